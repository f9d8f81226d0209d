//! # petmatch-core
//!
//! Core types, traits, and scoring policy for petmatch.
//!
//! This crate provides the data model (submissions, records, colour
//! signatures, notifications), the trait seams to external collaborators,
//! and the error type shared by every other petmatch crate.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod policy;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use policy::{env_or, MatchPolicy, ScoreWeights};
pub use traits::*;
