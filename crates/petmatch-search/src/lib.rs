//! # petmatch-search
//!
//! Matching and ranking engine for petmatch.
//!
//! This crate provides:
//! - Dominant-colour similarity
//! - Categorical feature agreement
//! - Weighted fusion of vector, colour and feature signals
//! - [`MatchEngine`], which embeds a query photo, retrieves candidates from
//!   the index and re-ranks them
//!
//! ## Example
//!
//! ```ignore
//! use petmatch_search::{MatchEngine, SearchConfig};
//!
//! let engine = MatchEngine::new(embedder, index, SearchConfig::from_env()?);
//! let matches = engine.search(&photo, SearchMode::Lost, Some(&attributes)).await?;
//! ```

pub mod color;
pub mod engine;
pub mod features;
pub mod scoring;

pub use color::color_score;
pub use engine::{MatchEngine, SearchConfig};
pub use features::{attribute_matches, feature_score};
pub use scoring::{rank, score_candidate, QuerySignals};
