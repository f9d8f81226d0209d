//! # petmatch-inference
//!
//! Client for the image embedding service.
//!
//! This crate provides:
//! - [`HttpEmbeddingBackend`], the HTTP implementation of
//!   [`petmatch_core::EmbeddingBackend`]
//! - A scripted mock backend (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use petmatch_core::EmbeddingBackend;
//! use petmatch_inference::HttpEmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = HttpEmbeddingBackend::from_env().unwrap();
//!     let embedding = backend.embed_url("https://example.com/cat.jpg").await.unwrap();
//!     assert_eq!(embedding.vector.len(), backend.dimension());
//! }
//! ```

pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use http::{EmbedServiceConfig, HttpEmbeddingBackend};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingBackend;
