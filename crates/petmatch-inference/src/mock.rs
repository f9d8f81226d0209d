//! Scripted embedding backend for tests.
//!
//! Inputs are keyed by URL (`embed_url`) or by the image bytes read as
//! UTF-8 (`embed_image`). Unscripted inputs get a deterministic unit vector
//! derived from the key, so identical inputs embed identically.
//!
//! ```rust,ignore
//! let backend = MockEmbeddingBackend::new()
//!     .with_dimension(4)
//!     .with_failing_input("https://img/broken.jpg");
//! let embedding = backend.embed_url("https://img/ok.jpg").await.unwrap();
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use petmatch_core::{ColorSignature, EmbeddingBackend, Error, ImageBlob, ImageEmbedding, Result};

/// Mock embedding backend.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    responses: HashMap<String, ImageEmbedding>,
    failing_inputs: HashSet<String>,
    delays: HashMap<String, Duration>,
    fail_all: bool,
    default_colors: ColorSignature,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: petmatch_core::defaults::EMBED_DIMENSION,
            responses: HashMap::new(),
            failing_inputs: HashSet::new(),
            delays: HashMap::new(),
            fail_all: false,
            default_colors: ColorSignature::empty(),
        }
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        let mut backend = Self::new();
        Arc::make_mut(&mut backend.config).fail_all = true;
        backend
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Return `embedding` for this input.
    pub fn with_response(mut self, input: impl Into<String>, embedding: ImageEmbedding) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .insert(input.into(), embedding);
        self
    }

    /// Fail calls for this input.
    pub fn with_failing_input(mut self, input: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .failing_inputs
            .insert(input.into());
        self
    }

    /// Sleep before answering calls for this input.
    pub fn with_delay(mut self, input: impl Into<String>, delay: Duration) -> Self {
        Arc::make_mut(&mut self.config)
            .delays
            .insert(input.into(), delay);
        self
    }

    /// Colour signature attached to unscripted responses.
    pub fn with_default_colors(mut self, colors: ColorSignature) -> Self {
        Arc::make_mut(&mut self.config).default_colors = colors;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Deterministic unit vector for a key (FNV-1a seeded xorshift).
    pub fn vector_for(&self, key: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key.bytes() {
            state ^= byte as u64;
            state = state.wrapping_mul(0x0100_0000_01b3);
        }
        let mut vector: Vec<f32> = (0..self.config.dimension)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state % 2000) as f32 / 1000.0) - 1.0
            })
            .collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    async fn respond(&self, operation: &str, key: String) -> Result<ImageEmbedding> {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: key.clone(),
        });

        if let Some(delay) = self.config.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.config.fail_all || self.config.failing_inputs.contains(&key) {
            return Err(Error::EmbeddingFailed(format!("mock failure for {}", key)));
        }
        if let Some(scripted) = self.config.responses.get(&key) {
            return Ok(scripted.clone());
        }
        Ok(ImageEmbedding {
            vector: self.vector_for(&key),
            colors: self.config.default_colors.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_image(&self, image: &ImageBlob) -> Result<ImageEmbedding> {
        let key = String::from_utf8_lossy(&image.data).into_owned();
        self.respond("embed_image", key).await
    }

    async fn embed_url(&self, url: &str) -> Result<ImageEmbedding> {
        self.respond("embed_url", url.to_string()).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
