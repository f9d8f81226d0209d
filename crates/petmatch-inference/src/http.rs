//! HTTP client for the image embedding service.
//!
//! The service exposes two endpoints:
//! - `POST {base}/embed` with a multipart `file` part (raw image bytes)
//! - `POST {base}/embed-url` with JSON `{"image_url": "..."}`
//!
//! Both answer `{"embedding": [f32], "colors": [[r,g,b]], "color_percentages": [f32]}`.
//! Any failure, including a payload that does not validate, surfaces as a
//! single [`Error::EmbeddingFailed`]; nothing is ever partially parsed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use petmatch_core::{
    defaults, env_or, ColorSignature, EmbeddingBackend, Error, ImageBlob, ImageEmbedding, Result,
    Rgb,
};

/// Requests slower than this are logged with `slow = true`.
const SLOW_EMBED_MS: u64 = 5000;

/// Connection settings for the embedding service.
#[derive(Debug, Clone)]
pub struct EmbedServiceConfig {
    pub base_url: String,
    /// Deadline of a single embedding request.
    pub timeout: Duration,
    /// Expected vector length; responses of another length are rejected.
    pub dimension: usize,
}

impl Default for EmbedServiceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::EMBEDDING_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            dimension: defaults::EMBED_DIMENSION,
        }
    }
}

impl EmbedServiceConfig {
    /// Read `EMBEDDING_SERVICE_URL`, `EMBED_TIMEOUT_SECS` and `EMBED_DIMENSION`.
    pub fn from_env() -> Self {
        let base_url = std::env::var("EMBEDDING_SERVICE_URL")
            .unwrap_or_else(|_| defaults::EMBEDDING_SERVICE_URL.to_string());
        Self {
            base_url,
            timeout: Duration::from_secs(env_or("EMBED_TIMEOUT_SECS", defaults::EMBED_TIMEOUT_SECS)),
            dimension: env_or("EMBED_DIMENSION", defaults::EMBED_DIMENSION),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

/// [`EmbeddingBackend`] backed by the HTTP embedding service.
#[derive(Clone)]
pub struct HttpEmbeddingBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
    dimension: usize,
}

#[derive(Serialize)]
struct EmbedUrlRequest<'a> {
    image_url: &'a str,
}

/// Wire format of an embedding response.
#[derive(Debug, Deserialize)]
pub(crate) struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    colors: Option<Vec<[f32; 3]>>,
    #[serde(default)]
    color_percentages: Option<Vec<f32>>,
}

impl HttpEmbeddingBackend {
    pub fn new(config: EmbedServiceConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(Error::Config("embedding dimension must be positive".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "http_embedder",
            base_url = %config.base_url,
            dimension = config.dimension,
            timeout_secs = config.timeout.as_secs(),
            "Initializing embedding service client"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            dimension: config.dimension,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EmbedServiceConfig::from_env())
    }

    /// True if `GET {base}/health` answers 2xx within five seconds.
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Embedding service health check failed");
                false
            }
        }
    }

    async fn read_response(&self, response: Response, started: Instant) -> Result<ImageEmbedding> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingFailed(format!(
                "embedding service returned {}: {}",
                status, body
            )));
        }

        let payload: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingFailed(format!("Failed to parse response: {}", e)))?;
        let embedding = parse_embed_response(payload, self.dimension)?;

        let elapsed = started.elapsed().as_millis() as u64;
        debug!(
            duration_ms = elapsed,
            color_count = embedding.colors.len(),
            "Embedding complete"
        );
        if elapsed > SLOW_EMBED_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow embedding operation");
        }
        Ok(embedding)
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::EmbeddingFailed(format!(
                "embedding request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            Error::EmbeddingFailed(format!("Request failed: {}", e))
        }
    }
}

/// Validate a decoded response into an [`ImageEmbedding`].
pub(crate) fn parse_embed_response(
    payload: EmbedResponse,
    expected_dimension: usize,
) -> Result<ImageEmbedding> {
    if payload.embedding.len() != expected_dimension {
        return Err(Error::EmbeddingFailed(format!(
            "expected {}-dimensional embedding, got {}",
            expected_dimension,
            payload.embedding.len()
        )));
    }
    if payload.embedding.iter().any(|v| !v.is_finite()) {
        return Err(Error::EmbeddingFailed(
            "embedding contains non-finite values".to_string(),
        ));
    }

    let colors = match (payload.colors, payload.color_percentages) {
        (None, None) => ColorSignature::empty(),
        (Some(colors), Some(weights)) => {
            let rgb = colors
                .into_iter()
                .map(|[r, g, b]| {
                    let channel = |v: f32| {
                        if v.is_finite() && (0.0..=255.0).contains(&v) {
                            Ok(v.round() as u8)
                        } else {
                            Err(Error::EmbeddingFailed(format!(
                                "colour channel out of range: {}",
                                v
                            )))
                        }
                    };
                    Ok(Rgb([channel(r)?, channel(g)?, channel(b)?]))
                })
                .collect::<Result<Vec<_>>>()?;
            ColorSignature::new(rgb, weights)
                .map_err(|e| Error::EmbeddingFailed(format!("invalid colour signature: {}", e)))?
        }
        _ => {
            return Err(Error::EmbeddingFailed(
                "colors and color_percentages must be supplied together".to_string(),
            ))
        }
    };

    Ok(ImageEmbedding {
        vector: payload.embedding,
        colors,
    })
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    #[instrument(skip(self, image), fields(subsystem = "inference", component = "http_embedder", op = "embed_image", size = image.data.len()))]
    async fn embed_image(&self, image: &ImageBlob) -> Result<ImageEmbedding> {
        let started = Instant::now();
        let part = multipart::Part::bytes(image.data.clone())
            .file_name(
                image
                    .filename
                    .clone()
                    .unwrap_or_else(|| format!("upload.{}", image.extension())),
            )
            .mime_str(image.content_type_or_default())
            .map_err(|e| Error::EmbeddingFailed(format!("invalid content type: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        self.read_response(response, started).await
    }

    #[instrument(skip(self), fields(subsystem = "inference", component = "http_embedder", op = "embed_url"))]
    async fn embed_url(&self, url: &str) -> Result<ImageEmbedding> {
        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/embed-url", self.base_url))
            .timeout(self.timeout)
            .json(&EmbedUrlRequest { image_url: url })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        self.read_response(response, started).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> EmbedResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_full_response() {
        let parsed = parse_embed_response(
            payload(serde_json::json!({
                "embedding": [0.1, 0.2, 0.3],
                "colors": [[255, 0, 0], [0, 0, 255]],
                "color_percentages": [0.7, 0.3],
            })),
            3,
        )
        .unwrap();
        assert_eq!(parsed.vector.len(), 3);
        assert_eq!(parsed.colors.colors(), &[Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)]);
    }

    #[test]
    fn test_parse_without_colors_yields_empty_signature() {
        let parsed =
            parse_embed_response(payload(serde_json::json!({"embedding": [1.0, 0.0]})), 2)
                .unwrap();
        assert!(parsed.colors.is_empty());
    }

    #[test]
    fn test_parse_rejects_dimension_mismatch() {
        let err = parse_embed_response(payload(serde_json::json!({"embedding": [1.0]})), 512)
            .unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailed(_)));
    }

    #[test]
    fn test_parse_rejects_length_mismatch() {
        let err = parse_embed_response(
            payload(serde_json::json!({
                "embedding": [1.0],
                "colors": [[1, 2, 3]],
                "color_percentages": [0.5, 0.5],
            })),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailed(_)));
    }

    #[test]
    fn test_parse_rejects_half_signature() {
        let err = parse_embed_response(
            payload(serde_json::json!({"embedding": [1.0], "colors": [[1, 2, 3]]})),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailed(_)));
    }

    #[test]
    fn test_parse_rejects_out_of_range_channel() {
        let err = parse_embed_response(
            payload(serde_json::json!({
                "embedding": [1.0],
                "colors": [[1, 2, 999]],
                "color_percentages": [1.0],
            })),
            1,
        )
        .unwrap_err();
        assert!(matches!(err, Error::EmbeddingFailed(_)));
    }

    #[test]
    fn test_config_builder() {
        let config = EmbedServiceConfig::default()
            .with_base_url("http://embed:9000")
            .with_timeout(Duration::from_secs(3))
            .with_dimension(128);
        assert_eq!(config.base_url, "http://embed:9000");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.dimension, 128);
    }

    #[test]
    fn test_zero_dimension_is_config_error() {
        let err = HttpEmbeddingBackend::new(EmbedServiceConfig::default().with_dimension(0))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
