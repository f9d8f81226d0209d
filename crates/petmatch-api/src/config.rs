//! Server configuration.

use axum::http::HeaderValue;

use petmatch_core::{defaults, env_or, MatchPolicy, Result};
use petmatch_pipeline::PipelineConfig;
use petmatch_search::SearchConfig;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_upload_bytes: usize,
    /// Root directory of the filesystem image store.
    pub image_storage_path: String,
    /// Base URL under which stored images are served.
    pub public_base_url: String,
    pub backfill_batch_size: i64,
    pub allowed_origins: Vec<HeaderValue>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let host = "0.0.0.0".to_string();
        let port = defaults::SERVER_PORT;
        Self {
            public_base_url: format!("http://localhost:{}/images", port),
            host,
            port,
            database_url: "postgres://localhost/petmatch".to_string(),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            image_storage_path: defaults::IMAGE_STORAGE_PATH.to_string(),
            backfill_batch_size: defaults::BACKFILL_BATCH_SIZE,
            allowed_origins: vec![HeaderValue::from_static("http://localhost:3000")],
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let base = Self::default();
        let port = env_or("PORT", base.port);
        Self {
            host: env_or("HOST", base.host),
            port,
            database_url: env_or("DATABASE_URL", base.database_url),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", base.max_upload_bytes),
            image_storage_path: env_or("IMAGE_STORAGE_PATH", base.image_storage_path),
            public_base_url: env_or(
                "PUBLIC_BASE_URL",
                format!("http://localhost:{}/images", port),
            ),
            backfill_batch_size: env_or("BACKFILL_BATCH_SIZE", base.backfill_batch_size).max(1),
            allowed_origins: parse_allowed_origins(
                std::env::var("ALLOWED_ORIGINS").ok().as_deref(),
            ),
        }
    }
}

/// Parse a comma-separated origin list, skipping invalid entries.
pub fn parse_allowed_origins(raw: Option<&str>) -> Vec<HeaderValue> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return vec![HeaderValue::from_static("http://localhost:3000")],
    };
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// Everything the application needs, loaded once at start-up.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load and validate. An invalid matching policy fails start-up.
    pub fn from_env() -> Result<Self> {
        let policy = MatchPolicy::from_env()?;
        let search = SearchConfig::from_env()?.with_policy(policy);
        let pipeline = PipelineConfig::from_env(&policy)?;
        Ok(Self {
            server: ServerConfig::from_env(),
            search,
            pipeline,
        })
    }
}
