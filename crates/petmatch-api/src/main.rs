//! petmatch-api - HTTP API server for petmatch

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petmatch_api::{router, AppConfig, AppState, Services};
use petmatch_core::EmbeddingBackend;
use petmatch_db::{Database, FilesystemImageStore, PoolConfig};
use petmatch_inference::HttpEmbeddingBackend;

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "petmatch=debug,tower_http=debug")
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "petmatch_api=debug,petmatch_pipeline=debug,petmatch_search=debug,\
         petmatch_db=info,petmatch_inference=info,tower_http=debug"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("petmatch-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _file_guard = init_logging();

    let config = AppConfig::from_env()?;
    info!(
        weights = ?config.search.policy.weights,
        search_floor = config.search.policy.search_floor,
        accept_floor = config.search.policy.accept_floor,
        notify_threshold = config.search.policy.notify_threshold,
        task_mode = ?config.pipeline.task_mode,
        "Matching policy loaded"
    );

    info!("Connecting to database...");
    let db = Database::connect_with_config(&config.server.database_url, PoolConfig::from_env())
        .await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let images = FilesystemImageStore::new(
        &config.server.image_storage_path,
        &config.server.public_base_url,
    );
    if let Err(e) = images.validate().await {
        warn!(
            path = %config.server.image_storage_path,
            error = %e,
            "Image storage is not writable; every upload will fail"
        );
    }
    info!(
        "Image storage initialized at {}",
        config.server.image_storage_path
    );

    let embedder = HttpEmbeddingBackend::from_env()?;
    if embedder.health_check().await {
        info!("Embedding service reachable: {}", embedder.model_name());
    } else {
        warn!("Embedding service unreachable; records will be saved without signatures");
    }

    let services = Services {
        images: Arc::new(images),
        records: Arc::new(db.records.clone()),
        index: Arc::new(db.records.clone()),
        notifications: Arc::new(db.notifications.clone()),
        embedder: Arc::new(embedder),
    };
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = router(AppState::new(services, config));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
