//! Shared application state.

use std::sync::Arc;

use petmatch_core::{
    CandidateIndex, EmbeddingBackend, ImageStore, NotificationRepository, RecordRepository,
};
use petmatch_pipeline::{Backfill, IngestionPipeline, TaskRunner};
use petmatch_search::MatchEngine;

use crate::config::AppConfig;

/// External collaborators the application is wired to.
#[derive(Clone)]
pub struct Services {
    pub images: Arc<dyn ImageStore>,
    pub records: Arc<dyn RecordRepository>,
    pub index: Arc<dyn CandidateIndex>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub embedder: Arc<dyn EmbeddingBackend>,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub pipeline: IngestionPipeline,
    pub runner: TaskRunner,
    pub engine: MatchEngine,
    pub backfill: Backfill,
    pub embedding_model: String,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(services: Services, config: AppConfig) -> Self {
        let runner = TaskRunner::new(
            services.records.clone(),
            services.index.clone(),
            services.notifications.clone(),
            config.pipeline.clone(),
        );
        let pipeline = IngestionPipeline::new(
            services.images.clone(),
            services.records.clone(),
            services.embedder.clone(),
            config.pipeline.clone(),
        );
        let engine = MatchEngine::new(
            services.embedder.clone(),
            services.index.clone(),
            config.search.clone(),
        );
        let backfill = Backfill::new(
            services.records.clone(),
            services.embedder.clone(),
            runner.clone(),
            config.pipeline.clone(),
        );
        Self {
            records: services.records,
            notifications: services.notifications,
            pipeline,
            runner,
            engine,
            backfill,
            embedding_model: services.embedder.model_name().to_string(),
            config: Arc::new(config),
        }
    }
}
