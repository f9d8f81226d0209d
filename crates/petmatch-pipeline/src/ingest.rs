//! Submission ingestion: upload, persist, analyze.
//!
//! Only two failures abort an ingestion: every upload failing and the record
//! write failing. Everything after the record write degrades instead.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use petmatch_core::{
    EmbeddingBackend, Error, ImageEmbedding, ImageStore, NewRecord, Record, RecordRepository,
    RecordStatus, Result, Submission,
};

use crate::config::{PipelineConfig, TaskMode};
use crate::tasks::{PostCommitTask, TaskReport, TaskRunner};

/// Counters describing how far an ingestion got.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub images_received: usize,
    pub images_stored: usize,
    pub embeddings_succeeded: usize,
    /// Position, among the stored images, of the image whose signature represents the record.
    pub representative_index: Option<usize>,
}

/// A committed record plus the side effects still owed to it.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub record: Record,
    pub tasks: Vec<PostCommitTask>,
    pub report: IngestReport,
}

/// Whether enrichment was applied before the caller got the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enrichment {
    /// Post-commit tasks ran; see the task report.
    Applied,
    /// Tasks were handed to a background task and may finish later.
    Pending,
    /// No task was emitted (no usable embedding).
    None,
}

/// Result of [`IngestionPipeline::ingest_and_run`].
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub record: Record,
    pub report: IngestReport,
    pub enrichment: Enrichment,
    /// Present when tasks ran inline.
    pub tasks: Option<TaskReport>,
}

/// Ingestion entry point.
#[derive(Clone)]
pub struct IngestionPipeline {
    images: Arc<dyn ImageStore>,
    records: Arc<dyn RecordRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        images: Arc<dyn ImageStore>,
        records: Arc<dyn RecordRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            images,
            records,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Store images, write the record and compute its signature.
    ///
    /// Returns the committed record with the post-commit tasks it needs. The
    /// record is returned even when no embedding succeeded.
    #[instrument(skip(self, submission), fields(subsystem = "pipeline", component = "ingest", op = "ingest", status = %submission.status, image_count = submission.images.len()))]
    pub async fn ingest(&self, mut submission: Submission) -> Result<Ingested> {
        let start = Instant::now();
        let images_received = submission.images.len();
        submission.images.retain(|b| !b.data.is_empty());
        let empty = images_received - submission.images.len();
        if empty > 0 {
            warn!(
                skipped = empty,
                image_count = images_received,
                "Skipping empty image parts"
            );
        }
        self.validate(&submission)?;

        let mut report = IngestReport {
            images_received,
            ..IngestReport::default()
        };

        let image_urls = self.upload_all(&submission).await;
        if image_urls.is_empty() {
            error!(
                image_count = report.images_received,
                "Every image upload failed, nothing persisted"
            );
            return Err(Error::StorageUnavailable(format!(
                "none of {} images could be stored",
                report.images_received
            )));
        }
        report.images_stored = image_urls.len();

        let record = self.persist(&submission, image_urls).await?;

        let embeddings = self.embed_all(&record.image_urls).await;
        report.embeddings_succeeded = embeddings.iter().filter(|e| e.is_some()).count();
        let mut tasks = Vec::new();
        match select_representative(embeddings) {
            Some((index, embedding)) => {
                report.representative_index = Some(index);
                let vector = embedding.vector.clone();
                tasks.push(PostCommitTask::AttachSignature {
                    record_id: record.id,
                    embedding,
                });
                if record.status == RecordStatus::Found {
                    tasks.push(PostCommitTask::NotifyOwners {
                        found: record.clone(),
                        vector,
                    });
                }
            }
            None => warn!(
                record_id = %record.id,
                image_count = report.images_stored,
                "No embedding succeeded, record saved without signature"
            ),
        }

        info!(
            record_id = %record.id,
            images_stored = report.images_stored,
            embeddings_succeeded = report.embeddings_succeeded,
            task_count = tasks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ingestion committed"
        );

        Ok(Ingested {
            record,
            tasks,
            report,
        })
    }

    /// Ingest, then run the post-commit tasks according to the task mode.
    ///
    /// Inline: the returned record carries the signature when it was attached.
    /// Background: the tasks are spawned and the record is returned as written.
    pub async fn ingest_and_run(
        &self,
        submission: Submission,
        runner: &TaskRunner,
    ) -> Result<IngestOutcome> {
        let Ingested {
            mut record,
            tasks,
            report,
        } = self.ingest(submission).await?;

        if tasks.is_empty() {
            return Ok(IngestOutcome {
                record,
                report,
                enrichment: Enrichment::None,
                tasks: None,
            });
        }

        match self.config.task_mode {
            TaskMode::Inline => {
                let signature = tasks.iter().find_map(|t| match t {
                    PostCommitTask::AttachSignature { embedding, .. } => Some(embedding.clone()),
                    _ => None,
                });
                let task_report = runner.run_all(tasks).await;
                if task_report.signature_attached {
                    if let Some(ImageEmbedding { vector, colors }) = signature {
                        record.embedding = Some(vector);
                        record.colors = (!colors.is_empty()).then_some(colors);
                    }
                }
                Ok(IngestOutcome {
                    record,
                    report,
                    enrichment: Enrichment::Applied,
                    tasks: Some(task_report),
                })
            }
            TaskMode::Background => {
                let runner = runner.clone();
                let record_id = record.id;
                tokio::spawn(async move {
                    let task_report = runner.run_all(tasks).await;
                    debug!(
                        subsystem = "pipeline",
                        component = "task_runner",
                        record_id = %record_id,
                        signature_attached = task_report.signature_attached,
                        notifications_sent = task_report.notifications_sent,
                        failure_count = task_report.failures.len(),
                        "Background post-commit tasks finished"
                    );
                });
                Ok(IngestOutcome {
                    record,
                    report,
                    enrichment: Enrichment::Pending,
                    tasks: None,
                })
            }
        }
    }

    fn validate(&self, submission: &Submission) -> Result<()> {
        if submission.images.is_empty() {
            return Err(Error::InvalidInput(
                "at least one image is required".to_string(),
            ));
        }
        if submission.images.len() > self.config.max_images {
            return Err(Error::InvalidInput(format!(
                "at most {} images per submission, got {}",
                self.config.max_images,
                submission.images.len()
            )));
        }
        if submission.status == RecordStatus::Reunited {
            return Err(Error::InvalidInput(
                "new submissions must be LOST or FOUND".to_string(),
            ));
        }
        submission.attributes.validate()
    }

    /// Upload concurrently; returns the URLs that made it, in submission order.
    async fn upload_all(&self, submission: &Submission) -> Vec<String> {
        let uploads = submission.images.iter().enumerate().map(|(i, blob)| {
            let key = format!(
                "{}/{}.{}",
                self.config.key_prefix,
                Uuid::now_v7(),
                blob.extension()
            );
            async move {
                match tokio::time::timeout(self.config.upload_timeout, self.images.store(&key, blob))
                    .await
                {
                    Ok(Ok(url)) => {
                        debug!(image_index = i, storage_key = %key, "Image stored");
                        Some(url)
                    }
                    Ok(Err(e)) => {
                        warn!(image_index = i, storage_key = %key, error = %e, "Image upload failed");
                        None
                    }
                    Err(_) => {
                        warn!(
                            image_index = i,
                            storage_key = %key,
                            timeout_ms = self.config.upload_timeout.as_millis() as u64,
                            "Image upload timed out"
                        );
                        None
                    }
                }
            }
        });
        join_all(uploads).await.into_iter().flatten().collect()
    }

    async fn persist(&self, submission: &Submission, image_urls: Vec<String>) -> Result<Record> {
        let new = NewRecord::from_submission(submission, image_urls);
        let record_id = new.id;
        match tokio::time::timeout(self.config.write_timeout, self.records.insert(new)).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(e)) => {
                error!(record_id = %record_id, error = %e, "Record write failed");
                Err(Error::PersistenceFailed(e.to_string()))
            }
            Err(_) => {
                error!(record_id = %record_id, "Record write timed out");
                Err(Error::PersistenceFailed(format!(
                    "record write timed out after {}ms",
                    self.config.write_timeout.as_millis()
                )))
            }
        }
    }

    /// One slot per URL; a failure or timeout leaves `None`.
    async fn embed_all(&self, urls: &[String]) -> Vec<Option<ImageEmbedding>> {
        let requests = urls.iter().enumerate().map(|(i, url)| async move {
            match tokio::time::timeout(self.config.embed_timeout, self.embedder.embed_url(url))
                .await
            {
                Ok(Ok(embedding)) => Some(embedding),
                Ok(Err(e)) => {
                    warn!(image_index = i, error = %e, "Embedding failed");
                    None
                }
                Err(_) => {
                    warn!(
                        image_index = i,
                        timeout_ms = self.config.embed_timeout.as_millis() as u64,
                        "Embedding timed out"
                    );
                    None
                }
            }
        });
        join_all(requests).await
    }
}

/// First successful embedding in submission order, with its position.
fn select_representative(
    embeddings: Vec<Option<ImageEmbedding>>,
) -> Option<(usize, ImageEmbedding)> {
    embeddings
        .into_iter()
        .enumerate()
        .find_map(|(i, e)| e.map(|e| (i, e)))
}
