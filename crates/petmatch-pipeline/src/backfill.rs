//! Signature backfill for records whose every embedding failed at ingestion.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use petmatch_core::{EmbeddingBackend, Error, RecordRepository, Result};

use crate::config::PipelineConfig;
use crate::tasks::{PostCommitTask, TaskReport, TaskRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Attached,
    EmbedFailed,
    AttachFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillItem {
    pub record_id: Uuid,
    pub status: BackfillStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub attached: usize,
    pub failed: usize,
    pub items: Vec<BackfillItem>,
}

impl BackfillReport {
    fn push(&mut self, item: BackfillItem) {
        self.processed += 1;
        if item.status == BackfillStatus::Attached {
            self.attached += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(item);
    }
}

/// Re-embeds the primary image of unsigned records, one batch per call.
#[derive(Clone)]
pub struct Backfill {
    records: Arc<dyn RecordRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    runner: TaskRunner,
    config: PipelineConfig,
}

impl Backfill {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        runner: TaskRunner,
        config: PipelineConfig,
    ) -> Self {
        Self {
            records,
            embedder,
            runner,
            config,
        }
    }

    /// Process up to `limit` records missing a signature.
    ///
    /// Per-record failures land in the report; only the listing query can
    /// fail the whole batch. Owners are not notified from here.
    #[instrument(skip(self), fields(subsystem = "pipeline", component = "backfill", op = "backfill"))]
    pub async fn run(&self, limit: i64) -> Result<BackfillReport> {
        let start = Instant::now();
        let pending = self.records.list_missing_signature(limit.max(1)).await?;
        let mut report = BackfillReport::default();

        for record in pending {
            let Some(url) = record.primary_image_url() else {
                continue;
            };

            let embedding =
                tokio::time::timeout(self.config.embed_timeout, self.embedder.embed_url(url))
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::EmbeddingFailed(format!(
                            "timed out after {}ms",
                            self.config.embed_timeout.as_millis()
                        )))
                    });
            let embedding = match embedding {
                Ok(e) => e,
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Backfill embedding failed");
                    report.push(BackfillItem {
                        record_id: record.id,
                        status: BackfillStatus::EmbedFailed,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let mut outcome = TaskReport::default();
            self.runner
                .run(
                    &PostCommitTask::AttachSignature {
                        record_id: record.id,
                        embedding,
                    },
                    &mut outcome,
                )
                .await;

            report.push(match outcome.failures.pop() {
                None if outcome.signature_attached => BackfillItem {
                    record_id: record.id,
                    status: BackfillStatus::Attached,
                    error: None,
                },
                failure => BackfillItem {
                    record_id: record.id,
                    status: BackfillStatus::AttachFailed,
                    error: failure.map(|f| f.error),
                },
            });
        }

        info!(
            result_count = report.processed,
            attached = report.attached,
            failed = report.failed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Backfill batch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petmatch_core::testing::{
        record_fixture, MemoryNotificationRepository, MemoryRecordRepository,
    };
    use petmatch_core::RecordStatus;
    use petmatch_inference::MockEmbeddingBackend;

    fn backfill(records: MemoryRecordRepository, embedder: MockEmbeddingBackend) -> Backfill {
        let config = PipelineConfig::default();
        let runner = TaskRunner::new(
            Arc::new(records.clone()),
            Arc::new(records.clone()),
            Arc::new(MemoryNotificationRepository::new()),
            config.clone(),
        );
        Backfill::new(Arc::new(records), Arc::new(embedder), runner, config)
    }

    #[tokio::test]
    async fn test_backfill_attaches_missing_signatures() {
        let records = MemoryRecordRepository::new();
        let unsigned = record_fixture(RecordStatus::Lost, None, None);
        let signed = record_fixture(RecordStatus::Found, Some(vec![1.0]), None);
        records.seed(unsigned.clone());
        records.seed(signed);

        let report = backfill(records.clone(), MockEmbeddingBackend::new().with_dimension(8))
            .run(50)
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.attached, 1);
        assert_eq!(report.items[0].record_id, unsigned.id);
        assert!(records.get(unsigned.id).await.unwrap().has_signature());
    }

    #[tokio::test]
    async fn test_backfill_reports_embed_failures() {
        let records = MemoryRecordRepository::new();
        let broken = record_fixture(RecordStatus::Lost, None, None);
        let ok = record_fixture(RecordStatus::Lost, None, None);
        records.seed(broken.clone());
        records.seed(ok.clone());

        let embedder =
            MockEmbeddingBackend::new().with_failing_input(broken.image_urls[0].clone());
        let report = backfill(records.clone(), embedder).run(50).await.unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.attached, 1);
        assert_eq!(report.failed, 1);
        let failed = report
            .items
            .iter()
            .find(|i| i.record_id == broken.id)
            .unwrap();
        assert_eq!(failed.status, BackfillStatus::EmbedFailed);
        assert!(failed.error.is_some());
        assert!(!records.get(broken.id).await.unwrap().has_signature());
        assert!(records.get(ok.id).await.unwrap().has_signature());
    }

    #[tokio::test]
    async fn test_backfill_respects_batch_limit() {
        let records = MemoryRecordRepository::new();
        for _ in 0..5 {
            records.seed(record_fixture(RecordStatus::Found, None, None));
        }
        let report = backfill(records, MockEmbeddingBackend::new())
            .run(2)
            .await
            .unwrap();
        assert_eq!(report.processed, 2);
    }

    #[tokio::test]
    async fn test_backfill_empty_batch() {
        let report = backfill(MemoryRecordRepository::new(), MockEmbeddingBackend::new())
            .run(50)
            .await
            .unwrap();
        assert_eq!(report.processed, 0);
        assert!(report.items.is_empty());
    }
}
