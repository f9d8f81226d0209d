//! Post-commit tasks: side effects that follow a successful record write.
//!
//! Ingestion never performs these itself. It returns them so the caller can
//! run them inline, spawn them, or drop them, and a failure here can never
//! undo the committed record.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use petmatch_core::{
    CandidateIndex, Error, ImageEmbedding, NewNotification, NotificationRepository, Record,
    RecordRepository, RecordStatus, Result,
};

use crate::config::{PipelineConfig, RetryPolicy};

/// A bounded unit of work emitted by ingestion.
#[derive(Debug, Clone)]
pub enum PostCommitTask {
    /// Store the representative embedding and colour signature on the record.
    AttachSignature {
        record_id: Uuid,
        embedding: ImageEmbedding,
    },
    /// Notify owners of LOST records that look like this FOUND record.
    NotifyOwners { found: Record, vector: Vec<f32> },
}

impl PostCommitTask {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AttachSignature { .. } => "attach_signature",
            Self::NotifyOwners { .. } => "notify_owners",
        }
    }

    pub fn record_id(&self) -> Uuid {
        match self {
            Self::AttachSignature { record_id, .. } => *record_id,
            Self::NotifyOwners { found, .. } => found.id,
        }
    }
}

/// A task that gave up.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub task: &'static str,
    pub record_id: Uuid,
    pub attempts: u32,
    pub error: String,
}

/// What the post-commit tasks of one ingestion actually achieved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskReport {
    pub signature_attached: bool,
    pub notifications_sent: usize,
    pub failures: Vec<TaskFailure>,
}

fn is_retryable(error: &Error) -> bool {
    !matches!(
        error,
        Error::InvalidInput(_) | Error::RecordNotFound(_) | Error::NotFound(_)
    )
}

/// Executes [`PostCommitTask`]s with a retry/backoff policy.
#[derive(Clone)]
pub struct TaskRunner {
    records: Arc<dyn RecordRepository>,
    index: Arc<dyn CandidateIndex>,
    notifications: Arc<dyn NotificationRepository>,
    config: PipelineConfig,
}

impl TaskRunner {
    pub fn new(
        records: Arc<dyn RecordRepository>,
        index: Arc<dyn CandidateIndex>,
        notifications: Arc<dyn NotificationRepository>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            records,
            index,
            notifications,
            config,
        }
    }

    /// Run every task in order and report the outcome. Never fails.
    pub async fn run_all(&self, tasks: Vec<PostCommitTask>) -> TaskReport {
        let mut report = TaskReport::default();
        for task in tasks {
            self.run(&task, &mut report).await;
        }
        report
    }

    /// Run one task, folding its outcome into `report`.
    pub async fn run(&self, task: &PostCommitTask, report: &mut TaskReport) {
        let start = Instant::now();
        let (outcome, attempts) = match task {
            PostCommitTask::AttachSignature {
                record_id,
                embedding,
            } => {
                let (result, attempts) = self
                    .with_retry(task.kind(), *record_id, || {
                        self.records.attach_signature(
                            *record_id,
                            &embedding.vector,
                            &embedding.colors,
                        )
                    })
                    .await;
                if result.is_ok() {
                    report.signature_attached = true;
                }
                (result.map(|_| ()), attempts)
            }
            PostCommitTask::NotifyOwners { found, vector } => {
                let (result, attempts) = self.notify_owners(found, vector).await;
                if let Ok(sent) = result {
                    report.notifications_sent += sent;
                }
                (result.map(|_| ()), attempts)
            }
        };

        match outcome {
            Ok(()) => debug!(
                subsystem = "pipeline",
                component = "task_runner",
                op = task.kind(),
                record_id = %task.record_id(),
                attempt = attempts,
                duration_ms = start.elapsed().as_millis() as u64,
                "Post-commit task complete"
            ),
            Err(e) => {
                warn!(
                    subsystem = "pipeline",
                    component = "task_runner",
                    op = task.kind(),
                    record_id = %task.record_id(),
                    attempt = attempts,
                    error = %e,
                    "Post-commit task failed"
                );
                report.failures.push(TaskFailure {
                    task: task.kind(),
                    record_id: task.record_id(),
                    attempts,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Query LOST records above the notification threshold and write one
    /// notification per owned match. Only the index query is retried; a
    /// failed write is logged and skipped so retries never duplicate.
    #[instrument(skip(self, found, vector), fields(subsystem = "pipeline", component = "task_runner", op = "notify_owners", record_id = %found.id))]
    async fn notify_owners(&self, found: &Record, vector: &[f32]) -> (Result<usize>, u32) {
        let threshold = self.config.notify_threshold;
        let index_timeout = self.config.index_timeout;
        let (matches, attempts) = self
            .with_retry("notify_owners", found.id, || async move {
                tokio::time::timeout(
                    index_timeout,
                    self.index.query(
                        vector,
                        RecordStatus::Lost,
                        threshold,
                        self.config.notify_limit,
                    ),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(Error::IndexQueryFailed(format!(
                        "candidate query exceeded {}ms",
                        index_timeout.as_millis()
                    )))
                })
            })
            .await;
        let matches = match matches {
            Ok(m) => m,
            Err(e @ Error::IndexQueryFailed(_)) => return (Err(e), attempts),
            Err(e) => return (Err(Error::IndexQueryFailed(e.to_string())), attempts),
        };

        let pending: Vec<NewNotification> = matches
            .iter()
            .filter(|c| c.similarity >= threshold && c.record.id != found.id)
            .filter_map(|c| {
                let owner = c.record.owner_id.as_deref()?.trim();
                (!owner.is_empty()).then(|| {
                    NewNotification::pet_match(owner.to_string(), found, &c.record, c.similarity)
                })
            })
            .collect();

        let writes = pending.into_iter().map(|n| {
            let lost_id = n.lost_record_id;
            async move {
                let result =
                    tokio::time::timeout(self.config.write_timeout, self.notifications.insert(n))
                        .await
                        .unwrap_or_else(|_| {
                            Err(Error::Timeout("notification write".to_string()))
                        });
                if let Err(e) = &result {
                    warn!(lost_record_id = %lost_id, error = %e, "Notification write failed");
                }
                result.is_ok()
            }
        });
        let sent = join_all(writes).await.into_iter().filter(|ok| *ok).count();

        info!(
            candidate_count = matches.len(),
            result_count = sent,
            "Owner notifications written"
        );
        (Ok(sent), attempts)
    }

    /// Retry `op` per the policy. Returns the final result and the number of
    /// attempts made.
    async fn with_retry<T, F, Fut>(
        &self,
        op: &'static str,
        record_id: Uuid,
        mut f: F,
    ) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let retry: &RetryPolicy = &self.config.retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(retry.attempt_timeout, f())
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(format!(
                        "{} exceeded {}ms",
                        op,
                        retry.attempt_timeout.as_millis()
                    )))
                });
            match result {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if attempt < retry.max_attempts && is_retryable(&e) => {
                    let delay = retry.backoff_for(attempt);
                    warn!(
                        op,
                        record_id = %record_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying post-commit task"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use petmatch_core::testing::{
        record_fixture, MemoryNotificationRepository, MemoryRecordRepository,
        StaticCandidateIndex,
    };
    use petmatch_core::{Candidate, ColorSignature, NewRecord, Submission};

    fn runner(
        records: MemoryRecordRepository,
        index: Arc<dyn CandidateIndex>,
        notifications: MemoryNotificationRepository,
    ) -> TaskRunner {
        TaskRunner::new(
            Arc::new(records),
            index,
            Arc::new(notifications),
            PipelineConfig::default(),
        )
    }

    fn lost_with_owner(owner: Option<&str>) -> Record {
        let mut r = record_fixture(RecordStatus::Lost, Some(vec![1.0, 0.0]), None);
        r.owner_id = owner.map(str::to_string);
        r
    }

    fn notify_task() -> PostCommitTask {
        PostCommitTask::NotifyOwners {
            found: record_fixture(RecordStatus::Found, None, None),
            vector: vec![1.0, 0.0],
        }
    }

    #[tokio::test]
    async fn test_notifies_owner_above_threshold() {
        let lost = lost_with_owner(Some("owner-1"));
        let index = StaticCandidateIndex::new(vec![Candidate {
            record: lost.clone(),
            similarity: 0.9,
        }]);
        let notifications = MemoryNotificationRepository::new();
        let runner = runner(
            MemoryRecordRepository::new(),
            Arc::new(index),
            notifications.clone(),
        );

        let task = notify_task();
        let found_id = task.record_id();
        let report = runner.run_all(vec![task]).await;

        assert_eq!(report.notifications_sent, 1);
        let written = notifications.all();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].recipient_id, "owner-1");
        assert_eq!(written[0].found_record_id, found_id);
        assert_eq!(written[0].lost_record_id, lost.id);
    }

    #[tokio::test]
    async fn test_no_notification_below_threshold() {
        let index = StaticCandidateIndex::new(vec![Candidate {
            record: lost_with_owner(Some("owner-1")),
            similarity: 0.6,
        }]);
        let notifications = MemoryNotificationRepository::new();
        let runner = runner(
            MemoryRecordRepository::new(),
            Arc::new(index),
            notifications.clone(),
        );

        let report = runner.run_all(vec![notify_task()]).await;

        assert_eq!(report.notifications_sent, 0);
        assert!(notifications.all().is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_unowned_lost_records_are_skipped() {
        let index = StaticCandidateIndex::new(vec![
            Candidate {
                record: lost_with_owner(None),
                similarity: 0.95,
            },
            Candidate {
                record: lost_with_owner(Some("  ")),
                similarity: 0.95,
            },
            Candidate {
                record: lost_with_owner(Some("owner-2")),
                similarity: 0.88,
            },
        ]);
        let notifications = MemoryNotificationRepository::new();
        let runner = runner(
            MemoryRecordRepository::new(),
            Arc::new(index),
            notifications.clone(),
        );

        let report = runner.run_all(vec![notify_task()]).await;
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(notifications.all()[0].recipient_id, "owner-2");
    }

    #[tokio::test]
    async fn test_notification_write_failure_is_swallowed() {
        let index = StaticCandidateIndex::new(vec![Candidate {
            record: lost_with_owner(Some("owner-1")),
            similarity: 0.9,
        }]);
        let runner = runner(
            MemoryRecordRepository::new(),
            Arc::new(index),
            MemoryNotificationRepository::failing(),
        );
        let report = runner.run_all(vec![notify_task()]).await;
        assert_eq!(report.notifications_sent, 0);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_failure_is_reported_not_raised() {
        let runner = runner(
            MemoryRecordRepository::new(),
            Arc::new(MemoryRecordRepository::new().failing_queries()),
            MemoryNotificationRepository::new(),
        );
        let report = runner.run_all(vec![notify_task()]).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].task, "notify_owners");
        assert_eq!(report.failures[0].attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_index_query_hits_index_timeout() {
        let index = StaticCandidateIndex::new(vec![Candidate {
            record: lost_with_owner(Some("owner-1")),
            similarity: 0.95,
        }])
        .with_delay(Duration::from_millis(300));
        let calls = index.clone();
        let notifications = MemoryNotificationRepository::new();
        let runner = TaskRunner::new(
            Arc::new(MemoryRecordRepository::new()),
            Arc::new(index),
            Arc::new(notifications.clone()),
            PipelineConfig::default().with_index_timeout(Duration::from_millis(20)),
        );

        let report = runner.run_all(vec![notify_task()]).await;

        assert_eq!(report.notifications_sent, 0);
        assert!(notifications.all().is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].task, "notify_owners");
        assert_eq!(report.failures[0].attempts, 3);
        assert!(report.failures[0].error.contains("exceeded 20ms"));
        assert_eq!(calls.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_signature_retries_then_succeeds() {
        let records = MemoryRecordRepository::new().with_attach_failures(2);
        let record = records
            .insert(NewRecord::from_submission(
                &Submission::new(RecordStatus::Found, Vec::new()),
                vec!["memory://a".into()],
            ))
            .await
            .unwrap();
        let runner = runner(
            records.clone(),
            Arc::new(StaticCandidateIndex::default()),
            MemoryNotificationRepository::new(),
        );

        let started = tokio::time::Instant::now();
        let report = runner
            .run_all(vec![PostCommitTask::AttachSignature {
                record_id: record.id,
                embedding: ImageEmbedding {
                    vector: vec![0.5, 0.5],
                    colors: ColorSignature::empty(),
                },
            }])
            .await;

        assert!(report.signature_attached);
        assert!(report.failures.is_empty());
        assert_eq!(records.attach_calls(), 3);
        // 200ms + 400ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(600));
        assert!(records.get(record.id).await.unwrap().has_signature());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_signature_gives_up_after_max_attempts() {
        let records = MemoryRecordRepository::new().with_attach_failures(10);
        let record = records
            .insert(NewRecord::from_submission(
                &Submission::new(RecordStatus::Lost, Vec::new()),
                vec!["memory://a".into()],
            ))
            .await
            .unwrap();
        let runner = runner(
            records.clone(),
            Arc::new(StaticCandidateIndex::default()),
            MemoryNotificationRepository::new(),
        );

        let report = runner
            .run_all(vec![PostCommitTask::AttachSignature {
                record_id: record.id,
                embedding: ImageEmbedding {
                    vector: vec![1.0],
                    colors: ColorSignature::empty(),
                },
            }])
            .await;

        assert!(!report.signature_attached);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(records.attach_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_retried() {
        let records = MemoryRecordRepository::new();
        let runner = runner(
            records.clone(),
            Arc::new(StaticCandidateIndex::default()),
            MemoryNotificationRepository::new(),
        );
        let report = runner
            .run_all(vec![PostCommitTask::AttachSignature {
                record_id: Uuid::now_v7(),
                embedding: ImageEmbedding {
                    vector: vec![1.0],
                    colors: ColorSignature::empty(),
                },
            }])
            .await;
        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(records.attach_calls(), 1);
    }
}
