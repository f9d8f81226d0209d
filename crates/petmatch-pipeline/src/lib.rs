//! # petmatch-pipeline
//!
//! Submission ingestion for petmatch.
//!
//! [`IngestionPipeline`] stores photos, writes the record and extracts a
//! visual signature. Side effects that follow the record write are returned
//! as [`PostCommitTask`]s and executed by a [`TaskRunner`] with its own retry
//! policy. [`Backfill`] re-runs signature extraction for unsigned records.

pub mod backfill;
pub mod config;
pub mod ingest;
pub mod tasks;

pub use backfill::{Backfill, BackfillItem, BackfillReport, BackfillStatus};
pub use config::{PipelineConfig, RetryPolicy, TaskMode};
pub use ingest::{Enrichment, IngestOutcome, IngestReport, Ingested, IngestionPipeline};
pub use tasks::{PostCommitTask, TaskFailure, TaskReport, TaskRunner};
