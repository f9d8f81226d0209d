//! Structured logging schema and field name constants for petmatch.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query ingestion and search events uniformly.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Fatal to the caller (record write failed, search could not embed) |
//! | WARN  | Degraded but recovered (one upload or embedding failed, task retried) |
//! | INFO  | Lifecycle events and operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-candidate scoring detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "search", "db", "inference", "pipeline"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "ingest", "task_runner", "match_engine", "http_embedder", "records"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "ingest", "search", "embed_url", "query", "attach_signature"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Record UUID being operated on.
pub const RECORD_ID: &str = "record_id";

/// Record status (LOST / FOUND).
pub const STATUS: &str = "status";

/// Notification recipient.
pub const RECIPIENT_ID: &str = "recipient_id";

/// Storage key of an uploaded image.
pub const STORAGE_KEY: &str = "storage_key";

/// Position of an image within its submission.
pub const IMAGE_INDEX: &str = "image_index";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of candidates fetched from the index before ranking.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of images received in a submission.
pub const IMAGE_COUNT: &str = "image_count";

/// Task attempt number (1-based).
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
