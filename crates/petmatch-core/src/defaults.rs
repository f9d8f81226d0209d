//! Centralized default constants for petmatch.
//!
//! **This module is the single source of truth** for shared default values.
//! Runtime overrides go through the `from_env()` constructors, which fall back
//! to these constants.

// =============================================================================
// SCORING POLICY
// =============================================================================

/// Weight of the vector similarity in the combined score.
pub const WEIGHT_EMBEDDING: f32 = 0.4;

/// Weight of the dominant-colour similarity in the combined score.
pub const WEIGHT_COLOR: f32 = 0.3;

/// Weight of the categorical feature agreement in the combined score.
pub const WEIGHT_FEATURE: f32 = 0.3;

/// Loose similarity floor for the candidate index query.
///
/// Colour and feature signals can only boost what vector search retrieved,
/// so this stays permissive.
pub const SEARCH_SIMILARITY_FLOOR: f32 = 0.4;

/// Final acceptance floor on the combined score.
pub const ACCEPT_FLOOR: f32 = 0.5;

/// Strict similarity threshold for notifying owners of lost pets.
pub const NOTIFY_THRESHOLD: f32 = 0.85;

/// Maximum candidates fetched from the index per search.
pub const CANDIDATE_LIMIT: i64 = 50;

/// Maximum ranked results returned per search.
pub const RESULT_LIMIT: usize = 20;

/// Neutral sub-score used when a signal has no usable input.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Largest possible Euclidean distance between two RGB colours, `sqrt(3 * 255^2)`.
pub const MAX_RGB_DISTANCE: f32 = 441.672_96;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding service base URL.
pub const EMBEDDING_SERVICE_URL: &str = "http://127.0.0.1:8000";

/// Default embedding vector dimension (ResNet-18 pooled features).
pub const EMBED_DIMENSION: usize = 512;

/// Timeout for a single embedding request in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// INGESTION
// =============================================================================

/// Timeout for a single image upload in seconds.
pub const UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single record/notification write in seconds.
pub const WRITE_TIMEOUT_SECS: u64 = 10;

/// Timeout for a single candidate index query in seconds.
pub const INDEX_QUERY_TIMEOUT_SECS: u64 = 10;

/// Prefix for image storage keys.
pub const IMAGE_KEY_PREFIX: &str = "pets";

/// Maximum images accepted in one submission.
pub const MAX_IMAGES_PER_SUBMISSION: usize = 10;

/// Maximum entries in the free-form extra attribute map.
pub const EXTRA_ATTRIBUTES_MAX: usize = 16;

/// Maximum key length in the extra attribute map.
pub const EXTRA_ATTRIBUTE_KEY_MAX: usize = 64;

/// Maximum value length in the extra attribute map.
pub const EXTRA_ATTRIBUTE_VALUE_MAX: usize = 256;

// =============================================================================
// POST-COMMIT TASKS
// =============================================================================

/// Attempts per post-commit task before it is reported as failed.
pub const TASK_MAX_ATTEMPTS: u32 = 3;

/// Initial retry backoff in milliseconds (doubles per attempt).
pub const TASK_BACKOFF_MS: u64 = 200;

/// Records processed per signature backfill run.
pub const BACKFILL_BATCH_SIZE: i64 = 50;

// =============================================================================
// DATABASE
// =============================================================================

/// Connections kept by the record and notification repositories together.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Seconds to wait for a free pool connection.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an idle connection is kept open.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum request body size in bytes (multipart uploads).
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default on-disk location of the filesystem image store.
pub const IMAGE_STORAGE_PATH: &str = "/var/lib/petmatch/images";

/// Default page size for record listings.
pub const PAGE_LIMIT: i64 = 50;

/// Hard cap on record listing page size.
pub const PAGE_LIMIT_MAX: i64 = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let sum = WEIGHT_EMBEDDING + WEIGHT_COLOR + WEIGHT_FEATURE;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_floors_are_ordered() {
        assert!(SEARCH_SIMILARITY_FLOOR < ACCEPT_FLOOR);
        assert!(ACCEPT_FLOOR < NOTIFY_THRESHOLD);
    }

    #[test]
    fn test_max_rgb_distance() {
        let expected = (3.0f32 * 255.0 * 255.0).sqrt();
        assert!((MAX_RGB_DISTANCE - expected).abs() < 1e-3);
    }
}
