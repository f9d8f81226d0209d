//! Core traits for petmatch abstractions.
//!
//! These traits define the seams between orchestration and the external
//! collaborators (image storage, embedding extraction, vector search and the
//! relational store), enabling pluggable backends and testability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// IMAGE STORAGE
// =============================================================================

/// Object storage for uploaded photos.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `blob` under `key` and return its public URL.
    ///
    /// Keys are collision-resistant; an existing object is overwritten.
    async fn store(&self, key: &str, blob: &ImageBlob) -> Result<String>;

    /// Backend identifier (e.g. "filesystem").
    fn backend_name(&self) -> &'static str;
}

// =============================================================================
// EMBEDDING
// =============================================================================

/// Visual embedding + dominant-colour extraction.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed raw image bytes (used by search, where nothing is stored yet).
    async fn embed_image(&self, image: &ImageBlob) -> Result<ImageEmbedding>;

    /// Embed an image that is already reachable by URL.
    async fn embed_url(&self, url: &str) -> Result<ImageEmbedding>;

    /// Expected vector dimension.
    fn dimension(&self) -> usize;

    /// Model/service identifier for logs.
    fn model_name(&self) -> &str;
}

// =============================================================================
// RECORD REPOSITORY
// =============================================================================

/// Request for listing records.
#[derive(Debug, Clone, Default)]
pub struct ListRecordsRequest {
    /// Filter by status
    pub status: Option<RecordStatus>,
    /// Filter by species (case-insensitive substring)
    pub species: Option<String>,
    /// Case-insensitive text filter over name, description and colours
    pub text: Option<String>,
    /// Maximum results
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRecordsResponse {
    pub records: Vec<Record>,
    pub total: i64,
}

/// Repository for record persistence.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert a new record. This is the only write ingestion treats as fatal.
    async fn insert(&self, record: NewRecord) -> Result<Record>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Record>;

    /// Set the representative embedding and colour signature of a record.
    async fn attach_signature(
        &self,
        id: Uuid,
        embedding: &[f32],
        colors: &ColorSignature,
    ) -> Result<()>;

    /// Change the lifecycle status of a record.
    async fn update_status(&self, id: Uuid, status: RecordStatus) -> Result<Record>;

    /// List records, newest first.
    async fn list(&self, req: ListRecordsRequest) -> Result<ListRecordsResponse>;

    /// Records with images but no embedding, oldest first.
    async fn list_missing_signature(&self, limit: i64) -> Result<Vec<Record>>;
}

// =============================================================================
// CANDIDATE INDEX
// =============================================================================

/// Nearest-neighbour lookup over record embeddings.
#[async_trait]
pub trait CandidateIndex: Send + Sync {
    /// Records of `status` with similarity >= `floor`, most similar first.
    ///
    /// Records without an embedding are never returned. An empty result is
    /// valid and not an error.
    async fn query(
        &self,
        embedding: &[f32],
        status: RecordStatus,
        floor: f32,
        limit: i64,
    ) -> Result<Vec<Candidate>>;
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Repository for owner notifications.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Write one notification.
    async fn insert(&self, notification: NewNotification) -> Result<Notification>;

    /// Notifications addressed to a recipient, newest first.
    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>>;

    /// Mark a notification read. Idempotent.
    async fn mark_read(&self, id: Uuid) -> Result<Notification>;
}
