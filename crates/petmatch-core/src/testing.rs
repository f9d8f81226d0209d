//! In-memory implementations of the storage traits.
//!
//! Used by the unit tests of the pipeline, search and API crates. Each fake
//! records its calls and can be told to fail, so degraded paths are testable
//! without PostgreSQL or an embedding service.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::*;

/// Cosine similarity of two vectors, 0.0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

// =============================================================================
// IMAGE STORE
// =============================================================================

/// In-memory image store.
#[derive(Clone, Default)]
pub struct MemoryImageStore {
    objects: Arc<Mutex<HashMap<String, ImageBlob>>>,
    failing_payloads: Arc<Mutex<HashSet<Vec<u8>>>>,
    fail_all: bool,
    delay: Option<Duration>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload fails.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Uploads of blobs with exactly these bytes fail.
    pub fn with_failing_payload(self, data: impl Into<Vec<u8>>) -> Self {
        self.failing_payloads.lock().unwrap().insert(data.into());
        self
    }

    /// Every upload sleeps this long before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn url_for(key: &str) -> String {
        format!("memory://{}", key)
    }

    pub fn stored_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn store(&self, key: &str, blob: &ImageBlob) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all || self.failing_payloads.lock().unwrap().contains(&blob.data) {
            return Err(Error::Request(format!("upload of {} rejected", key)));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), blob.clone());
        Ok(Self::url_for(key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// RECORDS + CANDIDATE INDEX
// =============================================================================

/// In-memory record store that doubles as a cosine-similarity candidate index.
#[derive(Clone, Default)]
pub struct MemoryRecordRepository {
    records: Arc<Mutex<Vec<Record>>>,
    fail_inserts: bool,
    fail_queries: bool,
    attach_failures: Arc<AtomicU32>,
    attach_calls: Arc<AtomicU32>,
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every insert fails.
    pub fn failing_inserts(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    /// Every index query fails.
    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// The next `n` `attach_signature` calls fail.
    pub fn with_attach_failures(self, n: u32) -> Self {
        self.attach_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of `attach_signature` calls, failed ones included.
    pub fn attach_calls(&self) -> u32 {
        self.attach_calls.load(Ordering::SeqCst)
    }

    /// Insert a fully formed record directly.
    pub fn seed(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    pub fn all(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

#[async_trait]
impl RecordRepository for MemoryRecordRepository {
    async fn insert(&self, record: NewRecord) -> Result<Record> {
        if self.fail_inserts {
            return Err(Error::Request("connection refused".to_string()));
        }
        let record = Record::from_new(record, Utc::now());
        self.records.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Record> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(Error::RecordNotFound(id))
    }

    async fn attach_signature(
        &self,
        id: Uuid,
        embedding: &[f32],
        colors: &ColorSignature,
    ) -> Result<()> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.attach_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.attach_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Request("write timed out".to_string()));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::RecordNotFound(id))?;
        record.embedding = Some(embedding.to_vec());
        record.colors = if colors.is_empty() {
            None
        } else {
            Some(colors.clone())
        };
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: RecordStatus) -> Result<Record> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::RecordNotFound(id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list(&self, req: ListRecordsRequest) -> Result<ListRecordsResponse> {
        let records = self.records.lock().unwrap();
        let matching: Vec<Record> = records
            .iter()
            .rev()
            .filter(|r| req.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                req.species
                    .as_deref()
                    .map_or(true, |s| contains_ci(r.attributes.species.as_deref(), s))
            })
            .filter(|r| {
                req.text.as_deref().map_or(true, |t| {
                    contains_ci(r.pet_name.as_deref(), t)
                        || contains_ci(r.description.as_deref(), t)
                        || contains_ci(r.attributes.color_main.as_deref(), t)
                })
            })
            .cloned()
            .collect();
        let total = matching.len() as i64;
        let offset = req.offset.unwrap_or(0).max(0) as usize;
        let limit = req.limit.unwrap_or(crate::defaults::PAGE_LIMIT).max(0) as usize;
        Ok(ListRecordsResponse {
            records: matching.into_iter().skip(offset).take(limit).collect(),
            total,
        })
    }

    async fn list_missing_signature(&self, limit: i64) -> Result<Vec<Record>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.embedding.is_none() && !r.image_urls.is_empty())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CandidateIndex for MemoryRecordRepository {
    async fn query(
        &self,
        embedding: &[f32],
        status: RecordStatus,
        floor: f32,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        if self.fail_queries {
            return Err(Error::Request("index unavailable".to_string()));
        }
        let records = self.records.lock().unwrap();
        let mut candidates: Vec<Candidate> = records
            .iter()
            .filter(|r| r.status == status)
            .filter_map(|r| {
                let vector = r.embedding.as_deref()?;
                let similarity = cosine_similarity(embedding, vector).clamp(0.0, 1.0);
                (similarity >= floor).then(|| Candidate {
                    record: r.clone(),
                    similarity,
                })
            })
            .collect();
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }
}

/// Candidate index returning preset similarities, filtered like a real index.
#[derive(Clone, Default)]
pub struct StaticCandidateIndex {
    candidates: Vec<Candidate>,
    calls: Arc<AtomicU32>,
    delay: Option<Duration>,
}

impl StaticCandidateIndex {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            calls: Arc::new(AtomicU32::new(0)),
            delay: None,
        }
    }

    /// Every query sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateIndex for StaticCandidateIndex {
    async fn query(
        &self,
        _embedding: &[f32],
        status: RecordStatus,
        floor: f32,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .candidates
            .iter()
            .filter(|c| c.record.status == status && c.similarity >= floor)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Candidate index that ignores the floor, for checking the engine's own re-check.
#[derive(Clone, Default)]
pub struct UnfilteredCandidateIndex {
    pub candidates: Vec<Candidate>,
}

#[async_trait]
impl CandidateIndex for UnfilteredCandidateIndex {
    async fn query(
        &self,
        _embedding: &[f32],
        _status: RecordStatus,
        _floor: f32,
        _limit: i64,
    ) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// In-memory notification store.
#[derive(Clone, Default)]
pub struct MemoryNotificationRepository {
    notifications: Arc<Mutex<Vec<Notification>>>,
    fail_inserts: bool,
}

impl MemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationRepository for MemoryNotificationRepository {
    async fn insert(&self, notification: NewNotification) -> Result<Notification> {
        if self.fail_inserts {
            return Err(Error::Request("notification write failed".to_string()));
        }
        let stored = Notification::from_new(Uuid::now_v7(), notification, Utc::now());
        self.notifications.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        Ok(self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| !unread_only || n.read_at.is_none())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let mut notifications = self.notifications.lock().unwrap();
        let n = notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| Error::NotFound(format!("Notification {} not found", id)))?;
        if n.read_at.is_none() {
            n.read_at = Some(Utc::now());
        }
        Ok(n.clone())
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// A persisted record with the given status, embedding and colours.
pub fn record_fixture(
    status: RecordStatus,
    embedding: Option<Vec<f32>>,
    colors: Option<ColorSignature>,
) -> Record {
    let new = NewRecord::from_submission(
        &Submission::new(status, Vec::new()),
        vec![format!("memory://pets/{}.jpg", Uuid::now_v7())],
    );
    let mut record = Record::from_new(new, Utc::now());
    record.embedding = embedding;
    record.colors = colors;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_index_skips_unembedded_and_other_status() {
        let repo = MemoryRecordRepository::new();
        repo.seed(record_fixture(RecordStatus::Lost, Some(vec![1.0, 0.0]), None));
        repo.seed(record_fixture(RecordStatus::Lost, None, None));
        repo.seed(record_fixture(RecordStatus::Found, Some(vec![1.0, 0.0]), None));

        let hits = repo
            .query(&[1.0, 0.0], RecordStatus::Lost, 0.4, 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.status, RecordStatus::Lost);
    }

    #[tokio::test]
    async fn test_attach_failures_are_consumed() {
        let repo = MemoryRecordRepository::new().with_attach_failures(1);
        let record = repo
            .insert(NewRecord::from_submission(
                &Submission::new(RecordStatus::Found, Vec::new()),
                vec!["memory://a".into()],
            ))
            .await
            .unwrap();
        let sig = ColorSignature::empty();
        assert!(repo.attach_signature(record.id, &[1.0], &sig).await.is_err());
        assert!(repo.attach_signature(record.id, &[1.0], &sig).await.is_ok());
        assert_eq!(repo.attach_calls(), 2);
        assert!(repo.get(record.id).await.unwrap().has_signature());
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let repo = MemoryNotificationRepository::new();
        let found = record_fixture(RecordStatus::Found, None, None);
        let lost = record_fixture(RecordStatus::Lost, None, None);
        let n = repo
            .insert(NewNotification::pet_match("u1".into(), &found, &lost, 0.9))
            .await
            .unwrap();
        let first = repo.mark_read(n.id).await.unwrap();
        let second = repo.mark_read(n.id).await.unwrap();
        assert_eq!(first.read_at, second.read_at);
        assert!(repo
            .list_for_recipient("u1", true, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
