//! Core data models for petmatch.
//!
//! These types are shared across all petmatch crates and represent the
//! submissions, persisted records, and ranked matches of the system.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    /// An owner is looking for this pet.
    Lost,
    /// Someone found this animal.
    Found,
    /// Case closed; no longer matched against anything.
    Reunited,
}

impl RecordStatus {
    /// The status of the population this status is matched against.
    ///
    /// Closed records have no counterpart.
    pub fn counterpart(self) -> Option<RecordStatus> {
        match self {
            Self::Lost => Some(Self::Found),
            Self::Found => Some(Self::Lost),
            Self::Reunited => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lost => "LOST",
            Self::Found => "FOUND",
            Self::Reunited => "REUNITED",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOST" => Ok(Self::Lost),
            "FOUND" => Ok(Self::Found),
            "REUNITED" => Ok(Self::Reunited),
            other => Err(Error::InvalidInput(format!("Invalid status: {}", other))),
        }
    }
}

/// Direction of a user search.
///
/// Someone who lost a pet browses FOUND reports and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// The searcher found an animal and looks for its owner.
    Found,
    /// The searcher lost a pet and looks for reports of it.
    Lost,
}

impl SearchMode {
    /// Status of the records shown to this searcher.
    pub fn target_status(self) -> RecordStatus {
        match self {
            Self::Found => RecordStatus::Lost,
            Self::Lost => RecordStatus::Found,
        }
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "found" => Ok(Self::Found),
            "lost" => Ok(Self::Lost),
            other => Err(Error::InvalidInput(format!(
                "Invalid search mode: {} (expected found or lost)",
                other
            ))),
        }
    }
}

// =============================================================================
// COLOUR SIGNATURE
// =============================================================================

/// An RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Euclidean distance in RGB space.
    pub fn distance(&self, other: &Rgb) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = *a as f32 - *b as f32;
                d * d
            })
            .sum::<f32>()
            .sqrt()
    }
}

/// Dominant colours of an image with their area fractions.
///
/// `weights` is parallel to `colors` and always sums to 1.0 once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSignature {
    colors: Vec<Rgb>,
    weights: Vec<f32>,
}

/// Tolerance before weights are renormalized to sum to one.
const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

impl ColorSignature {
    /// Build a signature, validating and normalizing the weights.
    ///
    /// Weights given as percentages (summing to ~100) are scaled down.
    pub fn new(colors: Vec<Rgb>, weights: Vec<f32>) -> Result<Self> {
        if colors.len() != weights.len() {
            return Err(Error::InvalidInput(format!(
                "colour signature has {} colours but {} weights",
                colors.len(),
                weights.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidInput(
                "colour weights must be finite and non-negative".to_string(),
            ));
        }
        if colors.is_empty() {
            return Ok(Self::empty());
        }

        let sum: f32 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(Error::InvalidInput(
                "colour weights must not all be zero".to_string(),
            ));
        }
        let weights = if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            weights.into_iter().map(|w| w / sum).collect()
        } else {
            weights
        };

        Ok(Self { colors, weights })
    }

    pub fn empty() -> Self {
        Self {
            colors: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Iterate `(colour, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Rgb, f32)> {
        self.colors.iter().zip(self.weights.iter().copied())
    }

    /// Parse a signature from stored JSON columns.
    ///
    /// Never fails: anything missing, malformed, or inconsistent yields `None`,
    /// which scoring treats as "no colour data". Values stored as JSON-encoded
    /// strings are accepted too.
    pub fn from_stored(colors: Option<&JsonValue>, weights: Option<&JsonValue>) -> Option<Self> {
        let colors = parse_colors(&unwrap_json_string(colors?)?)?;
        let weights = parse_weights(&unwrap_json_string(weights?)?)?;
        let signature = Self::new(colors, weights).ok()?;
        if signature.is_empty() {
            None
        } else {
            Some(signature)
        }
    }

    /// JSON form of the colours, `[[r, g, b], ...]`.
    pub fn colors_json(&self) -> JsonValue {
        serde_json::json!(self.colors)
    }

    /// JSON form of the weights, `[w, ...]`.
    pub fn weights_json(&self) -> JsonValue {
        serde_json::json!(self.weights)
    }
}

fn unwrap_json_string(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

fn parse_colors(value: &JsonValue) -> Option<Vec<Rgb>> {
    value
        .as_array()?
        .iter()
        .map(|entry| {
            let channels = entry.as_array()?;
            if channels.len() != 3 {
                return None;
            }
            let mut rgb = [0u8; 3];
            for (slot, channel) in rgb.iter_mut().zip(channels) {
                let v = channel.as_f64()?;
                if !(0.0..=255.0).contains(&v) {
                    return None;
                }
                *slot = v.round() as u8;
            }
            Some(Rgb(rgb))
        })
        .collect()
}

fn parse_weights(value: &JsonValue) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|w| w.as_f64().map(|w| w as f32))
        .collect()
}

/// Output of the embedding service for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEmbedding {
    pub vector: Vec<f32>,
    pub colors: ColorSignature,
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Structured visual attributes of an animal.
///
/// Every known attribute is a nullable field so matching iterates a fixed,
/// typed list. Anything else goes into the bounded `extra` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_main: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_secondary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fur_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collar_color: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl PetAttributes {
    /// Names of the typed attributes, in matching order.
    pub const KNOWN: [&'static str; 9] = [
        "species",
        "color_main",
        "color_secondary",
        "color_pattern",
        "fur_length",
        "eye_color",
        "body_size",
        "sex",
        "collar_color",
    ];

    /// Look up a typed attribute by name. Blank values read as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        let value = match name {
            "species" => self.species.as_deref(),
            "color_main" => self.color_main.as_deref(),
            "color_secondary" => self.color_secondary.as_deref(),
            "color_pattern" => self.color_pattern.as_deref(),
            "fur_length" => self.fur_length.as_deref(),
            "eye_color" => self.eye_color.as_deref(),
            "body_size" => self.body_size.as_deref(),
            "sex" => self.sex.as_deref(),
            "collar_color" => self.collar_color.as_deref(),
            _ => None,
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }

    /// Set a typed attribute by name, or store it in `extra` if unknown.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        let slot = match name {
            "species" => &mut self.species,
            "color_main" => &mut self.color_main,
            "color_secondary" => &mut self.color_secondary,
            "color_pattern" => &mut self.color_pattern,
            "fur_length" => &mut self.fur_length,
            "eye_color" => &mut self.eye_color,
            "body_size" => &mut self.body_size,
            "sex" => &mut self.sex,
            "collar_color" => &mut self.collar_color,
            _ => {
                let len_after = self.extra.len() + usize::from(!self.extra.contains_key(name));
                Self::check_extra_len(len_after)?;
                Self::check_extra_entry(name, &value)?;
                self.extra.insert(name.to_string(), value);
                return Ok(());
            }
        };
        *slot = Some(value);
        Ok(())
    }

    /// Look up an extra attribute. Blank values read as absent.
    pub fn get_extra(&self, name: &str) -> Option<&str> {
        self.extra
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// True when no attribute (typed or extra) carries a value.
    pub fn is_empty(&self) -> bool {
        Self::KNOWN.iter().all(|name| self.get(name).is_none())
            && self.extra.keys().all(|k| self.get_extra(k).is_none())
    }

    /// Enforce the bounds on the extra map.
    pub fn validate(&self) -> Result<()> {
        Self::check_extra_len(self.extra.len())?;
        for (key, value) in &self.extra {
            Self::check_extra_entry(key, value)?;
        }
        Ok(())
    }

    fn check_extra_len(len: usize) -> Result<()> {
        if len > defaults::EXTRA_ATTRIBUTES_MAX {
            return Err(Error::InvalidInput(format!(
                "at most {} extra attributes are allowed",
                defaults::EXTRA_ATTRIBUTES_MAX
            )));
        }
        Ok(())
    }

    fn check_extra_entry(key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.len() > defaults::EXTRA_ATTRIBUTE_KEY_MAX {
            return Err(Error::InvalidInput(format!(
                "extra attribute key must be 1-{} characters",
                defaults::EXTRA_ATTRIBUTE_KEY_MAX
            )));
        }
        if value.len() > defaults::EXTRA_ATTRIBUTE_VALUE_MAX {
            return Err(Error::InvalidInput(format!(
                "extra attribute '{}' exceeds {} characters",
                key,
                defaults::EXTRA_ATTRIBUTE_VALUE_MAX
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// Geographic position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidInput(format!(
                "coordinates out of range: {}, {}",
                lat, lng
            )));
        }
        Ok(Self { lat, lng })
    }
}

/// One uploaded image.
#[derive(Debug, Clone, Default)]
pub struct ImageBlob {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl ImageBlob {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// File extension for the storage key.
    ///
    /// Taken from the filename when it is short and alphanumeric, otherwise
    /// derived from the content type.
    pub fn extension(&self) -> String {
        let from_name = self
            .filename
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            });
        if let Some(ext) = from_name {
            return ext;
        }
        match self.content_type.as_deref() {
            Some("image/jpeg") | Some("image/jpg") => "jpg",
            Some("image/png") => "png",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            Some("image/heic") => "heic",
            _ => "bin",
        }
        .to_string()
    }

    /// Content type to record with the stored object.
    pub fn content_type_or_default(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

/// Ephemeral ingestion input. Never persisted as-is.
#[derive(Debug, Clone)]
pub struct Submission {
    pub images: Vec<ImageBlob>,
    pub status: RecordStatus,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub location: Option<GeoPoint>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub attributes: PetAttributes,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub reward: Option<String>,
    /// Account of the submitter; makes LOST records notifiable.
    pub owner_id: Option<String>,
}

impl Submission {
    pub fn new(status: RecordStatus, images: Vec<ImageBlob>) -> Self {
        Self {
            images,
            status,
            description: None,
            contact_info: None,
            location: None,
            last_seen_at: None,
            attributes: PetAttributes::default(),
            pet_name: None,
            owner_name: None,
            reward: None,
            owner_id: None,
        }
    }

    pub fn with_attributes(mut self, attributes: PetAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_contact(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = Some(contact_info.into());
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// Payload of the core record write.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub id: Uuid,
    pub status: RecordStatus,
    pub image_urls: Vec<String>,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub location: Option<GeoPoint>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub attributes: PetAttributes,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub reward: Option<String>,
    pub owner_id: Option<String>,
}

impl NewRecord {
    /// Build the record payload from a submission and its stored image URLs.
    pub fn from_submission(submission: &Submission, image_urls: Vec<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            status: submission.status,
            image_urls,
            description: submission.description.clone(),
            contact_info: submission.contact_info.clone(),
            location: submission.location,
            last_seen_at: submission.last_seen_at,
            attributes: submission.attributes.clone(),
            pet_name: submission.pet_name.clone(),
            owner_name: submission.owner_name.clone(),
            reward: submission.reward.clone(),
            owner_id: submission.owner_id.clone(),
        }
    }
}

/// A persisted found/lost report.
///
/// A record with images but no embedding is valid: extraction may have failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub status: RecordStatus,
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<ColorSignature>,
    pub attributes: PetAttributes,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub location: Option<GeoPoint>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub reward: Option<String>,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Materialize a freshly inserted record.
    pub fn from_new(new: NewRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            status: new.status,
            image_urls: new.image_urls,
            embedding: None,
            colors: None,
            attributes: new.attributes,
            description: new.description,
            contact_info: new.contact_info,
            location: new.location,
            last_seen_at: new.last_seen_at,
            pet_name: new.pet_name,
            owner_name: new.owner_name,
            reward: new.reward,
            owner_id: new.owner_id,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn primary_image_url(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }

    pub fn has_signature(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Client-facing view of a record: the raw vector is summarized.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub id: Uuid,
    pub status: RecordStatus,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub has_embedding: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dimension: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_colors: Option<Vec<Rgb>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_percentages: Option<Vec<f32>>,
    pub attributes: PetAttributes,
    pub description: Option<String>,
    pub contact_info: Option<String>,
    pub location: Option<GeoPoint>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub reward: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            status: record.status,
            image_url: record.primary_image_url().map(str::to_string),
            image_urls: record.image_urls.clone(),
            has_embedding: record.embedding.is_some(),
            embedding_dimension: record.embedding.as_ref().map(Vec::len),
            dominant_colors: record.colors.as_ref().map(|c| c.colors().to_vec()),
            color_percentages: record.colors.as_ref().map(|c| c.weights().to_vec()),
            attributes: record.attributes.clone(),
            description: record.description.clone(),
            contact_info: record.contact_info.clone(),
            location: record.location,
            last_seen_at: record.last_seen_at,
            pet_name: record.pet_name.clone(),
            owner_name: record.owner_name.clone(),
            reward: record.reward.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// =============================================================================
// MATCHING
// =============================================================================

/// A record returned by the candidate index with its raw vector similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record: Record,
    /// Similarity in [0, 1], 1 = identical.
    pub similarity: f32,
}

/// Sub-scores and combined score of one candidate, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScores {
    pub embedding: f32,
    pub color: f32,
    pub feature: f32,
    pub combined: f32,
}

/// A candidate after re-ranking.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub record: Record,
    pub scores: MatchScores,
}

/// Ranked match as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub record: RecordView,
    pub embedding_similarity: f32,
    pub color_similarity: f32,
    pub feature_score: f32,
    pub combined_score: f32,
}

impl From<&ScoredCandidate> for MatchView {
    fn from(scored: &ScoredCandidate) -> Self {
        Self {
            record: RecordView::from(&scored.record),
            embedding_similarity: scored.scores.embedding,
            color_similarity: scored.scores.color,
            feature_score: scored.scores.feature,
            combined_score: scored.scores.combined,
        }
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Kind tag for lost/found match notifications.
pub const NOTIFICATION_KIND_PET_MATCH: &str = "pet_match";

/// A notification to write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub found_record_id: Uuid,
    pub lost_record_id: Uuid,
    pub similarity: f32,
    pub title: String,
    pub message: String,
    pub data: JsonValue,
}

impl NewNotification {
    /// Notification telling the owner of `lost` that `found` may be their pet.
    pub fn pet_match(
        recipient_id: String,
        found: &Record,
        lost: &Record,
        similarity: f32,
    ) -> Self {
        let name = lost.pet_name.as_deref().unwrap_or("your pet");
        Self {
            recipient_id,
            found_record_id: found.id,
            lost_record_id: lost.id,
            similarity,
            title: "A found animal may be your pet".to_string(),
            message: format!(
                "Someone reported an animal that looks like \"{}\" ({:.0}% match)",
                name,
                similarity * 100.0
            ),
            data: serde_json::json!({
                "found_pet_id": found.id,
                "lost_pet_id": lost.id,
                "embedding_score": similarity,
                "found_image_url": found.primary_image_url(),
                "lost_image_url": lost.primary_image_url(),
            }),
        }
    }
}

/// A stored notification, consumed by the mailbox UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    pub found_record_id: Uuid,
    pub lost_record_id: Uuid,
    pub similarity: f32,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub data: JsonValue,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn from_new(id: Uuid, new: NewNotification, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            found_record_id: new.found_record_id,
            lost_record_id: new.lost_record_id,
            similarity: new.similarity,
            title: new.title,
            message: new.message,
            kind: NOTIFICATION_KIND_PET_MATCH.to_string(),
            data: new.data,
            created_at,
            read_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_counterparts() {
        assert_eq!(RecordStatus::Lost.counterpart(), Some(RecordStatus::Found));
        assert_eq!(RecordStatus::Found.counterpart(), Some(RecordStatus::Lost));
        assert_eq!(RecordStatus::Reunited.counterpart(), None);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("found".parse::<RecordStatus>().unwrap(), RecordStatus::Found);
        assert_eq!(" LOST ".parse::<RecordStatus>().unwrap(), RecordStatus::Lost);
        assert!("missing".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_search_mode_targets_opposite_population() {
        assert_eq!(SearchMode::Lost.target_status(), RecordStatus::Found);
        assert_eq!(SearchMode::Found.target_status(), RecordStatus::Lost);
        assert!("reunited".parse::<SearchMode>().is_err());
    }

    #[test]
    fn test_rgb_distance() {
        let black = Rgb::new(0, 0, 0);
        let white = Rgb::new(255, 255, 255);
        assert_eq!(black.distance(&black), 0.0);
        assert!((black.distance(&white) - defaults::MAX_RGB_DISTANCE).abs() < 1e-3);
    }

    #[test]
    fn test_color_signature_rejects_length_mismatch() {
        let err = ColorSignature::new(vec![Rgb::new(1, 2, 3)], vec![0.5, 0.5]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_color_signature_normalizes_percentages() {
        let sig = ColorSignature::new(
            vec![Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)],
            vec![70.0, 30.0],
        )
        .unwrap();
        assert!((sig.weights()[0] - 0.7).abs() < 1e-6);
        assert!((sig.weights()[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_color_signature_keeps_fractions() {
        let sig = ColorSignature::new(vec![Rgb::new(1, 1, 1)], vec![0.995]).unwrap();
        assert_eq!(sig.weights(), &[0.995]);
    }

    #[test]
    fn test_from_stored_arrays() {
        let colors = json!([[255, 0, 0], [0, 0, 255]]);
        let weights = json!([0.7, 0.3]);
        let sig = ColorSignature::from_stored(Some(&colors), Some(&weights)).unwrap();
        assert_eq!(sig.colors(), &[Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)]);
    }

    #[test]
    fn test_from_stored_json_encoded_strings() {
        let colors = json!("[[10, 20, 30]]");
        let weights = json!("[1.0]");
        let sig = ColorSignature::from_stored(Some(&colors), Some(&weights)).unwrap();
        assert_eq!(sig.colors(), &[Rgb::new(10, 20, 30)]);
    }

    #[test]
    fn test_from_stored_malformed_is_none() {
        let cases = vec![
            (json!("not json"), json!([1.0])),
            (json!([[1, 2]]), json!([1.0])),
            (json!([[1, 2, 300]]), json!([1.0])),
            (json!([[1, 2, 3]]), json!([0.5, 0.5])),
            (json!({"r": 1}), json!([1.0])),
            (json!([]), json!([])),
            (json!([[1, 2, 3]]), json!(["heavy"])),
        ];
        for (colors, weights) in cases {
            assert!(
                ColorSignature::from_stored(Some(&colors), Some(&weights)).is_none(),
                "expected None for {} / {}",
                colors,
                weights
            );
        }
        assert!(ColorSignature::from_stored(None, Some(&json!([1.0]))).is_none());
        assert!(ColorSignature::from_stored(Some(&JsonValue::Null), None).is_none());
    }

    #[test]
    fn test_attributes_get_ignores_blank() {
        let attrs = PetAttributes {
            species: Some("  ".into()),
            color_main: Some(" Orange ".into()),
            ..Default::default()
        };
        assert_eq!(attrs.get("species"), None);
        assert_eq!(attrs.get("color_main"), Some("Orange"));
        assert_eq!(attrs.get("unknown"), None);
    }

    #[test]
    fn test_attributes_set_routes_unknown_to_extra() {
        let mut attrs = PetAttributes::default();
        attrs.set("fur_length", "short").unwrap();
        attrs.set("ear_shape", "folded").unwrap();
        assert_eq!(attrs.fur_length.as_deref(), Some("short"));
        assert_eq!(attrs.get_extra("ear_shape"), Some("folded"));
        assert!(!attrs.is_empty());
    }

    #[test]
    fn test_attributes_extra_is_bounded() {
        let mut attrs = PetAttributes::default();
        for i in 0..defaults::EXTRA_ATTRIBUTES_MAX {
            attrs.set(&format!("k{}", i), "v").unwrap();
        }
        assert!(attrs.set("one_too_many", "v").is_err());
        assert_eq!(attrs.extra.len(), defaults::EXTRA_ATTRIBUTES_MAX);
        assert!(attrs.get_extra("one_too_many").is_none());
        assert!(attrs.validate().is_ok());

        // Overwriting an existing key at the cap is still allowed.
        attrs.set("k0", "w").unwrap();
        assert_eq!(attrs.get_extra("k0"), Some("w"));
        assert!(attrs
            .set("k1", "x".repeat(defaults::EXTRA_ATTRIBUTE_VALUE_MAX + 1))
            .is_err());
        assert_eq!(attrs.get_extra("k1"), Some("v"));

        let long = PetAttributes {
            extra: [("k".to_string(), "x".repeat(defaults::EXTRA_ATTRIBUTE_VALUE_MAX + 1))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_attributes_empty() {
        assert!(PetAttributes::default().is_empty());
        let blank_extra = PetAttributes {
            extra: [("k".to_string(), " ".to_string())].into_iter().collect(),
            ..Default::default()
        };
        assert!(blank_extra.is_empty());
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(7.0, 100.47).is_ok());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
    }

    #[test]
    fn test_image_extension() {
        let named = ImageBlob::new(vec![1]).with_filename("Cat.JPEG");
        assert_eq!(named.extension(), "jpeg");

        let typed = ImageBlob::new(vec![1])
            .with_filename("upload")
            .with_content_type("image/png");
        assert_eq!(typed.extension(), "png");

        let hostile = ImageBlob::new(vec![1]).with_filename("x.p/h../p");
        assert_eq!(hostile.extension(), "bin");
    }

    #[test]
    fn test_record_view_summarizes_embedding() {
        let new = NewRecord::from_submission(
            &Submission::new(RecordStatus::Found, vec![]),
            vec!["https://img/1.jpg".into(), "https://img/2.jpg".into()],
        );
        let mut record = Record::from_new(new, Utc::now());
        record.embedding = Some(vec![0.0; 512]);
        let view = RecordView::from(&record);
        assert_eq!(view.image_url.as_deref(), Some("https://img/1.jpg"));
        assert!(view.has_embedding);
        assert_eq!(view.embedding_dimension, Some(512));
        assert!(view.dominant_colors.is_none());
    }

    #[test]
    fn test_pet_match_notification_references_both_records() {
        let found = Record::from_new(
            NewRecord::from_submission(
                &Submission::new(RecordStatus::Found, vec![]),
                vec!["f.jpg".into()],
            ),
            Utc::now(),
        );
        let mut lost_new = NewRecord::from_submission(
            &Submission::new(RecordStatus::Lost, vec![]),
            vec!["l.jpg".into()],
        );
        lost_new.pet_name = Some("Mochi".into());
        let lost = Record::from_new(lost_new, Utc::now());

        let n = NewNotification::pet_match("owner-1".into(), &found, &lost, 0.9);
        assert_eq!(n.found_record_id, found.id);
        assert_eq!(n.lost_record_id, lost.id);
        assert!(n.message.contains("Mochi"));
        assert!(n.message.contains("90%"));
        assert_eq!(n.data["lost_image_url"], "l.jpg");
    }
}
