//! Multipart form decoding for the ingestion and search endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;
use chrono::{DateTime, NaiveDate, Utc};

use petmatch_core::{
    GeoPoint, ImageBlob, PetAttributes, RecordStatus, SearchMode, Submission,
};

use crate::error::ApiError;

/// Image parts and text fields of a multipart body.
#[derive(Debug, Default)]
pub struct FormData {
    pub images: Vec<ImageBlob>,
    pub fields: HashMap<String, String>,
}

impl FormData {
    /// Non-blank text field, trimmed.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn owned(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    fn first_text(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|n| self.text(n))
    }
}

/// Read every part. Parts named in `image_fields` become images in
/// submission order; everything else is read as text.
pub async fn read_form(
    mut multipart: Multipart,
    image_fields: &[&str],
) -> Result<FormData, ApiError> {
    let mut form = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if image_fields.contains(&name.as_str()) {
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?
                .to_vec();
            // An unselected file input arrives as an empty, unnamed part.
            if data.is_empty() && filename.as_deref().map_or(true, str::is_empty) {
                continue;
            }
            let mut blob = ImageBlob::new(data);
            blob.filename = filename;
            blob.content_type = content_type;
            form.images.push(blob);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Typed attributes from their named fields plus the `extra_attributes`
/// JSON object.
pub fn attributes_from_form(form: &FormData) -> Result<PetAttributes, ApiError> {
    let mut attributes = PetAttributes::default();
    for name in PetAttributes::KNOWN {
        if let Some(value) = form.text(name) {
            attributes.set(name, value)?;
        }
    }

    if let Some(raw) = form.text("extra_attributes") {
        let parsed: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            ApiError::BadRequest(format!("extra_attributes must be a JSON object: {}", e))
        })?;
        let object = parsed.as_object().ok_or_else(|| {
            ApiError::BadRequest("extra_attributes must be a JSON object".to_string())
        })?;
        for (key, value) in object {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if PetAttributes::KNOWN.contains(&key.as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "'{}' is a typed attribute; send it as its own field",
                    key
                )));
            }
            attributes.extra.insert(key.clone(), value);
        }
    }

    attributes.validate()?;
    Ok(attributes)
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid last_seen_at: {}", raw)))
}

fn parse_coordinate(form: &FormData, name: &str) -> Result<Option<f64>, ApiError> {
    form.text(name)
        .map(|raw| {
            raw.parse::<f64>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", name, raw)))
        })
        .transpose()
}

/// Build a submission from an ingestion form. A missing status means FOUND.
pub fn submission_from_form(form: FormData) -> Result<Submission, ApiError> {
    let status = match form.text("status") {
        Some(raw) => raw.parse::<RecordStatus>()?,
        None => RecordStatus::Found,
    };

    let location = match (parse_coordinate(&form, "lat")?, parse_coordinate(&form, "lng")?) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)?),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "lat and lng must be supplied together".to_string(),
            ))
        }
    };

    let last_seen_at = form.text("last_seen_at").map(parse_timestamp).transpose()?;
    let attributes = attributes_from_form(&form)?;

    let mut submission = Submission::new(status, Vec::new()).with_attributes(attributes);
    submission.description = form.owned("description");
    submission.contact_info = form.owned("contact_info");
    submission.location = location;
    submission.last_seen_at = last_seen_at;
    submission.pet_name = form.owned("pet_name");
    submission.owner_name = form.owned("owner_name");
    submission.reward = form.owned("reward");
    submission.owner_id = form
        .first_text(&["owner_id", "user_id"])
        .map(str::to_string);
    submission.images = form.images;
    Ok(submission)
}

/// A decoded search request.
#[derive(Debug)]
pub struct SearchForm {
    pub image: ImageBlob,
    pub mode: SearchMode,
    pub attributes: PetAttributes,
}

/// Build a search request. `mode` (alias `type`) defaults to `lost`.
pub fn search_from_form(mut form: FormData) -> Result<SearchForm, ApiError> {
    let mode = match form.first_text(&["mode", "type"]) {
        Some(raw) => raw.parse::<SearchMode>()?,
        None => SearchMode::Lost,
    };
    let attributes = attributes_from_form(&form)?;
    if form.images.is_empty() {
        return Err(ApiError::BadRequest("Missing image".to_string()));
    }
    let image = form.images.swap_remove(0);
    if image.data.is_empty() {
        return Err(ApiError::BadRequest("Image is empty".to_string()));
    }
    Ok(SearchForm {
        image,
        mode,
        attributes,
    })
}
