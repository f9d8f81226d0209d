//! Record handlers: ingestion, lookup, browsing and status changes.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use petmatch_core::{defaults, ListRecordsRequest, RecordStatus, RecordView};
use petmatch_pipeline::{Enrichment, IngestReport, TaskReport};

use crate::error::ApiError;
use crate::form::{read_form, submission_from_form};
use crate::state::AppState;

/// Response of a successful ingestion.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub record: RecordView,
    pub report: IngestReport,
    /// `applied`, `pending` (tasks still running in the background) or `none`.
    pub enrichment: Enrichment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TaskReport>,
}

/// Submit a lost or found report.
///
/// # Multipart Fields
/// - `images` (repeatable) or `image`: photos (at least one)
/// - `status`: `LOST` or `FOUND` (default `FOUND`)
/// - `description`, `contact_info`, `pet_name`, `owner_name`, `reward`
/// - `owner_id` (alias `user_id`): recipient of match notifications
/// - `lat`, `lng`: last known position (both or neither)
/// - `last_seen_at`: RFC 3339 timestamp or `YYYY-MM-DD`
/// - typed attributes (`species`, `color_main`, ...) and `extra_attributes` (JSON object)
#[utoipa::path(post, path = "/api/v1/records", tag = "Records",
    responses(
        (status = 201, description = "Record saved"),
        (status = 400, description = "Invalid submission"),
        (status = 500, description = "Record could not be saved"),
        (status = 503, description = "No image could be stored"),
    ))]
pub async fn create_record(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let form = read_form(multipart, &["images", "image"]).await?;
    let submission = submission_from_form(form)?;

    let outcome = state
        .pipeline
        .ingest_and_run(submission, &state.runner)
        .await?;

    info!(
        subsystem = "api",
        record_id = %outcome.record.id,
        status = %outcome.record.status,
        enrichment = ?outcome.enrichment,
        "Record created"
    );

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            record: RecordView::from(&outcome.record),
            report: outcome.report,
            enrichment: outcome.enrichment,
            tasks: outcome.tasks,
        }),
    ))
}

/// Fetch one record.
#[utoipa::path(get, path = "/api/v1/records/{id}", tag = "Records",
    params(("id" = Uuid, Path, description = "Record id")),
    responses(
        (status = 200, description = "Record"),
        (status = 404, description = "Record not found"),
    ))]
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecordView>, ApiError> {
    let record = state.records.get(id).await?;
    Ok(Json(RecordView::from(&record)))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListRecordsQuery {
    /// `LOST`, `FOUND` or `REUNITED`
    pub status: Option<String>,
    /// Case-insensitive species filter
    pub species: Option<String>,
    /// Case-insensitive text filter over name, description and main colour
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListRecordsResponse {
    pub records: Vec<RecordView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Browse records, newest first.
#[utoipa::path(get, path = "/api/v1/records", tag = "Records",
    params(ListRecordsQuery),
    responses(
        (status = 200, description = "Page of records"),
        (status = 400, description = "Invalid filter"),
    ))]
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<ListRecordsResponse>, ApiError> {
    let status = non_blank(query.status)
        .map(|s| s.parse::<RecordStatus>())
        .transpose()?;
    let limit = query
        .limit
        .unwrap_or(defaults::PAGE_LIMIT)
        .clamp(1, defaults::PAGE_LIMIT_MAX);
    let offset = query.offset.unwrap_or(0).max(0);

    let page = state
        .records
        .list(ListRecordsRequest {
            status,
            species: non_blank(query.species),
            text: non_blank(query.q),
            limit: Some(limit),
            offset: Some(offset),
        })
        .await?;

    Ok(Json(ListRecordsResponse {
        records: page.records.iter().map(RecordView::from).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateStatusRequest {
    /// `LOST`, `FOUND` or `REUNITED`
    pub status: String,
}

/// Change a record's status (e.g. mark it `REUNITED`).
#[utoipa::path(patch, path = "/api/v1/records/{id}/status", tag = "Records",
    params(("id" = Uuid, Path, description = "Record id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Updated record"),
        (status = 400, description = "Invalid status"),
        (status = 404, description = "Record not found"),
    ))]
pub async fn update_record_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<RecordView>, ApiError> {
    let status: RecordStatus = req.status.parse()?;
    let record = state.records.update_status(id, status).await?;
    info!(subsystem = "api", record_id = %id, status = %status, "Record status updated");
    Ok(Json(RecordView::from(&record)))
}
