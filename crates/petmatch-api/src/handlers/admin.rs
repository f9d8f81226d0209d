//! Maintenance endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use petmatch_core::defaults;
use petmatch_pipeline::BackfillReport;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct BackfillQuery {
    /// Records to process (default `BACKFILL_BATCH_SIZE`)
    pub limit: Option<i64>,
}

/// Compute signatures for records saved while the embedding service was down.
#[utoipa::path(post, path = "/api/v1/admin/backfill-signatures", tag = "Admin",
    params(BackfillQuery),
    responses(
        (status = 200, description = "Per-record backfill outcome"),
        (status = 500, description = "Pending records could not be listed"),
    ))]
pub async fn backfill_signatures(
    State(state): State<AppState>,
    Query(query): Query<BackfillQuery>,
) -> Result<Json<BackfillReport>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.config.server.backfill_batch_size)
        .clamp(1, defaults::PAGE_LIMIT_MAX);
    Ok(Json(state.backfill.run(limit).await?))
}
