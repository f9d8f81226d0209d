//! Photo search.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use petmatch_core::{MatchView, SearchMode};

use crate::error::ApiError;
use crate::form::{read_form, search_from_form};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    pub count: usize,
    /// Ranked best first; every score component is included.
    pub matches: Vec<MatchView>,
}

/// Find records that may show the same animal as the uploaded photo.
///
/// # Multipart Fields
/// - `image`: query photo (required)
/// - `mode` (alias `type`): `lost` searches FOUND reports, `found` searches
///   LOST reports (default `lost`)
/// - typed attributes and `extra_attributes` refine the ranking
///
/// An empty `matches` list is a normal answer, not an error.
#[utoipa::path(post, path = "/api/v1/search", tag = "Search",
    responses(
        (status = 200, description = "Ranked matches"),
        (status = 400, description = "Missing image or invalid field"),
        (status = 502, description = "Photo could not be analyzed"),
    ))]
pub async fn search(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SearchResponse>, ApiError> {
    let form = read_form(multipart, &["image"]).await?;
    let request = search_from_form(form)?;

    let ranked = state
        .engine
        .search(&request.image, request.mode, Some(&request.attributes))
        .await?;

    let matches: Vec<MatchView> = ranked.iter().map(MatchView::from).collect();
    Ok(Json(SearchResponse {
        mode: request.mode,
        count: matches.len(),
        matches,
    }))
}
