//! Owner mailbox.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use petmatch_core::{defaults, Notification};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListNotificationsQuery {
    pub recipient_id: String,
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
    pub count: usize,
}

/// Newest notifications for one recipient.
#[utoipa::path(get, path = "/api/v1/notifications", tag = "Notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Notifications, newest first"),
        (status = 400, description = "Missing recipient"),
    ))]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<ListNotificationsResponse>, ApiError> {
    let recipient = query.recipient_id.trim();
    if recipient.is_empty() {
        return Err(ApiError::BadRequest("recipient_id is required".to_string()));
    }
    let limit = query
        .limit
        .unwrap_or(defaults::PAGE_LIMIT)
        .clamp(1, defaults::PAGE_LIMIT_MAX);

    let notifications = state
        .notifications
        .list_for_recipient(recipient, query.unread_only, limit)
        .await?;
    Ok(Json(ListNotificationsResponse {
        count: notifications.len(),
        notifications,
    }))
}

/// Mark a notification read. Repeating the call is harmless.
#[utoipa::path(post, path = "/api/v1/notifications/{id}/read", tag = "Notifications",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification with read_at set"),
        (status = 404, description = "Notification not found"),
    ))]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(state.notifications.mark_read(id).await?))
}
