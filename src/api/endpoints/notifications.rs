//! Notification endpoints, shared by every role.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::CurrentUser;
use crate::app_state::AppState;
use crate::db::repository::notification;
use crate::models::notification::Notification;

#[derive(Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
}

/// `GET /api/notifications` — latest 10 for the session user.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let conn = state.db()?;
    Ok(Json(NotificationListResponse {
        notifications: notification::list_for_user(&conn, current.user_id)?,
        unread_count: notification::unread_count(&conn, current.user_id)?,
    }))
}

/// `POST /api/notifications/:id/read` — scoped to the session user; marking
/// someone else's notification reports not-found.
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conn = state.db()?;
    if !notification::mark_read(&conn, id, current.user_id)? {
        return Err(ApiError::NotFound(format!("notification {id} not found")));
    }
    Ok(Json(serde_json::json!({ "message": "Marked as read" })))
}
