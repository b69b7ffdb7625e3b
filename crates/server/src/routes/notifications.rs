use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Utc};
use db::models::activity::ActivityType;
use serde::Serialize;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

const FEED_LIMIT: i64 = 20;

/// Diff-free notification surface: "you were added to a workspace",
/// derived from the activity log rather than a dedicated table.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub read: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<ResponseJson<ApiResponse<NotificationFeed>>, ApiError> {
    let items = state.activity().notifications_for(&email, FEED_LIMIT).await?;
    let notifications = items
        .into_iter()
        .map(|activity| Notification {
            id: activity.id,
            kind: activity.activity_type,
            message: activity.description,
            timestamp: activity.created_at,
            metadata: activity.metadata,
            // Read tracking is out of scope; the feed is poll-only.
            read: false,
        })
        .collect();
    Ok(ResponseJson(ApiResponse::success(NotificationFeed {
        notifications,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications/{email}", get(get_notifications))
}
