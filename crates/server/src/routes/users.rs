use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::{
    activity::{ActivityType, NewActivity},
    user::User,
};
use serde::{Deserialize, Serialize};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, http::identity::RequestContext};

/// What profile reads expose: never the credential, never the role.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub name: String,
    pub email: String,
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<ResponseJson<ApiResponse<PublicProfile>>, ApiError> {
    let user = User::find_by_email(&state.db().pool, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(ResponseJson(ApiResponse::success(PublicProfile {
        name: user.name,
        email: user.email,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<ResponseJson<ApiResponse<PublicProfile>>, ApiError> {
    let user = User::update_name(&state.db().pool, &email, &payload.name).await?;

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::ProfileUpdate,
            actor: user.email.clone(),
            description: format!("Updated name to: {}", user.name),
            metadata: serde_json::json!({}),
        },
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success_with_message(
        PublicProfile {
            name: user.name,
            email: user.email,
        },
        "Name updated successfully",
    )))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/user/{email}", get(get_user).put(update_user))
}
