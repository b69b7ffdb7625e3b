use axum::{Json, Router, extract::State, response::Json as ResponseJson, routing::post};
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailRequest {
    pub test_email: Option<String>,
}

/// Operational smoke test for the notification dispatcher. Unlike the
/// assignment flow, failures here surface to the caller.
pub async fn test_email(
    State(state): State<AppState>,
    Json(payload): Json<TestEmailRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let to = payload
        .test_email
        .filter(|email| !email.trim().is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest("Please provide testEmail in request body".to_string())
        })?;

    state.notifier().test_configuration(&to).await?;

    Ok(ResponseJson(ApiResponse::success_with_message(
        (),
        "Test email sent successfully!",
    )))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/test-email", post(test_email))
}
