use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::{
    activity::ActivityError, user::UserError, workspace::WorkspaceError,
};
use services::services::{
    attachment::AttachmentError, email::EmailError, google::GoogleAuthError,
};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    GoogleAuth(#[from] GoogleAuthError),
    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<&'static str> for ApiError {
    fn from(msg: &'static str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Attachment task misses carry a diagnostic payload so clients can
        // see which task ids the server actually holds.
        if let ApiError::Attachment(AttachmentError::TaskNotFound { known_tasks }) = &self {
            let body = serde_json::json!({
                "success": false,
                "message": "Task not found in workspace",
                "knownTasks": known_tasks,
            });
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        }

        let (status_code, error_type) = match &self {
            ApiError::User(err) => match err {
                UserError::NotFound => (StatusCode::NOT_FOUND, "UserError"),
                UserError::AlreadyExists => (StatusCode::CONFLICT, "UserError"),
                UserError::ValidationError(_) => (StatusCode::BAD_REQUEST, "UserError"),
                UserError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UserError"),
            },
            ApiError::Workspace(err) => match err {
                WorkspaceError::NotFound => (StatusCode::NOT_FOUND, "WorkspaceError"),
                WorkspaceError::ValidationError(_) => (StatusCode::BAD_REQUEST, "WorkspaceError"),
                WorkspaceError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "WorkspaceError")
                }
            },
            ApiError::Activity(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ActivityError"),
            ApiError::Attachment(err) => match err {
                AttachmentError::WorkspaceNotFound | AttachmentError::TaskNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "AttachmentError")
                }
                AttachmentError::PayloadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "AttachmentError")
                }
                AttachmentError::Workspace(WorkspaceError::NotFound) => {
                    (StatusCode::NOT_FOUND, "AttachmentError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "AttachmentError"),
            },
            ApiError::Email(err) => match err {
                EmailError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "EmailError"),
                EmailError::Message(_) => (StatusCode::BAD_REQUEST, "EmailError"),
                EmailError::Smtp(_) => (StatusCode::BAD_GATEWAY, "EmailError"),
            },
            ApiError::GoogleAuth(err) => match err {
                GoogleAuthError::NotConfigured => {
                    (StatusCode::SERVICE_UNAVAILABLE, "GoogleAuthError")
                }
                GoogleAuthError::MissingEmail => (StatusCode::BAD_REQUEST, "GoogleAuthError"),
                _ => (StatusCode::BAD_GATEWAY, "GoogleAuthError"),
            },
            ApiError::Multipart(_) => (StatusCode::BAD_REQUEST, "MultipartError"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IoError"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "ConflictError"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "ForbiddenError"),
        };

        let error_message = match &self {
            ApiError::Multipart(_) => {
                "Failed to upload file. Please ensure the file is valid and try again.".to_string()
            }
            ApiError::Unauthorized => "Unauthorized. Please sign in.".to_string(),
            ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Forbidden(msg) => msg.clone(),
            ApiError::User(err) => err.to_string(),
            ApiError::Workspace(err) => err.to_string(),
            ApiError::Attachment(err) => err.to_string(),
            ApiError::Email(err) => err.to_string(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("dup".to_string()).into_response().status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(UserError::AlreadyExists)
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(WorkspaceError::NotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AttachmentError::PayloadTooLarge { size: 11, max: 10 })
                .into_response()
                .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(EmailError::NotConfigured)
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn attachment_task_miss_carries_diagnostics() {
        let err = ApiError::from(AttachmentError::TaskNotFound {
            known_tasks: Vec::new(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
