use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    response::Json as ResponseJson,
    routing::{delete, post},
};
use db::models::{
    activity::{ActivityType, NewActivity},
    workspace::Workspace,
};
use services::services::policy::{self, WorkspaceAction};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::identity::{Identity, RequestContext},
};

async fn load_gated_workspace(
    state: &AppState,
    identity: &Identity,
    workspace_id: Uuid,
) -> Result<Workspace, ApiError> {
    let caller = identity.require()?;
    let workspace = Workspace::find_by_id(&state.db().pool, workspace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Workspace not found".to_string()))?;
    if !policy::check(caller, &workspace, WorkspaceAction::EditGoals) {
        return Err(ApiError::Forbidden(
            "Only workspace members may modify attachments".to_string(),
        ));
    }
    Ok(workspace)
}

/// Multipart upload, field name `file`. The size cap is enforced against
/// the read bytes before any aggregate mutation; the surrounding body
/// limit only exists to bound memory.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Path((workspace_id, task_id)): Path<(Uuid, Uuid)>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
    mut multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    load_gated_workspace(&state, &identity, workspace_id).await?;

    let mut uploaded: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let original_name = field
                .file_name()
                .filter(|name| !name.is_empty())
                .unwrap_or("upload")
                .to_string();
            let bytes = field.bytes().await?;
            uploaded = Some((original_name, bytes.to_vec()));
        }
    }
    let Some((original_name, bytes)) = uploaded else {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    };

    let updated = state
        .attachments()
        .upload(&state.db().pool, workspace_id, task_id, &bytes, &original_name)
        .await?;

    let stored_name = updated
        .tasks()
        .find(|task| task.id == task_id)
        .and_then(|task| task.attachments.last())
        .map(|attachment| attachment.file_name.clone())
        .unwrap_or_default();

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::FileUploaded,
            actor: identity.actor(),
            description: format!("Uploaded file \"{original_name}\""),
            metadata: serde_json::json!({
                "workspaceId": workspace_id,
                "taskId": task_id,
                "fileName": stored_name,
                "originalName": original_name,
                "size": bytes.len(),
            }),
        },
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn remove_attachment(
    State(state): State<AppState>,
    Path((workspace_id, task_id, file_name)): Path<(Uuid, Uuid, String)>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    load_gated_workspace(&state, &identity, workspace_id).await?;

    let updated = state
        .attachments()
        .remove(&state.db().pool, workspace_id, task_id, &file_name)
        .await?;

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::AttachmentRemoved,
            actor: identity.actor(),
            description: format!("Attachment {file_name} removed"),
            metadata: serde_json::json!({
                "workspaceId": workspace_id,
                "taskId": task_id,
                "fileName": file_name,
            }),
        },
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    // Leave headroom above the attachment cap so the explicit size check
    // decides, not the transport limit.
    let body_limit = state.attachments().max_upload_bytes() + 1024 * 1024;
    Router::new()
        .route(
            "/workspaces/{id}/tasks/{task_id}/attachments",
            post(upload_attachment),
        )
        .route(
            "/workspaces/{id}/tasks/{task_id}/attachments/{file_name}",
            delete(remove_attachment),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}
