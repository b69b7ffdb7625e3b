use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    activity::{ActivityContext, ActivityType, NewActivity},
    user::User,
    workspace::{CreateWorkspace, Goal, Workspace},
};
use serde::Deserialize;
use services::services::{
    diff::assignment_changes,
    email::dispatch_assignment_changes,
    policy::{self, WorkspaceAction},
};
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    http::identity::{Identity, RequestContext},
    middleware::load_workspace_middleware,
};

pub async fn list_for_member(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<ResponseJson<ApiResponse<Vec<Workspace>>>, ApiError> {
    let workspaces = Workspace::find_by_member(&state.db().pool, &email).await?;
    Ok(ResponseJson(ApiResponse::success(workspaces)))
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<CreateWorkspace>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    let caller = identity.require()?;

    let workspace =
        Workspace::create(&state.db().pool, payload, Some(&caller.email)).await?;

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::WorkspaceCreated,
            actor: caller.email.clone(),
            description: format!("Created workspace \"{}\"", workspace.name),
            metadata: serde_json::json!({
                "workspaceId": workspace.id,
                "memberCount": workspace.members.len(),
                "members": workspace.members,
            }),
        },
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success(workspace)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoalsRequest {
    pub goals: Vec<Goal>,
}

/// Full-tree replace. The response is produced before the diff runs: the
/// snapshot comparison, email dispatch and audit append all happen on a
/// detached task that is never joined.
pub async fn update_goals(
    State(state): State<AppState>,
    Extension(prior): Extension<Workspace>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<UpdateGoalsRequest>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    let caller = identity.require()?;
    if !policy::check(caller, &prior, WorkspaceAction::EditGoals) {
        return Err(ApiError::Forbidden(
            "Only workspace members may edit the goal tree".to_string(),
        ));
    }

    let updated = Workspace::replace_goals(&state.db().pool, prior.id, &payload.goals).await?;

    spawn_update_side_effects(
        state.clone(),
        prior,
        updated.clone(),
        caller.email.clone(),
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success(updated)))
}

fn spawn_update_side_effects(
    state: AppState,
    old: Workspace,
    new: Workspace,
    actor: String,
    context: ActivityContext,
) {
    tokio::spawn(async move {
        let changes: Vec<_> = assignment_changes(&old, &new).collect();
        if !changes.is_empty() {
            dispatch_assignment_changes(
                state.notifier().as_ref(),
                &changes,
                &new.name,
                &actor,
            )
            .await;
        }

        state.activity().record(
            NewActivity {
                activity_type: ActivityType::WorkspaceUpdated,
                actor,
                description: format!("Workspace '{}' updated", new.name),
                metadata: serde_json::json!({
                    "workspaceId": new.id,
                    "goalsCount": new.goals.len(),
                }),
            },
            context,
        );
    });
}

pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let caller = identity.require()?;
    if !policy::check(caller, &workspace, WorkspaceAction::Delete) {
        return Err(ApiError::Forbidden(
            "Only workspace owners or admins can delete workspaces".to_string(),
        ));
    }

    let file_names = Workspace::delete(&state.db().pool, workspace.id).await?;

    // The document is gone; physical cleanup and the audit entry are
    // best-effort and run off the response path.
    let actor = caller.email.clone();
    let activity_context = context.to_activity_context();
    tokio::spawn(async move {
        let attempted = state.attachments().remove_files(&file_names).await;
        state.activity().record(
            NewActivity {
                activity_type: ActivityType::WorkspaceDeleted,
                actor,
                description: format!("Workspace '{}' deleted", workspace.name),
                metadata: serde_json::json!({
                    "workspaceId": workspace.id,
                    "deletedFiles": attempted,
                }),
            },
            activity_context,
        );
    });

    Ok(ResponseJson(ApiResponse::success(())))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(workspace): Extension<Workspace>,
    Extension(identity): Extension<Identity>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<AddMemberRequest>,
) -> Result<ResponseJson<ApiResponse<Workspace>>, ApiError> {
    let caller = identity.require()?;
    if !policy::check(caller, &workspace, WorkspaceAction::AddMember) {
        return Err(ApiError::Forbidden(
            "Only the workspace owner or an admin can add members".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ApiError::BadRequest("Email required".to_string()));
    }
    if !User::has_verified_identity(&state.db().pool, &email).await? {
        return Err(ApiError::BadRequest(
            "User must sign in with Google first".to_string(),
        ));
    }

    let (updated, added) = Workspace::add_member(&state.db().pool, workspace.id, &email).await?;

    if added {
        state.activity().record(
            NewActivity {
                activity_type: ActivityType::MemberAdded,
                actor: email.clone(),
                description: format!(
                    "Added to workspace \"{}\" by {}",
                    updated.name, caller.email
                ),
                metadata: serde_json::json!({
                    "workspaceId": updated.id,
                    "workspaceName": updated.name,
                    "addedBy": caller.email,
                    "memberCount": updated.members.len(),
                }),
            },
            context.to_activity_context(),
        );
    }

    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let per_workspace = Router::new()
        .route(
            "/workspaces/{id}",
            get(list_for_member)
                .put(update_goals)
                .delete(delete_workspace),
        )
        .route("/workspaces/{id}/add-member", post(add_member))
        .layer(from_fn_with_state(
            state.clone(),
            load_workspace_middleware,
        ));

    Router::new()
        .route("/workspaces", post(create_workspace))
        .merge(per_workspace)
}
