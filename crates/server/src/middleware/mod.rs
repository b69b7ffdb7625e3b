use axum::{
    extract::{Path, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use db::models::workspace::Workspace;
use uuid::Uuid;

use crate::AppState;

/// Loads the workspace aggregate named in the path and parks it in request
/// extensions; for mutation routes this snapshot doubles as the pre-write
/// tree the diff engine compares against.
///
/// `GET /workspaces/{id}` shares its shape with the list-by-member route,
/// where the parameter is an email. A parameter that does not parse as a
/// Uuid therefore passes through untouched on GET and is a 404 on anything
/// else.
pub async fn load_workspace_middleware(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Ok(workspace_id) = raw_id.parse::<Uuid>() else {
        if request.method() == Method::GET {
            return Ok(next.run(request).await);
        }
        return Err(StatusCode::NOT_FOUND);
    };

    match Workspace::find_by_id(&state.db().pool, workspace_id).await {
        Ok(Some(workspace)) => {
            let mut request = request;
            request.extensions_mut().insert(workspace);
            Ok(next.run(request).await)
        }
        Ok(None) => {
            tracing::warn!(%workspace_id, "workspace not found");
            Err(StatusCode::NOT_FOUND)
        }
        Err(error) => {
            tracing::error!(%workspace_id, %error, "failed to fetch workspace");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
