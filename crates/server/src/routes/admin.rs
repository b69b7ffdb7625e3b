use axum::{
    Extension, Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use chrono::{DateTime, Duration, Utc};
use db::models::{
    activity::{Activity, ActivityFilter, ActivityType},
    user::User,
    workspace::Workspace,
};
use serde::{Deserialize, Serialize};
use services::services::auth::Caller;
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError, http::identity::Identity};

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;

fn require_admin(identity: &Identity) -> Result<&Caller, ApiError> {
    match &identity.caller {
        Some(caller) if caller.is_admin() => Ok(caller),
        _ => Err(ApiError::Forbidden("Admin access required".to_string())),
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<ResponseJson<ApiResponse<Vec<User>>>, ApiError> {
    require_admin(&identity)?;
    let users = User::find_all(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(users)))
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<ResponseJson<ApiResponse<Vec<Workspace>>>, ApiError> {
    require_admin(&identity)?;
    let workspaces = Workspace::find_all(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(workspaces)))
}

#[derive(Debug, Deserialize)]
pub struct ActivitiesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Comma-separated activity type tags.
    pub types: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitiesResponse {
    pub activities: Vec<Activity>,
    pub total_count: i64,
    pub has_more: bool,
}

pub async fn list_activities(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ActivitiesQuery>,
) -> Result<ResponseJson<ApiResponse<ActivitiesResponse>>, ApiError> {
    require_admin(&identity)?;

    let types = match &query.types {
        Some(raw) => {
            let mut parsed = Vec::new();
            for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
                let activity_type = tag.parse::<ActivityType>().map_err(|_| {
                    ApiError::BadRequest(format!("Unknown activity type: {tag}"))
                })?;
                parsed.push(activity_type);
            }
            Some(parsed)
        }
        None => None,
    };

    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let filter = ActivityFilter {
        types,
        actor: None,
        since: query.since,
        until: query.until,
    };
    let page = state.activity().query(&filter, limit, offset).await?;

    let has_more = offset + limit < page.total_count;
    Ok(ResponseJson(ApiResponse::success(ActivitiesResponse {
        activities: page.items,
        total_count: page.total_count,
        has_more,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentStats {
    pub total_users: i64,
    pub active_workspaces: i64,
    pub total_workspaces: i64,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub task_completion_rate: i64,
}

/// Trailing-window counts compared against the preceding window of the
/// same width. Coarse by design.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthStats {
    pub user_growth: i64,
    pub workspace_growth: i64,
    pub update_activity_growth: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBreakdown {
    pub logins: i64,
    pub signups: i64,
    pub workspace_creations: i64,
    pub workspace_updates: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub current: CurrentStats,
    pub changes: GrowthStats,
    pub activity_breakdown: ActivityBreakdown,
    pub last_updated: DateTime<Utc>,
}

fn pct_change(current: i64, previous: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    ((current - previous) * 100) / previous
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<ResponseJson<ApiResponse<StatsResponse>>, ApiError> {
    require_admin(&identity)?;
    let pool = &state.db().pool;

    let users = User::find_all(pool).await?;
    let workspaces = Workspace::find_all(pool).await?;

    let total_users = users.len() as i64;
    let total_workspaces = workspaces.len() as i64;
    let active_workspaces = workspaces
        .iter()
        .filter(|workspace| !workspace.members.is_empty())
        .count() as i64;
    let total_tasks = workspaces
        .iter()
        .map(|workspace| workspace.tasks().count() as i64)
        .sum::<i64>();
    let completed_tasks = workspaces
        .iter()
        .flat_map(|workspace| workspace.tasks())
        .filter(|task| task.status.eq_ignore_ascii_case("done"))
        .count() as i64;
    let task_completion_rate = if total_tasks > 0 {
        completed_tasks * 100 / total_tasks
    } else {
        0
    };

    let now = Utc::now();
    let day_ago = now - Duration::hours(24);
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);

    let signups_this_week =
        Activity::count_in_window(pool, &[ActivityType::Signup], week_ago, None).await?;
    let created_this_week =
        Activity::count_in_window(pool, &[ActivityType::WorkspaceCreated], week_ago, None).await?;
    let created_last_week = Activity::count_in_window(
        pool,
        &[ActivityType::WorkspaceCreated],
        two_weeks_ago,
        Some(week_ago),
    )
    .await?;
    let updated_this_week =
        Activity::count_in_window(pool, &[ActivityType::WorkspaceUpdated], week_ago, None).await?;
    let updated_last_week = Activity::count_in_window(
        pool,
        &[ActivityType::WorkspaceUpdated],
        two_weeks_ago,
        Some(week_ago),
    )
    .await?;

    let user_growth = if signups_this_week > 0 {
        pct_change(total_users, total_users - signups_this_week).min(99)
    } else {
        0
    };

    let breakdown = ActivityBreakdown {
        logins: Activity::count_in_window(pool, &[ActivityType::Login], day_ago, None).await?,
        signups: Activity::count_in_window(pool, &[ActivityType::Signup], day_ago, None).await?,
        workspace_creations: Activity::count_in_window(
            pool,
            &[ActivityType::WorkspaceCreated],
            day_ago,
            None,
        )
        .await?,
        workspace_updates: Activity::count_in_window(
            pool,
            &[ActivityType::WorkspaceUpdated],
            day_ago,
            None,
        )
        .await?,
    };

    Ok(ResponseJson(ApiResponse::success(StatsResponse {
        current: CurrentStats {
            total_users,
            active_workspaces,
            total_workspaces,
            total_tasks,
            completed_tasks,
            task_completion_rate,
        },
        changes: GrowthStats {
            user_growth,
            workspace_growth: pct_change(created_this_week, created_last_week),
            update_activity_growth: pct_change(updated_this_week, updated_last_week),
        },
        activity_breakdown: breakdown,
        last_updated: now,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/workspaces", get(list_workspaces))
        .route("/admin/activities", get(list_activities))
        .route("/admin/stats", get(get_stats))
}
