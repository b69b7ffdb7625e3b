use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, types::Json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityType {
    Login,
    Signup,
    ProfileUpdate,
    WorkspaceCreated,
    WorkspaceUpdated,
    MemberAdded,
    FileUploaded,
    AttachmentRemoved,
    WorkspaceDeleted,
}

/// One audit record. Rows are append-only; nothing in the application
/// mutates or deletes them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub actor: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    activity_type: ActivityType,
    actor: String,
    description: String,
    metadata: Json<serde_json::Value>,
    ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            activity_type: row.activity_type,
            actor: row.actor,
            description: row.description,
            metadata: row.metadata.0,
            ip: row.ip,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub activity_type: ActivityType,
    pub actor: String,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Request context captured alongside an entry; `None` fields come out as
/// "system" in the stored row.
#[derive(Debug, Clone, Default)]
pub struct ActivityContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub types: Option<Vec<ActivityType>>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub items: Vec<Activity>,
    pub total_count: i64,
}

fn push_filters(builder: &mut QueryBuilder<Sqlite>, filter: &ActivityFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(types) = &filter.types
        && !types.is_empty()
    {
        builder.push(" AND activity_type IN (");
        let mut separated = builder.separated(", ");
        for activity_type in types {
            separated.push_bind(*activity_type);
        }
        separated.push_unseparated(")");
    }
    if let Some(actor) = &filter.actor {
        builder.push(" AND actor = ").push_bind(actor.clone());
    }
    if let Some(since) = filter.since {
        builder.push(" AND created_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND created_at < ").push_bind(until);
    }
}

impl Activity {
    pub async fn insert(
        pool: &SqlitePool,
        entry: &NewActivity,
        context: &ActivityContext,
    ) -> Result<Self, ActivityError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO activities (id, activity_type, actor, description, metadata, ip, user_agent, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entry.activity_type)
        .bind(&entry.actor)
        .bind(&entry.description)
        .bind(Json(&entry.metadata))
        .bind(context.ip.as_deref().unwrap_or("system"))
        .bind(context.user_agent.as_deref().unwrap_or("system"))
        .bind(now)
        .execute(pool)
        .await?;

        Ok(Self {
            id,
            activity_type: entry.activity_type,
            actor: entry.actor.clone(),
            description: entry.description.clone(),
            metadata: entry.metadata.clone(),
            ip: Some(context.ip.clone().unwrap_or_else(|| "system".to_string())),
            user_agent: Some(context.user_agent.clone().unwrap_or_else(|| "system".to_string())),
            created_at: now,
        })
    }

    /// Newest-first page plus the unpaged total for the same filter.
    pub async fn query(
        pool: &SqlitePool,
        filter: &ActivityFilter,
        limit: i64,
        offset: i64,
    ) -> Result<ActivityPage, ActivityError> {
        let mut builder = QueryBuilder::new("SELECT * FROM activities");
        push_filters(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<ActivityRow> = builder.build_query_as().fetch_all(pool).await?;

        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM activities");
        push_filters(&mut count_builder, filter);
        let total_count: i64 = count_builder.build_query_scalar().fetch_one(pool).await?;

        Ok(ActivityPage {
            items: rows.into_iter().map(Into::into).collect(),
            total_count,
        })
    }

    pub async fn count_in_window(
        pool: &SqlitePool,
        types: &[ActivityType],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<i64, ActivityError> {
        let filter = ActivityFilter {
            types: Some(types.to_vec()),
            since: Some(since),
            until,
            ..Default::default()
        };
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM activities");
        push_filters(&mut builder, &filter);
        Ok(builder.build_query_scalar().fetch_one(pool).await?)
    }

    /// Feed backing `GET /api/notifications/{email}`: entries recording that
    /// this email was added to a workspace.
    pub async fn member_added_for(
        pool: &SqlitePool,
        email: &str,
        limit: i64,
    ) -> Result<Vec<Self>, ActivityError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT * FROM activities WHERE activity_type = 'member_added' AND actor = ? \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(email.trim().to_lowercase())
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
