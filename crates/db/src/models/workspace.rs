use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, types::Json};
use thiserror::Error;
use uuid::Uuid;

use crate::retry_on_sqlite_busy;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Workspace not found")]
    NotFound,
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// Metadata for one uploaded file. The binary itself lives in the content
/// store under `file_name`; the database record is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub original_name: String,
    pub url: String,
}

/// Leaf of the aggregate tree. `id` must stay stable across full-tree
/// replacements: the diff engine and the attachment manager both locate
/// tasks by id. Nodes submitted without an id get a fresh one on
/// deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub user_stories: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

/// The aggregate root. One database row holds the whole document: member
/// list and goal tree are JSON columns, so a single UPDATE replaces the
/// aggregate atomically and concurrent editors are last-write-wins at this
/// granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner: Option<String>,
    pub members: Vec<String>,
    pub goals: Vec<Goal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct WorkspaceRow {
    id: Uuid,
    name: String,
    owner: Option<String>,
    members: Json<Vec<String>>,
    goals: Json<Vec<Goal>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            members: row.members.0,
            goals: row.goals.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspace {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

/// Shown in attachment 404 diagnostics so a client can see which task ids
/// the server actually holds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: Uuid,
    pub title: String,
}

fn normalize_members(owner: Option<&str>, members: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for email in members {
        let email = email.trim().to_lowercase();
        if !email.is_empty() && !normalized.contains(&email) {
            normalized.push(email);
        }
    }
    if let Some(owner) = owner {
        let owner = owner.trim().to_lowercase();
        if !owner.is_empty() && !normalized.contains(&owner) {
            normalized.push(owner);
        }
    }
    normalized
}

impl Workspace {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, WorkspaceError> {
        let row = sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, WorkspaceError> {
        let rows =
            sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces ORDER BY created_at DESC")
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn find_by_member(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<Vec<Self>, WorkspaceError> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT * FROM workspaces \
             WHERE EXISTS (SELECT 1 FROM json_each(workspaces.members) WHERE json_each.value = ?) \
             ORDER BY created_at DESC",
        )
        .bind(email.trim().to_lowercase())
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create(
        pool: &SqlitePool,
        data: CreateWorkspace,
        owner: Option<&str>,
    ) -> Result<Self, WorkspaceError> {
        let name = data.name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::ValidationError(
                "Workspace name is required".to_string(),
            ));
        }

        let members = normalize_members(owner, &data.members);
        let owner = owner
            .map(|o| o.trim().to_lowercase())
            .filter(|o| !o.is_empty());
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO workspaces (id, name, owner, members, goals, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(name)
        .bind(&owner)
        .bind(Json(&members))
        .bind(Json(&data.goals))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id).await?.ok_or(WorkspaceError::NotFound)
    }

    /// Overwrites the entire goal tree in one UPDATE. Full-replacement
    /// semantics: the caller submits the complete desired tree, no
    /// field-level merging happens.
    pub async fn replace_goals(
        pool: &SqlitePool,
        id: Uuid,
        goals: &[Goal],
    ) -> Result<Self, WorkspaceError> {
        let result = retry_on_sqlite_busy(|| async move {
            sqlx::query("UPDATE workspaces SET goals = ?, updated_at = ? WHERE id = ?")
                .bind(Json(goals))
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
        })
        .await?;
        if result.rows_affected() == 0 {
            return Err(WorkspaceError::NotFound);
        }
        Self::find_by_id(pool, id).await?.ok_or(WorkspaceError::NotFound)
    }

    /// No-ops when the email is already present. Returns the updated
    /// aggregate plus whether a write happened.
    pub async fn add_member(
        pool: &SqlitePool,
        id: Uuid,
        email: &str,
    ) -> Result<(Self, bool), WorkspaceError> {
        let workspace = Self::find_by_id(pool, id).await?.ok_or(WorkspaceError::NotFound)?;
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(WorkspaceError::ValidationError("Email required".to_string()));
        }
        if workspace.members.contains(&email) {
            return Ok((workspace, false));
        }

        let mut members = workspace.members.clone();
        members.push(email);
        let members = &members;
        retry_on_sqlite_busy(|| async move {
            sqlx::query("UPDATE workspaces SET members = ?, updated_at = ? WHERE id = ?")
                .bind(Json(members))
                .bind(Utc::now())
                .bind(id)
                .execute(pool)
                .await
        })
        .await?;

        let updated = Self::find_by_id(pool, id).await?.ok_or(WorkspaceError::NotFound)?;
        Ok((updated, true))
    }

    /// Deletes the aggregate row and hands back every attachment file name
    /// reachable from the tree, collected before the delete so the caller
    /// can drive cascade cleanup of the content store.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<Vec<String>, WorkspaceError> {
        let workspace = Self::find_by_id(pool, id).await?.ok_or(WorkspaceError::NotFound)?;
        let file_names = workspace.attachment_file_names();

        retry_on_sqlite_busy(|| async move {
            sqlx::query("DELETE FROM workspaces WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
        })
        .await?;

        Ok(file_names)
    }

    /// Flattened view over goals[*].milestones[*].tasks[*].
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.goals
            .iter()
            .flat_map(|goal| goal.milestones.iter())
            .flat_map(|milestone| milestone.tasks.iter())
    }

    /// Linear scan for a task anywhere in the tree; first match wins.
    pub fn find_task_mut(&mut self, task_id: Uuid) -> Option<&mut Task> {
        self.goals
            .iter_mut()
            .flat_map(|goal| goal.milestones.iter_mut())
            .flat_map(|milestone| milestone.tasks.iter_mut())
            .find(|task| task.id == task_id)
    }

    pub fn attachment_file_names(&self) -> Vec<String> {
        self.tasks()
            .flat_map(|task| task.attachments.iter())
            .map(|attachment| attachment.file_name.clone())
            .collect()
    }

    pub fn task_summaries(&self) -> Vec<TaskSummary> {
        self.tasks()
            .map(|task| TaskSummary {
                id: task.id,
                title: task.title.clone(),
            })
            .collect()
    }

    pub fn is_member(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.members.iter().any(|member| member == &email)
    }

    pub fn is_owner(&self, email: &str) -> bool {
        self.owner
            .as_deref()
            .is_some_and(|owner| owner.eq_ignore_ascii_case(email.trim()))
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    pub fn task(id: Uuid, title: &str, assigned_to: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            status: "Not Started".to_string(),
            assigned_to: assigned_to.to_string(),
            user_stories: String::new(),
            start_date: None,
            end_date: None,
            attachments: Vec::new(),
        }
    }

    pub fn tree_with_tasks(tasks: Vec<Task>) -> Vec<Goal> {
        vec![Goal {
            id: Uuid::new_v4(),
            title: "Goal".to_string(),
            priority: Priority::Medium,
            milestones: vec![Milestone {
                id: Uuid::new_v4(),
                title: "Milestone".to_string(),
                tasks,
            }],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::{test_fixtures::*, *};
    use crate::test_support::TestDb;

    fn create_data(name: &str, members: &[&str]) -> CreateWorkspace {
        CreateWorkspace {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            goals: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_normalizes_members_and_includes_owner() {
        let db = TestDb::new().await;
        let workspace = Workspace::create(
            &db.pool,
            create_data("Sprint", &["A@x.com", "b@x.com", "a@x.com", " "]),
            Some("Owner@X.com"),
        )
        .await
        .unwrap();

        assert_eq!(workspace.members, vec!["a@x.com", "b@x.com", "owner@x.com"]);
        assert_eq!(workspace.owner.as_deref(), Some("owner@x.com"));
        assert!(workspace.is_owner("owner@x.com"));
        assert!(workspace.is_member("B@X.COM"));
    }

    #[tokio::test]
    async fn create_rejects_blank_name() {
        let db = TestDb::new().await;
        let err = Workspace::create(&db.pool, create_data("   ", &[]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn replace_goals_swaps_the_whole_tree() {
        let db = TestDb::new().await;
        let workspace = Workspace::create(&db.pool, create_data("WS", &["a@x.com"]), None)
            .await
            .unwrap();

        let t1 = Uuid::new_v4();
        let first = tree_with_tasks(vec![task(t1, "First", "")]);
        let updated = Workspace::replace_goals(&db.pool, workspace.id, &first)
            .await
            .unwrap();
        assert_eq!(updated.tasks().count(), 1);

        // A second replace does not merge: the old task is gone entirely.
        let second = tree_with_tasks(vec![task(Uuid::new_v4(), "Second", "b@x.com")]);
        let updated = Workspace::replace_goals(&db.pool, workspace.id, &second)
            .await
            .unwrap();
        let titles: Vec<_> = updated.tasks().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Second"]);
        assert!(updated.tasks().all(|t| t.id != t1));
    }

    #[tokio::test]
    async fn replace_goals_on_missing_workspace_is_not_found() {
        let db = TestDb::new().await;
        let err = Workspace::replace_goals(&db.pool, Uuid::new_v4(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound));
    }

    #[tokio::test]
    async fn add_member_is_idempotent() {
        let db = TestDb::new().await;
        let workspace = Workspace::create(&db.pool, create_data("WS", &["a@x.com"]), None)
            .await
            .unwrap();

        let (updated, added) = Workspace::add_member(&db.pool, workspace.id, "New@X.com")
            .await
            .unwrap();
        assert!(added);
        assert!(updated.is_member("new@x.com"));

        let (updated, added) = Workspace::add_member(&db.pool, workspace.id, "new@x.com")
            .await
            .unwrap();
        assert!(!added);
        assert_eq!(
            updated.members.iter().filter(|m| m.as_str() == "new@x.com").count(),
            1
        );
    }

    #[tokio::test]
    async fn member_query_matches_exactly() {
        let db = TestDb::new().await;
        Workspace::create(&db.pool, create_data("Mine", &["a@x.com"]), None)
            .await
            .unwrap();
        Workspace::create(&db.pool, create_data("Other", &["b@x.com"]), None)
            .await
            .unwrap();

        let mine = Workspace::find_by_member(&db.pool, "A@x.com").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Mine");
    }

    #[tokio::test]
    async fn delete_collects_every_attachment_file_name() {
        let db = TestDb::new().await;
        let workspace = Workspace::create(&db.pool, create_data("WS", &[]), None)
            .await
            .unwrap();

        let mut t1 = task(Uuid::new_v4(), "T1", "");
        t1.attachments.push(Attachment {
            file_name: "1-a.txt".to_string(),
            original_name: "a.txt".to_string(),
            url: "/uploads/1-a.txt".to_string(),
        });
        let mut t2 = task(Uuid::new_v4(), "T2", "");
        t2.attachments.push(Attachment {
            file_name: "2-b.txt".to_string(),
            original_name: "b.txt".to_string(),
            url: "/uploads/2-b.txt".to_string(),
        });
        Workspace::replace_goals(&db.pool, workspace.id, &tree_with_tasks(vec![t1, t2]))
            .await
            .unwrap();

        let file_names = Workspace::delete(&db.pool, workspace.id).await.unwrap();
        assert_eq!(file_names, vec!["1-a.txt", "2-b.txt"]);
        assert!(Workspace::find_by_id(&db.pool, workspace.id).await.unwrap().is_none());
    }

    #[test]
    fn tasks_submitted_without_ids_get_fresh_ones() {
        let goal: Goal = serde_json::from_value(serde_json::json!({
            "title": "G",
            "milestones": [{
                "title": "M",
                "tasks": [{"title": "T", "status": "Not Started"}]
            }]
        }))
        .unwrap();
        let task = &goal.milestones[0].tasks[0];
        assert!(!task.id.is_nil());
        assert_eq!(task.assigned_to, "");
    }
}
