use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use axum::Router;
use db::{
    DBService,
    models::workspace::{CreateWorkspace, Goal, Milestone, Priority, Task, Workspace},
};
use services::services::{
    config::{Config, EmailConfig},
    email::{AssignmentEmail, EmailError, Notifier, SmtpNotifier},
};
use uuid::Uuid;

use crate::AppState;

pub fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Points the asset dir at a per-test temp root for the duration of the
/// test. Env mutation is process-global, so holders are serialized.
pub struct TestEnvGuard {
    _lock: MutexGuard<'static, ()>,
    prev_asset_dir: Option<String>,
}

impl TestEnvGuard {
    pub fn new(temp_root: &std::path::Path) -> Self {
        let lock = test_lock().lock().unwrap_or_else(|err| err.into_inner());
        let prev_asset_dir = std::env::var("STRIVE_ASSET_DIR").ok();

        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            std::env::set_var("STRIVE_ASSET_DIR", temp_root);
        }

        Self {
            _lock: lock,
            prev_asset_dir,
        }
    }
}

impl Drop for TestEnvGuard {
    fn drop(&mut self) {
        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            match &self.prev_asset_dir {
                Some(value) => std::env::set_var("STRIVE_ASSET_DIR", value),
                None => std::env::remove_var("STRIVE_ASSET_DIR"),
            }
        }
    }
}

/// Captures dispatch attempts instead of talking SMTP.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: tokio::sync::Mutex<Vec<AssignmentEmail>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<AssignmentEmail> {
        self.sent.lock().await.clone()
    }

    /// Polls until `n` sends landed; dispatch runs on a detached task.
    pub async fn wait_for_sends(&self, n: usize) -> Vec<AssignmentEmail> {
        for _ in 0..100 {
            let sent = self.sent().await;
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.sent().await
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_assignment(&self, email: &AssignmentEmail) -> Result<(), EmailError> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }

    async fn test_configuration(&self, _to: &str) -> Result<(), EmailError> {
        Ok(())
    }
}

pub struct TestEnv {
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    _guard: TestEnvGuard,
    _temp: tempfile::TempDir,
}

fn test_config() -> Config {
    Config {
        admin_emails: vec!["root@x.com".to_string()],
        // Small cap so oversize paths are cheap to exercise.
        max_upload_bytes: 1024,
        ..Default::default()
    }
    .normalized()
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let guard = TestEnvGuard::new(temp.path());
        let db = DBService::new().await.unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::with_parts(db, test_config(), notifier.clone());
        Self {
            state,
            notifier,
            _guard: guard,
            _temp: temp,
        }
    }

    /// Variant wired to the real SMTP notifier (left unconfigured) for
    /// exercising the upstream-unavailable path.
    pub async fn with_smtp_notifier() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let guard = TestEnvGuard::new(temp.path());
        let db = DBService::new().await.unwrap();
        let config = test_config();
        let smtp = Arc::new(SmtpNotifier::new(
            EmailConfig::default(),
            config.frontend_url.clone(),
        ));
        let state = AppState::with_parts(db, config, smtp);
        Self {
            state,
            notifier: Arc::new(RecordingNotifier::default()),
            _guard: guard,
            _temp: temp,
        }
    }

    pub fn router(&self) -> Router {
        crate::http::router(self.state.clone())
    }

    pub async fn create_workspace(
        &self,
        name: &str,
        owner: &str,
        members: &[&str],
    ) -> Workspace {
        Workspace::create(
            &self.state.db().pool,
            CreateWorkspace {
                name: name.to_string(),
                members: members.iter().map(|m| m.to_string()).collect(),
                goals: Vec::new(),
            },
            Some(owner),
        )
        .await
        .unwrap()
    }

    pub async fn replace_goals(
        &self,
        workspace_id: Uuid,
        task_id: Uuid,
        assigned_to: &str,
    ) -> Workspace {
        let goals = vec![Goal {
            id: Uuid::new_v4(),
            title: "Goal".to_string(),
            priority: Priority::Medium,
            milestones: vec![Milestone {
                id: Uuid::new_v4(),
                title: "Milestone".to_string(),
                tasks: vec![Task {
                    id: task_id,
                    title: "Task".to_string(),
                    status: "Not Started".to_string(),
                    assigned_to: assigned_to.to_string(),
                    user_stories: String::new(),
                    start_date: None,
                    end_date: None,
                    attachments: Vec::new(),
                }],
            }],
        }];
        Workspace::replace_goals(&self.state.db().pool, workspace_id, &goals)
            .await
            .unwrap()
    }
}

/// Goal-tree payload for `PUT /api/workspaces/{id}` carrying one task.
pub fn goals_json(task_id: Uuid, assigned_to: &str) -> serde_json::Value {
    serde_json::json!([{
        "title": "Goal",
        "priority": "Medium",
        "milestones": [{
            "title": "Milestone",
            "tasks": [{
                "id": task_id,
                "title": "Task",
                "status": "Not Started",
                "assignedTo": assigned_to,
            }]
        }]
    }])
}
