use std::path::PathBuf;

use chrono::Utc;
use db::models::workspace::{Attachment, TaskSummary, Workspace, WorkspaceError};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

const TASK_DIAGNOSTIC_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("Workspace not found")]
    WorkspaceNotFound,
    #[error("Task not found in workspace")]
    TaskNotFound { known_tasks: Vec<TaskSummary> },
    #[error("File too large: {size} bytes (maximum is {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Flat content store addressed by generated file name. The database
/// record is authoritative; this store is a derived cache that may
/// transiently hold orphans.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        if let Err(err) = std::fs::create_dir_all(&root) {
            tracing::warn!(path = %root.display(), error = %err, "failed to create upload dir");
        }
        Self { root }
    }

    fn resolve(&self, file_name: &str) -> std::io::Result<PathBuf> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name == "."
            || file_name == ".."
        {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid stored file name",
            ));
        }
        Ok(self.root.join(file_name))
    }

    pub fn path(&self, file_name: &str) -> std::io::Result<PathBuf> {
        self.resolve(file_name)
    }

    pub async fn put(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.resolve(file_name)?;
        tokio::fs::write(path, bytes).await
    }

    pub async fn remove(&self, file_name: &str) -> std::io::Result<()> {
        let path = self.resolve(file_name)?;
        tokio::fs::remove_file(path).await
    }
}

/// Stored name: millisecond timestamp plus the sanitized original, the
/// same scheme the upload URL serves back.
pub fn generate_file_name(original_name: &str) -> String {
    let sanitized: String = original_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}-{}", Utc::now().timestamp_millis(), sanitized)
}

#[derive(Clone)]
pub struct AttachmentService {
    store: FileStore,
    max_upload_bytes: usize,
}

impl AttachmentService {
    pub fn new(store: FileStore, max_upload_bytes: usize) -> Self {
        Self {
            store,
            max_upload_bytes,
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn task_not_found(workspace: &Workspace) -> AttachmentError {
        let mut known_tasks = workspace.task_summaries();
        known_tasks.truncate(TASK_DIAGNOSTIC_CAP);
        AttachmentError::TaskNotFound { known_tasks }
    }

    /// Stores the binary, appends the attachment record to the task and
    /// rewrites the aggregate. Oversize payloads are rejected before any
    /// mutation.
    pub async fn upload(
        &self,
        pool: &SqlitePool,
        workspace_id: Uuid,
        task_id: Uuid,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<Workspace, AttachmentError> {
        if bytes.len() > self.max_upload_bytes {
            return Err(AttachmentError::PayloadTooLarge {
                size: bytes.len(),
                max: self.max_upload_bytes,
            });
        }

        let mut workspace = Workspace::find_by_id(pool, workspace_id)
            .await?
            .ok_or(AttachmentError::WorkspaceNotFound)?;
        if !workspace.tasks().any(|task| task.id == task_id) {
            return Err(Self::task_not_found(&workspace));
        }

        let file_name = generate_file_name(original_name);
        self.store.put(&file_name, bytes).await?;

        let attachment = Attachment {
            file_name: file_name.clone(),
            original_name: original_name.to_string(),
            url: format!("/uploads/{file_name}"),
        };
        if let Some(task) = workspace.find_task_mut(task_id) {
            task.attachments.push(attachment);
        }

        match Workspace::replace_goals(pool, workspace_id, &workspace.goals).await {
            Ok(updated) => Ok(updated),
            Err(err) => {
                // The aggregate write failed, so the stored file would be an
                // orphan from birth. Unlink it, best effort.
                if let Err(io_err) = self.store.remove(&file_name).await {
                    tracing::warn!(file_name = %file_name, error = %io_err, "failed to unlink file after aborted upload");
                }
                Err(err.into())
            }
        }
    }

    /// Removes the record, persists the aggregate, then attempts physical
    /// deletion. A failed unlink is logged and never rolls back the
    /// logical removal.
    pub async fn remove(
        &self,
        pool: &SqlitePool,
        workspace_id: Uuid,
        task_id: Uuid,
        file_name: &str,
    ) -> Result<Workspace, AttachmentError> {
        let mut workspace = Workspace::find_by_id(pool, workspace_id)
            .await?
            .ok_or(AttachmentError::WorkspaceNotFound)?;
        if !workspace.tasks().any(|task| task.id == task_id) {
            return Err(Self::task_not_found(&workspace));
        }

        if let Some(task) = workspace.find_task_mut(task_id) {
            task.attachments
                .retain(|attachment| attachment.file_name != file_name);
        }
        let updated = Workspace::replace_goals(pool, workspace_id, &workspace.goals).await?;

        if let Err(err) = self.store.remove(file_name).await {
            tracing::warn!(file_name = %file_name, error = %err, "failed to delete stored attachment file");
        }

        Ok(updated)
    }

    /// Cascade cleanup after workspace deletion: one best-effort unlink per
    /// collected file name. Individual failures never abort the sweep.
    pub async fn remove_files(&self, file_names: &[String]) -> usize {
        let mut attempted = 0;
        for file_name in file_names {
            attempted += 1;
            if let Err(err) = self.store.remove(file_name).await {
                tracing::warn!(file_name = %file_name, error = %err, "failed to delete file during cascade");
            }
        }
        attempted
    }
}
