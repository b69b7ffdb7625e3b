use std::sync::Arc;

use db::DBService;
use services::services::{
    activity::ActivityService,
    attachment::{AttachmentService, FileStore},
    auth::SessionStore,
    config::Config,
    email::{Notifier, SmtpNotifier},
    google::GoogleOAuth,
};
use tokio::sync::RwLock;

pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;

#[cfg(test)]
pub mod test_support;

/// Shared handle threaded through every handler. Cheap to clone; the
/// notifier sits behind a trait object so tests can substitute a
/// recording double.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<RwLock<Config>>,
    sessions: SessionStore,
    activity: ActivityService,
    attachments: AttachmentService,
    notifier: Arc<dyn Notifier>,
    google: GoogleOAuth,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let config =
            services::services::config::load_config_from_file(&utils::assets::config_path()).await;
        let db = DBService::new().await?;
        let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(
            config.email.clone(),
            config.frontend_url.clone(),
        ));
        Ok(Self::with_parts(db, config, notifier))
    }

    pub fn with_parts(db: DBService, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let store = FileStore::new(utils::assets::uploads_dir());
        let attachments = AttachmentService::new(store, config.max_upload_bytes);
        let activity = ActivityService::new(db.clone());
        let google = GoogleOAuth::new(config.google.clone());
        Self {
            db,
            config: Arc::new(RwLock::new(config)),
            sessions: SessionStore::new(),
            activity,
            attachments,
            notifier,
            google,
        }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn activity(&self) -> &ActivityService {
        &self.activity
    }

    pub fn attachments(&self) -> &AttachmentService {
        &self.attachments
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn google(&self) -> &GoogleOAuth {
        &self.google
    }
}
