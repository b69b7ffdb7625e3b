use std::{collections::HashMap, sync::Arc};

use db::models::user::{User, UserError, UserRole};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::config::Config;

/// Resolved identity of the requester: enough for every policy decision.
#[derive(Debug, Clone)]
pub struct Caller {
    pub email: String,
    pub role: UserRole,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn from_user(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Opaque-token session map. Tokens live in an HttpOnly cookie; the store
/// itself is process-local (polling clients re-authenticate after a
/// restart, which matches the original deployment).
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, email: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.inner
            .write()
            .await
            .insert(token.clone(), email.trim().to_lowercase());
        token
    }

    pub async fn email_for(&self, token: &str) -> Option<String> {
        self.inner.read().await.get(token).cloned()
    }

    pub async fn remove(&self, token: &str) {
        self.inner.write().await.remove(token);
    }
}

/// Prefers the authenticated session identity and falls back to a supplied
/// email. `None` means unauthenticated; callers must reject privileged
/// operations on it.
pub async fn resolve_caller(
    pool: &SqlitePool,
    session_email: Option<&str>,
    fallback_email: Option<&str>,
) -> Result<Option<Caller>, UserError> {
    for candidate in [session_email, fallback_email].into_iter().flatten() {
        if let Some(user) = User::find_by_email(pool, candidate).await? {
            return Ok(Some(Caller::from_user(&user)));
        }
    }
    Ok(None)
}

/// Allow-list promotion applied on every successful sign-in. At most one
/// write: a user that is already admin is left untouched.
pub async fn ensure_admin_role(
    pool: &SqlitePool,
    config: &Config,
    user: User,
) -> Result<User, UserError> {
    if !config.is_admin_email(&user.email) || user.is_admin() {
        return Ok(user);
    }
    if User::promote_to_admin(pool, user.id).await? {
        tracing::info!(email = %user.email, "admin role assigned from allow-list");
    }
    User::find_by_email(pool, &user.email)
        .await?
        .ok_or(UserError::NotFound)
}
