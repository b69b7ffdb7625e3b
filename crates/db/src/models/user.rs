use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    NotFound,
    #[error("User already exists")]
    AlreadyExists,
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

/// Account record. The password is an opaque credential compared verbatim;
/// `google_id` marks an account that has completed OAuth at least once.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub google_id: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub google_id: Option<String>,
    pub role: UserRole,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<Self>, UserError> {
        let user = sqlx::query_as::<_, Self>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_google_id(
        pool: &SqlitePool,
        google_id: &str,
    ) -> Result<Option<Self>, UserError> {
        let user = sqlx::query_as::<_, Self>("SELECT * FROM users WHERE google_id = ?")
            .bind(google_id)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, UserError> {
        let users = sqlx::query_as::<_, Self>("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?;
        Ok(users)
    }

    pub async fn create(pool: &SqlitePool, data: &CreateUser) -> Result<Self, UserError> {
        let email = data.email.trim().to_lowercase();
        if email.is_empty() {
            return Err(UserError::ValidationError("Email is required".to_string()));
        }
        if Self::find_by_email(pool, &email).await?.is_some() {
            return Err(UserError::AlreadyExists);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, name, email, password, google_id, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&email)
        .bind(&data.password)
        .bind(&data.google_id)
        .bind(data.role)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_email(pool, &email)
            .await?
            .ok_or(UserError::NotFound)
    }

    /// Email + opaque-credential check. OAuth-only accounts (NULL password)
    /// never match.
    pub async fn verify_credentials(
        pool: &SqlitePool,
        email: &str,
        password: &str,
    ) -> Result<Option<Self>, UserError> {
        let user = sqlx::query_as::<_, Self>("SELECT * FROM users WHERE email = ? AND password = ?")
            .bind(email.trim().to_lowercase())
            .bind(password)
            .fetch_optional(pool)
            .await?;
        Ok(user)
    }

    pub async fn update_name(pool: &SqlitePool, email: &str, name: &str) -> Result<Self, UserError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(UserError::ValidationError("Name is required".to_string()));
        }
        let email = email.trim().to_lowercase();
        let result = sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE email = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(&email)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(UserError::NotFound);
        }
        Self::find_by_email(pool, &email)
            .await?
            .ok_or(UserError::NotFound)
    }

    /// Idempotent role upgrade. Returns true only when a write happened, so
    /// callers can observe that repeat sign-ins do not touch the row again.
    pub async fn promote_to_admin(pool: &SqlitePool, id: Uuid) -> Result<bool, UserError> {
        let result = sqlx::query("UPDATE users SET role = 'admin', updated_at = ? WHERE id = ? AND role != 'admin'")
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attaches an external identity to a password-created account, filling
    /// in a missing display name from the OAuth profile.
    pub async fn link_google(
        pool: &SqlitePool,
        id: Uuid,
        google_id: &str,
        profile_name: &str,
    ) -> Result<(), UserError> {
        sqlx::query(
            "UPDATE users SET google_id = ?, \
             name = CASE WHEN name = '' THEN ? ELSE name END, \
             updated_at = ? WHERE id = ?",
        )
        .bind(google_id)
        .bind(profile_name)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Membership gate: the target must have completed OAuth at least once.
    pub async fn has_verified_identity(
        pool: &SqlitePool,
        email: &str,
    ) -> Result<bool, UserError> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND google_id IS NOT NULL)",
        )
        .bind(email.trim().to_lowercase())
        .fetch_one(pool)
        .await?;
        Ok(exists != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestDb;

    fn signup(email: &str) -> CreateUser {
        CreateUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: Some("hunter2".to_string()),
            google_id: None,
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn email_is_stored_lower_case_and_unique() {
        let db = TestDb::new().await;
        let user = User::create(&db.pool, &signup("Alice@Example.COM")).await.unwrap();
        assert_eq!(user.email, "alice@example.com");

        let err = User::create(&db.pool, &signup("alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::AlreadyExists));

        // Lookups are case-insensitive through normalization.
        let found = User::find_by_email(&db.pool, "ALICE@example.com")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn credential_check_rejects_oauth_only_accounts() {
        let db = TestDb::new().await;
        User::create(
            &db.pool,
            &CreateUser {
                name: "OAuth Only".to_string(),
                email: "o@x.com".to_string(),
                password: None,
                google_id: Some("g-123".to_string()),
                role: UserRole::User,
            },
        )
        .await
        .unwrap();

        let miss = User::verify_credentials(&db.pool, "o@x.com", "anything")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn admin_promotion_is_idempotent() {
        let db = TestDb::new().await;
        let user = User::create(&db.pool, &signup("boss@x.com")).await.unwrap();

        assert!(User::promote_to_admin(&db.pool, user.id).await.unwrap());
        // Second promotion finds nothing to write.
        assert!(!User::promote_to_admin(&db.pool, user.id).await.unwrap());

        let user = User::find_by_email(&db.pool, "boss@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn verified_identity_requires_google_id() {
        let db = TestDb::new().await;
        let user = User::create(&db.pool, &signup("m@x.com")).await.unwrap();
        assert!(!User::has_verified_identity(&db.pool, "m@x.com").await.unwrap());

        User::link_google(&db.pool, user.id, "g-9", "M").await.unwrap();
        assert!(User::has_verified_identity(&db.pool, "m@x.com").await.unwrap());

        // Linking keeps the existing display name.
        let user = User::find_by_email(&db.pool, "m@x.com").await.unwrap().unwrap();
        assert_eq!(user.name, "Test User");
    }
}
