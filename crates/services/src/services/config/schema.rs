use serde::{Deserialize, Serialize};

const SMTP_PASSWORD_ENV: &str = "STRIVE_SMTP_PASSWORD";
const GOOGLE_CLIENT_SECRET_ENV: &str = "STRIVE_GOOGLE_CLIENT_SECRET";

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

/// SMTP transport settings for the notification dispatcher. Unset
/// credentials leave the dispatcher in "not configured" mode: sends fail
/// softly without a network attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    #[serde(alias = "smtpHost")]
    pub smtp_host: Option<String>,
    #[serde(alias = "smtpPort")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "fromAddress")]
    pub from_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from_address: None,
        }
    }
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.username.is_some() && self.password.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleOAuthConfig {
    #[serde(alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(alias = "clientSecret")]
    pub client_secret: Option<String>,
}

impl GoogleOAuthConfig {
    pub fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emails promoted to the admin role at sign-in/sign-up/OAuth
    /// completion. Policy data, not code.
    #[serde(alias = "adminEmails")]
    pub admin_emails: Vec<String>,
    #[serde(alias = "frontendUrl")]
    pub frontend_url: String,
    pub email: EmailConfig,
    pub google: GoogleOAuthConfig,
    #[serde(alias = "maxUploadBytes")]
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_emails: Vec::new(),
            frontend_url: default_frontend_url(),
            email: EmailConfig::default(),
            google: GoogleOAuthConfig::default(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Config {
    pub fn from_raw(raw_config: &str) -> Self {
        match serde_json::from_str::<Config>(raw_config) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Invalid config file, using defaults: {}", err);
                Config::default()
            }
        }
    }

    /// Lower-cases the allow-list so membership checks are
    /// case-insensitive.
    pub fn normalized(mut self) -> Self {
        self.admin_emails = self
            .admin_emails
            .iter()
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        self
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(password) = std::env::var(SMTP_PASSWORD_ENV)
            && !password.is_empty()
        {
            self.email.password = Some(password);
        }
        if let Ok(secret) = std::env::var(GOOGLE_CLIENT_SECRET_ENV)
            && !secret.is_empty()
        {
            self.google.client_secret = Some(secret);
        }
        self.normalized()
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| admin == &email)
    }
}
