use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::config::GoogleOAuthConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Error)]
pub enum GoogleAuthError {
    #[error("Google OAuth is not configured")]
    NotConfigured,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("No email found in Google profile")]
    MissingEmail,
}

/// Identity document returned by the userinfo endpoint, reduced to what
/// account linking needs.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Thin OAuth redirect-flow client. The handshake itself is a black box to
/// the rest of the system; all it produces is a verified (google_id,
/// email, name) triple.
#[derive(Clone)]
pub struct GoogleOAuth {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn authorize_url(&self, redirect_uri: &str) -> Result<Url, GoogleAuthError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(GoogleAuthError::NotConfigured)?;
        let mut url = Url::parse(AUTH_URL)?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid profile email");
        Ok(url)
    }

    /// Trades the callback code for an access token, then fetches the
    /// profile. A profile without an email is unusable for account linking.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GoogleProfile, GoogleAuthError> {
        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(GoogleAuthError::NotConfigured);
        };

        let token: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let profile: GoogleProfile = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match &profile.email {
            Some(email) if !email.trim().is_empty() => Ok(profile),
            _ => Err(GoogleAuthError::MissingEmail),
        }
    }
}
