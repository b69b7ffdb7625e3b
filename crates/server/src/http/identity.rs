use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use db::models::activity::ActivityContext;
use services::services::auth::{Caller, resolve_caller};
use url::form_urlencoded;

use crate::{AppState, error::ApiError};

pub const SESSION_COOKIE: &str = "strive_session";

/// Identity resolved once per request: the session-derived email (when the
/// cookie maps to a live session) and the effective caller, which prefers
/// the session and falls back to a supplied `?email=` parameter.
#[derive(Clone)]
pub struct Identity {
    pub session_email: Option<String>,
    pub caller: Option<Caller>,
}

impl Identity {
    /// `None` caller means unauthenticated; privileged handlers reject it.
    pub fn require(&self) -> Result<&Caller, ApiError> {
        self.caller.as_ref().ok_or(ApiError::Unauthorized)
    }

    pub fn actor(&self) -> String {
        self.caller
            .as_ref()
            .map(|caller| caller.email.clone())
            .unwrap_or_else(|| "system".to_string())
    }
}

#[derive(Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn to_activity_context(&self) -> ActivityContext {
        ActivityContext {
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=')
            && name == SESSION_COOKIE
            && !value.is_empty()
        {
            return Some(value.to_string());
        }
    }
    None
}

fn email_query_param(req: &Request) -> Option<String> {
    let query = req.uri().query()?;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key == "email" {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            return Some(trimmed.to_string());
        }
    }
    None
}

pub fn request_context(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> RequestContext {
    RequestContext {
        ip: connect_info.map(|info| info.0.ip().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string()),
    }
}

/// Installed on the `/api` router. Resolution failures are logged and
/// demote the request to anonymous rather than failing it: identity here
/// is advisory until a policy check needs it.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session_email = match session_token_from_headers(req.headers()) {
        Some(token) => state.sessions().email_for(&token).await,
        None => None,
    };
    let fallback_email = email_query_param(&req);

    let caller = match resolve_caller(
        &state.db().pool,
        session_email.as_deref(),
        fallback_email.as_deref(),
    )
    .await
    {
        Ok(caller) => caller,
        Err(err) => {
            tracing::warn!(error = %err, "identity resolution failed");
            None
        }
    };

    let context = request_context(
        req.headers(),
        req.extensions().get::<ConnectInfo<SocketAddr>>(),
    );
    req.extensions_mut().insert(Identity {
        session_email,
        caller,
    });
    req.extensions_mut().insert(context);

    next.run(req).await
}

pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400")
}

pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}
