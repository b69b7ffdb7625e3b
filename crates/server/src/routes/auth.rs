use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{AppendHeaders, IntoResponse, Json as ResponseJson, Redirect, Response},
    routing::{get, post},
};
use db::models::{
    activity::{ActivityType, NewActivity},
    user::{CreateUser, User, UserRole},
};
use serde::{Deserialize, Serialize};
use services::services::auth::ensure_admin_role;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::identity::{
        Identity, RequestContext, clear_session_cookie, request_context, session_cookie,
        session_token_from_headers,
    },
};

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

/// Session-facing view of a user; what the frontend routes on.
#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl SessionUser {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

pub async fn signup(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<SignupRequest>,
) -> Result<ResponseJson<ApiResponse<SessionUser>>, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let role = {
        let config = state.config().read().await;
        if config.is_admin_email(&payload.email) {
            UserRole::Admin
        } else {
            UserRole::User
        }
    };

    let user = User::create(
        &state.db().pool,
        &CreateUser {
            name: payload.name,
            email: payload.email,
            password: Some(payload.password),
            google_id: None,
            role,
        },
    )
    .await?;

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::Signup,
            actor: user.email.clone(),
            description: format!("New user registered: {}", user.name),
            metadata: serde_json::json!({
                "role": user.role,
                "signupMethod": "email_password",
            }),
        },
        context.to_activity_context(),
    );

    Ok(ResponseJson(ApiResponse::success(SessionUser::from_user(
        &user,
    ))))
}

pub async fn signin(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<SigninRequest>,
) -> Result<Response, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let pool = &state.db().pool;
    let Some(user) = User::verify_credentials(pool, &payload.email, &payload.password).await?
    else {
        tracing::debug!(email = %payload.email.to_lowercase(), "invalid sign-in attempt");
        return Err(ApiError::Unauthorized);
    };

    let config = state.config().read().await.clone();
    let user = ensure_admin_role(pool, &config, user).await?;

    let token = state.sessions().create(&user.email).await;

    state.activity().record(
        NewActivity {
            activity_type: ActivityType::Login,
            actor: user.email.clone(),
            description: "User logged in successfully".to_string(),
            metadata: serde_json::json!({
                "role": user.role,
                "loginMethod": "email_password",
            }),
        },
        context.to_activity_context(),
    );

    Ok((
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        ResponseJson(ApiResponse::success(SessionUser::from_user(&user))),
    )
        .into_response())
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token_from_headers(&headers) {
        state.sessions().remove(&token).await;
    }
    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie())]),
        ResponseJson(ApiResponse::success(())),
    )
        .into_response())
}

/// Session-derived identity probe. The `?email=` fallback deliberately
/// does not count here: only a live session cookie authenticates.
pub async fn current_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<ResponseJson<ApiResponse<SessionUser>>, ApiError> {
    let email = identity.session_email.as_deref().ok_or(ApiError::Unauthorized)?;
    let user = User::find_by_email(&state.db().pool, email)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(ResponseJson(ApiResponse::success(SessionUser::from_user(
        &user,
    ))))
}

fn server_base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost:8080");
    format!("{proto}://{host}")
}

fn callback_uri(headers: &HeaderMap) -> String {
    format!("{}/auth/google/callback", server_base_url(headers))
}

pub async fn google_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Redirect, ApiError> {
    let url = state.google().authorize_url(&callback_uri(&headers))?;
    Ok(Redirect::to(url.as_str()))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Finishes the redirect flow: exchange the code, find-or-create the user
/// (linking the external identity to a same-email account when one
/// exists), apply allow-list promotion, set the session and route by role.
/// Failures redirect back to the frontend with an error tag instead of
/// surfacing an API error, since the caller here is a browser mid-flow.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response {
    let frontend_url = state.config().read().await.frontend_url.clone();

    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        tracing::warn!(error = ?query.error, "OAuth callback without a code");
        return Redirect::to(&format!("{frontend_url}/?error=oauth_failed")).into_response();
    };

    match complete_google_sign_in(&state, &code, &callback_uri(&headers)).await {
        Ok(user) => {
            let token = state.sessions().create(&user.email).await;
            state.activity().record(
                NewActivity {
                    activity_type: ActivityType::Login,
                    actor: user.email.clone(),
                    description: "User logged in successfully".to_string(),
                    metadata: serde_json::json!({
                        "role": user.role,
                        "loginMethod": "google",
                    }),
                },
                request_context(&headers, None).to_activity_context(),
            );

            let destination = if user.is_admin() {
                format!("{frontend_url}/admin")
            } else {
                format!("{frontend_url}/dashboard")
            };
            (
                AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
                Redirect::to(&destination),
            )
                .into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "OAuth callback failed");
            Redirect::to(&format!("{frontend_url}/?error=server_error")).into_response()
        }
    }
}

async fn complete_google_sign_in(
    state: &AppState,
    code: &str,
    redirect_uri: &str,
) -> Result<User, ApiError> {
    let profile = state.google().exchange_code(code, redirect_uri).await?;
    let email = profile
        .email
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    let display_name = profile.name.clone().unwrap_or_else(|| email.clone());
    let pool = &state.db().pool;

    let user = match User::find_by_google_id(pool, &profile.id).await? {
        Some(user) => user,
        None => match User::find_by_email(pool, &email).await? {
            Some(existing) => {
                User::link_google(pool, existing.id, &profile.id, &display_name).await?;
                User::find_by_email(pool, &email)
                    .await?
                    .ok_or_else(|| ApiError::Internal("User vanished during link".to_string()))?
            }
            None => {
                let role = {
                    let config = state.config().read().await;
                    if config.is_admin_email(&email) {
                        UserRole::Admin
                    } else {
                        UserRole::User
                    }
                };
                let user = User::create(
                    pool,
                    &CreateUser {
                        name: display_name,
                        email: email.clone(),
                        password: None,
                        google_id: Some(profile.id.clone()),
                        role,
                    },
                )
                .await?;
                state.activity().record(
                    NewActivity {
                        activity_type: ActivityType::Signup,
                        actor: user.email.clone(),
                        description: format!("New user registered: {}", user.name),
                        metadata: serde_json::json!({
                            "role": user.role,
                            "signupMethod": "google",
                        }),
                    },
                    Default::default(),
                );
                user
            }
        },
    };

    let config = state.config().read().await.clone();
    Ok(ensure_admin_role(pool, &config, user).await?)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/logout", post(logout))
        .route("/current_user", get(current_user))
}

/// OAuth redirect endpoints live outside `/api`: they are browser
/// navigation targets, not JSON calls.
pub fn oauth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_auth))
        .route("/auth/google/callback", get(google_callback))
}
