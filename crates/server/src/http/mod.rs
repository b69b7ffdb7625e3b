use axum::{
    Router,
    http::{Method, header},
    middleware::from_fn_with_state,
    routing::get,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{AppState, routes};

pub mod identity;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::workspaces::router(&state))
        .merge(routes::attachments::router(&state))
        .merge(routes::notifications::router())
        .merge(routes::admin::router())
        .merge(routes::email::router())
        .layer(from_fn_with_state(
            state.clone(),
            identity::resolve_identity,
        ));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::auth::oauth_router())
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(utils::assets::uploads_dir()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
