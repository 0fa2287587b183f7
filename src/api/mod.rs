//! API layer - HTTP handlers and routing
//!
//! - Passport endpoints (verification codes, register, login, logout)
//! - Profile pages and forms under `/user`
//! - Collect and follow relations under `/news`
//! - Locally stored uploads under `/uploads`

pub mod common;
pub mod middleware;
pub mod news;
pub mod passport;
pub mod profile;
pub mod responses;


use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::config::{ServerConfig, StorageConfig, StorageDriver};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser, RetCode};

/// Build the application routes
pub fn build_app_router() -> Router<AppState> {
    Router::new()
        .merge(passport::router())
        .nest("/user", profile::router())
        .nest("/news", news::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, server: &ServerConfig, storage: &StorageConfig) -> anyhow::Result<Router> {
    // CORS configuration - cookie sessions need credentials
    let origin = server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", server.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let mut router = build_app_router();
    if storage.driver == StorageDriver::Local {
        router = router.nest_service("/uploads", ServeDir::new(&storage.path));
    }

    let body_limit = usize::try_from(storage.max_file_size).unwrap_or(usize::MAX);

    Ok(router
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_session,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
