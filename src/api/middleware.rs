//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The `RetCode` taxonomy and the `ApiError` JSON envelope
//! - Session loading and the authenticated-user extractors
//! - Body and query extractors that reject with `ApiError`

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Request, State,
    },
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::PaginationConfig;
use crate::models::{Session, User};
use crate::services::{NewsService, UserService, VerificationService};
use crate::templates::TemplateEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub news_service: Arc<NewsService>,
    pub verification: Arc<VerificationService>,
    pub templates: Arc<TemplateEngine>,
    pub pagination: Arc<PaginationConfig>,
    /// `Max-Age` of the session cookie, in seconds
    pub session_max_age: u64,
}

// ============================================================================
// Error envelope
// ============================================================================

/// Flat response code carried as the `errno` string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCode {
    Ok,
    DbErr,
    NoData,
    DataExist,
    DataErr,
    SessionErr,
    LoginErr,
    ParamErr,
    UserErr,
    RoleErr,
    PwdErr,
    ReqErr,
    IpErr,
    ThirdErr,
    IoErr,
    ServerErr,
    UnknownErr,
}

impl RetCode {
    pub fn errno(self) -> &'static str {
        match self {
            RetCode::Ok => "0",
            RetCode::DbErr => "4001",
            RetCode::NoData => "4002",
            RetCode::DataExist => "4003",
            RetCode::DataErr => "4004",
            RetCode::SessionErr => "4101",
            RetCode::LoginErr => "4102",
            RetCode::ParamErr => "4103",
            RetCode::UserErr => "4104",
            RetCode::RoleErr => "4105",
            RetCode::PwdErr => "4106",
            RetCode::ReqErr => "4201",
            RetCode::IpErr => "4202",
            RetCode::ThirdErr => "4301",
            RetCode::IoErr => "4302",
            RetCode::ServerErr => "4500",
            RetCode::UnknownErr => "4501",
        }
    }
}

/// Error response: `{"errno": "...", "errmsg": "..."}`
///
/// Always sent with HTTP 200; clients branch on `errno`.
#[derive(Debug)]
pub struct ApiError {
    pub code: RetCode,
    pub errmsg: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errno: &'static str,
    errmsg: &'a str,
}

impl ApiError {
    pub fn new(code: RetCode, errmsg: impl Into<String>) -> Self {
        Self {
            code,
            errmsg: errmsg.into(),
        }
    }

    pub fn param(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::ParamErr, errmsg)
    }

    pub fn db(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::DbErr, errmsg)
    }

    pub fn no_data(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::NoData, errmsg)
    }

    pub fn data(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::DataErr, errmsg)
    }

    pub fn data_exist(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::DataExist, errmsg)
    }

    pub fn session(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::SessionErr, errmsg)
    }

    pub fn pwd(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::PwdErr, errmsg)
    }

    pub fn third(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::ThirdErr, errmsg)
    }

    pub fn server(errmsg: impl Into<String>) -> Self {
        Self::new(RetCode::ServerErr, errmsg)
    }

    pub fn errno(&self) -> &'static str {
        self.code.errno()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errno: self.code.errno(),
            errmsg: &self.errmsg,
        };
        Json(body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected JSON body: {}", rejection.body_text());
        ApiError::param("参数错误")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!("Rejected query string: {}", rejection.body_text());
        ApiError::param("参数错误")
    }
}

/// `Json` that rejects with a ParamErr envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// `Query` that rejects with a ParamErr envelope
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

// ============================================================================
// Sessions
// ============================================================================

/// Logged-in user and the session that authenticated the request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: Session,
}

/// Current user if the request carries a live session
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

/// Extract session token from request: `Authorization: Bearer` first, then
/// the `session` cookie
pub(crate) fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Resolve the session token, if any, and attach the user to the request.
///
/// Lookup failures are logged and the request continues anonymously.
pub async fn load_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if let Some(token) = extract_session_token(&request) {
        match state.user_service.resolve_session(&token).await {
            Ok(Some((user, session))) => {
                request
                    .extensions_mut()
                    .insert(AuthenticatedUser { user, session });
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::session("用户未登录"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

/// `Set-Cookie` value starting a session
pub fn session_cookie(session_id: &str, max_age: u64) -> String {
    format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session_id, max_age
    )
}

/// `Set-Cookie` value clearing the session
pub const CLEAR_SESSION_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";
