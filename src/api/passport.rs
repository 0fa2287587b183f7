//! Passport endpoints
//!
//! - GET /image_code - Image challenge for the SMS form
//! - POST /sms_code - Check the challenge and text a code
//! - POST /register - Create an account with a verified mobile
//! - POST /login - Mobile and password login
//! - POST /logout - End the current session

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::api::common::present;
use crate::api::middleware::{
    session_cookie, ApiError, AppState, JsonBody, MaybeUser, QueryParams, CLEAR_SESSION_COOKIE,
};
use crate::api::responses::{ok, ok_msg};
use crate::services::{is_valid_mobile, UserServiceError, VerificationError};

#[derive(Debug, Default, Deserialize)]
pub struct ImageCodeQuery {
    pub image_code_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SmsCodeRequest {
    pub mobile: Option<String>,
    pub image_code: Option<String>,
    pub image_code_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub mobile: Option<String>,
    pub sms_code: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub mobile: Option<String>,
    pub password: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/image_code", get(image_code))
        .route("/sms_code", post(send_sms_code))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// GET /image_code?image_code_id=
async fn image_code(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ImageCodeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let image_code_id = present(query.image_code_id).ok_or_else(|| ApiError::param("参数缺失"))?;

    let image = state
        .verification
        .issue_image_code(&image_code_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to issue image code {}: {}", image_code_id, e);
            match e {
                VerificationError::CacheWrite(_) => ApiError::db("保存数据失败"),
                _ => ApiError::server("生成图片验证码失败"),
            }
        })?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image))
}

/// POST /sms_code
async fn send_sms_code(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SmsCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(mobile), Some(image_code), Some(image_code_id)) = (
        present(body.mobile),
        present(body.image_code),
        present(body.image_code_id),
    ) else {
        return Err(ApiError::param("参数错误"));
    };

    state
        .verification
        .send_sms_code(&mobile, &image_code, &image_code_id)
        .await
        .map_err(|e| match e {
            VerificationError::InvalidMobile => ApiError::param("手机号格式错误"),
            VerificationError::Expired => ApiError::no_data("数据已过期"),
            VerificationError::ImageCodeMismatch => ApiError::data("图片验证码错误"),
            VerificationError::CacheRead(e) => {
                tracing::error!("Failed to read image code {}: {:#}", image_code_id, e);
                ApiError::db("获取数据失败")
            }
            VerificationError::CacheWrite(e) => {
                tracing::error!("Failed to store SMS code for {}: {:#}", mobile, e);
                ApiError::db("保存短信验证码失败")
            }
            VerificationError::Gateway(e) => {
                tracing::error!("SMS gateway error for {}: {:#}", mobile, e);
                ApiError::third("发送短信异常")
            }
            VerificationError::Rejected(result) => {
                tracing::error!("SMS gateway rejected message to {}: {}", mobile, result);
                ApiError::third("发送失败")
            }
            other => {
                tracing::error!("Unexpected verification error: {}", other);
                ApiError::server("发送失败")
            }
        })?;

    Ok(ok_msg("发送成功"))
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(mobile), Some(sms_code), Some(password)) = (
        present(body.mobile),
        present(body.sms_code),
        present(body.password),
    ) else {
        return Err(ApiError::param("参数缺失"));
    };

    if !is_valid_mobile(&mobile) {
        return Err(ApiError::param("手机号格式错误"));
    }

    state
        .verification
        .consume_sms_code(&mobile, &sms_code)
        .await
        .map_err(|e| match e {
            VerificationError::Expired => ApiError::no_data("短信验证码已过期"),
            VerificationError::SmsCodeMismatch => ApiError::data("短信验证码错误"),
            other => {
                tracing::error!("Failed to read SMS code for {}: {}", mobile, other);
                ApiError::db("获取数据失败")
            }
        })?;

    let (_user, session) = state
        .user_service
        .register(&mobile, &password)
        .await
        .map_err(|e| match e {
            UserServiceError::UserExists(_) => ApiError::data_exist("手机号已注册"),
            other => {
                tracing::error!("Failed to register {}: {}", mobile, other);
                ApiError::db("保存用户数据失败")
            }
        })?;

    let cookie = session_cookie(&session.id, state.session_max_age);
    Ok(([(header::SET_COOKIE, cookie)], ok()))
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(mobile), Some(password)) = (present(body.mobile), present(body.password)) else {
        return Err(ApiError::param("参数缺失"));
    };

    if !is_valid_mobile(&mobile) {
        return Err(ApiError::param("手机号格式错误"));
    }

    let (_user, session) = state
        .user_service
        .login(&mobile, &password)
        .await
        .map_err(|e| match e {
            UserServiceError::InvalidCredentials => ApiError::pwd("用户名或密码错误"),
            other => {
                tracing::error!("Login failed for {}: {}", mobile, other);
                ApiError::db("查询用户数据失败")
            }
        })?;

    let cookie = session_cookie(&session.id, state.session_max_age);
    Ok(([(header::SET_COOKIE, cookie)], ok()))
}

/// POST /logout
async fn logout(
    State(state): State<AppState>,
    MaybeUser(current): MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(current) = current {
        state
            .user_service
            .logout(&current.session.id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to delete session for user {}: {}", current.user.id, e);
                ApiError::db("退出登录失败")
            })?;
    }

    Ok(([(header::SET_COOKIE, CLEAR_SESSION_COOKIE)], ok()))
}
