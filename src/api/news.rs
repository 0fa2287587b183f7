//! Relation endpoints, mounted under `/news`
//!
//! - POST /news/news_collect - Collect or un-collect a news item
//! - POST /news/followed_user - Follow or unfollow another user

use axum::{extract::State, routing::post, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{json_id, present};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, JsonBody};
use crate::api::responses::{ok, JsonEnvelope};
use crate::services::{CollectAction, FollowAction, NewsServiceError, UserServiceError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CollectRequest {
    pub news_id: Option<Value>,
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FollowRequest {
    pub user_id: Option<Value>,
    pub action: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/news_collect", post(news_collect))
        .route("/followed_user", post(followed_user))
}

/// POST /news/news_collect
async fn news_collect(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    JsonBody(body): JsonBody<CollectRequest>,
) -> Result<JsonEnvelope, ApiError> {
    let action = present(body.action).ok_or_else(|| ApiError::param("参数缺失"))?;
    let news_id = json_id(body.news_id.as_ref(), "参数缺失")?;
    let action: CollectAction = action.parse().map_err(|_| ApiError::param("参数错误"))?;

    state
        .news_service
        .set_collect(current.user.id, news_id, action)
        .await
        .map_err(|e| match e {
            NewsServiceError::NewsNotFound => ApiError::no_data("未查询到新闻数据"),
            other => {
                tracing::error!("Failed to update collection of user {}: {}", current.user.id, other);
                ApiError::db("保存数据失败")
            }
        })?;

    Ok(ok())
}

/// POST /news/followed_user
async fn followed_user(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    JsonBody(body): JsonBody<FollowRequest>,
) -> Result<JsonEnvelope, ApiError> {
    let action = present(body.action).ok_or_else(|| ApiError::param("参数缺失"))?;
    let user_id = json_id(body.user_id.as_ref(), "参数缺失")?;
    let action: FollowAction = action.parse().map_err(|_| ApiError::param("参数错误"))?;

    state
        .user_service
        .set_follow(current.user.id, user_id, action)
        .await
        .map_err(|e| match e {
            UserServiceError::NotFound => ApiError::no_data("未查询到用户数据"),
            UserServiceError::SelfFollow => ApiError::param("不能关注自己"),
            other => {
                tracing::error!("Failed to update follow of user {}: {}", current.user.id, other);
                ApiError::db("保存数据失败")
            }
        })?;

    Ok(ok())
}
