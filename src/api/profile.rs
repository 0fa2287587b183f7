//! Profile endpoints, mounted under `/user`
//!
//! Pages render `news/*.html` templates with a single `data` object.
//! Form submissions answer with the JSON envelope. Every route except
//! `/user/info` requires a session.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::{parse_id, parse_page, present, MultipartForm, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, JsonBody, MaybeUser, QueryParams};
use crate::api::responses::{ok, ok_with, AvatarData, JsonEnvelope, NewsListData};
use crate::models::{Gender, PageRequest, UpdateProfileInput, User, UserDict};
use crate::services::{NewsServiceError, PublishNewsInput, UserServiceError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BaseInfoRequest {
    pub nick_name: Option<String>,
    pub signature: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PassInfoRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtherInfoQuery {
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtherNewsQuery {
    pub user_id: Option<String>,
    pub p: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/info", get(user_info))
        .route("/base_info", get(base_info_page).post(save_base_info))
        .route("/pic_info", get(pic_info_page).post(save_avatar))
        .route("/news_release", get(news_release_page).post(publish_news))
        .route("/pass_info", get(pass_info_page).post(save_password))
        .route("/collection", get(collection))
        .route("/news_list", get(news_list))
        .route("/user_follow", get(user_follow))
        .route("/other_info", get(other_info))
        .route("/other_news_list", get(other_news_list))
}

fn render(state: &AppState, template: &str, data: Value) -> Result<Html<String>, ApiError> {
    let mut context = tera::Context::new();
    context.insert("data", &data);

    state.templates.render(template, &context).map(Html).map_err(|e| {
        tracing::error!("{:#}", e);
        ApiError::server("页面渲染失败")
    })
}

async fn user_dict(state: &AppState, user: &User) -> Result<UserDict, ApiError> {
    state.user_service.user_dict(user).await.map_err(|e| {
        tracing::error!("Failed to load profile of user {}: {}", user.id, e);
        ApiError::db("查询数据错误")
    })
}

fn news_page(state: &AppState, page: i64) -> PageRequest {
    PageRequest::new(page, state.pagination.news_per_page)
}

// ============================================================================
// Profile pages
// ============================================================================

/// GET /user/info
async fn user_info(State(state): State<AppState>, MaybeUser(current): MaybeUser) -> Result<Response, ApiError> {
    let Some(current) = current else {
        return Ok(Redirect::to("/").into_response());
    };

    let user = user_dict(&state, &current.user).await?;
    let page = render(&state, "news/user.html", json!({ "user": user }))?;
    Ok(page.into_response())
}

/// GET /user/base_info
async fn base_info_page(State(state): State<AppState>, current: AuthenticatedUser) -> Result<Html<String>, ApiError> {
    let user = user_dict(&state, &current.user).await?;
    render(&state, "news/user_base_info.html", json!({ "user": user }))
}

/// POST /user/base_info
async fn save_base_info(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    JsonBody(body): JsonBody<BaseInfoRequest>,
) -> Result<JsonEnvelope, ApiError> {
    let (Some(nick_name), Some(signature), Some(gender)) = (
        present(body.nick_name),
        present(body.signature),
        present(body.gender),
    ) else {
        return Err(ApiError::param("参数错误"));
    };

    let gender: Gender = gender.parse().map_err(|_| ApiError::param("参数格式错误"))?;

    state
        .user_service
        .update_profile(
            current.user.id,
            &UpdateProfileInput {
                nick_name,
                signature,
                gender,
            },
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to save profile of user {}: {}", current.user.id, e);
            ApiError::db("保存数据失败")
        })?;

    Ok(ok())
}

/// GET /user/pic_info
async fn pic_info_page(State(state): State<AppState>, current: AuthenticatedUser) -> Result<Html<String>, ApiError> {
    let user = user_dict(&state, &current.user).await?;
    render(&state, "news/user_pic_info.html", json!({ "user": user }))
}

/// POST /user/pic_info
async fn save_avatar(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonEnvelope<AvatarData>, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::param("参数错误"))?;
    let mut form = MultipartForm::read(multipart).await.map_err(|e| {
        tracing::error!("Failed to read avatar upload: {}", e);
        ApiError::param("参数类型错误")
    })?;

    let avatar = form.take_file("avatar").ok_or_else(|| ApiError::param("参数错误"))?;

    let avatar_url = state
        .user_service
        .update_avatar(current.user.id, avatar)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update avatar of user {}: {}", current.user.id, e);
            match e {
                UserServiceError::UploadFailed(_) => ApiError::third("上传图片异常"),
                _ => ApiError::db("保存数据失败"),
            }
        })?;

    Ok(ok_with(AvatarData { avatar_url }))
}

/// GET /user/pass_info
async fn pass_info_page(State(state): State<AppState>, _current: AuthenticatedUser) -> Result<Html<String>, ApiError> {
    render(&state, "news/user_pass_info.html", json!({}))
}

/// POST /user/pass_info
async fn save_password(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    JsonBody(body): JsonBody<PassInfoRequest>,
) -> Result<JsonEnvelope, ApiError> {
    let (Some(old_password), Some(new_password)) = (present(body.old_password), present(body.new_password))
    else {
        return Err(ApiError::param("参数缺失"));
    };

    state
        .user_service
        .change_password(&current.user, &old_password, &new_password)
        .await
        .map_err(|e| match e {
            UserServiceError::WrongPassword => ApiError::pwd("旧密码错误"),
            other => {
                tracing::error!("Failed to change password of user {}: {}", current.user.id, other);
                ApiError::db("保存数据失败")
            }
        })?;

    Ok(ok())
}

// ============================================================================
// Publishing
// ============================================================================

/// GET /user/news_release
async fn news_release_page(State(state): State<AppState>, _current: AuthenticatedUser) -> Result<Html<String>, ApiError> {
    let categories = state
        .news_service
        .release_categories()
        .await
        .map_err(|e| match e {
            NewsServiceError::NoCategories => ApiError::no_data("无新闻分类数据"),
            other => {
                tracing::error!("Failed to load categories: {}", other);
                ApiError::db("查询新闻分类数据失败")
            }
        })?;

    render(&state, "news/user_news_release.html", json!({ "categories": categories }))
}

/// POST /user/news_release
async fn publish_news(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonEnvelope, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::param("参数缺失"))?;
    let mut form = MultipartForm::read(multipart).await.map_err(|e| {
        tracing::error!("Failed to read news submission: {}", e);
        ApiError::param("读取图片数据失败")
    })?;

    let index_image = form.take_file("index_image");
    let (Some(title), Some(digest), Some(category_id), Some(content), Some(index_image)) = (
        form.text("title"),
        form.text("digest"),
        form.text("category_id"),
        form.text("content"),
        index_image,
    ) else {
        return Err(ApiError::param("参数缺失"));
    };

    let category_id: i64 = category_id
        .parse()
        .map_err(|_| ApiError::param("参数类型错误"))?;

    let input = PublishNewsInput {
        title: title.to_string(),
        digest: digest.to_string(),
        content: content.to_string(),
        category_id,
        index_image,
    };

    state
        .news_service
        .publish(current.user.id, input)
        .await
        .map_err(|e| {
            tracing::error!("Failed to publish news for user {}: {}", current.user.id, e);
            match e {
                NewsServiceError::UploadFailed(_) => ApiError::third("上传图片异常"),
                _ => ApiError::db("保存数据失败"),
            }
        })?;

    Ok(ok())
}

// ============================================================================
// Listings
// ============================================================================

/// GET /user/collection?p=
async fn collection(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Html<String>, ApiError> {
    let page = parse_page(query.p.as_deref())?;

    let collections = state
        .news_service
        .collections(current.user.id, news_page(&state, page))
        .await
        .map_err(|e| {
            tracing::error!("Failed to list collections of user {}: {}", current.user.id, e);
            ApiError::db("查询数据错误")
        })?;

    render(
        &state,
        "news/user_collection.html",
        json!({
            "collections": collections.items,
            "total_page": collections.total_pages(),
            "current_page": collections.page,
        }),
    )
}

/// GET /user/news_list?p=
async fn news_list(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Html<String>, ApiError> {
    let page = parse_page(query.p.as_deref())?;

    let news = state
        .news_service
        .authored(current.user.id, news_page(&state, page))
        .await
        .map_err(|e| {
            tracing::error!("Failed to list news of user {}: {}", current.user.id, e);
            ApiError::db("查询数据错误")
        })?;

    render(
        &state,
        "news/user_news_list.html",
        json!({
            "news_list": news.items,
            "total_page": news.total_pages(),
            "current_page": news.page,
        }),
    )
}

/// GET /user/user_follow?p=
async fn user_follow(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> Result<Html<String>, ApiError> {
    let page = parse_page(query.p.as_deref())?;

    let users = state
        .user_service
        .followed_users(
            current.user.id,
            PageRequest::new(page, state.pagination.followed_per_page),
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to list followed users of {}: {}", current.user.id, e);
            ApiError::db("查询数据错误")
        })?;

    render(
        &state,
        "news/user_follow.html",
        json!({
            "users": users.items,
            "total_page": users.total_pages(),
            "current_page": users.page,
        }),
    )
}

/// GET /user/other_info?id=
async fn other_info(
    State(state): State<AppState>,
    current: AuthenticatedUser,
    QueryParams(query): QueryParams<OtherInfoQuery>,
) -> Result<Html<String>, ApiError> {
    let other_id = parse_id(query.id.as_deref(), "参数错误")?;

    let profile = state
        .user_service
        .other_profile(Some(current.user.id), other_id)
        .await
        .map_err(|e| match e {
            UserServiceError::NotFound => ApiError::no_data("无数据"),
            other => {
                tracing::error!("Failed to load user {}: {}", other_id, other);
                ApiError::db("查询数据错误")
            }
        })?;
    let user = user_dict(&state, &current.user).await?;

    render(
        &state,
        "news/other.html",
        json!({
            "is_followed": profile.is_followed,
            "user": user,
            "other_info": profile.user,
        }),
    )
}

/// GET /user/other_news_list?user_id=&p=
async fn other_news_list(
    State(state): State<AppState>,
    _current: AuthenticatedUser,
    QueryParams(query): QueryParams<OtherNewsQuery>,
) -> Result<JsonEnvelope<NewsListData>, ApiError> {
    let user_id = parse_id(query.user_id.as_deref(), "参数错误")?;
    let page = parse_page(query.p.as_deref())?;

    let news = state
        .news_service
        .user_news(user_id, news_page(&state, page))
        .await
        .map_err(|e| match e {
            NewsServiceError::UserNotFound => ApiError::no_data("用户不存在"),
            other => {
                tracing::error!("Failed to list news of user {}: {}", user_id, other);
                ApiError::db("查询数据错误")
            }
        })?;

    Ok(ok_with(NewsListData::from(news)))
}
