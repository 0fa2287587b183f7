//! News service
//!
//! User submissions, the author and collection listings, and the collect
//! relation.

use crate::db::repositories::{CategoryRepository, NewsRepository, UserRepository};
use crate::models::{
    Category, CreateNewsInput, NewsBasicDict, NewsReviewDict, PageRequest, Paginated,
};
use crate::services::storage::ObjectStorage;
use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum NewsServiceError {
    #[error("No news categories")]
    NoCategories,

    #[error("News not found")]
    NewsNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// `action` field of the collect endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectAction {
    Collect,
    CancelCollect,
}

impl FromStr for CollectAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collect" => Ok(CollectAction::Collect),
            "cancel_collect" => Ok(CollectAction::CancelCollect),
            _ => Err(anyhow::anyhow!("Invalid collect action: {}", s)),
        }
    }
}

/// A submission as received from the release form
#[derive(Debug, Clone)]
pub struct PublishNewsInput {
    pub title: String,
    pub digest: String,
    pub content: String,
    pub category_id: i64,
    /// Raw cover image bytes
    pub index_image: Vec<u8>,
}

pub struct NewsService {
    news_repo: Arc<dyn NewsRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    user_repo: Arc<dyn UserRepository>,
    storage: Arc<dyn ObjectStorage>,
    domain_prefix: String,
}

impl NewsService {
    pub fn new(
        news_repo: Arc<dyn NewsRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        user_repo: Arc<dyn UserRepository>,
        storage: Arc<dyn ObjectStorage>,
        domain_prefix: impl Into<String>,
    ) -> Self {
        Self {
            news_repo,
            category_repo,
            user_repo,
            storage,
            domain_prefix: domain_prefix.into(),
        }
    }

    /// Categories a user may publish into: everything but the leading
    /// "latest" pseudo-category
    pub async fn release_categories(&self) -> Result<Vec<Category>, NewsServiceError> {
        let categories = self
            .category_repo
            .list()
            .await
            .context("Failed to list categories")?;

        if categories.is_empty() {
            return Err(NewsServiceError::NoCategories);
        }

        Ok(categories.into_iter().skip(1).collect())
    }

    /// Upload the cover and store the submission for review.
    /// Returns the new news id.
    pub async fn publish(&self, user_id: i64, input: PublishNewsInput) -> Result<i64, NewsServiceError> {
        let key = self
            .storage
            .upload(input.index_image)
            .await
            .map_err(NewsServiceError::UploadFailed)?;

        let news = self
            .news_repo
            .create(&CreateNewsInput {
                title: input.title,
                digest: input.digest,
                content: input.content,
                category_id: input.category_id,
                user_id,
                index_image_url: format!("{}{}", self.domain_prefix, key),
            })
            .await
            .context("Failed to save news")?;

        tracing::info!("User {} submitted news {} for review", user_id, news.id);
        Ok(news.id)
    }

    pub async fn collections(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Paginated<NewsBasicDict>, NewsServiceError> {
        let news = self
            .news_repo
            .list_collected(user_id, page)
            .await
            .context("Failed to list collections")?;
        Ok(news.map(|n| n.to_basic_dict()))
    }

    /// The caller's own submissions with their review state
    pub async fn authored(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Paginated<NewsReviewDict>, NewsServiceError> {
        let news = self
            .news_repo
            .list_by_user(user_id, page)
            .await
            .context("Failed to list user news")?;
        Ok(news.map(|n| n.to_review_dict()))
    }

    /// Another user's submissions
    pub async fn user_news(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Paginated<NewsBasicDict>, NewsServiceError> {
        if self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .is_none()
        {
            return Err(NewsServiceError::UserNotFound);
        }

        let news = self
            .news_repo
            .list_by_user(user_id, page)
            .await
            .context("Failed to list user news")?;
        Ok(news.map(|n| n.to_basic_dict()))
    }

    /// Collect or un-collect a news item; repeating an action is a no-op
    pub async fn set_collect(
        &self,
        user_id: i64,
        news_id: i64,
        action: CollectAction,
    ) -> Result<(), NewsServiceError> {
        if self
            .news_repo
            .get_by_id(news_id)
            .await
            .context("Failed to get news")?
            .is_none()
        {
            return Err(NewsServiceError::NewsNotFound);
        }

        let result = match action {
            CollectAction::Collect => self.news_repo.collect(user_id, news_id).await,
            CollectAction::CancelCollect => self.news_repo.cancel_collect(user_id, news_id).await,
        };
        result.context("Failed to update collection")?;

        Ok(())
    }
}
