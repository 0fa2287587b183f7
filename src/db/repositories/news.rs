//! News repository
//!
//! News rows plus the collection relation (`user_collection`).

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{
    CreateNewsInput, News, NewsStatus, PageRequest, Paginated, USER_SUBMITTED_SOURCE,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const NEWS_COLUMNS: &[&str] = &[
    "id",
    "title",
    "source",
    "digest",
    "content",
    "clicks",
    "index_image_url",
    "category_id",
    "user_id",
    "status",
    "reason",
    "create_time",
    "update_time",
];

fn news_columns(alias: &str) -> String {
    NEWS_COLUMNS
        .iter()
        .map(|column| format!("{}.{}", alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// News repository trait
#[async_trait]
pub trait NewsRepository: Send + Sync {
    /// Insert a user submission in the reviewing state
    async fn create(&self, input: &CreateNewsInput) -> Result<News>;

    async fn get_by_id(&self, id: i64) -> Result<Option<News>>;

    /// News authored by `user_id`, newest first
    async fn list_by_user(&self, user_id: i64, page: PageRequest) -> Result<Paginated<News>>;

    /// News collected by `user_id`, most recently collected first
    async fn list_collected(&self, user_id: i64, page: PageRequest) -> Result<Paginated<News>>;

    /// Add to the user's collection; collecting twice is a no-op
    async fn collect(&self, user_id: i64, news_id: i64) -> Result<()>;

    async fn cancel_collect(&self, user_id: i64, news_id: i64) -> Result<()>;
}

pub struct SqlxNewsRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsRepository> {
        Arc::new(Self::new(pool))
    }

    async fn count(&self, sql: &str, id: i64) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_one(sqlite(&self.pool)?)
                .await?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_one(mysql(&self.pool)?)
                .await?
                .get("count"),
        };
        Ok(count)
    }

    /// Fetch one page of news with a query taking `(id, limit, offset)`
    async fn fetch_page(&self, sql: &str, id: i64, page: PageRequest) -> Result<Vec<News>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .bind(page.per_page)
                .bind(page.offset())
                .fetch_all(sqlite(&self.pool)?)
                .await?
                .iter()
                .map(row_to_news_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .bind(page.per_page)
                .bind(page.offset())
                .fetch_all(mysql(&self.pool)?)
                .await?
                .iter()
                .map(row_to_news_mysql)
                .collect(),
        }
    }
}

#[async_trait]
impl NewsRepository for SqlxNewsRepository {
    async fn create(&self, input: &CreateNewsInput) -> Result<News> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_news_sqlite(sqlite(&self.pool)?, input).await,
            DatabaseDriver::Mysql => create_news_mysql(mysql(&self.pool)?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<News>> {
        let sql = format!("SELECT {} FROM news n WHERE n.id = ?", news_columns("n"));
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get news by ID")?;
                row.as_ref().map(row_to_news_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get news by ID")?;
                row.as_ref().map(row_to_news_mysql).transpose()
            }
        }
    }

    async fn list_by_user(&self, user_id: i64, page: PageRequest) -> Result<Paginated<News>> {
        let total = self
            .count("SELECT COUNT(*) AS count FROM news WHERE user_id = ?", user_id)
            .await
            .context("Failed to count user news")?;
        let page = page.clamp(total);

        let sql = format!(
            r#"
            SELECT {}
            FROM news n
            WHERE n.user_id = ?
            ORDER BY n.create_time DESC, n.id DESC
            LIMIT ? OFFSET ?
            "#,
            news_columns("n")
        );
        let items = self
            .fetch_page(&sql, user_id, page)
            .await
            .context("Failed to list user news")?;

        Ok(Paginated::new(items, total, page))
    }

    async fn list_collected(&self, user_id: i64, page: PageRequest) -> Result<Paginated<News>> {
        let total = self
            .count("SELECT COUNT(*) AS count FROM user_collection WHERE user_id = ?", user_id)
            .await
            .context("Failed to count collected news")?;
        let page = page.clamp(total);

        let sql = format!(
            r#"
            SELECT {}
            FROM news n
            INNER JOIN user_collection c ON c.news_id = n.id
            WHERE c.user_id = ?
            ORDER BY c.create_time DESC, n.id DESC
            LIMIT ? OFFSET ?
            "#,
            news_columns("n")
        );
        let items = self
            .fetch_page(&sql, user_id, page)
            .await
            .context("Failed to list collected news")?;

        Ok(Paginated::new(items, total, page))
    }

    async fn collect(&self, user_id: i64, news_id: i64) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO user_collection (user_id, news_id, create_time) VALUES (?, ?, ?)",
                )
                .bind(user_id)
                .bind(news_id)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to collect news")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO user_collection (user_id, news_id, create_time) VALUES (?, ?, ?)",
                )
                .bind(user_id)
                .bind(news_id)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to collect news")?;
            }
        }
        Ok(())
    }

    async fn cancel_collect(&self, user_id: i64, news_id: i64) -> Result<()> {
        let sql = "DELETE FROM user_collection WHERE user_id = ? AND news_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(news_id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to cancel collection")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(news_id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to cancel collection")?;
            }
        }
        Ok(())
    }
}

fn submitted_news(id: i64, input: &CreateNewsInput, now: chrono::DateTime<Utc>) -> News {
    News {
        id,
        title: input.title.clone(),
        source: USER_SUBMITTED_SOURCE.to_string(),
        digest: input.digest.clone(),
        content: input.content.clone(),
        clicks: 0,
        index_image_url: Some(input.index_image_url.clone()),
        category_id: input.category_id,
        user_id: Some(input.user_id),
        status: NewsStatus::Reviewing,
        reason: None,
        create_time: now,
        update_time: now,
    }
}

const INSERT_NEWS: &str = r#"
    INSERT INTO news (title, source, digest, content, clicks, index_image_url, category_id, user_id, status, create_time, update_time)
    VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_news_sqlite(pool: &SqlitePool, input: &CreateNewsInput) -> Result<News> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(INSERT_NEWS)
        .bind(&input.title)
        .bind(USER_SUBMITTED_SOURCE)
        .bind(&input.digest)
        .bind(&input.content)
        .bind(&input.index_image_url)
        .bind(input.category_id)
        .bind(input.user_id)
        .bind(NewsStatus::Reviewing.code())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create news")?;

    tx.commit().await.context("Failed to commit news")?;
    Ok(submitted_news(result.last_insert_rowid(), input, now))
}

fn row_to_news_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<News> {
    Ok(News {
        id: row.get("id"),
        title: row.get("title"),
        source: row.get("source"),
        digest: row.get("digest"),
        content: row.get("content"),
        clicks: row.get("clicks"),
        index_image_url: row.get("index_image_url"),
        category_id: row.get("category_id"),
        user_id: row.get("user_id"),
        status: NewsStatus::from_code(row.get("status"))?,
        reason: row.get("reason"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_news_mysql(pool: &MySqlPool, input: &CreateNewsInput) -> Result<News> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(INSERT_NEWS)
        .bind(&input.title)
        .bind(USER_SUBMITTED_SOURCE)
        .bind(&input.digest)
        .bind(&input.content)
        .bind(&input.index_image_url)
        .bind(input.category_id)
        .bind(input.user_id)
        .bind(NewsStatus::Reviewing.code())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create news")?;

    tx.commit().await.context("Failed to commit news")?;
    Ok(submitted_news(result.last_insert_id() as i64, input, now))
}

fn row_to_news_mysql(row: &sqlx::mysql::MySqlRow) -> Result<News> {
    Ok(News {
        id: row.get("id"),
        title: row.get("title"),
        source: row.get("source"),
        digest: row.get("digest"),
        content: row.get("content"),
        clicks: row.get("clicks"),
        index_image_url: row.get("index_image_url"),
        category_id: row.get("category_id"),
        user_id: row.get("user_id"),
        status: NewsStatus::from_code(row.get("status"))?,
        reason: row.get("reason"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    })
}
