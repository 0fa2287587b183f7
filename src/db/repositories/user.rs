//! User repository
//!
//! Users plus the follow relation (`user_fans`) between them.

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::{Gender, PageRequest, Paginated, UpdateProfileInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str = "id, nick_name, password_hash, mobile, avatar_url, signature, gender, last_login, create_time, update_time";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_mobile(&self, mobile: &str) -> Result<Option<User>>;

    /// Update nickname, signature and gender, and mirror the nickname onto
    /// the user's sessions, in one transaction
    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<()>;

    /// Store the object-storage key of a new avatar
    async fn update_avatar(&self, id: i64, avatar_key: &str) -> Result<()>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn touch_last_login(&self, id: i64) -> Result<()>;

    /// Number of users following `id`
    async fn followers_count(&self, id: i64) -> Result<i64>;

    /// Number of news items authored by `id`
    async fn news_count(&self, id: i64) -> Result<i64>;

    /// Users followed by `follower_id`, most recently followed first
    async fn list_followed(&self, follower_id: i64, page: PageRequest) -> Result<Paginated<User>>;

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Add a follow edge; following twice is a no-op
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<()>;

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(sqlite(&self.pool)?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(mysql(&self.pool)?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_mobile(&self, mobile: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE mobile = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(mobile)
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get user by mobile")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(mobile)
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .context("Failed to get user by mobile")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_profile_sqlite(sqlite(&self.pool)?, id, input).await,
            DatabaseDriver::Mysql => update_profile_mysql(mysql(&self.pool)?, id, input).await,
        }
    }

    async fn update_avatar(&self, id: i64, avatar_key: &str) -> Result<()> {
        let sql = "UPDATE users SET avatar_url = ?, update_time = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(avatar_key)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update avatar")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(avatar_key)
                    .bind(now)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update avatar")?;
            }
        }
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let sql = "UPDATE users SET password_hash = ?, update_time = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update password")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(password_hash)
                    .bind(now)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update password")?;
            }
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: i64) -> Result<()> {
        let sql = "UPDATE users SET last_login = ? WHERE id = ?";
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to update last login")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to update last login")?;
            }
        }
        Ok(())
    }

    async fn followers_count(&self, id: i64) -> Result<i64> {
        self.count("SELECT COUNT(*) AS count FROM user_fans WHERE followed_id = ?", id)
            .await
            .context("Failed to count followers")
    }

    async fn news_count(&self, id: i64) -> Result<i64> {
        self.count("SELECT COUNT(*) AS count FROM news WHERE user_id = ?", id)
            .await
            .context("Failed to count news")
    }

    async fn list_followed(&self, follower_id: i64, page: PageRequest) -> Result<Paginated<User>> {
        let total = self
            .count("SELECT COUNT(*) AS count FROM user_fans WHERE follower_id = ?", follower_id)
            .await
            .context("Failed to count followed users")?;
        let page = page.clamp(total);

        let sql = format!(
            r#"
            SELECT {}
            FROM users u
            INNER JOIN user_fans f ON f.followed_id = u.id
            WHERE f.follower_id = ?
            ORDER BY f.create_time DESC, u.id DESC
            LIMIT ? OFFSET ?
            "#,
            prefixed_user_columns("u")
        );

        let users = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(follower_id)
                    .bind(page.per_page)
                    .bind(page.offset())
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to list followed users")?;
                rows.iter().map(row_to_user_sqlite).collect::<Result<Vec<_>>>()?
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(follower_id)
                    .bind(page.per_page)
                    .bind(page.offset())
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to list followed users")?;
                rows.iter().map(row_to_user_mysql).collect::<Result<Vec<_>>>()?
            }
        };

        Ok(Paginated::new(users, total, page))
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM user_fans WHERE follower_id = ? AND followed_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to check follow relation")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to check follow relation")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO user_fans (follower_id, followed_id, create_time) VALUES (?, ?, ?)",
                )
                .bind(follower_id)
                .bind(followed_id)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to follow user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO user_fans (follower_id, followed_id, create_time) VALUES (?, ?, ?)",
                )
                .bind(follower_id)
                .bind(followed_id)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to follow user")?;
            }
        }
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<()> {
        let sql = "DELETE FROM user_fans WHERE follower_id = ? AND followed_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(follower_id)
                    .bind(followed_id)
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to unfollow user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(follower_id)
                    .bind(followed_id)
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to unfollow user")?;
            }
        }
        Ok(())
    }
}

impl SqlxUserRepository {
    /// Run a `SELECT COUNT(*) AS count ... WHERE x = ?` query
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
}

fn prefixed_user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", alias, column))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (nick_name, password_hash, mobile, avatar_url, signature, gender, last_login, create_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.nick_name)
    .bind(&user.password_hash)
    .bind(&user.mobile)
    .bind(&user.avatar_url)
    .bind(&user.signature)
    .bind(user.gender.to_string())
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        last_login: now,
        create_time: now,
        update_time: now,
        ..user.clone()
    })
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, input: &UpdateProfileInput) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("UPDATE users SET nick_name = ?, signature = ?, gender = ?, update_time = ? WHERE id = ?")
        .bind(&input.nick_name)
        .bind(&input.signature)
        .bind(input.gender.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update profile")?;

    sqlx::query("UPDATE sessions SET nick_name = ? WHERE user_id = ?")
        .bind(&input.nick_name)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update session nickname")?;

    tx.commit().await.context("Failed to commit profile update")?;
    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let gender_str: String = row.get("gender");
    let gender = Gender::from_str(&gender_str)
        .with_context(|| format!("Invalid gender in database: {}", gender_str))?;

    Ok(User {
        id: row.get("id"),
        nick_name: row.get("nick_name"),
        password_hash: row.get("password_hash"),
        mobile: row.get("mobile"),
        avatar_url: row.get("avatar_url"),
        signature: row.get("signature"),
        gender,
        last_login: row.get("last_login"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (nick_name, password_hash, mobile, avatar_url, signature, gender, last_login, create_time, update_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.nick_name)
    .bind(&user.password_hash)
    .bind(&user.mobile)
    .bind(&user.avatar_url)
    .bind(&user.signature)
    .bind(user.gender.to_string())
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        last_login: now,
        create_time: now,
        update_time: now,
        ..user.clone()
    })
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, input: &UpdateProfileInput) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("UPDATE users SET nick_name = ?, signature = ?, gender = ?, update_time = ? WHERE id = ?")
        .bind(&input.nick_name)
        .bind(&input.signature)
        .bind(input.gender.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update profile")?;

    sqlx::query("UPDATE sessions SET nick_name = ? WHERE user_id = ?")
        .bind(&input.nick_name)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update session nickname")?;

    tx.commit().await.context("Failed to commit profile update")?;
    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let gender_str: String = row.get("gender");
    let gender = Gender::from_str(&gender_str)
        .with_context(|| format!("Invalid gender in database: {}", gender_str))?;

    Ok(User {
        id: row.get("id"),
        nick_name: row.get("nick_name"),
        password_hash: row.get("password_hash"),
        mobile: row.get("mobile"),
        avatar_url: row.get("avatar_url"),
        signature: row.get("signature"),
        gender,
        last_login: row.get("last_login"),
        create_time: row.get("create_time"),
        update_time: row.get("update_time"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SessionRepository, SqlxSessionRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::Session;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(repo: &SqlxUserRepository, mobile: &str) -> User {
        repo.create(&User::new(mobile.to_string(), "hash".to_string()))
            .await
            .expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = create_test_user(&repo, "13800001111").await;
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().expect("User not found");
        assert_eq!(by_id.mobile, "13800001111");
        assert_eq!(by_id.nick_name, "13800001111");
        assert_eq!(by_id.gender, Gender::Man);

        let by_mobile = repo.get_by_mobile("13800001111").await.unwrap().expect("User not found");
        assert_eq!(by_mobile.id, created.id);

        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_mobile("13900000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_mobile_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        create_test_user(&repo, "13800001111").await;

        let result = repo
            .create(&User::new("13800001111".to_string(), "hash".to_string()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_profile_mirrors_session_nickname() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_test_user(&repo, "13800001111").await;

        let sessions = SqlxSessionRepository::new(pool.clone());
        let session = Session::start(
            user.id,
            &user.nick_name,
            &user.mobile,
            chrono::Duration::hours(1),
        )
        .unwrap();
        sessions.create(&session).await.unwrap();

        let input = UpdateProfileInput {
            nick_name: "reader".to_string(),
            signature: "hello".to_string(),
            gender: Gender::Woman,
        };
        repo.update_profile(user.id, &input).await.unwrap();

        let updated = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(updated.nick_name, "reader");
        assert_eq!(updated.signature.as_deref(), Some("hello"));
        assert_eq!(updated.gender, Gender::Woman);

        let stored = sessions.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.nick_name, "reader");
    }

    #[tokio::test]
    async fn test_update_profile_duplicate_nickname_rolls_back() {
        let (_pool, repo) = setup_test_repo().await;
        let first = create_test_user(&repo, "13800001111").await;
        let second = create_test_user(&repo, "13800002222").await;

        let input = UpdateProfileInput {
            nick_name: first.nick_name.clone(),
            signature: "changed".to_string(),
            gender: Gender::Woman,
        };
        assert!(repo.update_profile(second.id, &input).await.is_err());

        let unchanged = repo.get_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(unchanged.nick_name, "13800002222");
        assert_eq!(unchanged.gender, Gender::Man);
    }

    #[tokio::test]
    async fn test_update_avatar_and_password() {
        let (_pool, repo) = setup_test_repo().await;
        let user = create_test_user(&repo, "13800001111").await;

        repo.update_avatar(user.id, "FkKey").await.unwrap();
        repo.update_password(user.id, "new-hash").await.unwrap();
        repo.touch_last_login(user.id).await.unwrap();

        let updated = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(updated.avatar_url.as_deref(), Some("FkKey"));
        assert_eq!(updated.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_follow_relation() {
        let (_pool, repo) = setup_test_repo().await;
        let a = create_test_user(&repo, "13800001111").await;
        let b = create_test_user(&repo, "13800002222").await;

        assert!(!repo.is_following(a.id, b.id).await.unwrap());

        repo.follow(a.id, b.id).await.unwrap();
        repo.follow(a.id, b.id).await.unwrap();

        assert!(repo.is_following(a.id, b.id).await.unwrap());
        assert!(!repo.is_following(b.id, a.id).await.unwrap());
        assert_eq!(repo.followers_count(b.id).await.unwrap(), 1);
        assert_eq!(repo.followers_count(a.id).await.unwrap(), 0);

        repo.unfollow(a.id, b.id).await.unwrap();
        assert!(!repo.is_following(a.id, b.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_followed_paginates_newest_first() {
        let (_pool, repo) = setup_test_repo().await;
        let me = create_test_user(&repo, "13800000000").await;

        let mut followed = Vec::new();
        for i in 1..=5 {
            let other = create_test_user(&repo, &format!("1380000000{}", i)).await;
            repo.follow(me.id, other.id).await.unwrap();
            followed.push(other.id);
        }

        let first = repo.list_followed(me.id, PageRequest::new(1, 4)).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages(), 2);
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.items[0].id, followed[4]);

        let second = repo.list_followed(me.id, PageRequest::new(2, 4)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id, followed[0]);

        // Out-of-range pages are clamped to the last page
        let clamped = repo.list_followed(me.id, PageRequest::new(9, 4)).await.unwrap();
        assert_eq!(clamped.page, 2);
    }

    #[tokio::test]
    async fn test_list_followed_empty() {
        let (_pool, repo) = setup_test_repo().await;
        let me = create_test_user(&repo, "13800000000").await;

        let page = repo.list_followed(me.id, PageRequest::new(1, 4)).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages(), 1);
    }
}
