//! Category repository

use crate::config::DatabaseDriver;
use crate::db::{mysql, sqlite, DynDatabasePool};
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Category repository trait (read-only)
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// All categories ordered by id, the "latest" pseudo-category first
    async fn list(&self) -> Result<Vec<Category>>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>> {
        let sql = "SELECT id, name FROM categories ORDER BY id";
        let categories = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(|row| Category {
                    id: row.get("id"),
                    name: row.get("name"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(|row| Category {
                    id: row.get("id"),
                    name: row.get("name"),
                })
                .collect(),
        };
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_list_seeded_categories() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxCategoryRepository::new(pool);

        let categories = repo.list().await.expect("Failed to list categories");

        assert_eq!(categories.len(), 6);
        assert_eq!(categories[0], Category { id: 1, name: "最新".to_string() });
        assert!(categories.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_list_empty_table() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute("DELETE FROM categories").await.unwrap();

        let categories = SqlxCategoryRepository::new(pool).list().await.unwrap();
        assert!(categories.is_empty());
    }
}
