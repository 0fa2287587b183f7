//! Database layer
//!
//! SQLite (default, single-file deployment) or MySQL, selected by
//! configuration. Repositories work against [`DynDatabasePool`] and branch on
//! the driver for backend-specific SQL.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let users = SqlxUserRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

use anyhow::{Context, Result};
use sqlx::{MySqlPool, SqlitePool};

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Borrow the SQLite pool behind a driver-checked handle
pub(crate) fn sqlite(pool: &DynDatabasePool) -> Result<&SqlitePool> {
    pool.as_sqlite()
        .context("Database pool is not backed by SQLite")
}

/// Borrow the MySQL pool behind a driver-checked handle
pub(crate) fn mysql(pool: &DynDatabasePool) -> Result<&MySqlPool> {
    pool.as_mysql()
        .context("Database pool is not backed by MySQL")
}
