//! Persistence layer for the ratex platform.
//!
//! Models mirror table rows, repositories are zero-sized structs with
//! async methods over `&PgPool`, and services orchestrate the
//! multi-table operations: study snapshots, item uploads, questionnaire
//! generation, participation, and archiving. All domain logic lives in
//! `ratex-core`; this crate only loads, calls, and persists.

pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

use sqlx::postgres::PgPoolOptions;

pub use error::DbError;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Create a pool from `DATABASE_URL`, loading `.env` first.
pub async fn create_pool_from_env() -> Result<DbPool, DbError> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| DbError::Config("DATABASE_URL is not set".into()))?;
    Ok(create_pool(&database_url).await?)
}

/// Cheap liveness probe.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
