//! Report persistence and the shared cache tier.
//!
//! [`ReportStore`] is the contract the pipeline mutates reports through.
//! [`PgReportStore`] implements it on PostgreSQL; [`MemoryReportStore`]
//! keeps everything in process for tests and single-node runs.
//! [`PgCacheTier`] is the PostgreSQL-backed [`vigil_cache::RemoteCache`].

use sqlx::postgres::PgPoolOptions;

pub mod cache_tier;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod store;

pub use cache_tier::PgCacheTier;
pub use error::StoreError;
pub use memory::MemoryReportStore;
pub use repositories::report_repo::PgReportStore;
pub use store::{CompletedReport, ReportStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
