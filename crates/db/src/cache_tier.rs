//! PostgreSQL-backed shared cache tier.
//!
//! Entries live in a `cache_entries` table shared by every worker process:
//!
//! | Column       | Type        | Notes                 |
//! |--------------|-------------|-----------------------|
//! | `key`        | TEXT        | primary key           |
//! | `value`      | JSONB       |                       |
//! | `expires_at` | TIMESTAMPTZ | nullable = never      |
//! | `created_at` | TIMESTAMPTZ | defaults to `NOW()`   |
//!
//! Expired rows are invisible to reads and removed by [`PgCacheTier::purge_expired`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use vigil_cache::{CacheError, RemoteCache, RemoteEntry, WildcardPattern};
use vigil_core::types::Timestamp;

#[derive(Debug, Clone)]
pub struct PgCacheTier {
    pool: PgPool,
}

impl PgCacheTier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose TTL has passed. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        let result = sqlx::query(
            "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await
        .map_err(remote_error)?;
        Ok(result.rows_affected())
    }
}

fn remote_error(e: sqlx::Error) -> CacheError {
    CacheError::remote(e.to_string())
}

fn expires_at(ttl: Option<Duration>) -> Option<Timestamp> {
    let ttl = chrono::Duration::from_std(ttl?).ok()?;
    Utc::now().checked_add_signed(ttl)
}

/// Translate a wildcard pattern into a `LIKE` pattern (escape `\`).
///
/// `%`, `_` and `\` in the pattern are matched literally; `*` becomes `%`.
pub fn like_pattern(pattern: &WildcardPattern) -> String {
    let mut out = String::with_capacity(pattern.as_str().len() + 8);
    for c in pattern.as_str().chars() {
        match c {
            '*' => out.push('%'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl RemoteCache for PgCacheTier {
    async fn get(&self, key: &str) -> Result<Option<RemoteEntry>, CacheError> {
        let row = sqlx::query_as::<_, (serde_json::Value, Option<Timestamp>)>(
            "SELECT value, expires_at FROM cache_entries \
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(remote_error)?;
        Ok(row.map(|(value, expires_at)| RemoteEntry::new(value, expires_at)))
    }

    async fn set(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE \
             SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at, created_at = NOW()",
        )
        .bind(key)
        .bind(Json(value))
        .bind(expires_at(ttl))
        .execute(&self.pool)
        .await
        .map_err(remote_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(remote_error)?;
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &WildcardPattern) -> Result<u64, CacheError> {
        let result = if pattern.is_exact() {
            sqlx::query("DELETE FROM cache_entries WHERE key = $1")
                .bind(pattern.as_str())
                .execute(&self.pool)
                .await
        } else {
            sqlx::query("DELETE FROM cache_entries WHERE key LIKE $1 ESCAPE '\\'")
                .bind(like_pattern(pattern))
                .execute(&self.pool)
                .await
        }
        .map_err(remote_error)?;
        Ok(result.rows_affected())
    }
}
