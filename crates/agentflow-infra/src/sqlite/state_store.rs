//! SQLite TTL key-value store for execution coordination.
//!
//! Expiry is stored as unix epoch milliseconds and checked on every read, so
//! an expired row behaves as absent even before it is swept. Writes go
//! through the single writer connection; `set_if_absent` clears an expired
//! row and inserts inside one transaction so two processes sharing the file
//! cannot both win the same key.

use std::time::Duration;

use agentflow_core::coordination::{CoordinationError, ExecutionStateStore};
use chrono::Utc;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionStateStore`.
pub struct SqliteStateStore {
    pool: DatabasePool,
}

impl SqliteStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Delete every expired row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, CoordinationError> {
        let result = sqlx::query("DELETE FROM execution_state WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;
        if result.rows_affected() > 0 {
            tracing::debug!(removed = result.rows_affected(), "purged expired coordination keys");
        }
        Ok(result.rows_affected())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn store_error(e: sqlx::Error) -> CoordinationError {
    CoordinationError::Store(e.to_string())
}

impl ExecutionStateStore for SqliteStateStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        let mut tx = self.pool.writer.begin().await.map_err(store_error)?;

        sqlx::query("DELETE FROM execution_state WHERE key = ? AND expires_at <= ?")
            .bind(key)
            .bind(now_millis())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let result = sqlx::query(
            "INSERT INTO execution_state (key, value, expires_at) VALUES (?, ?, ?) ON CONFLICT(key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        sqlx::query("DELETE FROM execution_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError> {
        let row = sqlx::query(
            r#"INSERT INTO execution_state (key, value, expires_at) VALUES (?, '1', ?)
               ON CONFLICT(key) DO UPDATE SET
                 value = CASE
                   WHEN execution_state.expires_at <= ? THEN '1'
                   ELSE CAST(CAST(execution_state.value AS INTEGER) + 1 AS TEXT)
                 END,
                 expires_at = excluded.expires_at
               RETURNING value"#,
        )
        .bind(key)
        .bind(expiry(ttl))
        .bind(now_millis())
        .fetch_one(&self.pool.writer)
        .await
        .map_err(store_error)?;

        let value: String = row.try_get("value").map_err(store_error)?;
        value
            .parse::<i64>()
            .map_err(|e| CoordinationError::Store(format!("counter '{key}' is not an integer: {e}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError> {
        sqlx::query(
            r#"INSERT INTO execution_state (key, value, expires_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&self.pool.writer)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let row = sqlx::query("SELECT value FROM execution_state WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(store_error)?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(store_error)
    }
}
