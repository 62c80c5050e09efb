//! Persistence for the `quota_counters` table.
//!
//! This is the durable backstop behind `cache.rs`'s in-process sliding
//! window: the in-memory limiter absorbs the request-rate hot path, while
//! this table lets a counter survive a process restart mid-window.

use crate::database::DatabaseConnection;
use crate::domain_types::TenantId;
use crate::error::CoreResult;
use crate::storage::to_unix;
use sqlx::Row;

mod sql {
    pub(super) fn increment_and_get() -> &'static str {
        "INSERT INTO quota_counters (tenant_id, key, window_start, count)
         VALUES (?, ?, ?, 1)
         ON CONFLICT(tenant_id, key, window_start) DO UPDATE SET count = count + 1
         RETURNING count"
    }

    pub(super) fn count_for_window() -> &'static str {
        "SELECT count FROM quota_counters WHERE tenant_id = ? AND key = ? AND window_start = ?"
    }
}

/// Shell wrapping durable rate-limit counters against SQLite.
pub struct QuotaStorage {
    connection: DatabaseConnection,
}

impl QuotaStorage {
    /// Creates a new quota storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Increments the counter for `(tenant_id, key, window_start)` and
    /// returns the new count.
    pub async fn increment_and_get(
        &self,
        tenant_id: &TenantId,
        key: &str,
        window_start: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<u64> {
        let row = sqlx::query(sql::increment_and_get())
            .bind(tenant_id.to_string())
            .bind(key)
            .bind(to_unix(window_start))
            .fetch_one(self.connection.pool())
            .await?;
        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    /// Reads the current count for a window without incrementing it.
    pub async fn count_for_window(
        &self,
        tenant_id: &TenantId,
        key: &str,
        window_start: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<u64> {
        let row = sqlx::query(sql::count_for_window())
            .bind(tenant_id.to_string())
            .bind(key)
            .bind(to_unix(window_start))
            .fetch_optional(self.connection.pool())
            .await?;
        Ok(row.map_or(0, |r| {
            let count: i64 = r.get("count");
            count.max(0) as u64
        }))
    }
}
