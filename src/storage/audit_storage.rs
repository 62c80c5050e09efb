//! Persistence for the `audit_events` table.

use crate::database::DatabaseConnection;
use crate::domain::AuditEvent;
use crate::domain_types::{AuditEventId, TenantId};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;

mod sql {
    pub(super) fn insert() -> &'static str {
        "INSERT INTO audit_events (id, tenant_id, operation, payload, signature, created_at)
         VALUES (?, ?, ?, ?, ?, ?)"
    }

    pub(super) fn select_recent_for_tenant() -> &'static str {
        "SELECT id, tenant_id, operation, payload, signature, created_at
         FROM audit_events WHERE tenant_id = ?
         ORDER BY created_at DESC
         LIMIT ?"
    }
}

mod mapping {
    use super::{AuditEvent, CoreResult};
    use crate::domain_types::{AuditEventId, TenantId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_event(row: &SqliteRow) -> CoreResult<AuditEvent> {
        let id: String = row.get("id");
        let tenant_id: String = row.get("tenant_id");
        let operation: String = row.get("operation");
        let payload: String = row.get("payload");
        let signature: Vec<u8> = row.get("signature");
        let created_at: i64 = row.get("created_at");

        Ok(AuditEvent {
            id: AuditEventId::new(
                uuid::Uuid::parse_str(&id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            operation,
            payload,
            signature,
            created_at: super::from_unix(created_at),
        })
    }
}

/// Shell wrapping append-only audit persistence against SQLite. There is no
/// update or delete path: audit events are immutable once written.
pub struct AuditStorage {
    connection: DatabaseConnection,
}

impl AuditStorage {
    /// Creates a new audit storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Appends a signed audit event.
    pub async fn append(&self, event: &AuditEvent) -> CoreResult<()> {
        sqlx::query(sql::insert())
            .bind(event.id.to_string())
            .bind(event.tenant_id.to_string())
            .bind(&event.operation)
            .bind(&event.payload)
            .bind(&event.signature)
            .bind(to_unix(event.created_at))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Lists a tenant's most recent audit events, newest first.
    pub async fn recent(&self, tenant_id: &TenantId, limit: u32) -> CoreResult<Vec<AuditEvent>> {
        let rows = sqlx::query(sql::select_recent_for_tenant())
            .bind(tenant_id.to_string())
            .bind(i64::from(limit))
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_event).collect()
    }
}
