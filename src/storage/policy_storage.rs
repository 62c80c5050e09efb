//! Persistence for the `policies` table.

use crate::database::DatabaseConnection;
use crate::domain::policy::{Policy, Rule};
use crate::domain_types::{PolicyKind, TenantId};
use crate::error::CoreResult;
use sqlx::Row;

mod sql {
    pub(super) fn upsert() -> &'static str {
        "INSERT INTO policies (tenant_id, id, kind, rules, priority, enabled)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(tenant_id, id) DO UPDATE SET
            kind = excluded.kind,
            rules = excluded.rules,
            priority = excluded.priority,
            enabled = excluded.enabled"
    }

    pub(super) fn select_for_tenant() -> &'static str {
        "SELECT tenant_id, id, kind, rules, priority, enabled
         FROM policies WHERE tenant_id = ?
         ORDER BY priority DESC"
    }
}

mod mapping {
    use super::{CoreResult, Policy};
    use crate::domain_types::{PolicyKind, TenantId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_policy(row: &SqliteRow) -> CoreResult<Policy> {
        let tenant_id: String = row.get("tenant_id");
        let id: String = row.get("id");
        let kind: String = row.get("kind");
        let rules_json: String = row.get("rules");
        let priority: i64 = row.get("priority");
        let enabled: bool = row.get("enabled");

        let rules = serde_json::from_str(&rules_json).map_err(|e| CoreError::Internal(e.into()))?;

        Ok(Policy {
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            id,
            kind: PolicyKind::parse(&kind).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            rules,
            priority,
            enabled,
        })
    }
}

/// Shell wrapping tenant policy CRUD against SQLite.
pub struct PolicyStorage {
    connection: DatabaseConnection,
}

impl PolicyStorage {
    /// Creates a new policy storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts a policy, or replaces it in place if `(tenant_id, id)`
    /// already exists.
    pub async fn upsert(&self, policy: &Policy) -> CoreResult<()> {
        let rules_json: Vec<&Rule> = policy.rules.iter().collect();
        let rules_json =
            serde_json::to_string(&rules_json).map_err(|e| crate::error::CoreError::Internal(e.into()))?;

        sqlx::query(sql::upsert())
            .bind(policy.tenant_id.to_string())
            .bind(&policy.id)
            .bind(policy.kind.as_str())
            .bind(rules_json)
            .bind(policy.priority)
            .bind(policy.enabled)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Lists every policy configured for a tenant, in descending priority.
    /// Callers filter by `enabled` during evaluation, not retrieval, so a
    /// disabled policy can be re-enabled without losing its rule set.
    pub async fn list_for_tenant(&self, tenant_id: &TenantId) -> CoreResult<Vec<Policy>> {
        let rows = sqlx::query(sql::select_for_tenant())
            .bind(tenant_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_policy).collect()
    }
}
