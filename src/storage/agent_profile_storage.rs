//! Persistence for the `agents` table.

use crate::database::DatabaseConnection;
use crate::domain::routing::EmbeddingVector;
use crate::domain::AgentProfile;
use crate::domain_types::{AgentId, AgentStatus, TenantId, Token};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;

mod sql {
    pub(super) fn upsert() -> &'static str {
        "INSERT INTO agents
            (tenant_id, agent_id, profile_embedding, capabilities, recent_demand, status,
             avg_success, last_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(tenant_id, agent_id) DO UPDATE SET
            profile_embedding = excluded.profile_embedding,
            capabilities = excluded.capabilities,
            recent_demand = excluded.recent_demand,
            status = excluded.status,
            avg_success = excluded.avg_success,
            last_active = excluded.last_active"
    }

    pub(super) fn select_active_for_tenant() -> &'static str {
        "SELECT tenant_id, agent_id, profile_embedding, capabilities, recent_demand, status,
                avg_success, last_active
         FROM agents WHERE tenant_id = ? AND status = 'active'"
    }

    pub(super) fn select_one() -> &'static str {
        "SELECT tenant_id, agent_id, profile_embedding, capabilities, recent_demand, status,
                avg_success, last_active
         FROM agents WHERE tenant_id = ? AND agent_id = ?"
    }

    pub(super) fn count_active_for_tenant() -> &'static str {
        "SELECT COUNT(*) AS n FROM agents WHERE tenant_id = ? AND status = 'active'"
    }
}

mod mapping {
    use super::{AgentProfile, CoreResult, EmbeddingVector};
    use crate::domain_types::{AgentId, AgentStatus, TenantId, Token};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_profile(row: &SqliteRow) -> CoreResult<AgentProfile> {
        let tenant_id: String = row.get("tenant_id");
        let agent_id: String = row.get("agent_id");
        let embedding_bytes: Vec<u8> = row.get("profile_embedding");
        let capabilities_json: String = row.get("capabilities");
        let recent_demand_json: String = row.get("recent_demand");
        let status: String = row.get("status");
        let avg_success: f64 = row.get("avg_success");
        let last_active: i64 = row.get("last_active");

        let capabilities: Vec<String> = serde_json::from_str(&capabilities_json)
            .map_err(|e| CoreError::Internal(e.into()))?;
        let recent_demand: Vec<String> = serde_json::from_str(&recent_demand_json)
            .map_err(|e| CoreError::Internal(e.into()))?;

        Ok(AgentProfile {
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            agent_id: AgentId::try_new(agent_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            profile_embedding: EmbeddingVector::from_bytes(&embedding_bytes)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            capabilities: capabilities
                .into_iter()
                .map(|t| Token::try_new(t).map_err(|e| CoreError::InvalidArgument(e.to_string())))
                .collect::<CoreResult<Vec<_>>>()?,
            recent_demand: recent_demand
                .into_iter()
                .map(|t| Token::try_new(t).map_err(|e| CoreError::InvalidArgument(e.to_string())))
                .collect::<CoreResult<Vec<_>>>()?,
            status: AgentStatus::parse(&status)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            avg_success,
            last_active: super::from_unix(last_active),
        })
    }
}

/// Shell wrapping agent-profile CRUD against SQLite.
pub struct AgentProfileStorage {
    connection: DatabaseConnection,
}

impl AgentProfileStorage {
    /// Creates a new agent-profile storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts a profile, or updates it in place if `(tenant_id, agent_id)`
    /// already exists.
    pub async fn upsert(&self, profile: &AgentProfile) -> CoreResult<()> {
        let capabilities_json = serde_json::to_string(&profile.capabilities)
            .map_err(|e| crate::error::CoreError::Internal(e.into()))?;
        let recent_demand_json = serde_json::to_string(&profile.recent_demand)
            .map_err(|e| crate::error::CoreError::Internal(e.into()))?;

        sqlx::query(sql::upsert())
            .bind(profile.tenant_id.to_string())
            .bind(profile.agent_id.to_string())
            .bind(profile.profile_embedding.to_bytes())
            .bind(capabilities_json)
            .bind(recent_demand_json)
            .bind(profile.status.as_str())
            .bind(profile.avg_success)
            .bind(to_unix(profile.last_active))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Fetches a single agent profile.
    pub async fn get(&self, tenant_id: &TenantId, agent_id: &AgentId) -> CoreResult<AgentProfile> {
        let row = sqlx::query(sql::select_one())
            .bind(tenant_id.to_string())
            .bind(agent_id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        mapping::row_to_profile(&row)
    }

    /// Lists every active agent profile for a tenant; these are the
    /// candidates a broadcast is routed against.
    pub async fn list_active(&self, tenant_id: &TenantId) -> CoreResult<Vec<AgentProfile>> {
        let rows = sqlx::query(sql::select_active_for_tenant())
            .bind(tenant_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_profile).collect()
    }

    /// Counts active agents for a tenant, used to size the adaptive
    /// candidate bound `K`.
    pub async fn count_active(&self, tenant_id: &TenantId) -> CoreResult<u64> {
        let row = sqlx::query(sql::count_active_for_tenant())
            .bind(tenant_id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        let n: i64 = row.get("n");
        Ok(n.max(0) as u64)
    }
}
