//! Persistence for the `hyphae_edges` table.

use crate::database::DatabaseConnection;
use crate::domain::Edge;
use crate::domain_types::{AgentId, EdgeWeight, TenantId};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;

mod sql {
    pub(super) fn upsert() -> &'static str {
        "INSERT INTO hyphae_edges (tenant_id, src_agent, dst_agent, weight, last_update)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(tenant_id, src_agent, dst_agent) DO UPDATE SET
            weight = excluded.weight,
            last_update = excluded.last_update"
    }

    pub(super) fn select_outgoing() -> &'static str {
        "SELECT tenant_id, src_agent, dst_agent, weight, last_update
         FROM hyphae_edges WHERE tenant_id = ? AND src_agent = ?
         ORDER BY weight DESC"
    }

    pub(super) fn select_one() -> &'static str {
        "SELECT tenant_id, src_agent, dst_agent, weight, last_update
         FROM hyphae_edges WHERE tenant_id = ? AND src_agent = ? AND dst_agent = ?"
    }

    pub(super) fn select_all_for_tenant() -> &'static str {
        "SELECT tenant_id, src_agent, dst_agent, weight, last_update
         FROM hyphae_edges WHERE tenant_id = ?"
    }

    pub(super) fn update_weight() -> &'static str {
        "UPDATE hyphae_edges SET weight = ?, last_update = ?
         WHERE tenant_id = ? AND src_agent = ? AND dst_agent = ?"
    }
}

mod mapping {
    use super::{CoreResult, Edge};
    use crate::domain_types::{AgentId, EdgeWeight, TenantId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_edge(row: &SqliteRow) -> CoreResult<Edge> {
        let tenant_id: String = row.get("tenant_id");
        let src_agent: String = row.get("src_agent");
        let dst_agent: String = row.get("dst_agent");
        let weight: f64 = row.get("weight");
        let last_update: i64 = row.get("last_update");

        Ok(Edge {
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            src_agent: AgentId::try_new(src_agent)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            dst_agent: AgentId::try_new(dst_agent)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            weight: EdgeWeight::try_new(weight)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            last_update: super::from_unix(last_update),
        })
    }
}

/// Shell wrapping Hyphal-edge CRUD against SQLite.
///
/// Edges are queried on demand, per source agent, rather than materialized
/// into an in-memory graph: the full adjacency for a tenant can be large, but
/// any single routing decision only ever needs one agent's outgoing edges.
pub struct EdgeStorage {
    connection: DatabaseConnection,
}

impl EdgeStorage {
    /// Creates a new edge storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts an edge, or updates its weight/timestamp if it already exists.
    pub async fn upsert(&self, edge: &Edge) -> CoreResult<()> {
        sqlx::query(sql::upsert())
            .bind(edge.tenant_id.to_string())
            .bind(edge.src_agent.to_string())
            .bind(edge.dst_agent.to_string())
            .bind(edge.weight.into_inner())
            .bind(to_unix(edge.last_update))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Lists a single agent's outgoing edges, strongest weight first.
    pub async fn list_outgoing(
        &self,
        tenant_id: &TenantId,
        src_agent: &AgentId,
    ) -> CoreResult<Vec<Edge>> {
        let rows = sqlx::query(sql::select_outgoing())
            .bind(tenant_id.to_string())
            .bind(src_agent.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_edge).collect()
    }

    /// Fetches a single edge, if it has been materialized.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        src_agent: &AgentId,
        dst_agent: &AgentId,
    ) -> CoreResult<Option<Edge>> {
        let row = sqlx::query(sql::select_one())
            .bind(tenant_id.to_string())
            .bind(src_agent.to_string())
            .bind(dst_agent.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        row.as_ref().map(mapping::row_to_edge).transpose()
    }

    /// Lists every edge materialized for a tenant, regardless of source
    /// agent. Used only by the background decay tick, which needs the full
    /// adjacency to relax every edge toward `W_MIN`.
    pub async fn list_all_for_tenant(&self, tenant_id: &TenantId) -> CoreResult<Vec<Edge>> {
        let rows = sqlx::query(sql::select_all_for_tenant())
            .bind(tenant_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_edge).collect()
    }

    /// Applies a batch of decayed weights inside a single transaction. The
    /// decay formula itself is computed in process (SQLite has no `exp()`);
    /// this keeps the actual writes atomic per tenant the way a single
    /// `UPDATE` would be if the engine supported it natively.
    pub async fn batch_update_weights(
        &self,
        tenant_id: &TenantId,
        updates: &[(AgentId, AgentId, EdgeWeight, chrono::DateTime<chrono::Utc>)],
    ) -> CoreResult<()> {
        let mut tx = self.connection.pool().begin().await?;
        for (src, dst, weight, last_update) in updates {
            sqlx::query(sql::update_weight())
                .bind(weight.into_inner())
                .bind(to_unix(*last_update))
                .bind(tenant_id.to_string())
                .bind(src.to_string())
                .bind(dst.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
