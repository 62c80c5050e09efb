//! Persistence for the `nutrients_active` and `nutrient_routes` tables.

use crate::database::DatabaseConnection;
use crate::domain::routing::EmbeddingVector;
use crate::domain::{Nutrient, RouteRecord};
use crate::domain_types::{
    AgentId, MaxHops, NutrientId, Sensitivity, TenantId, Token, TraceId,
};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;

mod sql {
    pub(super) fn insert_nutrient() -> &'static str {
        "INSERT INTO nutrients_active
            (id, tenant_id, trace_id, sender_agent, summary, embedding, snippets, tool_hints,
             sensitivity, ttl_sec, max_hops, current_hop, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    }

    pub(super) fn select_nutrient() -> &'static str {
        "SELECT id, tenant_id, trace_id, sender_agent, summary, embedding, snippets, tool_hints,
                sensitivity, ttl_sec, max_hops, current_hop, created_at, expires_at
         FROM nutrients_active WHERE id = ?"
    }

    pub(super) fn delete_expired() -> &'static str {
        "DELETE FROM nutrients_active WHERE tenant_id = ? AND expires_at <= ?"
    }

    pub(super) fn bump_hop() -> &'static str {
        "UPDATE nutrients_active SET current_hop = current_hop + 1 WHERE id = ?"
    }

    pub(super) fn insert_route() -> &'static str {
        "INSERT INTO nutrient_routes
            (nutrient_id, tenant_id, trace_id, src_agent, dst_agent, hop_index, score,
             exploration_flagged, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
    }

    pub(super) fn select_routes_for_trace() -> &'static str {
        "SELECT nutrient_id, tenant_id, trace_id, src_agent, dst_agent, hop_index, score,
                exploration_flagged, created_at
         FROM nutrient_routes WHERE trace_id = ?
         ORDER BY hop_index ASC"
    }

    pub(super) fn select_active_for_tenant() -> &'static str {
        "SELECT id, tenant_id, trace_id, sender_agent, summary, embedding, snippets, tool_hints,
                sensitivity, ttl_sec, max_hops, current_hop, created_at, expires_at
         FROM nutrients_active
         WHERE tenant_id = ? AND expires_at > ? AND current_hop < max_hops
         ORDER BY created_at DESC
         LIMIT ?"
    }

    pub(super) fn delete_routes_older_than() -> &'static str {
        "DELETE FROM nutrient_routes WHERE tenant_id = ? AND created_at < ?"
    }
}

mod mapping {
    use super::{CoreResult, Nutrient, RouteRecord};
    use crate::domain_types::{AgentId, MaxHops, NutrientId, Sensitivity, TenantId, Token, TraceId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_nutrient(row: &SqliteRow) -> CoreResult<Nutrient> {
        let id: String = row.get("id");
        let tenant_id: String = row.get("tenant_id");
        let trace_id: String = row.get("trace_id");
        let sender_agent: String = row.get("sender_agent");
        let summary: String = row.get("summary");
        let embedding_bytes: Vec<u8> = row.get("embedding");
        let snippets_json: String = row.get("snippets");
        let tool_hints_json: String = row.get("tool_hints");
        let sensitivity: String = row.get("sensitivity");
        let ttl_sec: i64 = row.get("ttl_sec");
        let max_hops: i64 = row.get("max_hops");
        let current_hop: i64 = row.get("current_hop");
        let created_at: i64 = row.get("created_at");
        let expires_at: i64 = row.get("expires_at");

        let snippets: Vec<String> =
            serde_json::from_str(&snippets_json).map_err(|e| CoreError::Internal(e.into()))?;
        let tool_hints_raw: Vec<String> =
            serde_json::from_str(&tool_hints_json).map_err(|e| CoreError::Internal(e.into()))?;
        let tool_hints = tool_hints_raw
            .into_iter()
            .map(|t| Token::try_new(t).map_err(|e| CoreError::InvalidArgument(e.to_string())))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Nutrient {
            id: NutrientId::new(
                uuid::Uuid::parse_str(&id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            trace_id: TraceId::new(
                uuid::Uuid::parse_str(&trace_id)
                    .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            sender_agent: AgentId::try_new(sender_agent)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            summary,
            embedding: super::EmbeddingVector::from_bytes(&embedding_bytes)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            snippets,
            tool_hints,
            sensitivity: Sensitivity::parse(&sensitivity)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ttl_sec: ttl_sec.max(0) as u32,
            max_hops: MaxHops::try_new(max_hops.max(0) as u32)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            current_hop: current_hop.max(0) as u32,
            created_at: super::from_unix(created_at),
            expires_at: super::from_unix(expires_at),
        })
    }

    pub(super) fn row_to_route(row: &SqliteRow) -> CoreResult<RouteRecord> {
        let nutrient_id: String = row.get("nutrient_id");
        let tenant_id: String = row.get("tenant_id");
        let trace_id: String = row.get("trace_id");
        let src_agent: String = row.get("src_agent");
        let dst_agent: String = row.get("dst_agent");
        let hop_index: i64 = row.get("hop_index");
        let score: f64 = row.get("score");
        let exploration_flagged: bool = row.get("exploration_flagged");
        let created_at: i64 = row.get("created_at");

        Ok(RouteRecord {
            nutrient_id: NutrientId::new(
                uuid::Uuid::parse_str(&nutrient_id)
                    .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            trace_id: TraceId::new(
                uuid::Uuid::parse_str(&trace_id)
                    .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            src_agent: AgentId::try_new(src_agent)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            dst_agent: AgentId::try_new(dst_agent)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            hop_index: hop_index.max(0) as u32,
            score,
            exploration_flagged,
            created_at: super::from_unix(created_at),
        })
    }
}

/// Shell wrapping nutrient and route persistence against SQLite.
pub struct NutrientStorage {
    connection: DatabaseConnection,
}

impl NutrientStorage {
    /// Creates a new nutrient storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts a newly broadcast nutrient.
    pub async fn insert(&self, nutrient: &Nutrient) -> CoreResult<()> {
        let snippets_json = serde_json::to_string(&nutrient.snippets)
            .map_err(|e| crate::error::CoreError::Internal(e.into()))?;
        let tool_hints_json = serde_json::to_string(&nutrient.tool_hints)
            .map_err(|e| crate::error::CoreError::Internal(e.into()))?;

        sqlx::query(sql::insert_nutrient())
            .bind(nutrient.id.to_string())
            .bind(nutrient.tenant_id.to_string())
            .bind(nutrient.trace_id.to_string())
            .bind(nutrient.sender_agent.to_string())
            .bind(&nutrient.summary)
            .bind(nutrient.embedding.to_bytes())
            .bind(snippets_json)
            .bind(tool_hints_json)
            .bind(nutrient.sensitivity.as_str())
            .bind(i64::from(nutrient.ttl_sec))
            .bind(i64::from(nutrient.max_hops.into_inner()))
            .bind(i64::from(nutrient.current_hop))
            .bind(to_unix(nutrient.created_at))
            .bind(to_unix(nutrient.expires_at))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Fetches a single nutrient by id.
    pub async fn get(&self, id: &NutrientId) -> CoreResult<Nutrient> {
        let row = sqlx::query(sql::select_nutrient())
            .bind(id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        mapping::row_to_nutrient(&row)
    }

    /// Advances a nutrient's hop counter after a successful re-broadcast.
    pub async fn bump_hop(&self, id: &NutrientId) -> CoreResult<()> {
        sqlx::query(sql::bump_hop())
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Deletes every nutrient for `tenant_id` whose TTL has elapsed as of
    /// `now`. Called by the background scheduler's sweep tick.
    pub async fn delete_expired(
        &self,
        tenant_id: &TenantId,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<u64> {
        let result = sqlx::query(sql::delete_expired())
            .bind(tenant_id.to_string())
            .bind(to_unix(now))
            .execute(self.connection.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Records a routing decision for one hop of a trace.
    pub async fn insert_route(&self, route: &RouteRecord) -> CoreResult<()> {
        sqlx::query(sql::insert_route())
            .bind(route.nutrient_id.to_string())
            .bind(route.tenant_id.to_string())
            .bind(route.trace_id.to_string())
            .bind(route.src_agent.to_string())
            .bind(route.dst_agent.to_string())
            .bind(i64::from(route.hop_index))
            .bind(route.score)
            .bind(route.exploration_flagged)
            .bind(to_unix(route.created_at))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Lists every routing decision recorded for a trace, in hop order.
    pub async fn routes_for_trace(&self, trace_id: &TraceId) -> CoreResult<Vec<RouteRecord>> {
        let rows = sqlx::query(sql::select_routes_for_trace())
            .bind(trace_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_route).collect()
    }

    /// Fetches up to `pool_size` live (unexpired, hop-budget-remaining)
    /// nutrients for a tenant, most recent first. `collect` ranks these by
    /// cosine similarity against the caller's query embedding in process.
    pub async fn search_active_candidates(
        &self,
        tenant_id: &TenantId,
        now: chrono::DateTime<chrono::Utc>,
        pool_size: u32,
    ) -> CoreResult<Vec<Nutrient>> {
        let rows = sqlx::query(sql::select_active_for_tenant())
            .bind(tenant_id.to_string())
            .bind(to_unix(now))
            .bind(i64::from(pool_size))
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_nutrient).collect()
    }

    /// Deletes route records older than the retention window. Called by the
    /// background scheduler's sweep tick, independent of whether their trace
    /// ever received an outcome.
    pub async fn delete_routes_older_than(
        &self,
        tenant_id: &TenantId,
        threshold: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<u64> {
        let result = sqlx::query(sql::delete_routes_older_than())
            .bind(tenant_id.to_string())
            .bind(to_unix(threshold))
            .execute(self.connection.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
