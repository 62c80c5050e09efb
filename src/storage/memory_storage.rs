//! Persistence for the `hyphal_memory` table.
//!
//! There is no native vector index in SQLite, so semantic retrieval narrows
//! by a SQL index first (tenant, optionally agent) and then brute-force
//! scans the narrowed row set in-process for cosine similarity. A real ANN
//! backend can replace [`MemoryStorage::search_candidates`]'s body without
//! touching its callers.

use crate::database::DatabaseConnection;
use crate::domain::routing::EmbeddingVector;
use crate::domain::Memory;
use crate::domain_types::{AgentId, MemoryId, MemoryKind, Quality, Sensitivity, TenantId};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;

mod sql {
    pub(super) fn insert() -> &'static str {
        "INSERT INTO hyphal_memory
            (id, tenant_id, agent_id, kind, content, content_type, embedding, quality,
             sensitivity, encryption_nonce, created_at, expires_at, accessed_count, user_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    }

    pub(super) fn select_candidates_for_tenant() -> &'static str {
        "SELECT id, tenant_id, agent_id, kind, content, content_type, embedding, quality,
                sensitivity, encryption_nonce, created_at, expires_at, accessed_count, user_id
         FROM hyphal_memory
         WHERE tenant_id = ? AND (expires_at IS NULL OR expires_at > ?)
         ORDER BY quality DESC
         LIMIT ?"
    }

    pub(super) fn update_quality() -> &'static str {
        "UPDATE hyphal_memory SET quality = ? WHERE id = ?"
    }

    pub(super) fn increment_accessed_count() -> &'static str {
        "UPDATE hyphal_memory SET accessed_count = accessed_count + 1 WHERE id = ?"
    }
}

mod mapping {
    use super::{CoreResult, Memory};
    use crate::domain_types::{AgentId, MemoryId, MemoryKind, Quality, Sensitivity, TenantId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_memory(row: &SqliteRow) -> CoreResult<Memory> {
        let id: String = row.get("id");
        let tenant_id: String = row.get("tenant_id");
        let agent_id: String = row.get("agent_id");
        let kind: String = row.get("kind");
        let content: Vec<u8> = row.get("content");
        let content_type: String = row.get("content_type");
        let embedding_bytes: Vec<u8> = row.get("embedding");
        let quality: f64 = row.get("quality");
        let sensitivity: String = row.get("sensitivity");
        let created_at: i64 = row.get("created_at");
        let expires_at: Option<i64> = row.get("expires_at");
        let accessed_count: i64 = row.get("accessed_count");
        let user_id: Option<String> = row.get("user_id");
        let encryption_nonce: Option<Vec<u8>> = row.get("encryption_nonce");

        Ok(Memory {
            id: MemoryId::new(
                uuid::Uuid::parse_str(&id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            agent_id: AgentId::try_new(agent_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            kind: MemoryKind::parse(&kind).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            content,
            content_type,
            embedding: super::EmbeddingVector::from_bytes(&embedding_bytes)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            quality: Quality::try_new(quality)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            sensitivity: Sensitivity::parse(&sensitivity)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            created_at: super::from_unix(created_at),
            expires_at: expires_at.map(super::from_unix),
            accessed_count: accessed_count.max(0) as u64,
            user_id,
            encryption_nonce,
        })
    }
}

/// A memory candidate paired with its similarity to a query embedding,
/// returned by [`MemoryStorage::search_candidates`].
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The memory row.
    pub memory: Memory,
    /// Cosine similarity to the query embedding, in `[0, 1]`.
    pub similarity: f64,
}

/// Shell wrapping Hyphal-memory CRUD and similarity search against SQLite.
pub struct MemoryStorage {
    connection: DatabaseConnection,
}

impl MemoryStorage {
    /// Creates a new memory storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts a new memory. Memories are immutable once written except for
    /// `quality` and `accessed_count`; there is no update path for content.
    pub async fn insert(&self, memory: &Memory) -> CoreResult<()> {
        sqlx::query(sql::insert())
            .bind(memory.id.to_string())
            .bind(memory.tenant_id.to_string())
            .bind(memory.agent_id.to_string())
            .bind(memory.kind.as_str())
            .bind(&memory.content)
            .bind(&memory.content_type)
            .bind(memory.embedding.to_bytes())
            .bind(memory.quality.into_inner())
            .bind(memory.sensitivity.as_str())
            .bind(memory.encryption_nonce.as_deref())
            .bind(to_unix(memory.created_at))
            .bind(memory.expires_at.map(to_unix))
            .bind(memory.accessed_count as i64)
            .bind(&memory.user_id)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Fetches up to `pool_size` unexpired memories for a tenant, ordered by
    /// quality, then ranks them by cosine similarity against `query` in
    /// process. Callers apply MMR diversification on top of the result.
    pub async fn search_candidates(
        &self,
        tenant_id: &TenantId,
        query: &EmbeddingVector,
        pool_size: u32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<Vec<ScoredMemory>> {
        let rows = sqlx::query(sql::select_candidates_for_tenant())
            .bind(tenant_id.to_string())
            .bind(to_unix(now))
            .bind(i64::from(pool_size))
            .fetch_all(self.connection.pool())
            .await?;

        let mut scored = rows
            .iter()
            .map(|row| {
                let memory = mapping::row_to_memory(row)?;
                let similarity = memory.embedding.cosine_similarity(query);
                Ok(ScoredMemory { memory, similarity })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(scored)
    }

    /// Updates a memory's running quality score after an outcome is recorded.
    pub async fn update_quality(&self, id: &MemoryId, quality: Quality) -> CoreResult<()> {
        sqlx::query(sql::update_quality())
            .bind(quality.into_inner())
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Bumps a memory's access counter after it is returned by a search.
    pub async fn increment_accessed_count(&self, id: &MemoryId) -> CoreResult<()> {
        sqlx::query(sql::increment_accessed_count())
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }
}
