//! Hyphal Memory domain record
//!
//! Durable, retrievable knowledge: unlike a nutrient, a memory entry has no
//! TTL by default and persists until explicitly expired, accumulating
//! quality signal from the outcomes of the searches that surface it.

use crate::domain::routing::EmbeddingVector;
use crate::domain_types::{AgentId, MemoryId, MemoryKind, Quality, Sensitivity, TenantId};
use chrono::{DateTime, Utc};

/// Maximum size, in bytes, of a memory's opaque content blob.
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// A durable memory entry.
///
/// `content` and `embedding` are immutable once created; only `quality` and
/// `accessed_count` may be updated in place, last-writer-wins.
#[derive(Debug, Clone)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The agent that authored this memory.
    pub agent_id: AgentId,
    /// Kind of memory entry.
    pub kind: MemoryKind,
    /// Opaque content blob, capped at [`MAX_CONTENT_BYTES`].
    pub content: Vec<u8>,
    /// MIME type describing how to interpret `content`.
    pub content_type: String,
    /// Embedding over `content` (or a summary of it), used for retrieval.
    pub embedding: EmbeddingVector,
    /// Running quality score in `[0, 1]`, updated by the Reinforcement
    /// Engine at half the normal rate.
    pub quality: Quality,
    /// Sensitivity classification; `>= Confidential` requires encryption at
    /// rest.
    pub sensitivity: Sensitivity,
    /// When this memory was created.
    pub created_at: DateTime<Utc>,
    /// Optional expiry; `None` means the memory persists indefinitely.
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of times this memory has been returned by a search.
    pub accessed_count: u64,
    /// Optional end-user scoping, orthogonal to tenant/agent scoping.
    pub user_id: Option<String>,
    /// AES-256-GCM nonce, present only when `content` was encrypted at rest
    /// (`sensitivity.requires_encryption()`). The salt used to derive the
    /// per-row key travels framed as the first 16 bytes of `content` itself.
    pub encryption_nonce: Option<Vec<u8>>,
}

impl Memory {
    /// Whether this memory is still live relative to `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}
