//! Nutrient broadcast domain records
//!
//! A "nutrient" is the unit of knowledge a broadcast distributes: a summary,
//! optional snippets, and tool hints, propagated hop-by-hop through the
//! agent graph until its TTL or hop budget is exhausted.

use crate::domain::routing::EmbeddingVector;
use crate::domain_types::{AgentId, MaxHops, NutrientId, Sensitivity, TenantId, Token, TraceId};
use chrono::{DateTime, Utc};

/// An active, in-flight nutrient broadcast.
#[derive(Debug, Clone)]
pub struct Nutrient {
    /// Unique identifier for this broadcast.
    pub id: NutrientId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Trace tying this broadcast to its eventual outcome.
    pub trace_id: TraceId,
    /// The agent that originated the broadcast.
    pub sender_agent: AgentId,
    /// Human-readable summary of the knowledge being shared.
    pub summary: String,
    /// Embedding of `summary`, used as the routing query vector.
    pub embedding: EmbeddingVector,
    /// Optional supporting snippets (code, text), capped at 64KB each by the
    /// storage layer.
    pub snippets: Vec<String>,
    /// Tool-hint tokens used for semantic-overlap and capability-boost
    /// scoring.
    pub tool_hints: Vec<Token>,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Seconds from `created_at` until this nutrient expires.
    pub ttl_sec: u32,
    /// Maximum number of propagation hops.
    pub max_hops: MaxHops,
    /// Hops already taken.
    pub current_hop: u32,
    /// When this broadcast was created.
    pub created_at: DateTime<Utc>,
    /// Absolute expiry instant (`created_at + ttl_sec`).
    pub expires_at: DateTime<Utc>,
}

impl Nutrient {
    /// Whether this nutrient is still live relative to `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at || self.current_hop >= self.max_hops.into_inner()
    }
}

/// A single hop of a nutrient's propagation, recorded for audit and for the
/// Reinforcement Engine's idempotent outcome application.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    /// The nutrient this route belongs to.
    pub nutrient_id: NutrientId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Trace tying this route to its eventual outcome.
    pub trace_id: TraceId,
    /// Sending agent for this hop.
    pub src_agent: AgentId,
    /// Receiving agent for this hop.
    pub dst_agent: AgentId,
    /// Zero-based hop index.
    pub hop_index: u32,
    /// The combined routing score that led to this selection.
    pub score: f64,
    /// Whether this hop was an ε-greedy exploration pick rather than a
    /// scored-and-diversified one.
    pub exploration_flagged: bool,
    /// When this route was recorded.
    pub created_at: DateTime<Utc>,
}
