//! Agent profile domain record

use crate::domain::routing::EmbeddingVector;
use crate::domain_types::{AgentId, AgentStatus, TenantId, Token};
use chrono::{DateTime, Utc};

/// A registered agent within a tenant: the unit the Routing Engine selects
/// among and the Reinforcement Engine keeps edges between.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Agent identifier, unique within the tenant.
    pub agent_id: AgentId,
    /// Current profile embedding, used as the routing query target.
    pub profile_embedding: EmbeddingVector,
    /// Advertised capability tokens.
    pub capabilities: Vec<Token>,
    /// Recently observed demand tokens, informing future capability drift.
    pub recent_demand: Vec<Token>,
    /// Whether this agent is eligible as a routing candidate.
    pub status: AgentStatus,
    /// Exponential moving average of outcome scores for routes to this agent.
    pub avg_success: f64,
    /// Last time this agent sent or received a nutrient.
    pub last_active: DateTime<Utc>,
}

impl AgentProfile {
    /// Whether this agent may currently receive broadcasts.
    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.status == AgentStatus::Active
    }
}
