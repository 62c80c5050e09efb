//! Hyphal edge domain record
//!
//! An edge is a directed, weighted link from one agent to another within a
//! tenant, strengthened or weakened by the Reinforcement Engine as outcomes
//! come in, and relaxed toward the floor weight by periodic decay.

use crate::domain_types::{AgentId, EdgeWeight, TenantId};
use chrono::{DateTime, Utc};

/// A directed edge `src -> dst` carrying the current reinforcement weight.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Source agent.
    pub src_agent: AgentId,
    /// Destination agent.
    pub dst_agent: AgentId,
    /// Current edge weight, always within `[W_MIN, W_MAX]`.
    pub weight: EdgeWeight,
    /// When this edge was last reinforced or decayed.
    pub last_update: DateTime<Utc>,
}
