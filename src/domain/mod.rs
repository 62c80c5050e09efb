//! Pure domain logic: entities, scoring, and policy evaluation with no I/O.
//!
//! Every type here is constructed directly from validated
//! [`crate::domain_types`] newtypes, so a value that exists is already known
//! to satisfy its invariants. Persistence lives in [`crate::storage`];
//! orchestration that combines these pure functions with storage and the
//! clock lives in the `*_service` modules at the crate root.

pub mod agent_profile;
pub mod audit;
pub mod edge;
pub mod memory;
pub mod nutrient;
pub mod outcome;
pub mod policy;
pub mod reinforcement;
pub mod routing;
pub mod tenant;

pub use agent_profile::AgentProfile;
pub use audit::AuditEvent;
pub use edge::Edge;
pub use memory::Memory;
pub use nutrient::{Nutrient, RouteRecord};
pub use outcome::Outcome;
pub use policy::{evaluate as evaluate_policy, Condition, Effect, EvaluationContext, Policy, Rule};
pub use reinforcement::{
    decay_weight, hebbian_update, update_avg_success, update_memory_quality, ALPHA_NEG, ALPHA_POS,
    AVG_SUCCESS_EMA_ALPHA, LAMBDA_DECAY, THETA_POS,
};
pub use routing::{
    mmr_diversify, score_candidate, select_agents, semantic_overlap, EmbeddingVector,
    RouterConfig, RoutingCandidate, RoutingDecision, RoutingError, RoutingReason, SimilarityCache,
};
pub use tenant::Tenant;
