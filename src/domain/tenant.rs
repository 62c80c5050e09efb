//! Tenant domain record

use crate::domain_types::{Epsilon, PlanTier, RateLimitPerWindow, TenantId, TenantStatus};
use chrono::{DateTime, Utc};

/// A tenant: the unit of isolation for every query this crate issues.
#[derive(Debug, Clone)]
pub struct Tenant {
    /// Opaque tenant identifier.
    pub id: TenantId,
    /// Plan tier governing default quotas.
    pub plan_tier: PlanTier,
    /// Current lifecycle status.
    pub status: TenantStatus,
    /// Deployment region, used for informational/routing-affinity purposes.
    pub region: String,
    /// Broadcasts allowed per 60-second sliding window.
    pub quota_broadcasts_per_min: RateLimitPerWindow,
    /// Searches allowed per 60-second sliding window.
    pub quota_searches_per_min: RateLimitPerWindow,
    /// Default exploration probability for this tenant's routing decisions.
    pub exploration_epsilon: Epsilon,
    /// When this tenant was provisioned.
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Whether this tenant may issue requests right now.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }
}
