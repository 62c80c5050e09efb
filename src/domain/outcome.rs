//! Outcome domain record
//!
//! Outcomes close the feedback loop: `record_outcome` is idempotent by
//! `trace_id` so a retried client request never double-applies a
//! reinforcement update.

use crate::domain_types::{OutcomeScore, TenantId, TraceId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A recorded outcome for a broadcast/search trace.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Trace this outcome closes out; primary key, enforcing idempotence.
    pub trace_id: TraceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Overall outcome score in `[0, 1]`; required.
    pub overall_score: OutcomeScore,
    /// Optional per-hop breakdown, keyed by hop index.
    pub hop_scores: Option<HashMap<u32, OutcomeScore>>,
    /// When this outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}
