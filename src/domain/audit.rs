//! Audit event domain record
//!
//! Every privileged or sensitivity-gated operation appends one audit event.
//! The event's `signature` is computed over a canonicalized encoding of
//! `(tenant_id, operation, payload, created_at)` by the Ed25519 signer in
//! `security.rs`; storage only persists bytes produced elsewhere.

use crate::domain_types::{AuditEventId, TenantId};
use chrono::{DateTime, Utc};

/// A single signed audit record.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Unique identifier.
    pub id: AuditEventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Short operation name, e.g. `"memory.search"` or `"nutrient.broadcast"`.
    pub operation: String,
    /// Canonical JSON payload describing the operation.
    pub payload: String,
    /// Ed25519 signature over the canonicalized event.
    pub signature: Vec<u8>,
    /// When this event was recorded.
    pub created_at: DateTime<Utc>,
}
