//! Domain primitives for the Hyphae substrate
//!
//! This module defines strongly-typed domain values to prevent primitive
//! obsession and make illegal states unrepresentable at compile time.

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Saturation floor for edge weights.
pub const W_MIN: f64 = 0.01;
/// Saturation ceiling for edge weights.
pub const W_MAX: f64 = 1.5;
/// Initial weight assigned to an edge materialized on first delivery.
pub const W_INIT: f64 = 0.2;

/// Number of dimensions every embedding in this system must carry.
pub const EMBEDDING_DIM: usize = 1536;

/// Opaque tenant identifier.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        AsRef,
        TryFrom
    )
)]
pub struct TenantId(String);

/// Identifier for an agent, unique within a tenant.
#[nutype(
    sanitize(trim),
    validate(len_char_min = 1, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        AsRef,
        TryFrom
    )
)]
pub struct AgentId(String);

/// Identifier for a nutrient broadcast.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display
))]
pub struct NutrientId(Uuid);

impl NutrientId {
    /// Generates a new random nutrient id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier tying a broadcast to its subsequent outcome.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display
))]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generates a new random trace id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier for a durable memory row.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display
))]
pub struct MemoryId(Uuid);

impl MemoryId {
    /// Generates a new random memory id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Identifier for an audit event.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display
))]
pub struct AuditEventId(Uuid);

impl AuditEventId {
    /// Generates a new random audit event id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// A string token such as a tool hint, capability, or recent-demand entry.
#[nutype(
    sanitize(trim, lowercase),
    validate(len_char_min = 1, len_char_max = 128),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)
)]
pub struct Token(String);

/// A plan tier governing default quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Free tier: tightest quotas.
    Free,
    /// Pro tier: standard quotas.
    Pro,
    /// Enterprise tier: highest quotas, still bounded.
    Enterprise,
}

impl PlanTier {
    /// Parses a plan tier from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not one of `free`, `pro`, `enterprise`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(ValidationError::InvalidField {
                field: "plan_tier".to_string(),
                reason: format!("unknown plan tier '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Lifecycle status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    /// Tenant may issue requests.
    Active,
    /// Tenant is suspended; all requests are rejected.
    Suspended,
}

impl TenantStatus {
    /// Parses a tenant status from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not one of `active`, `suspended`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            other => Err(ValidationError::InvalidField {
                field: "status".to_string(),
                reason: format!("unknown tenant status '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
        }
    }
}

/// Lifecycle status of an agent profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent may send and receive nutrients.
    Active,
    /// Agent is excluded from routing candidacy.
    Inactive,
}

impl AgentStatus {
    /// Parses an agent status from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not one of `active`, `inactive`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(ValidationError::InvalidField {
                field: "status".to_string(),
                reason: format!("unknown agent status '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// Sensitivity classification governing retrieval and encryption at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// No restriction.
    Public,
    /// Internal to the tenant.
    Internal,
    /// Requires elevated clearance; encrypted at rest.
    Confidential,
    /// Highest classification; encrypted at rest.
    Secret,
}

impl Sensitivity {
    /// Whether content at this sensitivity must be envelope-encrypted at rest.
    #[must_use]
    pub fn requires_encryption(self) -> bool {
        self >= Self::Confidential
    }

    /// Parses a sensitivity from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a recognized sensitivity level.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "confidential" => Ok(Self::Confidential),
            "secret" => Ok(Self::Secret),
            other => Err(ValidationError::InvalidField {
                field: "sensitivity".to_string(),
                reason: format!("unknown sensitivity '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
            Self::Secret => "secret",
        }
    }
}

/// Kind of durable memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A derived insight.
    Insight,
    /// A reusable code or text snippet.
    Snippet,
    /// A recorded decision.
    Decision,
    /// A standing preference.
    Preference,
}

impl MemoryKind {
    /// Parses a memory kind from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a recognized memory kind.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "insight" => Ok(Self::Insight),
            "snippet" => Ok(Self::Snippet),
            "decision" => Ok(Self::Decision),
            "preference" => Ok(Self::Preference),
            other => Err(ValidationError::InvalidField {
                field: "kind".to_string(),
                reason: format!("unknown memory kind '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::Snippet => "snippet",
            Self::Decision => "decision",
            Self::Preference => "preference",
        }
    }
}

/// Kind of policy rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Data loss prevention rules (content pattern matching).
    Dlp,
    /// Role-based access control rules.
    Rbac,
    /// Attribute-based access control rules.
    Abac,
}

impl PolicyKind {
    /// Parses a policy kind from its lowercase wire representation.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a recognized policy kind.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "dlp" => Ok(Self::Dlp),
            "rbac" => Ok(Self::Rbac),
            "abac" => Ok(Self::Abac),
            other => Err(ValidationError::InvalidField {
                field: "kind".to_string(),
                reason: format!("unknown policy kind '{other}'"),
            }),
        }
    }

    /// Wire representation used for storage and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dlp => "dlp",
            Self::Rbac => "rbac",
            Self::Abac => "abac",
        }
    }
}

/// A bounded quality score in `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Display)
)]
pub struct Quality(f64);

/// A bounded outcome score in `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Display)
)]
pub struct OutcomeScore(f64);

/// Edge weight, saturating to `[W_MIN, W_MAX]`.
#[nutype(
    validate(finite, greater_or_equal = 0.01, less_or_equal = 1.5),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Display)
)]
pub struct EdgeWeight(f64);

impl Default for EdgeWeight {
    fn default() -> Self {
        Self::try_new(W_INIT).expect("W_INIT is within [W_MIN, W_MAX]")
    }
}

impl EdgeWeight {
    /// Saturates an arbitrary f64 into a valid `EdgeWeight`, clamping to the
    /// `[W_MIN, W_MAX]` band rather than rejecting out-of-range inputs. Used
    /// by the reinforcement engine, whose update/decay formulas may
    /// momentarily compute a value outside the band before saturation.
    #[must_use]
    pub fn saturating_from(raw: f64) -> Self {
        let clamped = raw.clamp(W_MIN, W_MAX);
        Self::try_new(clamped).unwrap_or_else(|_| Self::default())
    }
}

/// TTL for a nutrient, in seconds, bounded to `[1, 3600]`.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 3600),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)
)]
pub struct TtlSeconds(u32);

/// Maximum propagation hops for a nutrient, bounded to `[1, 10]`.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)
)]
pub struct MaxHops(u32);

/// Adaptive candidate bound `K`, clamped to `[20, 50]`.
#[nutype(
    validate(greater_or_equal = 20, less_or_equal = 50),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)
)]
pub struct CandidateBound(u32);

impl CandidateBound {
    /// Computes `K = clamp(20 + floor(n/50), 20, 50)` for a tenant with
    /// `n_active_agents` active agents.
    #[must_use]
    pub fn for_active_agents(n_active_agents: u64) -> Self {
        let raw = 20 + n_active_agents / 50;
        let clamped = raw.clamp(20, 50);
        Self::try_new(u32::try_from(clamped).unwrap_or(50))
            .expect("clamped value is within [20, 50]")
    }
}

/// Exploration probability ε, bounded to `[0, 1]`.
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Display)
)]
pub struct Epsilon(f64);

impl Default for Epsilon {
    fn default() -> Self {
        Self::try_new(0.05).expect("0.05 is within [0, 1]")
    }
}

/// Connection pool size, bounded to a sane operational range.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        Display,
        Default
    ),
    default = 10
)]
pub struct ConnectionPoolSize(u32);

impl ConnectionPoolSize {
    /// Gets the value as usize, as required by `sqlx::SqlitePoolOptions`.
    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.into_inner() as usize
    }
}

/// Requests allowed per sliding window, per rate-limit key.
#[nutype(
    validate(greater_or_equal = 1),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)
)]
pub struct RateLimitPerWindow(u32);

/// Domain-level validation errors shared across the newtypes in this module.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid field value with descriptive reason.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: String,
        /// Human-readable reason the value was rejected.
        reason: String,
    },

    /// Value is outside the allowed range.
    #[error("value out of range: {value}, expected {min}-{max}")]
    ValueOutOfRange {
        /// The rejected value.
        value: i64,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
    },

    /// Domain constraint violation not covered by a single field.
    #[error("constraint violation: {constraint}")]
    ConstraintViolation {
        /// Description of the violated constraint.
        constraint: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_bound_clamps_at_floor() {
        assert_eq!(CandidateBound::for_active_agents(0).into_inner(), 20);
        assert_eq!(CandidateBound::for_active_agents(10).into_inner(), 20);
    }

    #[test]
    fn candidate_bound_scales_with_network_size() {
        assert_eq!(CandidateBound::for_active_agents(500).into_inner(), 30);
    }

    #[test]
    fn candidate_bound_clamps_at_ceiling() {
        assert_eq!(CandidateBound::for_active_agents(1_000_000).into_inner(), 50);
    }

    #[test]
    fn sensitivity_ordering_governs_encryption() {
        assert!(!Sensitivity::Public.requires_encryption());
        assert!(!Sensitivity::Internal.requires_encryption());
        assert!(Sensitivity::Confidential.requires_encryption());
        assert!(Sensitivity::Secret.requires_encryption());
    }

    #[test]
    fn edge_weight_default_is_w_init() {
        assert!((EdgeWeight::default().into_inner() - W_INIT).abs() < f64::EPSILON);
    }

    #[test]
    fn edge_weight_saturates_out_of_range_inputs() {
        assert!((EdgeWeight::saturating_from(10.0).into_inner() - W_MAX).abs() < f64::EPSILON);
        assert!((EdgeWeight::saturating_from(-10.0).into_inner() - W_MIN).abs() < f64::EPSILON);
    }

    #[test]
    fn plan_tier_round_trips_through_wire_representation() {
        for tier in [PlanTier::Free, PlanTier::Pro, PlanTier::Enterprise] {
            assert_eq!(PlanTier::parse(tier.as_str()).unwrap(), tier);
        }
        assert!(PlanTier::parse("platinum").is_err());
    }

    #[test]
    fn sensitivity_round_trips_through_wire_representation() {
        for level in [
            Sensitivity::Public,
            Sensitivity::Internal,
            Sensitivity::Confidential,
            Sensitivity::Secret,
        ] {
            assert_eq!(Sensitivity::parse(level.as_str()).unwrap(), level);
        }
        assert!(Sensitivity::parse("top-secret").is_err());
    }
}
