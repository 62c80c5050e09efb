//! Data-driven policy rule evaluator
//!
//! Policies are plain data (a rule set plus a priority) rather than plugin
//! code: evaluating a request against a tenant's policies is a pure fold
//! over rows already sorted by descending priority, stopping at the first
//! matching `deny`.

use crate::domain_types::{PolicyKind, Sensitivity, TenantId};
use serde::{Deserialize, Serialize};

/// The effect a matching rule has on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// The request is allowed to proceed.
    Allow,
    /// The request is rejected with `PolicyDenied`.
    Deny,
}

/// A single predicate a rule matches against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Matches when the request's sensitivity is at least `min_sensitivity`.
    MinSensitivity {
        /// Inclusive lower bound.
        min_sensitivity: Sensitivity,
    },
    /// Matches when the requesting agent id equals `agent_id`.
    AgentIs {
        /// The agent id to match.
        agent_id: String,
    },
    /// Matches when any of `content` patterns is a literal substring of the
    /// evaluated text (DLP-style).
    ContainsAny {
        /// Patterns to search for.
        patterns: Vec<String>,
    },
    /// Always matches; used for blanket allow/deny rules.
    Always,
}

/// One rule within a policy: a condition plus the effect it produces when
/// the condition matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Predicate gating this rule.
    pub condition: Condition,
    /// Effect applied when `condition` matches.
    pub effect: Effect,
}

/// A tenant's named policy: an ordered rule set plus a priority used to
/// order evaluation across multiple policies of the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Policy identifier, unique within the tenant.
    pub id: String,
    /// Kind of policy (DLP/RBAC/ABAC).
    pub kind: PolicyKind,
    /// Rules evaluated in order; first match wins within this policy.
    pub rules: Vec<Rule>,
    /// Higher priority policies are evaluated first across a tenant's full
    /// policy set.
    pub priority: i64,
    /// Disabled policies are skipped entirely.
    pub enabled: bool,
}

/// The facts a policy evaluation is performed against.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    /// Sensitivity of the content being evaluated.
    pub sensitivity: Sensitivity,
    /// The agent issuing the request.
    pub agent_id: &'a str,
    /// Free text to scan for DLP patterns (e.g. a broadcast summary).
    pub text: &'a str,
}

impl Condition {
    fn matches(&self, ctx: &EvaluationContext<'_>) -> bool {
        match self {
            Self::MinSensitivity { min_sensitivity } => ctx.sensitivity >= *min_sensitivity,
            Self::AgentIs { agent_id } => ctx.agent_id == agent_id,
            Self::ContainsAny { patterns } => patterns.iter().any(|p| ctx.text.contains(p.as_str())),
            Self::Always => true,
        }
    }
}

/// Evaluates `policies` (assumed already enabled-filtered) against `ctx`,
/// in descending-priority order, applying the first matching rule's effect.
/// Returns [`Effect::Allow`] if nothing matches (default-allow, narrowed by
/// whatever explicit deny rules a tenant has configured).
#[must_use]
pub fn evaluate(policies: &[Policy], ctx: &EvaluationContext<'_>) -> Effect {
    let mut ordered: Vec<&Policy> = policies.iter().filter(|p| p.enabled).collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    for policy in ordered {
        for rule in &policy.rules {
            if rule.condition.matches(ctx) {
                return rule.effect;
            }
        }
    }
    Effect::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::try_new("tenant-a".to_string()).unwrap()
    }

    #[test]
    fn first_deny_wins_across_descending_priority() {
        let low_priority_allow = Policy {
            tenant_id: tenant(),
            id: "allow-all".to_string(),
            kind: PolicyKind::Rbac,
            rules: vec![Rule {
                condition: Condition::Always,
                effect: Effect::Allow,
            }],
            priority: 1,
            enabled: true,
        };
        let high_priority_deny = Policy {
            tenant_id: tenant(),
            id: "deny-secret".to_string(),
            kind: PolicyKind::Dlp,
            rules: vec![Rule {
                condition: Condition::MinSensitivity {
                    min_sensitivity: Sensitivity::Secret,
                },
                effect: Effect::Deny,
            }],
            priority: 10,
            enabled: true,
        };
        let ctx = EvaluationContext {
            sensitivity: Sensitivity::Secret,
            agent_id: "agent-1",
            text: "",
        };
        let effect = evaluate(&[low_priority_allow, high_priority_deny], &ctx);
        assert_eq!(effect, Effect::Deny);
    }

    #[test]
    fn disabled_policies_are_skipped() {
        let policy = Policy {
            tenant_id: tenant(),
            id: "deny-everything".to_string(),
            kind: PolicyKind::Dlp,
            rules: vec![Rule {
                condition: Condition::Always,
                effect: Effect::Deny,
            }],
            priority: 100,
            enabled: false,
        };
        let ctx = EvaluationContext {
            sensitivity: Sensitivity::Public,
            agent_id: "agent-1",
            text: "",
        };
        assert_eq!(evaluate(&[policy], &ctx), Effect::Allow);
    }

    #[test]
    fn no_matching_rule_defaults_to_allow() {
        let policy = Policy {
            tenant_id: tenant(),
            id: "deny-secret".to_string(),
            kind: PolicyKind::Dlp,
            rules: vec![Rule {
                condition: Condition::MinSensitivity {
                    min_sensitivity: Sensitivity::Secret,
                },
                effect: Effect::Deny,
            }],
            priority: 1,
            enabled: true,
        };
        let ctx = EvaluationContext {
            sensitivity: Sensitivity::Public,
            agent_id: "agent-1",
            text: "",
        };
        assert_eq!(evaluate(&[policy], &ctx), Effect::Allow);
    }

    #[test]
    fn dlp_pattern_match_denies() {
        let policy = Policy {
            tenant_id: tenant(),
            id: "dlp-ssn".to_string(),
            kind: PolicyKind::Dlp,
            rules: vec![Rule {
                condition: Condition::ContainsAny {
                    patterns: vec!["ssn:".to_string()],
                },
                effect: Effect::Deny,
            }],
            priority: 5,
            enabled: true,
        };
        let ctx = EvaluationContext {
            sensitivity: Sensitivity::Public,
            agent_id: "agent-1",
            text: "record contains ssn: 123-45-6789",
        };
        assert_eq!(evaluate(&[policy], &ctx), Effect::Deny);
    }
}
