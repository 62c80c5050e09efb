//! Authentication and policy-evaluation seams the Router Service depends on.
//!
//! Real authn/authz (issuing credentials, managing an IAM registry) is an
//! external collaborator this crate does not implement.
//! [`AuthGate`] and [`PolicyEvaluator`] are the narrow traits the Router and
//! Hyphal Memory services depend on instead, so the crate stays runnable and
//! testable end-to-end without a real IAM system: [`BearerTenantScopeGate`]
//! is a deterministic stub that treats the bearer credential as an opaque
//! `tenant_id:agent_id` scope string, and [`StoragePolicyEvaluator`] is the
//! data-driven rule evaluator from [`crate::domain::policy`] wired to
//! [`crate::storage::PolicyStorage`].

use crate::domain::policy::{evaluate as evaluate_policy, EvaluationContext};
use crate::domain_types::{AgentId, TenantId};
use crate::error::{CoreError, CoreResult};
use crate::storage::PolicyStorage;
use async_trait::async_trait;

/// The identity and scope a credential resolved to.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Tenant the credential is scoped to.
    pub tenant_id: TenantId,
    /// Agent the credential identifies, when the credential names one.
    pub agent_id: Option<AgentId>,
}

/// Resolves an opaque bearer credential into a tenant/agent scope.
///
/// Implementations must reject a credential that does not name
/// `expected_tenant`, so a leaked token scoped to one tenant can never be
/// replayed against another.
#[async_trait]
pub trait AuthGate: Send + Sync {
    /// Authenticates `credential` against `expected_tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unauthenticated`] if the credential is empty or
    /// malformed, or [`CoreError::PermissionDenied`] if it is well-formed but
    /// scoped to a different tenant.
    async fn authenticate(
        &self,
        expected_tenant: &TenantId,
        credential: &str,
    ) -> CoreResult<AuthContext>;
}

/// Deterministic stub `AuthGate`: the bearer credential is a literal
/// `"{tenant_id}"` or `"{tenant_id}:{agent_id}"` string. A real deployment
/// swaps this for a gate backed by whatever IAM issues credentials; nothing
/// else in the Router Service depends on the credential's internal shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerTenantScopeGate;

#[async_trait]
impl AuthGate for BearerTenantScopeGate {
    async fn authenticate(
        &self,
        expected_tenant: &TenantId,
        credential: &str,
    ) -> CoreResult<AuthContext> {
        if credential.is_empty() {
            return Err(CoreError::Unauthenticated);
        }

        let mut parts = credential.splitn(2, ':');
        let scoped_tenant = parts.next().unwrap_or_default();
        let scoped_agent = parts.next();

        if scoped_tenant.is_empty() {
            return Err(CoreError::Unauthenticated);
        }

        if scoped_tenant != expected_tenant.as_ref() {
            return Err(CoreError::PermissionDenied(
                "credential is not scoped to this tenant".to_string(),
            ));
        }

        let agent_id = scoped_agent
            .map(|raw| {
                AgentId::try_new(raw.to_string())
                    .map_err(|e| CoreError::InvalidArgument(e.to_string()))
            })
            .transpose()?;

        Ok(AuthContext {
            tenant_id: expected_tenant.clone(),
            agent_id,
        })
    }
}

/// Evaluates a tenant's configured policies (DLP/RBAC/ABAC) against a
/// request's facts.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates `ctx` against every enabled policy configured for
    /// `tenant_id`, in descending-priority order.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] if the underlying policy store is
    /// unreachable.
    async fn evaluate(
        &self,
        tenant_id: &TenantId,
        ctx: &EvaluationContext<'_>,
    ) -> CoreResult<crate::domain::policy::Effect>;
}

/// The data-driven policy evaluator: loads a tenant's policy rows and folds
/// [`crate::domain::policy::evaluate`] over them.
pub struct StoragePolicyEvaluator {
    storage: PolicyStorage,
}

impl StoragePolicyEvaluator {
    /// Wraps a policy storage shell.
    #[must_use]
    pub fn new(storage: PolicyStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PolicyEvaluator for StoragePolicyEvaluator {
    async fn evaluate(
        &self,
        tenant_id: &TenantId,
        ctx: &EvaluationContext<'_>,
    ) -> CoreResult<crate::domain::policy::Effect> {
        let policies = self.storage.list_for_tenant(tenant_id).await?;
        Ok(evaluate_policy(&policies, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(raw: &str) -> TenantId {
        TenantId::try_new(raw.to_string()).unwrap()
    }

    #[tokio::test]
    async fn empty_credential_is_unauthenticated() {
        let gate = BearerTenantScopeGate;
        let result = gate.authenticate(&tenant("tenant-a"), "").await;
        assert!(matches!(result, Err(CoreError::Unauthenticated)));
    }

    #[tokio::test]
    async fn credential_scoped_to_another_tenant_is_denied() {
        let gate = BearerTenantScopeGate;
        let result = gate.authenticate(&tenant("tenant-a"), "tenant-b:agent-1").await;
        assert!(matches!(result, Err(CoreError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn matching_tenant_scope_without_agent_succeeds() {
        let gate = BearerTenantScopeGate;
        let ctx = gate.authenticate(&tenant("tenant-a"), "tenant-a").await.unwrap();
        assert_eq!(ctx.tenant_id, tenant("tenant-a"));
        assert!(ctx.agent_id.is_none());
    }

    #[tokio::test]
    async fn matching_tenant_scope_with_agent_resolves_both() {
        let gate = BearerTenantScopeGate;
        let ctx = gate
            .authenticate(&tenant("tenant-a"), "tenant-a:agent-7")
            .await
            .unwrap();
        assert_eq!(ctx.tenant_id, tenant("tenant-a"));
        assert_eq!(ctx.agent_id.unwrap().as_ref(), "agent-7");
    }
}
