//! Reinforcement Engine: closes the loop between a broadcast's route
//! records and the outcome that eventually arrives for them.
//!
//! `record_outcome` is a one-shot, idempotent-by-`trace_id` operation: it
//! loads every hop recorded for a trace,
//! applies the Hebbian update to each hop's edge (halving the negative rate
//! for exploration-flagged hops so curiosity isn't punished), updates the
//! destination agent's `avg_success` EMA, and persists the outcome row
//! itself so a retried call observes [`CoreError::AlreadyRecorded`] rather
//! than double-applying credit. `decay_tick` and `sweep_tick` are the two
//! periodic maintenance passes [`crate::scheduler`] drives on independent
//! cadences.

use crate::domain::reinforcement::{hebbian_update, update_avg_success, ALPHA_NEG};
use crate::domain::Outcome;
use crate::domain_types::{AgentId, EdgeWeight, Quality, TenantId, TraceId, W_INIT};
use crate::error::{CoreError, CoreResult};
use crate::runtime::CoreRuntime;
use chrono::{DateTime, Utc};

/// A well-formed `record_outcome` request. `overall_score` is required;
/// `hop_scores`, when present, override `overall_score` for the hops they
/// name. A request carrying `hop_scores` with no `overall_score` is not a
/// supported shape.
#[derive(Debug, Clone)]
pub struct RecordOutcomeRequest {
    /// Trace this outcome closes out.
    pub trace_id: TraceId,
    /// Overall outcome score in `[0, 1]`.
    pub overall_score: crate::domain_types::OutcomeScore,
    /// Optional per-hop breakdown, keyed by hop index.
    pub hop_scores: Option<std::collections::HashMap<u32, crate::domain_types::OutcomeScore>>,
}

/// Records an outcome for `trace_id` and applies its reinforcement updates.
///
/// # Errors
///
/// Returns [`CoreError::AlreadyRecorded`] if an outcome for this trace was
/// already persisted, [`CoreError::NotFound`] if no route records exist for
/// the trace, or [`CoreError::Unavailable`] if the store is unreachable.
pub async fn record_outcome(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    credential: &str,
    request: RecordOutcomeRequest,
) -> CoreResult<()> {
    runtime.auth_gate.authenticate(tenant_id, credential).await?;

    if runtime.outcomes.exists(&request.trace_id).await? {
        return Err(CoreError::AlreadyRecorded(request.trace_id.to_string()));
    }

    let routes = runtime.nutrients.routes_for_trace(&request.trace_id).await?;
    if routes.is_empty() {
        return Err(CoreError::NotFound(format!(
            "no routes recorded for trace {}",
            request.trace_id
        )));
    }

    let now = system_time_to_utc(runtime.time_provider.now());

    for route in &routes {
        let effective = request
            .hop_scores
            .as_ref()
            .and_then(|scores| scores.get(&route.hop_index))
            .copied()
            .unwrap_or(request.overall_score);
        let effective_quality = Quality::try_new(effective.into_inner())
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

        apply_edge_update(runtime, tenant_id, &route.src_agent, &route.dst_agent, effective_quality, route.exploration_flagged, now)
            .await?;
        apply_avg_success_update(runtime, tenant_id, &route.dst_agent, effective_quality).await?;
    }

    let outcome = Outcome {
        trace_id: request.trace_id,
        tenant_id: tenant_id.clone(),
        overall_score: request.overall_score,
        hop_scores: request.hop_scores,
        recorded_at: now,
    };

    // Races between two concurrent first-callers are resolved by the
    // primary key on `outcomes.trace_id`: the loser's insert fails and is
    // reported as `AlreadyRecorded` rather than a generic store error, so
    // retried clients always observe the idempotent outcome.
    match runtime.outcomes.record(&outcome).await {
        Ok(()) => {}
        Err(CoreError::Unavailable(msg)) if msg.contains("UNIQUE constraint") => {
            return Err(CoreError::AlreadyRecorded(outcome.trace_id.to_string()));
        }
        Err(e) => return Err(e),
    }

    record_audit(runtime, tenant_id, "outcome.record", &outcome.trace_id.to_string(), now).await;
    Ok(())
}

async fn apply_edge_update(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    src: &AgentId,
    dst: &AgentId,
    effective: Quality,
    exploration_flagged: bool,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let current = match runtime.edges.get(tenant_id, src, dst).await? {
        Some(edge) => edge.weight,
        None => EdgeWeight::try_new(W_INIT).unwrap_or_default(),
    };

    let alpha_neg = if exploration_flagged { ALPHA_NEG / 2.0 } else { ALPHA_NEG };
    let updated = hebbian_update(current, effective, alpha_neg);

    let edge = crate::domain::Edge {
        tenant_id: tenant_id.clone(),
        src_agent: src.clone(),
        dst_agent: dst.clone(),
        weight: updated,
        last_update: now,
    };
    runtime.edges.upsert(&edge).await
}

async fn apply_avg_success_update(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    dst: &AgentId,
    effective: Quality,
) -> CoreResult<()> {
    let mut profile = match runtime.agent_profiles.get(tenant_id, dst).await {
        Ok(profile) => profile,
        // A recipient that has since been deregistered still earned its
        // edge update above; there is simply no profile left to EMA.
        Err(CoreError::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    profile.avg_success = update_avg_success(profile.avg_success, effective);
    runtime.agent_profiles.upsert(&profile).await
}

/// Relaxes every materialized edge, tenant by tenant, toward `W_MIN`
/// proportional to the time since its last update. Driven by
/// [`crate::scheduler`] on [`crate::config::RuntimeConfig::decay_interval`].
///
/// # Errors
///
/// Returns a [`CoreError`] if a tenant's edge list or the batched update
/// fails; the scheduler logs and retries at the next tick rather than
/// propagating this.
pub async fn decay_tick(runtime: &CoreRuntime) -> CoreResult<u64> {
    let now = system_time_to_utc(runtime.time_provider.now());
    let tenants = runtime.tenants.list_all().await?;
    let mut decayed = 0u64;

    for tenant in tenants {
        let edges = runtime.edges.list_all_for_tenant(&tenant.id).await?;
        if edges.is_empty() {
            continue;
        }

        let updates: Vec<_> = edges
            .iter()
            .map(|edge| {
                let elapsed_days =
                    (now - edge.last_update).num_seconds().max(0) as f64 / 86_400.0;
                let new_weight = crate::domain::decay_weight(edge.weight, elapsed_days);
                (edge.src_agent.clone(), edge.dst_agent.clone(), new_weight, now)
            })
            .collect();

        decayed += updates.len() as u64;
        runtime.edges.batch_update_weights(&tenant.id, &updates).await?;
    }

    Ok(decayed)
}

/// Default retention window for route records without an outcome, and the
/// ceiling past which even outcome-closed routes are reclaimed.
pub const ROUTE_RETENTION: chrono::Duration = chrono::Duration::days(7);

/// Deletes expired active nutrients and stale route records, tenant by
/// tenant. Driven by [`crate::scheduler`] on
/// [`crate::config::RuntimeConfig::sweep_interval`].
///
/// # Errors
///
/// Returns a [`CoreError`] if a tenant's delete fails; the scheduler logs
/// and retries at the next tick rather than propagating this.
pub async fn sweep_tick(runtime: &CoreRuntime) -> CoreResult<(u64, u64)> {
    let now = system_time_to_utc(runtime.time_provider.now());
    let route_threshold = now - ROUTE_RETENTION;
    let tenants = runtime.tenants.list_all().await?;

    let mut nutrients_deleted = 0u64;
    let mut routes_deleted = 0u64;
    for tenant in tenants {
        nutrients_deleted += runtime.nutrients.delete_expired(&tenant.id, now).await?;
        routes_deleted += runtime
            .nutrients
            .delete_routes_older_than(&tenant.id, route_threshold)
            .await?;
    }

    Ok((nutrients_deleted, routes_deleted))
}

async fn record_audit(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    operation: &str,
    payload: &str,
    now: DateTime<Utc>,
) {
    let event = crate::domain::AuditEvent {
        id: crate::domain_types::AuditEventId::generate(),
        tenant_id: tenant_id.clone(),
        operation: operation.to_string(),
        payload: payload.to_string(),
        signature: runtime.audit_signer.sign(payload.as_bytes()),
        created_at: now,
    };
    if let Err(e) = runtime.audit.append(&event).await {
        tracing::warn!(error = %e, operation, "failed to append audit event");
    }
}

fn system_time_to_utc(now: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::domain::routing::EmbeddingVector;
    use crate::domain::{AgentProfile, RouteRecord};
    use crate::domain_types::{AgentStatus, MaxHops, NutrientId, Sensitivity};
    use std::collections::HashMap;
    use tempfile::tempdir;

    async fn test_runtime() -> (CoreRuntime, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("reinforcement-test.db");
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            db_path.to_string_lossy().to_string(),
        );
        let config = RuntimeConfig::from_map(&vars).unwrap();
        let runtime = CoreRuntime::initialize(config).await.unwrap();
        (runtime, dir)
    }

    fn agent(tenant: &TenantId, id: &str) -> AgentProfile {
        AgentProfile {
            tenant_id: tenant.clone(),
            agent_id: AgentId::try_new(id.to_string()).unwrap(),
            profile_embedding: EmbeddingVector::try_from_vec(vec![0.1; 1536]).unwrap(),
            capabilities: vec![],
            recent_demand: vec![],
            status: AgentStatus::Active,
            avg_success: 0.5,
            last_active: Utc::now(),
        }
    }

    async fn seed_tenant(runtime: &CoreRuntime, id: &str) -> TenantId {
        let tenant_id = TenantId::try_new(id.to_string()).unwrap();
        let tenant = crate::domain::Tenant {
            id: tenant_id.clone(),
            plan_tier: crate::domain_types::PlanTier::Free,
            status: crate::domain_types::TenantStatus::Active,
            region: "local".to_string(),
            quota_broadcasts_per_min: crate::domain_types::RateLimitPerWindow::try_new(60).unwrap(),
            quota_searches_per_min: crate::domain_types::RateLimitPerWindow::try_new(120).unwrap(),
            exploration_epsilon: crate::domain_types::Epsilon::default(),
            created_at: Utc::now(),
        };
        runtime.tenants.upsert(&tenant).await.unwrap();
        tenant_id
    }

    async fn seed_route(
        runtime: &CoreRuntime,
        tenant_id: &TenantId,
        trace_id: TraceId,
        src: &str,
        dst: &str,
    ) {
        let route = RouteRecord {
            nutrient_id: NutrientId::generate(),
            tenant_id: tenant_id.clone(),
            trace_id,
            src_agent: AgentId::try_new(src.to_string()).unwrap(),
            dst_agent: AgentId::try_new(dst.to_string()).unwrap(),
            hop_index: 0,
            score: 0.8,
            exploration_flagged: false,
            created_at: Utc::now(),
        };
        runtime.nutrients.insert_route(&route).await.unwrap();
    }

    #[tokio::test]
    async fn record_outcome_strengthens_the_routed_edge() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;
        runtime.agent_profiles.upsert(&agent(&tenant_id, "b")).await.unwrap();
        let trace_id = TraceId::generate();
        seed_route(&runtime, &tenant_id, trace_id, "a", "b").await;

        let request = RecordOutcomeRequest {
            trace_id,
            overall_score: crate::domain_types::OutcomeScore::try_new(1.0).unwrap(),
            hop_scores: None,
        };
        record_outcome(&runtime, &tenant_id, "tenant-a", request).await.unwrap();

        let edge = runtime
            .edges
            .get(
                &tenant_id,
                &AgentId::try_new("a".to_string()).unwrap(),
                &AgentId::try_new("b".to_string()).unwrap(),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(edge.weight.into_inner() > W_INIT);
    }

    #[tokio::test]
    async fn duplicate_outcome_is_rejected() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;
        runtime.agent_profiles.upsert(&agent(&tenant_id, "b")).await.unwrap();
        let trace_id = TraceId::generate();
        seed_route(&runtime, &tenant_id, trace_id, "a", "b").await;

        let request = || RecordOutcomeRequest {
            trace_id,
            overall_score: crate::domain_types::OutcomeScore::try_new(1.0).unwrap(),
            hop_scores: None,
        };
        record_outcome(&runtime, &tenant_id, "tenant-a", request()).await.unwrap();
        let second = record_outcome(&runtime, &tenant_id, "tenant-a", request()).await;
        assert!(matches!(second, Err(CoreError::AlreadyRecorded(_))));
    }

    #[tokio::test]
    async fn outcome_for_unknown_trace_is_not_found() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;
        let request = RecordOutcomeRequest {
            trace_id: TraceId::generate(),
            overall_score: crate::domain_types::OutcomeScore::try_new(1.0).unwrap(),
            hop_scores: None,
        };
        let result = record_outcome(&runtime, &tenant_id, "tenant-a", request).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn exploration_flagged_route_halves_negative_penalty() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;
        runtime.agent_profiles.upsert(&agent(&tenant_id, "b")).await.unwrap();

        let edge = crate::domain::Edge {
            tenant_id: tenant_id.clone(),
            src_agent: AgentId::try_new("a".to_string()).unwrap(),
            dst_agent: AgentId::try_new("b".to_string()).unwrap(),
            weight: EdgeWeight::try_new(0.5).unwrap(),
            last_update: Utc::now(),
        };
        runtime.edges.upsert(&edge).await.unwrap();

        let trace_id = TraceId::generate();
        let route = RouteRecord {
            nutrient_id: NutrientId::generate(),
            tenant_id: tenant_id.clone(),
            trace_id,
            src_agent: edge.src_agent.clone(),
            dst_agent: edge.dst_agent.clone(),
            hop_index: 0,
            score: 0.4,
            exploration_flagged: true,
            created_at: Utc::now(),
        };
        runtime.nutrients.insert_route(&route).await.unwrap();

        let request = RecordOutcomeRequest {
            trace_id,
            overall_score: crate::domain_types::OutcomeScore::try_new(0.0).unwrap(),
            hop_scores: None,
        };
        record_outcome(&runtime, &tenant_id, "tenant-a", request).await.unwrap();

        let updated = runtime
            .edges
            .get(&tenant_id, &edge.src_agent, &edge.dst_agent)
            .await
            .unwrap()
            .unwrap();
        let full_penalty_weight =
            hebbian_update(edge.weight, Quality::try_new(0.0).unwrap(), ALPHA_NEG);
        assert!(updated.weight.into_inner() > full_penalty_weight.into_inner());
    }

    #[tokio::test]
    async fn decay_tick_relaxes_idle_edges_toward_floor() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;

        let stale = Utc::now() - chrono::Duration::days(30);
        let edge = crate::domain::Edge {
            tenant_id: tenant_id.clone(),
            src_agent: AgentId::try_new("a".to_string()).unwrap(),
            dst_agent: AgentId::try_new("b".to_string()).unwrap(),
            weight: EdgeWeight::try_new(1.0).unwrap(),
            last_update: stale,
        };
        runtime.edges.upsert(&edge).await.unwrap();

        let decayed = decay_tick(&runtime).await.unwrap();
        assert_eq!(decayed, 1);

        let after = runtime
            .edges
            .get(&tenant_id, &edge.src_agent, &edge.dst_agent)
            .await
            .unwrap()
            .unwrap();
        assert!(after.weight.into_inner() < 1.0);
        assert!(after.weight.into_inner() >= crate::domain_types::W_MIN);
    }

    #[tokio::test]
    async fn sweep_tick_removes_expired_nutrients() {
        let (runtime, _dir) = test_runtime().await;
        let tenant_id = seed_tenant(&runtime, "tenant-a").await;

        let now = Utc::now();
        let nutrient = crate::domain::Nutrient {
            id: NutrientId::generate(),
            tenant_id: tenant_id.clone(),
            trace_id: TraceId::generate(),
            sender_agent: AgentId::try_new("a".to_string()).unwrap(),
            summary: "stale".to_string(),
            embedding: EmbeddingVector::try_from_vec(vec![0.1; 1536]).unwrap(),
            snippets: vec![],
            tool_hints: vec![],
            sensitivity: Sensitivity::Public,
            ttl_sec: 1,
            max_hops: MaxHops::try_new(1).unwrap(),
            current_hop: 0,
            created_at: now - chrono::Duration::seconds(10),
            expires_at: now - chrono::Duration::seconds(5),
        };
        runtime.nutrients.insert(&nutrient).await.unwrap();

        let (nutrients_deleted, _routes_deleted) = sweep_tick(&runtime).await.unwrap();
        assert_eq!(nutrients_deleted, 1);
    }
}
