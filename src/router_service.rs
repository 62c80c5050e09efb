//! Router Service: the external surface for broadcast and collect.
//!
//! Orchestrates authn/authz, rate limiting, DLP policy evaluation, the pure
//! [`crate::domain::routing`] scoring/MMR engine, and persistence. Fail-fast
//! steps (auth, rate limit, policy, TTL/hop validation) run before anything
//! is persisted; once the nutrient itself is durable, candidate hydration
//! and delivery are best-effort — a failure there is logged and does not
//! fail the call.

use crate::domain::routing::{select_agents, EmbeddingVector, RoutingCandidate, RoutingReason};
use crate::domain::{AgentProfile, Nutrient, RouteRecord};
use crate::domain_types::{
    AgentId, CandidateBound, MaxHops, NutrientId, Sensitivity, TenantId, Token, TraceId,
    TtlSeconds,
};
use crate::error::{CoreError, CoreResult};
use crate::runtime::CoreRuntime;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

const MAX_PERSIST_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MIN_SIMILARITY_THRESHOLD: f64 = 0.7;

/// A well-formed broadcast request, validated by the caller (REST layer)
/// before reaching this service.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    /// Trace tying this broadcast to its eventual outcome. Caller-supplied
    /// (carried in the request path) rather than server-generated, so a
    /// retried broadcast call can be recognized as a retry rather than a
    /// second, independent fan-out.
    pub trace_id: TraceId,
    /// Agent originating the broadcast.
    pub sender_agent: AgentId,
    /// Human-readable summary of the knowledge being shared.
    pub summary: String,
    /// Embedding of `summary`, used as the routing query vector.
    pub embedding: EmbeddingVector,
    /// Optional supporting snippets.
    pub snippets: Vec<String>,
    /// Tool-hint tokens for semantic-overlap and capability-boost scoring.
    pub tool_hints: Vec<Token>,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Seconds until this nutrient expires.
    pub ttl_sec: TtlSeconds,
    /// Maximum propagation hops.
    pub max_hops: MaxHops,
}

/// Result of a successful `broadcast` call.
#[derive(Debug, Clone)]
pub struct BroadcastResponse {
    /// Identifier of the persisted nutrient.
    pub nutrient_id: NutrientId,
    /// Trace tying this broadcast to its eventual outcome.
    pub trace_id: TraceId,
    /// Number of recipients the nutrient was actually routed to.
    pub delivered_count: usize,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Broadcasts `request` from `tenant_id`, authenticated by `credential`.
///
/// # Errors
///
/// Returns [`CoreError::Unauthenticated`]/[`CoreError::PermissionDenied`] if
/// the credential does not resolve, [`CoreError::RateLimited`] if the
/// tenant's broadcast quota is exhausted, [`CoreError::PolicyDenied`] if a
/// DLP policy rejects the content, or [`CoreError::Expired`] if the
/// requested TTL/hop budget is already exhausted. Persistence failures
/// surface as [`CoreError::Unavailable`] after retry exhaustion.
pub async fn broadcast(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    credential: &str,
    request: BroadcastRequest,
) -> CoreResult<BroadcastResponse> {
    let auth = runtime.auth_gate.authenticate(tenant_id, credential).await?;
    let tenant = runtime.tenants.get(tenant_id).await?;
    if !tenant.is_active() {
        return Err(CoreError::PermissionDenied("tenant is suspended".to_string()));
    }

    let now = runtime.time_provider.now();
    let now_utc = system_time_to_utc(now);

    runtime.rate_limiter.check_and_increment(
        tenant_id.as_ref(),
        request.sender_agent.as_ref(),
        "broadcast",
        tenant.quota_broadcasts_per_min,
        now,
    )?;

    let policy_effect = runtime
        .policy_evaluator
        .evaluate(
            tenant_id,
            &crate::domain::policy::EvaluationContext {
                sensitivity: request.sensitivity,
                agent_id: request.sender_agent.as_ref(),
                text: &request.summary,
            },
        )
        .await?;
    if policy_effect == crate::domain::policy::Effect::Deny {
        return Err(CoreError::PolicyDenied(
            "broadcast content denied by tenant policy".to_string(),
        ));
    }

    // Every broadcast originates a fresh nutrient at current_hop = 0, so the
    // hop-exhaustion half of step 4's contract (`current_hop >= max_hops`)
    // can never trigger here; re-propagation past the origination hop is out
    // of scope for this Router Service (see DESIGN.md). `ttl_sec`/`max_hops`
    // well-formedness is enforced at construction by `TtlSeconds`/`MaxHops`.

    let trace_id = request.trace_id;
    let nutrient_id = NutrientId::generate();
    let expires_at = now_utc + ChronoDuration::seconds(i64::from(request.ttl_sec.into_inner()));

    let nutrient = Nutrient {
        id: nutrient_id,
        tenant_id: tenant_id.clone(),
        trace_id,
        sender_agent: request.sender_agent.clone(),
        summary: request.summary,
        embedding: request.embedding.clone(),
        snippets: request.snippets,
        tool_hints: request.tool_hints.clone(),
        sensitivity: request.sensitivity,
        ttl_sec: request.ttl_sec.into_inner(),
        max_hops: request.max_hops,
        current_hop: 0,
        created_at: now_utc,
        expires_at,
    };

    with_retry(|| runtime.nutrients.insert(&nutrient)).await?;

    record_audit(
        runtime,
        tenant_id,
        "broadcast",
        &format!("nutrient={nutrient_id} sender={}", request.sender_agent),
        now_utc,
    )
    .await;

    let delivered_count = match route_and_deliver(
        runtime,
        tenant_id,
        tenant.exploration_epsilon,
        &nutrient,
        &auth.agent_id.unwrap_or(request.sender_agent),
    )
    .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, %nutrient_id, "best-effort fan-out failed after persistence");
            0
        }
    };

    Ok(BroadcastResponse {
        nutrient_id,
        trace_id,
        delivered_count,
        expires_at,
    })
}

/// Steps 6-10 of `broadcast`: batch-load candidates, score/diversify via the
/// Routing Engine, and persist one route record per recipient. Best-effort:
/// any failure here is surfaced to the caller, which logs and swallows it.
async fn route_and_deliver(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    exploration_epsilon: crate::domain_types::Epsilon,
    nutrient: &Nutrient,
    sender: &AgentId,
) -> CoreResult<usize> {
    let active_count = runtime.agent_profiles.count_active(tenant_id).await?;
    let k = CandidateBound::for_active_agents(active_count);
    let m = (k.into_inner() as usize) * 4;

    let edges = runtime.edges.list_outgoing(tenant_id, sender).await?;
    let top_edges = edges.into_iter().take(m);
    let edge_weights: HashMap<AgentId, crate::domain_types::EdgeWeight> =
        top_edges.map(|e| (e.dst_agent, e.weight)).collect();

    let active_profiles = runtime.agent_profiles.list_active(tenant_id).await?;
    let candidates = build_candidates(sender, &active_profiles, &edge_weights, m);

    if candidates.is_empty() {
        return Ok(0);
    }

    // Per-tenant exploration rate overrides the process-wide default; every
    // other scoring/MMR coefficient stays shared across tenants.
    let mut router_config = runtime.router_config;
    router_config.epsilon = exploration_epsilon;

    let mut rng = OsRng;
    let decisions = select_agents(
        &candidates,
        &nutrient.embedding,
        &nutrient.tool_hints,
        k,
        &router_config,
        &mut rng,
    )
    .map_err(|e| CoreError::Unavailable(format!("routing engine: {e}")))?;

    let now = system_time_to_utc(runtime.time_provider.now());
    let mut delivered = 0usize;
    for (hop_index, decision) in decisions.into_iter().enumerate() {
        let route = RouteRecord {
            nutrient_id: nutrient.id,
            tenant_id: tenant_id.clone(),
            trace_id: nutrient.trace_id,
            src_agent: sender.clone(),
            dst_agent: decision.agent_id,
            hop_index: u32::try_from(hop_index).unwrap_or(u32::MAX),
            score: decision.score,
            exploration_flagged: matches!(decision.reason, RoutingReason::Exploration),
            created_at: now,
        };
        match with_retry(|| runtime.nutrients.insert_route(&route)).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!(error = %e, dst = %route.dst_agent, "route persistence failed"),
        }
    }

    Ok(delivered)
}

/// Joins the tenant's active agent profiles against the sender's top-M
/// outgoing edges. When the sender has no established edges yet (a fresh
/// tenant's social graph has not grown along any path), falls back to every
/// other active, routable profile so the substrate can bootstrap instead of
/// permanently deadlocking on the first broadcast.
fn build_candidates(
    sender: &AgentId,
    active_profiles: &[AgentProfile],
    edge_weights: &HashMap<AgentId, crate::domain_types::EdgeWeight>,
    m: usize,
) -> Vec<RoutingCandidate> {
    let others: Vec<&AgentProfile> = active_profiles
        .iter()
        .filter(|p| &p.agent_id != sender && p.is_routable())
        .collect();

    if edge_weights.is_empty() {
        return others
            .into_iter()
            .take(m)
            .map(|p| RoutingCandidate {
                agent_id: p.agent_id.clone(),
                profile_embedding: p.profile_embedding.clone(),
                capabilities: p.capabilities.clone(),
                edge_weight: None,
            })
            .collect();
    }

    let known: HashSet<&AgentId> = edge_weights.keys().collect();
    others
        .into_iter()
        .filter(|p| known.contains(&p.agent_id))
        .map(|p| RoutingCandidate {
            agent_id: p.agent_id.clone(),
            profile_embedding: p.profile_embedding.clone(),
            capabilities: p.capabilities.clone(),
            edge_weight: edge_weights.get(&p.agent_id).copied(),
        })
        .collect()
}

/// A live nutrient scored against a caller's query for `collect`.
#[derive(Debug, Clone)]
pub struct CollectedNutrient {
    /// The matched nutrient.
    pub nutrient: Nutrient,
    /// Cosine similarity against the caller's query embedding.
    pub similarity: f64,
}

/// Collects up to `top_k` live nutrients matching `query`, diversified by
/// MMR, visible to `caller` at `caller_clearance` or below.
///
/// # Errors
///
/// Returns the same authn/rate-limit/policy errors as [`broadcast`].
pub async fn collect(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    credential: &str,
    caller: &AgentId,
    query: &EmbeddingVector,
    top_k: usize,
    caller_clearance: Sensitivity,
) -> CoreResult<(TraceId, Vec<CollectedNutrient>)> {
    runtime.auth_gate.authenticate(tenant_id, credential).await?;
    let tenant = runtime.tenants.get(tenant_id).await?;
    if !tenant.is_active() {
        return Err(CoreError::PermissionDenied("tenant is suspended".to_string()));
    }

    let now = runtime.time_provider.now();
    runtime.rate_limiter.check_and_increment(
        tenant_id.as_ref(),
        caller.as_ref(),
        "collect",
        tenant.quota_searches_per_min,
        now,
    )?;

    let now_utc = system_time_to_utc(now);
    let pool_size = (top_k.max(1) * 3) as u32;
    let candidates = runtime
        .nutrients
        .search_active_candidates(tenant_id, now_utc, pool_size)
        .await?;

    let mut scored: Vec<(Nutrient, f64)> = candidates
        .into_iter()
        .filter(|n| n.sensitivity <= caller_clearance)
        .map(|n| {
            let sim = n.embedding.cosine_similarity(query);
            (n, sim)
        })
        .filter(|(_, sim)| *sim >= MIN_SIMILARITY_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let ranked: Vec<(f64, &Nutrient)> = scored.iter().map(|(n, sim)| (*sim, n)).collect();
    let diversified = crate::domain::mmr_diversify(
        &ranked,
        |n: &Nutrient| &n.embedding,
        runtime.router_config.lambda_mmr,
        top_k.max(1),
    );

    let results: Vec<CollectedNutrient> = diversified
        .into_iter()
        .map(|n| CollectedNutrient {
            nutrient: n.clone(),
            similarity: n.embedding.cosine_similarity(query),
        })
        .collect();

    let trace_id = TraceId::generate();
    Ok((trace_id, results))
}

/// Registers or updates an agent profile. A thin, tenant-scoped passthrough
/// to [`crate::storage::AgentProfileStorage`]; embedding dimension is
/// enforced by [`EmbeddingVector::try_from_vec`] before this is reached.
///
/// # Errors
///
/// Returns a [`CoreError`] if the underlying store is unreachable.
pub async fn register_agent(runtime: &CoreRuntime, profile: &AgentProfile) -> CoreResult<()> {
    runtime.agent_profiles.upsert(profile).await
}

/// Deactivates an agent so it is no longer selected as a routing candidate.
///
/// # Errors
///
/// Returns a [`CoreError`] if the underlying store is unreachable.
pub async fn deactivate_agent(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    agent_id: &AgentId,
) -> CoreResult<()> {
    let mut profile = runtime.agent_profiles.get(tenant_id, agent_id).await?;
    profile.status = crate::domain_types::AgentStatus::Inactive;
    runtime.agent_profiles.upsert(&profile).await
}

/// Lists every active agent profile for a tenant.
///
/// # Errors
///
/// Returns a [`CoreError`] if the underlying store is unreachable.
pub async fn list_agents(runtime: &CoreRuntime, tenant_id: &TenantId) -> CoreResult<Vec<AgentProfile>> {
    runtime.agent_profiles.list_active(tenant_id).await
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

/// Retries `op` up to [`MAX_PERSIST_RETRIES`] times with jittered
/// exponential backoff starting at [`INITIAL_BACKOFF`], only on retryable
/// errors (store unavailability). Terminal errors (validation, conflicts)
/// propagate immediately.
async fn with_retry<F, Fut, T>(mut op: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = CoreResult<T>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_PERSIST_RETRIES => {
                attempt += 1;
                let jitter_ms = rand_jitter_ms(backoff.as_millis() as u64);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
                backoff *= 3;
            }
            Err(e) => return Err(e),
        }
    }
}

fn rand_jitter_ms(base_ms: u64) -> u64 {
    use rand::Rng;
    let mut rng = OsRng;
    let jitter = rng.gen_range(0..=base_ms / 2);
    base_ms + jitter
}

fn system_time_to_utc(now: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::AgentStatus;

    fn profile(agent: &str, last_active: DateTime<Utc>) -> AgentProfile {
        AgentProfile {
            tenant_id: crate::domain_types::TenantId::try_new("tenant-a".to_string()).unwrap(),
            agent_id: AgentId::try_new(agent.to_string()).unwrap(),
            profile_embedding: EmbeddingVector::try_from_vec(vec![0.1; 1536]).unwrap(),
            capabilities: vec![],
            recent_demand: vec![],
            status: AgentStatus::Active,
            avg_success: 0.5,
            last_active,
        }
    }

    #[test]
    fn cold_start_falls_back_to_all_active_profiles() {
        let now = Utc::now();
        let sender = AgentId::try_new("sender".to_string()).unwrap();
        let profiles = vec![profile("agent-1", now), profile("agent-2", now)];
        let edge_weights = HashMap::new();

        let candidates = build_candidates(&sender, &profiles, &edge_weights, 10);
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.edge_weight.is_none()));
    }

    #[test]
    fn established_edges_restrict_candidates_to_known_neighbors() {
        let now = Utc::now();
        let sender = AgentId::try_new("sender".to_string()).unwrap();
        let profiles = vec![profile("agent-1", now), profile("agent-2", now)];
        let mut edge_weights = HashMap::new();
        edge_weights.insert(
            AgentId::try_new("agent-1".to_string()).unwrap(),
            crate::domain_types::EdgeWeight::default(),
        );

        let candidates = build_candidates(&sender, &profiles, &edge_weights, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].agent_id.as_ref(), "agent-1");
        assert!(candidates[0].edge_weight.is_some());
    }

    #[test]
    fn sender_never_routes_to_itself() {
        let now = Utc::now();
        let sender = AgentId::try_new("sender".to_string()).unwrap();
        let profiles = vec![profile("sender", now), profile("agent-2", now)];
        let edge_weights = HashMap::new();

        let candidates = build_candidates(&sender, &profiles, &edge_weights, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].agent_id.as_ref(), "agent-2");
    }
}
