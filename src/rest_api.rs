//! REST surface: the eight external endpoints of the substrate.
//!
//! Every handler follows the same shape: extract and validate the JSON body
//! into a service-layer request, pull `X-Tenant-Id`/bearer credential out of
//! the headers, call the matching `router_service`/`hyphal_service`/
//! `reinforcement_service` function against the shared [`CoreRuntime`], and
//! let [`crate::error::CoreError`]'s `IntoResponse` impl turn a failure into
//! the documented status code and `{code, message, retry_after_ms?,
//! trace_id}` body.

use crate::domain::routing::EmbeddingVector;
use crate::domain_types::{
    AgentId, MaxHops, MemoryKind, OutcomeScore, Quality, Sensitivity, TenantId, Token, TraceId,
    TtlSeconds,
};
use crate::error::{CoreError, CoreResult};
use crate::hyphal_service;
use crate::reinforcement_service::{self, RecordOutcomeRequest};
use crate::router_service::{self, BroadcastRequest};
use crate::runtime::CoreRuntime;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state threaded through every handler.
pub type AppState = Arc<CoreRuntime>;

/// Builds the axum router for all eight external endpoints.
#[must_use]
pub fn create_router(runtime: AppState) -> Router {
    Router::new()
        .route("/v1/broadcast/{tenant}/{trace}", post(broadcast))
        .route("/v1/collect/{tenant}", post(collect))
        .route("/v1/outcomes/{tenant}/{trace}", post(record_outcome))
        .route("/v1/hyphal/{tenant}", post(store_memory))
        .route("/v1/hyphal:search/{tenant}", post(search_memory))
        .route("/v1/agents:register", post(register_agent))
        .route("/v1/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(runtime)
}

/// Resolved `X-Tenant-Id` / bearer-credential pair common to every handler.
struct Credentials {
    tenant_id: TenantId,
    credential: String,
}

fn extract_credentials(tenant_path: &str, headers: &HeaderMap) -> CoreResult<Credentials> {
    let header_tenant = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !header_tenant.is_empty() && header_tenant != tenant_path {
        return Err(CoreError::PermissionDenied(
            "X-Tenant-Id header does not match the request path".to_string(),
        ));
    }

    let tenant_id = TenantId::try_new(tenant_path.to_string())
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

    let credential = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();

    Ok(Credentials { tenant_id, credential })
}

fn parse_embedding(values: Vec<f32>) -> CoreResult<EmbeddingVector> {
    EmbeddingVector::try_from_vec(values).map_err(|e| CoreError::InvalidArgument(e.to_string()))
}

fn parse_uuid_id(raw: &str, field: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| CoreError::InvalidArgument(format!("{field} is not a valid UUID")))
}

// --- POST /v1/broadcast/{tenant}/{trace} -----------------------------------

/// Request body for `POST /v1/broadcast/{tenant}/{trace}`.
#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    sender_agent: String,
    summary: String,
    embedding: Vec<f32>,
    #[serde(default)]
    snippets: Vec<String>,
    #[serde(default)]
    tool_hints: Vec<String>,
    sensitivity: String,
    ttl_sec: u32,
    max_hops: u32,
}

/// Response body for a successful broadcast.
#[derive(Debug, Serialize)]
pub struct BroadcastResponseBody {
    nutrient_id: String,
    delivered: usize,
    expires_at: chrono::DateTime<chrono::Utc>,
}

async fn broadcast(
    State(runtime): State<AppState>,
    Path((tenant, trace)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<BroadcastBody>,
) -> impl IntoResponse {
    runtime.metrics.record_broadcast();
    match broadcast_inner(&runtime, &tenant, &trace, &headers, body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn broadcast_inner(
    runtime: &CoreRuntime,
    tenant: &str,
    trace: &str,
    headers: &HeaderMap,
    body: BroadcastBody,
) -> CoreResult<BroadcastResponseBody> {
    let creds = extract_credentials(tenant, headers)?;
    let trace_id = TraceId::new(parse_uuid_id(trace, "trace")?);

    let sender_agent = AgentId::try_new(body.sender_agent)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let sensitivity = Sensitivity::parse(&body.sensitivity)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let max_hops =
        MaxHops::try_new(body.max_hops).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let ttl_sec =
        TtlSeconds::try_new(body.ttl_sec).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let tool_hints = body
        .tool_hints
        .into_iter()
        .map(|t| Token::try_new(t).map_err(|e| CoreError::InvalidArgument(e.to_string())))
        .collect::<CoreResult<Vec<_>>>()?;
    let embedding = parse_embedding(body.embedding)?;

    let request = BroadcastRequest {
        trace_id,
        sender_agent,
        summary: body.summary,
        embedding,
        snippets: body.snippets,
        tool_hints,
        sensitivity,
        ttl_sec,
        max_hops,
    };

    let response = router_service::broadcast(runtime, &creds.tenant_id, &creds.credential, request)
        .await?;

    Ok(BroadcastResponseBody {
        nutrient_id: response.nutrient_id.to_string(),
        delivered: response.delivered_count,
        expires_at: response.expires_at,
    })
}

// --- POST /v1/collect/{tenant} ---------------------------------------------

/// Request body for `POST /v1/collect/{tenant}`.
#[derive(Debug, Deserialize)]
pub struct CollectBody {
    caller_agent: String,
    query_embedding: Vec<f32>,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_clearance")]
    caller_clearance: String,
}

fn default_top_k() -> usize {
    10
}

fn default_clearance() -> String {
    "public".to_string()
}

/// One matched nutrient in a `collect` response.
#[derive(Debug, Serialize)]
pub struct CollectedContent {
    agent_id: String,
    summary: String,
    score: f64,
    data: Vec<String>,
}

/// Response body for a successful collect.
#[derive(Debug, Serialize)]
pub struct CollectResponseBody {
    trace_id: String,
    contents: Vec<CollectedContent>,
}

async fn collect(
    State(runtime): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CollectBody>,
) -> impl IntoResponse {
    runtime.metrics.record_collect();
    match collect_inner(&runtime, &tenant, &headers, body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn collect_inner(
    runtime: &CoreRuntime,
    tenant: &str,
    headers: &HeaderMap,
    body: CollectBody,
) -> CoreResult<CollectResponseBody> {
    let creds = extract_credentials(tenant, headers)?;
    let caller = AgentId::try_new(body.caller_agent)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let query = parse_embedding(body.query_embedding)?;
    let clearance = Sensitivity::parse(&body.caller_clearance)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

    let (trace_id, results) = router_service::collect(
        runtime,
        &creds.tenant_id,
        &creds.credential,
        &caller,
        &query,
        body.top_k,
        clearance,
    )
    .await?;

    let contents = results
        .into_iter()
        .map(|c| CollectedContent {
            agent_id: c.nutrient.sender_agent.to_string(),
            summary: c.nutrient.summary,
            score: c.similarity,
            data: c.nutrient.snippets,
        })
        .collect();

    Ok(CollectResponseBody { trace_id: trace_id.to_string(), contents })
}

// --- POST /v1/outcomes/{tenant}/{trace} ------------------------------------

/// Request body for `POST /v1/outcomes/{tenant}/{trace}`.
#[derive(Debug, Deserialize)]
pub struct RecordOutcomeBody {
    overall_score: f64,
    #[serde(default)]
    hop_scores: Option<HashMap<u32, f64>>,
}

async fn record_outcome(
    State(runtime): State<AppState>,
    Path((tenant, trace)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<RecordOutcomeBody>,
) -> impl IntoResponse {
    runtime.metrics.record_outcome();
    match record_outcome_inner(&runtime, &tenant, &trace, &headers, body).await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({}))).into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn record_outcome_inner(
    runtime: &CoreRuntime,
    tenant: &str,
    trace: &str,
    headers: &HeaderMap,
    body: RecordOutcomeBody,
) -> CoreResult<()> {
    let creds = extract_credentials(tenant, headers)?;
    let trace_id = TraceId::new(parse_uuid_id(trace, "trace")?);

    let overall_score = OutcomeScore::try_new(body.overall_score)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let hop_scores = body
        .hop_scores
        .map(|map| {
            map.into_iter()
                .map(|(hop, score)| {
                    OutcomeScore::try_new(score)
                        .map(|s| (hop, s))
                        .map_err(|e| CoreError::InvalidArgument(e.to_string()))
                })
                .collect::<CoreResult<HashMap<u32, OutcomeScore>>>()
        })
        .transpose()?;

    let request = RecordOutcomeRequest { trace_id, overall_score, hop_scores };
    reinforcement_service::record_outcome(runtime, &creds.tenant_id, &creds.credential, request)
        .await
}

// --- POST /v1/hyphal/{tenant} ----------------------------------------------

/// Request body for `POST /v1/hyphal/{tenant}`.
#[derive(Debug, Deserialize)]
pub struct StoreMemoryBody {
    agent_id: String,
    kind: String,
    content: String,
    #[serde(default = "default_content_type")]
    content_type: String,
    embedding: Vec<f32>,
    quality: f64,
    sensitivity: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// Response body for a successful memory store.
#[derive(Debug, Serialize)]
pub struct StoreMemoryResponseBody {
    id: String,
}

async fn store_memory(
    State(runtime): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(body): Json<StoreMemoryBody>,
) -> impl IntoResponse {
    runtime.metrics.record_memory_store();
    match store_memory_inner(&runtime, &tenant, &headers, body).await {
        Ok(id) => (StatusCode::CREATED, Json(StoreMemoryResponseBody { id })).into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn store_memory_inner(
    runtime: &CoreRuntime,
    tenant: &str,
    headers: &HeaderMap,
    body: StoreMemoryBody,
) -> CoreResult<String> {
    let creds = extract_credentials(tenant, headers)?;
    let agent_id =
        AgentId::try_new(body.agent_id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let kind = MemoryKind::parse(&body.kind).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let quality =
        Quality::try_new(body.quality).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let sensitivity = Sensitivity::parse(&body.sensitivity)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let embedding = parse_embedding(body.embedding)?;

    let request = hyphal_service::StoreRequest {
        agent_id,
        kind,
        content: body.content.into_bytes(),
        content_type: body.content_type,
        embedding,
        quality,
        sensitivity,
        user_id: body.user_id,
        expires_at: body.expires_at,
    };

    let id = hyphal_service::store(runtime, &creds.tenant_id, &creds.credential, request).await?;
    Ok(id.to_string())
}

// --- POST /v1/hyphal:search/{tenant} ---------------------------------------

/// Request body for `POST /v1/hyphal:search/{tenant}`.
#[derive(Debug, Deserialize)]
pub struct SearchMemoryBody {
    caller_agent: String,
    query_embedding: Vec<f32>,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    min_quality: f64,
    #[serde(default)]
    kind_filter: Option<String>,
    #[serde(default)]
    user_filter: Option<String>,
    #[serde(default = "default_clearance")]
    caller_clearance: String,
}

/// One matched memory in a `hyphal:search` response.
#[derive(Debug, Serialize)]
pub struct SearchResultBody {
    id: String,
    content: String,
    content_type: String,
    similarity: f64,
    quality: f64,
}

async fn search_memory(
    State(runtime): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SearchMemoryBody>,
) -> impl IntoResponse {
    runtime.metrics.record_memory_search();
    match search_memory_inner(&runtime, &tenant, &headers, body).await {
        Ok(results) => (StatusCode::OK, Json(serde_json::json!({ "results": results }))).into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn search_memory_inner(
    runtime: &CoreRuntime,
    tenant: &str,
    headers: &HeaderMap,
    body: SearchMemoryBody,
) -> CoreResult<Vec<SearchResultBody>> {
    let creds = extract_credentials(tenant, headers)?;
    let caller = AgentId::try_new(body.caller_agent)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let embedding = parse_embedding(body.query_embedding)?;
    let min_quality =
        Quality::try_new(body.min_quality).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let kind_filter = body
        .kind_filter
        .map(|k| MemoryKind::parse(&k).map_err(|e| CoreError::InvalidArgument(e.to_string())))
        .transpose()?;
    let sensitivity_ceiling = Sensitivity::parse(&body.caller_clearance)
        .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;

    let request = hyphal_service::SearchRequest {
        embedding,
        top_k: body.top_k,
        min_quality,
        kind_filter,
        user_filter: body.user_filter,
        sensitivity_ceiling,
    };

    let results =
        hyphal_service::search(runtime, &creds.tenant_id, &creds.credential, &caller, request)
            .await?;

    Ok(results
        .into_iter()
        .map(|r| SearchResultBody {
            id: r.memory.id.to_string(),
            content: String::from_utf8_lossy(&r.memory.content).to_string(),
            content_type: r.memory.content_type,
            similarity: r.similarity,
            quality: r.memory.quality.into_inner(),
        })
        .collect())
}

// --- POST /v1/agents:register -----------------------------------------------

/// Request body for `POST /v1/agents:register`.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    tenant_id: String,
    agent_id: String,
    profile_embedding: Vec<f32>,
    #[serde(default)]
    capabilities: Vec<String>,
}

async fn register_agent(
    State(runtime): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterAgentBody>,
) -> impl IntoResponse {
    match register_agent_inner(&runtime, &headers, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            runtime.metrics.record_error();
            e.into_response()
        }
    }
}

async fn register_agent_inner(
    runtime: &CoreRuntime,
    headers: &HeaderMap,
    body: RegisterAgentBody,
) -> CoreResult<()> {
    let creds = extract_credentials(&body.tenant_id, headers)?;
    let agent_id =
        AgentId::try_new(body.agent_id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
    let profile_embedding = parse_embedding(body.profile_embedding)?;
    let capabilities = body
        .capabilities
        .into_iter()
        .map(|t| Token::try_new(t).map_err(|e| CoreError::InvalidArgument(e.to_string())))
        .collect::<CoreResult<Vec<_>>>()?;

    let now = chrono::Utc::now();
    let profile = crate::domain::AgentProfile {
        tenant_id: creds.tenant_id,
        agent_id,
        profile_embedding,
        capabilities,
        recent_demand: vec![],
        status: crate::domain_types::AgentStatus::Active,
        avg_success: 0.5,
        last_active: now,
    };

    router_service::register_agent(runtime, &profile).await
}

// --- GET /v1/health ----------------------------------------------------------

/// Response body for `GET /v1/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponseBody {
    status: String,
    stores: HashMap<String, String>,
}

async fn health(State(runtime): State<AppState>) -> impl IntoResponse {
    let mut stores = HashMap::new();
    let db_ok = runtime.db.test_connection().await.is_ok();
    stores.insert("relational".to_string(), if db_ok { "ok" } else { "unavailable" }.to_string());

    if db_ok {
        (
            StatusCode::OK,
            Json(HealthResponseBody { status: "ok".to_string(), stores }),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponseBody { status: "degraded".to_string(), stores }),
        )
            .into_response()
    }
}

// --- GET /metrics ------------------------------------------------------------

async fn metrics(State(runtime): State<AppState>) -> impl IntoResponse {
    runtime.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_header_mismatch_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", "tenant-b".parse().unwrap());
        let result = extract_credentials("tenant-a", &headers);
        assert!(matches!(result, Err(CoreError::PermissionDenied(_))));
    }

    #[test]
    fn bearer_prefix_is_stripped_from_authorization_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer tenant-a:agent-1".parse().unwrap());
        let creds = extract_credentials("tenant-a", &headers).unwrap();
        assert_eq!(creds.credential, "tenant-a:agent-1");
    }

    #[test]
    fn missing_authorization_header_yields_empty_credential() {
        let headers = HeaderMap::new();
        let creds = extract_credentials("tenant-a", &headers).unwrap();
        assert!(creds.credential.is_empty());
    }
}
