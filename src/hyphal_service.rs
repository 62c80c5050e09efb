//! Hyphal Memory Service: the durable, vector-indexed knowledge store.
//!
//! `store` and `search` sit behind the same authn/policy/audit gates as the
//! Router Service (the same client → auth/quota gate → ... → persist
//! control flow applies uniformly across the REST surface), plus envelope
//! encryption for sensitive content and MMR diversification over the
//! approximate-nearest-neighbor candidate pool.

use crate::domain::routing::EmbeddingVector;
use crate::domain::Memory;
use crate::domain_types::{
    AgentId, MemoryId, MemoryKind, Quality, Sensitivity, TenantId,
};
use crate::error::{CoreError, CoreResult};
use crate::runtime::CoreRuntime;
use chrono::{DateTime, Utc};
use rand::RngCore;

/// Length, in bytes, of the per-row key-derivation salt framed as a prefix
/// on encrypted `content`.
const SALT_LEN: usize = 16;

/// A well-formed `store` request.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    /// Agent authoring this memory.
    pub agent_id: AgentId,
    /// Kind of memory entry.
    pub kind: MemoryKind,
    /// Opaque content blob.
    pub content: Vec<u8>,
    /// MIME type describing how to interpret `content`.
    pub content_type: String,
    /// Embedding over `content` (or a summary of it).
    pub embedding: EmbeddingVector,
    /// Initial quality score in `[0, 1]`.
    pub quality: Quality,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Optional end-user scoping.
    pub user_id: Option<String>,
    /// Optional absolute expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Writes a memory row, encrypting `content` at rest if `sensitivity`
/// requires it.
///
/// # Errors
///
/// Returns [`CoreError::InvalidArgument`] if the content exceeds
/// [`crate::domain::memory::MAX_CONTENT_BYTES`], or the same
/// auth/policy/store errors as the Router Service.
pub async fn store(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    credential: &str,
    request: StoreRequest,
) -> CoreResult<MemoryId> {
    runtime.auth_gate.authenticate(tenant_id, credential).await?;
    let tenant = runtime.tenants.get(tenant_id).await?;
    if !tenant.is_active() {
        return Err(CoreError::PermissionDenied("tenant is suspended".to_string()));
    }

    if request.content.len() > crate::domain::memory::MAX_CONTENT_BYTES {
        return Err(CoreError::InvalidArgument(format!(
            "content exceeds the {}-byte limit",
            crate::domain::memory::MAX_CONTENT_BYTES
        )));
    }

    let policy_effect = runtime
        .policy_evaluator
        .evaluate(
            tenant_id,
            &crate::domain::policy::EvaluationContext {
                sensitivity: request.sensitivity,
                agent_id: request.agent_id.as_ref(),
                text: std::str::from_utf8(&request.content).unwrap_or(""),
            },
        )
        .await?;
    if policy_effect == crate::domain::policy::Effect::Deny {
        return Err(CoreError::PolicyDenied(
            "memory content denied by tenant policy".to_string(),
        ));
    }

    let now = system_time_to_utc(runtime.time_provider.now());
    let id = MemoryId::generate();

    let (content, nonce) = if request.sensitivity.requires_encryption() {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let aad = tenant_id.as_ref().as_bytes();
        let (nonce, ciphertext) = runtime
            .encryptor
            .encrypt(&request.content, &salt, aad)
            .map_err(CoreError::from)?;
        // The salt travels with the ciphertext: prefixed so `search` can
        // recover it without a separate column.
        let mut framed = salt.to_vec();
        framed.extend_from_slice(&ciphertext);
        (framed, Some(nonce))
    } else {
        (request.content, None)
    };

    let memory = Memory {
        id,
        tenant_id: tenant_id.clone(),
        agent_id: request.agent_id,
        kind: request.kind,
        content,
        content_type: request.content_type,
        embedding: request.embedding,
        quality: request.quality,
        sensitivity: request.sensitivity,
        created_at: now,
        expires_at: request.expires_at,
        accessed_count: 0,
        user_id: request.user_id,
        encryption_nonce: nonce,
    };

    runtime.memories.insert(&memory).await?;
    record_audit(runtime, tenant_id, "memory.store", &memory.id.to_string(), now).await;

    Ok(id)
}

/// A well-formed `search` request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query embedding.
    pub embedding: EmbeddingVector,
    /// Maximum number of results to return.
    pub top_k: usize,
    /// Minimum quality a candidate must have to be returned.
    pub min_quality: Quality,
    /// Optional kind filter.
    pub kind_filter: Option<MemoryKind>,
    /// Optional end-user filter.
    pub user_filter: Option<String>,
    /// Caller's clearance; only memories at or below this sensitivity are
    /// visible.
    pub sensitivity_ceiling: Sensitivity,
}

/// A memory ranked by similarity to a search query.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    /// The matched memory (content decrypted if it was encrypted at rest).
    pub memory: Memory,
    /// Cosine similarity against the query embedding.
    pub similarity: f64,
}

/// Executes approximate-nearest-neighbor retrieval over the tenant-scoped
/// index, post-filtered by quality/kind/user/sensitivity, diversified by MMR
/// over the top `3 · top_k` candidates.
///
/// # Errors
///
/// Returns the same auth/rate-limit errors as the Router Service, or
/// [`CoreError::Internal`] if decrypting an encrypted candidate fails.
pub async fn search(
    runtime: &CoreRuntime,
    tenant_id: &TenantId,
    credential: &str,
    caller: &AgentId,
    request: SearchRequest,
) -> CoreResult<Vec<ScoredResult>> {
    runtime.auth_gate.authenticate(tenant_id, credential).await?;
    let tenant = runtime.tenants.get(tenant_id).await?;
    if !tenant.is_active() {
        return Err(CoreError::PermissionDenied("tenant is suspended".to_string()));
    }

    let now = runtime.time_provider.now();
    runtime.rate_limiter.check_and_increment(
        tenant_id.as_ref(),
        caller.as_ref(),
        "hyphal_search",
        tenant.quota_searches_per_min,
        now,
    )?;

    let now_utc = system_time_to_utc(now);
    let top_k = request.top_k.max(1);
    let pool_size = (top_k * 3) as u32;

    let candidates = runtime
        .memories
        .search_candidates(tenant_id, &request.embedding, pool_size, now_utc)
        .await?;

    let mut decrypted = Vec::with_capacity(candidates.len());
    for scored in candidates {
        if scored.memory.is_expired(now_utc) {
            continue;
        }
        if scored.memory.quality < request.min_quality {
            continue;
        }
        if scored.memory.sensitivity > request.sensitivity_ceiling {
            continue;
        }
        if let Some(kind) = request.kind_filter {
            if scored.memory.kind != kind {
                continue;
            }
        }
        if let Some(user_filter) = &request.user_filter {
            if scored.memory.user_id.as_deref() != Some(user_filter.as_str()) {
                continue;
            }
        }

        let memory = decrypt_if_needed(runtime, scored.memory, tenant_id)?;
        decrypted.push((memory, scored.similarity));
    }

    let ranked: Vec<(f64, &Memory)> = decrypted.iter().map(|(m, sim)| (*sim, m)).collect();
    let diversified = crate::domain::mmr_diversify(
        &ranked,
        |m: &Memory| &m.embedding,
        0.5,
        top_k,
    );

    let mut results = Vec::with_capacity(diversified.len());
    for memory in diversified {
        runtime.memories.increment_accessed_count(&memory.id).await.ok();
        results.push(ScoredResult {
            memory: memory.clone(),
            similarity: memory.embedding.cosine_similarity(&request.embedding),
        });
    }

    Ok(results)
}

/// Decrypts `memory.content` in place if this memory was stored encrypted.
/// The salt was framed as the first 16 bytes of `content` by [`store`]; the
/// nonce travels alongside the row in `encryption_nonce`.
fn decrypt_if_needed(
    runtime: &CoreRuntime,
    mut memory: Memory,
    tenant_id: &TenantId,
) -> CoreResult<Memory> {
    if !memory.sensitivity.requires_encryption() {
        return Ok(memory);
    }

    let nonce = memory.encryption_nonce.clone().ok_or_else(|| {
        CoreError::Internal(anyhow::anyhow!(
            "encrypted memory {} has no stored nonce",
            memory.id
        ))
    })?;
    if memory.content.len() < SALT_LEN {
        return Err(CoreError::Internal(anyhow::anyhow!(
            "encrypted memory {} content is shorter than the framed salt",
            memory.id
        )));
    }
    let (salt, ciphertext) = memory.content.split_at(SALT_LEN);
    let aad = tenant_id.as_ref().as_bytes();

    let plaintext = runtime
        .encryptor
        .decrypt(ciphertext, &nonce, salt, aad)
        .map_err(CoreError::from)?;
    memory.content = plaintext;
    Ok(memory)
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
    use crate::domain_types::MemoryKind;

    fn memory(sensitivity: Sensitivity, quality: f64) -> Memory {
        Memory {
            id: MemoryId::generate(),
            tenant_id: TenantId_for_test(),
            agent_id: AgentId::try_new("agent-1".to_string()).unwrap(),
            kind: MemoryKind::Insight,
            content: b"hello".to_vec(),
            content_type: "text/plain".to_string(),
            embedding: EmbeddingVector::try_from_vec(vec![0.2; 1536]).unwrap(),
            quality: Quality::try_new(quality).unwrap(),
            sensitivity,
            created_at: Utc::now(),
            expires_at: None,
            accessed_count: 0,
            user_id: None,
            encryption_nonce: None,
        }
    }

    #[allow(non_snake_case)]
    fn TenantId_for_test() -> TenantId {
        TenantId::try_new("tenant-a".to_string()).unwrap()
    }

    #[test]
    fn public_memory_is_never_marked_encrypted() {
        let runtime_encryptor_unused = ();
        let _ = runtime_encryptor_unused;
        let m = memory(Sensitivity::Public, 0.8);
        assert!(!m.sensitivity.requires_encryption());
    }

    #[tokio::test]
    async fn decrypt_if_needed_recovers_the_original_plaintext() {
        use crate::config::RuntimeConfig;
        use std::collections::HashMap;
        use tempfile::tempdir;

        let dir = tempdir().unwrap();
        let db_path = dir.path().join("hyphal-decrypt-test.db");
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            db_path.to_string_lossy().to_string(),
        );
        let config = RuntimeConfig::from_map(&vars).unwrap();
        let runtime = CoreRuntime::initialize(config).await.unwrap();

        let tenant_id = TenantId_for_test();
        let salt = [7u8; SALT_LEN];
        let aad = tenant_id.as_ref().as_bytes();
        let (nonce, ciphertext) = runtime.encryptor.encrypt(b"top secret", &salt, aad).unwrap();
        let mut framed = salt.to_vec();
        framed.extend_from_slice(&ciphertext);

        let mut m = memory(Sensitivity::Confidential, 0.8);
        m.content = framed;
        m.encryption_nonce = Some(nonce);

        let decrypted = decrypt_if_needed(&runtime, m, &tenant_id).unwrap();
        assert_eq!(decrypted.content, b"top secret");
    }

    #[test]
    fn confidential_memory_requires_encryption() {
        let m = memory(Sensitivity::Confidential, 0.8);
        assert!(m.sensitivity.requires_encryption());
    }
}
