//! Process-wide runtime: one [`CoreRuntime`] built at startup and shared by
//! every request handler.
//!
//! Favoring explicit dependency injection over global state, `CoreRuntime`
//! bundles the database pool, every storage shell, the auth/policy seams
//! from [`crate::auth`], the cryptographic primitives from
//! [`crate::security`], the in-process rate limiter, and the
//! [`crate::time_provider::TimeProvider`] the scheduler drives decay/sweep
//! ticks through. Nothing in the crate reaches for `std::env` or a process
//! singleton once this value exists.

use crate::auth::{AuthGate, BearerTenantScopeGate, PolicyEvaluator, StoragePolicyEvaluator};
use crate::cache::RateLimiter;
use crate::config::RuntimeConfig;
use crate::database::{DatabaseConnection, DatabaseError};
use crate::domain::routing::RouterConfig;
use crate::observability::Metrics;
use crate::security::{AuditSigner, Encryptor, SecurityError};
use crate::storage::{
    AgentProfileStorage, AuditStorage, EdgeStorage, MemoryStorage, NutrientStorage,
    OutcomeStorage, PolicyStorage, QuotaStorage, TenantStorage,
};
use crate::time_provider::{production_time_provider, SharedTimeProvider};
use std::sync::Arc;
use thiserror::Error;

/// Failures that can prevent the runtime from starting at all.
///
/// Distinct from [`crate::error::CoreError`], which covers failures of an
/// individual request: `main.rs` maps [`RuntimeInitError::Store`] to the
/// "required store unreachable at startup" exit code and everything else to
/// the generic unhandled-error exit code.
#[derive(Debug, Error)]
pub enum RuntimeInitError {
    /// The database could not be opened, migrated, or reached.
    #[error("database unavailable: {0}")]
    Store(#[from] DatabaseError),

    /// The configured audit signing key or encryption master key could not
    /// be loaded.
    #[error("key material unavailable: {0}")]
    KeyMaterial(String),
}

impl From<SecurityError> for RuntimeInitError {
    fn from(e: SecurityError) -> Self {
        Self::KeyMaterial(e.to_string())
    }
}

/// Everything a request handler needs to serve the Router, Hyphal Memory,
/// and Reinforcement operations for one process.
pub struct CoreRuntime {
    /// The validated configuration this runtime was built from.
    pub config: RuntimeConfig,
    /// The pooled SQLite connection.
    pub db: DatabaseConnection,

    /// Tenant records shell.
    pub tenants: TenantStorage,
    /// Agent profile / candidate pool shell.
    pub agent_profiles: AgentProfileStorage,
    /// Routing-graph edge weights shell.
    pub edges: EdgeStorage,
    /// Hyphal Memory store shell.
    pub memories: MemoryStorage,
    /// Nutrient and route-record shell.
    pub nutrients: NutrientStorage,
    /// Outcome records shell.
    pub outcomes: OutcomeStorage,
    /// DLP/RBAC/ABAC policy rules shell.
    pub policies: PolicyStorage,
    /// Durable quota-window backstop shell.
    pub quotas: QuotaStorage,
    /// Append-only audit log shell.
    pub audit: AuditStorage,

    /// Resolves bearer credentials to a tenant/agent scope.
    pub auth_gate: Arc<dyn AuthGate>,
    /// Evaluates a tenant's configured policies against a request's facts.
    pub policy_evaluator: Arc<dyn PolicyEvaluator>,
    /// In-process sliding-window rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Signs and verifies audit events.
    pub audit_signer: Arc<AuditSigner>,
    /// Envelope-encrypts Hyphal Memory content above the confidentiality floor.
    pub encryptor: Arc<Encryptor>,
    /// Clock/sleep abstraction the scheduler drives ticks through.
    pub time_provider: SharedTimeProvider,
    /// Default routing weights, seeded from [`RuntimeConfig::default_epsilon`].
    pub router_config: RouterConfig,
    /// Request counters backing the `/metrics` exposition endpoint.
    pub metrics: Metrics,
}

impl CoreRuntime {
    /// Builds the runtime: opens and migrates the database, constructs every
    /// storage shell over the shared pool, loads key material, and wires the
    /// default `AuthGate`/`PolicyEvaluator` implementations.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeInitError::Store`] if the database cannot be opened
    /// or migrated, or [`RuntimeInitError::KeyMaterial`] if a configured
    /// signing or encryption key cannot be loaded.
    pub async fn initialize(config: RuntimeConfig) -> Result<Self, RuntimeInitError> {
        use crate::database::DatabaseConfig;

        let db_config = DatabaseConfig::new(config.database_path.clone())
            .with_pool_size(config.pool_size);
        let db = DatabaseConnection::initialize(db_config).await?;

        let tenants = TenantStorage::new(db.clone());
        let agent_profiles = AgentProfileStorage::new(db.clone());
        let edges = EdgeStorage::new(db.clone());
        let memories = MemoryStorage::new(db.clone());
        let nutrients = NutrientStorage::new(db.clone());
        let outcomes = OutcomeStorage::new(db.clone());
        let policies = PolicyStorage::new(db.clone());
        let quotas = QuotaStorage::new(db.clone());
        let audit = AuditStorage::new(db.clone());

        let audit_signer = Arc::new(load_audit_signer(&config)?);
        let encryptor = Arc::new(load_encryptor(&config));

        let auth_gate: Arc<dyn AuthGate> = Arc::new(BearerTenantScopeGate);
        let policy_evaluator: Arc<dyn PolicyEvaluator> =
            Arc::new(StoragePolicyEvaluator::new(PolicyStorage::new(db.clone())));

        let mut router_config = RouterConfig::default();
        router_config.epsilon = config.default_epsilon;

        Ok(Self {
            config,
            db,
            tenants,
            agent_profiles,
            edges,
            memories,
            nutrients,
            outcomes,
            policies,
            quotas,
            audit,
            auth_gate,
            policy_evaluator,
            rate_limiter: Arc::new(RateLimiter::new()),
            audit_signer,
            encryptor,
            time_provider: production_time_provider(),
            router_config,
            metrics: Metrics::new(),
        })
    }
}

/// Loads the Ed25519 audit signing key from the configured path, or
/// generates an ephemeral one (with a loud warning) when none is configured.
/// An ephemeral key is only appropriate for development: audit events signed
/// with it cannot be verified across a restart.
fn load_audit_signer(config: &RuntimeConfig) -> Result<AuditSigner, RuntimeInitError> {
    match &config.audit_signing_key_path {
        Some(path) => {
            let seed = std::fs::read(path).map_err(|e| {
                RuntimeInitError::KeyMaterial(format!(
                    "could not read audit signing key at {}: {e}",
                    path.display()
                ))
            })?;
            Ok(AuditSigner::from_seed(&seed)?)
        }
        None => {
            tracing::warn!(
                "no HYPHAE_AUDIT_SIGNING_KEY_PATH configured; generating an ephemeral audit \
                 signing key for this process only"
            );
            Ok(AuditSigner::generate())
        }
    }
}

/// Resolves the envelope-encryption master secret reference. A reference
/// that names an existing file is read as raw key bytes; otherwise the
/// reference itself is treated as inline secret material (e.g. injected by
/// a secret-mounting sidecar). An empty reference generates an ephemeral
/// secret, valid for the lifetime of this process only.
fn load_encryptor(config: &RuntimeConfig) -> Encryptor {
    let reference = &config.encryption_master_key_ref;

    if reference.is_empty() {
        tracing::warn!(
            "no HYPHAE_ENCRYPTION_MASTER_KEY_REF configured; generating an ephemeral \
             encryption master secret for this process only"
        );
        let mut secret = vec![0u8; 32];
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(&mut secret);
        return Encryptor::new(secret);
    }

    let path = std::path::Path::new(reference);
    if path.is_file() {
        match std::fs::read(path) {
            Ok(bytes) => return Encryptor::new(bytes),
            Err(e) => {
                tracing::warn!(
                    "could not read encryption master key at {}: {e}; falling back to the \
                     reference string itself",
                    path.display()
                );
            }
        }
    }

    Encryptor::new(reference.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn test_config(db_path: &std::path::Path) -> RuntimeConfig {
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            db_path.to_string_lossy().to_string(),
        );
        RuntimeConfig::from_map(&vars).unwrap()
    }

    #[tokio::test]
    async fn initializes_with_ephemeral_keys_when_unconfigured() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("runtime-test.db");
        let config = test_config(&db_path);

        let runtime = CoreRuntime::initialize(config).await.unwrap();
        assert!(runtime.db.config().pool_size().as_usize() > 0);
    }

    #[tokio::test]
    async fn fails_when_database_path_is_unwritable() {
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            "/root/impossible_write_location_runtime.db".to_string(),
        );
        let Ok(config) = RuntimeConfig::from_map(&vars) else {
            return;
        };
        let result = CoreRuntime::initialize(config).await;
        assert!(result.is_err());
    }
}
