//! Runtime configuration loaded from the environment and validated at startup.
//!
//! Parsing and validation are pure functions over a `HashMap<String, String>`
//! snapshot of the environment (functional core); only
//! [`RuntimeConfig::from_env`] touches `std::env` directly (imperative
//! shell). Unknown variables are ignored, as required by the
//! external-interfaces contract.

use crate::database::DatabasePath;
use crate::domain_types::{ConnectionPoolSize, Epsilon};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_PATH: &str = "hyphae.db";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REGION: &str = "local";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_DECAY_INTERVAL_SECS: u64 = 3600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Errors produced while loading or validating [`RuntimeConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable was present but failed to parse or validate.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// Name of the offending environment variable.
        var: String,
        /// Human-readable reason the value was rejected.
        reason: String,
    },
}

/// Immutable, validated process configuration.
///
/// Constructed once at startup in `main.rs` and held inside
/// [`crate::runtime::CoreRuntime`] for the life of the process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the embedded SQLite database file.
    pub database_path: DatabasePath,
    /// Connection pool size for the database.
    pub pool_size: ConnectionPoolSize,
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Deployment region, attached to tenants created without an explicit one.
    pub region: String,
    /// `tracing` log level filter, e.g. `"info"` or `"hyphae=debug,warn"`.
    pub log_level: String,
    /// Path to the file holding the 32-byte Ed25519 audit signing seed.
    pub audit_signing_key_path: Option<PathBuf>,
    /// Reference (path or external-secret identifier) to the envelope
    /// encryption master key; resolved by the imperative shell at startup.
    pub encryption_master_key_ref: String,
    /// How often the reinforcement scheduler decays idle edges.
    pub decay_interval: Duration,
    /// How often the scheduler sweeps expired nutrients and routes.
    pub sweep_interval: Duration,
    /// Default exploration epsilon assigned to tenants that don't override it.
    pub default_epsilon: Epsilon,
}

impl RuntimeConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a present variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Pure constructor over a variable snapshot, used directly by `from_env`
    /// and by tests that need deterministic input without touching the real
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a present variable fails to parse.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = DatabasePath::new(
            vars.get("HYPHAE_DATABASE_PATH")
                .map_or(DEFAULT_DATABASE_PATH, String::as_str),
        )
        .map_err(|e| ConfigError::InvalidValue {
            var: "HYPHAE_DATABASE_PATH".to_string(),
            reason: e.to_string(),
        })?;

        let pool_size = match vars.get("HYPHAE_DATABASE_POOL_SIZE") {
            Some(raw) => parse_field("HYPHAE_DATABASE_POOL_SIZE", raw, |s| {
                s.parse::<u32>()
                    .ok()
                    .and_then(|n| ConnectionPoolSize::try_new(n).ok())
            })?,
            None => ConnectionPoolSize::default(),
        };

        let listen_addr = parse_field(
            "HYPHAE_LISTEN_ADDR",
            vars.get("HYPHAE_LISTEN_ADDR")
                .map_or(DEFAULT_LISTEN_ADDR, String::as_str),
            |s| s.parse::<SocketAddr>().ok(),
        )?;

        let region = vars
            .get("HYPHAE_REGION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let log_level = vars
            .get("HYPHAE_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let audit_signing_key_path = vars
            .get("HYPHAE_AUDIT_SIGNING_KEY_PATH")
            .map(PathBuf::from);

        let encryption_master_key_ref = vars
            .get("HYPHAE_ENCRYPTION_MASTER_KEY_REF")
            .cloned()
            .unwrap_or_default();

        let decay_interval = match vars.get("HYPHAE_DECAY_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_field(
                "HYPHAE_DECAY_INTERVAL_SECS",
                raw,
                |s| s.parse::<u64>().ok().filter(|n| *n > 0),
            )?),
            None => Duration::from_secs(DEFAULT_DECAY_INTERVAL_SECS),
        };

        let sweep_interval = match vars.get("HYPHAE_SWEEP_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_field(
                "HYPHAE_SWEEP_INTERVAL_SECS",
                raw,
                |s| s.parse::<u64>().ok().filter(|n| *n > 0),
            )?),
            None => Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        };

        let default_epsilon = match vars.get("HYPHAE_DEFAULT_EPSILON") {
            Some(raw) => parse_field("HYPHAE_DEFAULT_EPSILON", raw, |s| {
                s.parse::<f64>().ok().and_then(|v| Epsilon::try_new(v).ok())
            })?,
            None => Epsilon::default(),
        };

        Ok(Self {
            database_path,
            pool_size,
            listen_addr,
            region,
            log_level,
            audit_signing_key_path,
            encryption_master_key_ref,
            decay_interval,
            sweep_interval,
            default_epsilon,
        })
    }
}

fn parse_field<T>(
    var: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    parse(raw).ok_or_else(|| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: format!("could not parse '{raw}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = RuntimeConfig::from_map(&HashMap::new()).unwrap();
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(
            config.listen_addr,
            DEFAULT_LISTEN_ADDR.parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            config.sweep_interval,
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
        );
    }

    #[test]
    fn explicit_values_override_defaults() {
        let vars = map(&[
            ("HYPHAE_REGION", "us-east-1"),
            ("HYPHAE_LISTEN_ADDR", "127.0.0.1:9090"),
            ("HYPHAE_DEFAULT_EPSILON", "0.1"),
        ]);
        let config = RuntimeConfig::from_map(&vars).unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.listen_addr, "127.0.0.1:9090".parse().unwrap());
        assert!((config.default_epsilon.into_inner() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_listen_addr_is_rejected() {
        let vars = map(&[("HYPHAE_LISTEN_ADDR", "not-an-address")]);
        assert!(RuntimeConfig::from_map(&vars).is_err());
    }

    #[test]
    fn invalid_epsilon_out_of_range_is_rejected() {
        let vars = map(&[("HYPHAE_DEFAULT_EPSILON", "2.0")]);
        assert!(RuntimeConfig::from_map(&vars).is_err());
    }

    #[test]
    fn unknown_variables_are_ignored() {
        let vars = map(&[("SOME_UNRELATED_VAR", "whatever")]);
        assert!(RuntimeConfig::from_map(&vars).is_ok());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let vars = map(&[("HYPHAE_SWEEP_INTERVAL_SECS", "0")]);
        assert!(RuntimeConfig::from_map(&vars).is_err());
    }
}
