//! Operational CLI for one-time bootstrap tasks: generating the Ed25519
//! audit signing key a deployment's `HYPHAE_AUDIT_SIGNING_KEY_PATH` points
//! at, and provisioning a tenant directly against the configured database
//! without going through the REST API.

use clap::{Parser, Subcommand};
use hyphae::config::RuntimeConfig;
use hyphae::domain::Tenant;
use hyphae::domain_types::{Epsilon, PlanTier, RateLimitPerWindow, TenantId, TenantStatus};
use hyphae::runtime::CoreRuntime;
use hyphae::security::AuditSigner;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hyphae-cli", about = "Bootstrap tasks for a hyphae deployment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generates a fresh Ed25519 audit signing key and writes its seed to a file.
    GenerateAuditKey {
        /// Path to write the 32-byte seed to. Must not already exist.
        #[arg(long)]
        out: PathBuf,
    },
    /// Provisions a new tenant against the configured database.
    RegisterTenant {
        /// Tenant identifier.
        #[arg(long)]
        id: String,
        /// Plan tier: free, pro, or enterprise.
        #[arg(long, default_value = "free")]
        plan: String,
        /// Deployment region. Defaults to the process's configured region.
        #[arg(long)]
        region: Option<String>,
        /// Broadcasts allowed per 60-second window.
        #[arg(long, default_value_t = 60)]
        broadcast_quota: u32,
        /// Searches allowed per 60-second window.
        #[arg(long, default_value_t = 120)]
        search_quota: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateAuditKey { out } => generate_audit_key(&out),
        Command::RegisterTenant {
            id,
            plan,
            region,
            broadcast_quota,
            search_quota,
        } => register_tenant(&id, &plan, region, broadcast_quota, search_quota).await,
    }
}

fn generate_audit_key(out: &PathBuf) -> ExitCode {
    if out.exists() {
        eprintln!("refusing to overwrite existing key at {}", out.display());
        return ExitCode::FAILURE;
    }

    let signer = AuditSigner::generate();
    if let Err(e) = std::fs::write(out, signer.seed_bytes()) {
        eprintln!("could not write key to {}: {e}", out.display());
        return ExitCode::FAILURE;
    }

    println!("wrote audit signing key to {}", out.display());
    ExitCode::SUCCESS
}

async fn register_tenant(
    id: &str,
    plan: &str,
    region: Option<String>,
    broadcast_quota: u32,
    search_quota: u32,
) -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let region = region.unwrap_or_else(|| config.region.clone());

    let runtime = match CoreRuntime::initialize(config).await {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("could not reach the database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tenant_id = match TenantId::try_new(id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid tenant id: {e}");
            return ExitCode::FAILURE;
        }
    };
    let plan_tier = match plan.to_ascii_lowercase().as_str() {
        "free" => PlanTier::Free,
        "pro" => PlanTier::Pro,
        "enterprise" => PlanTier::Enterprise,
        other => {
            eprintln!("unknown plan tier: {other} (expected free, pro, or enterprise)");
            return ExitCode::FAILURE;
        }
    };
    let quota_broadcasts_per_min = match RateLimitPerWindow::try_new(broadcast_quota) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("invalid broadcast quota: {e}");
            return ExitCode::FAILURE;
        }
    };
    let quota_searches_per_min = match RateLimitPerWindow::try_new(search_quota) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("invalid search quota: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tenant = Tenant {
        id: tenant_id,
        plan_tier,
        status: TenantStatus::Active,
        region,
        quota_broadcasts_per_min,
        quota_searches_per_min,
        exploration_epsilon: Epsilon::default(),
        created_at: chrono::Utc::now(),
    };

    if let Err(e) = runtime.tenants.upsert(&tenant).await {
        eprintln!("could not register tenant: {e}");
        return ExitCode::FAILURE;
    }

    println!("registered tenant {id}");
    ExitCode::SUCCESS
}
