//! Persistence for the substrate's relational model.
//!
//! Each entity gets its own submodule following functional core / imperative
//! shell: a private `sql` module holds pure SQL-string generators, a private
//! `mapping` module holds pure row <-> domain conversions, and a public
//! shell struct wraps a [`DatabaseConnection`] and performs the actual I/O.
//!
//! All tables are created by `migrations/0001_init.sql`; these modules only
//! read and write rows, they never create tables.

pub mod agent_profile_storage;
pub mod audit_storage;
pub mod edge_storage;
pub mod memory_storage;
pub mod nutrient_storage;
pub mod outcome_storage;
pub mod policy_storage;
pub mod quota_storage;
pub mod tenant_storage;

pub use agent_profile_storage::AgentProfileStorage;
pub use audit_storage::AuditStorage;
pub use edge_storage::EdgeStorage;
pub use memory_storage::MemoryStorage;
pub use nutrient_storage::NutrientStorage;
pub use outcome_storage::OutcomeStorage;
pub use policy_storage::PolicyStorage;
pub use quota_storage::QuotaStorage;
pub use tenant_storage::TenantStorage;

/// Packs a `chrono` timestamp down to Unix seconds for SQLite storage.
pub(crate) fn to_unix(ts: chrono::DateTime<chrono::Utc>) -> i64 {
    ts.timestamp()
}

/// Unpacks Unix seconds back into a `chrono` timestamp.
pub(crate) fn from_unix(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
}
