//! Persistence for the `tenants` table.

use crate::database::DatabaseConnection;
use crate::domain::Tenant;
use crate::domain_types::TenantId;
use crate::error::{CoreError, CoreResult};
use crate::storage::{from_unix, to_unix};

mod sql {
    pub(super) fn upsert() -> &'static str {
        "INSERT INTO tenants
            (id, plan_tier, status, region, quota_broadcasts_per_min, quota_searches_per_min,
             exploration_epsilon, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            plan_tier = excluded.plan_tier,
            status = excluded.status,
            region = excluded.region,
            quota_broadcasts_per_min = excluded.quota_broadcasts_per_min,
            quota_searches_per_min = excluded.quota_searches_per_min,
            exploration_epsilon = excluded.exploration_epsilon"
    }

    pub(super) fn select_by_id() -> &'static str {
        "SELECT id, plan_tier, status, region, quota_broadcasts_per_min, quota_searches_per_min,
                exploration_epsilon, created_at
         FROM tenants WHERE id = ?"
    }

    pub(super) fn select_all() -> &'static str {
        "SELECT id, plan_tier, status, region, quota_broadcasts_per_min, quota_searches_per_min,
                exploration_epsilon, created_at
         FROM tenants"
    }
}

mod mapping {
    use super::{CoreError, CoreResult, Tenant};
    use crate::domain_types::{Epsilon, PlanTier, RateLimitPerWindow, TenantId, TenantStatus};
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;

    pub(super) fn row_to_tenant(row: &SqliteRow) -> CoreResult<Tenant> {
        let id: String = row.get("id");
        let plan_tier: String = row.get("plan_tier");
        let status: String = row.get("status");
        let region: String = row.get("region");
        let quota_broadcasts: i64 = row.get("quota_broadcasts_per_min");
        let quota_searches: i64 = row.get("quota_searches_per_min");
        let epsilon: f64 = row.get("exploration_epsilon");
        let created_at: i64 = row.get("created_at");

        Ok(Tenant {
            id: TenantId::try_new(id).map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            plan_tier: PlanTier::parse(&plan_tier)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            status: TenantStatus::parse(&status)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            region,
            quota_broadcasts_per_min: RateLimitPerWindow::try_new(quota_broadcasts as u32)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            quota_searches_per_min: RateLimitPerWindow::try_new(quota_searches as u32)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            exploration_epsilon: Epsilon::try_new(epsilon)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            created_at: super::from_unix(created_at),
        })
    }
}

/// Shell wrapping tenant CRUD against SQLite.
pub struct TenantStorage {
    connection: DatabaseConnection,
}

impl TenantStorage {
    /// Creates a new tenant storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Inserts a tenant, or updates it in place if the id already exists.
    pub async fn upsert(&self, tenant: &Tenant) -> CoreResult<()> {
        sqlx::query(sql::upsert())
            .bind(tenant.id.to_string())
            .bind(tenant.plan_tier.as_str())
            .bind(tenant.status.as_str())
            .bind(&tenant.region)
            .bind(i64::from(tenant.quota_broadcasts_per_min.into_inner()))
            .bind(i64::from(tenant.quota_searches_per_min.into_inner()))
            .bind(tenant.exploration_epsilon.into_inner())
            .bind(to_unix(tenant.created_at))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Fetches a tenant by id.
    pub async fn get(&self, id: &TenantId) -> CoreResult<Tenant> {
        let row = sqlx::query(sql::select_by_id())
            .bind(id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        mapping::row_to_tenant(&row)
    }

    /// Lists every tenant. Used by the background scheduler, which decays
    /// edges and sweeps expired nutrients one tenant at a time rather than
    /// issuing cross-tenant queries.
    pub async fn list_all(&self) -> CoreResult<Vec<Tenant>> {
        let rows = sqlx::query(sql::select_all())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(mapping::row_to_tenant).collect()
    }
}
