//! Persistence for the `outcomes` table.
//!
//! `trace_id` is the primary key, making `record` idempotent: a retried
//! client request for an already-recorded trace is rejected by callers
//! checking [`OutcomeStorage::exists`] rather than silently double-applying
//! a reinforcement update.

use crate::database::DatabaseConnection;
use crate::domain::Outcome;
use crate::domain_types::{OutcomeScore, TenantId, TraceId};
use crate::error::CoreResult;
use crate::storage::{from_unix, to_unix};
use sqlx::Row;
use std::collections::HashMap;

mod sql {
    pub(super) fn insert() -> &'static str {
        "INSERT INTO outcomes (trace_id, tenant_id, overall_score, hop_scores, recorded_at)
         VALUES (?, ?, ?, ?, ?)"
    }

    pub(super) fn select_one() -> &'static str {
        "SELECT trace_id, tenant_id, overall_score, hop_scores, recorded_at
         FROM outcomes WHERE trace_id = ?"
    }

    pub(super) fn exists() -> &'static str {
        "SELECT 1 AS present FROM outcomes WHERE trace_id = ?"
    }
}

mod mapping {
    use super::{CoreResult, Outcome};
    use crate::domain_types::{OutcomeScore, TenantId, TraceId};
    use crate::error::CoreError;
    use sqlx::sqlite::SqliteRow;
    use sqlx::Row;
    use std::collections::HashMap;

    pub(super) fn row_to_outcome(row: &SqliteRow) -> CoreResult<Outcome> {
        let trace_id: String = row.get("trace_id");
        let tenant_id: String = row.get("tenant_id");
        let overall_score: f64 = row.get("overall_score");
        let hop_scores_json: Option<String> = row.get("hop_scores");
        let recorded_at: i64 = row.get("recorded_at");

        let hop_scores = hop_scores_json
            .map(|json| {
                let raw: HashMap<u32, f64> =
                    serde_json::from_str(&json).map_err(|e| CoreError::Internal(e.into()))?;
                raw.into_iter()
                    .map(|(hop, score)| {
                        OutcomeScore::try_new(score)
                            .map(|s| (hop, s))
                            .map_err(|e| CoreError::InvalidArgument(e.to_string()))
                    })
                    .collect::<CoreResult<HashMap<_, _>>>()
            })
            .transpose()?;

        Ok(Outcome {
            trace_id: TraceId::new(
                uuid::Uuid::parse_str(&trace_id)
                    .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            ),
            tenant_id: TenantId::try_new(tenant_id)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            overall_score: OutcomeScore::try_new(overall_score)
                .map_err(|e| CoreError::InvalidArgument(e.to_string()))?,
            hop_scores,
            recorded_at: super::from_unix(recorded_at),
        })
    }
}

/// Shell wrapping outcome CRUD against SQLite.
pub struct OutcomeStorage {
    connection: DatabaseConnection,
}

impl OutcomeStorage {
    /// Creates a new outcome storage shell over an existing connection.
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    /// Records a new outcome. Callers must check [`Self::exists`] first;
    /// this method does not itself enforce idempotence beyond the table's
    /// primary key, which would surface as a constraint-violation error.
    pub async fn record(&self, outcome: &Outcome) -> CoreResult<()> {
        let hop_scores_json = outcome
            .hop_scores
            .as_ref()
            .map(|scores| {
                let raw: HashMap<u32, f64> = scores
                    .iter()
                    .map(|(hop, score)| (*hop, score.into_inner()))
                    .collect();
                serde_json::to_string(&raw)
            })
            .transpose()
            .map_err(|e| crate::error::CoreError::Internal(e.into()))?;

        sqlx::query(sql::insert())
            .bind(outcome.trace_id.to_string())
            .bind(outcome.tenant_id.to_string())
            .bind(outcome.overall_score.into_inner())
            .bind(hop_scores_json)
            .bind(to_unix(outcome.recorded_at))
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    /// Fetches a previously recorded outcome.
    pub async fn get(&self, trace_id: &TraceId) -> CoreResult<Outcome> {
        let row = sqlx::query(sql::select_one())
            .bind(trace_id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        mapping::row_to_outcome(&row)
    }

    /// Whether an outcome has already been recorded for `trace_id`.
    pub async fn exists(&self, trace_id: &TraceId) -> CoreResult<bool> {
        let row = sqlx::query(sql::exists())
            .bind(trace_id.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        Ok(row.is_some())
    }
}
