//! Cooperative background scheduler.
//!
//! Drives the two periodic maintenance passes — edge decay and TTL/
//! route-retention sweeping — on independent cadences taken from
//! [`crate::config::RuntimeConfig`]. Each tick is isolated: a failure is
//! logged and the loop reschedules itself rather than letting one bad tick
//! take the process down.
//!
//! Both loops are driven through [`crate::time_provider::SharedTimeProvider`]
//! rather than `tokio::time::sleep` directly, so tests can swap in a
//! [`crate::time_provider::MockTimeProvider`] and assert on tick counts
//! without waiting in real time.

use crate::reinforcement_service::{decay_tick, sweep_tick};
use crate::runtime::CoreRuntime;
use std::sync::Arc;

/// Spawns the decay and sweep loops as independent background tasks.
///
/// Returns their [`tokio::task::JoinHandle`]s so the caller can hold (and,
/// on shutdown, abort) them; neither loop returns on its own.
pub fn spawn(runtime: Arc<CoreRuntime>) -> SchedulerHandles {
    let decay_runtime = Arc::clone(&runtime);
    let decay = tokio::spawn(async move { decay_loop(decay_runtime).await });

    let sweep_runtime = Arc::clone(&runtime);
    let sweep = tokio::spawn(async move { sweep_loop(sweep_runtime).await });

    SchedulerHandles { decay, sweep }
}

/// Handles for the two background loops [`spawn`] started.
pub struct SchedulerHandles {
    /// Edge-decay loop.
    pub decay: tokio::task::JoinHandle<()>,
    /// TTL/route-retention sweep loop.
    pub sweep: tokio::task::JoinHandle<()>,
}

impl SchedulerHandles {
    /// Aborts both background loops. Used on graceful shutdown; the loops
    /// hold no state worth draining.
    pub fn abort(&self) {
        self.decay.abort();
        self.sweep.abort();
    }
}

async fn decay_loop(runtime: Arc<CoreRuntime>) {
    loop {
        runtime.time_provider.sleep(runtime.config.decay_interval).await;
        match decay_tick(&runtime).await {
            Ok(count) => {
                if count > 0 {
                    tracing::debug!(edges_decayed = count, "decay tick complete");
                }
            }
            Err(e) => tracing::warn!(error = %e, "decay tick failed; retrying next cadence"),
        }
    }
}

async fn sweep_loop(runtime: Arc<CoreRuntime>) {
    loop {
        runtime.time_provider.sleep(runtime.config.sweep_interval).await;
        match sweep_tick(&runtime).await {
            Ok((nutrients, routes)) => {
                if nutrients > 0 || routes > 0 {
                    tracing::debug!(
                        nutrients_deleted = nutrients,
                        routes_deleted = routes,
                        "sweep tick complete"
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "sweep tick failed; retrying next cadence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn test_runtime(dir: &tempfile::TempDir) -> CoreRuntime {
        let db_path = dir.path().join("scheduler-test.db");
        let mut vars = HashMap::new();
        vars.insert(
            "HYPHAE_DATABASE_PATH".to_string(),
            db_path.to_string_lossy().to_string(),
        );
        vars.insert("HYPHAE_DECAY_INTERVAL_SECS".to_string(), "1".to_string());
        vars.insert("HYPHAE_SWEEP_INTERVAL_SECS".to_string(), "1".to_string());
        let config = RuntimeConfig::from_map(&vars).unwrap();
        CoreRuntime::initialize(config).await.unwrap()
    }

    #[tokio::test]
    async fn decay_and_sweep_ticks_run_without_panicking_on_empty_store() {
        let dir = tempdir().unwrap();
        let runtime = test_runtime(&dir).await;

        assert_eq!(decay_tick(&runtime).await.unwrap(), 0);
        assert_eq!(sweep_tick(&runtime).await.unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn spawned_loops_survive_a_tick_on_an_empty_store() {
        let dir = tempdir().unwrap();
        let runtime = Arc::new(test_runtime(&dir).await);
        let handles = spawn(Arc::clone(&runtime));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handles.decay.is_finished());
        assert!(!handles.sweep.is_finished());

        handles.abort();
    }
}
