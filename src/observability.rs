//! Tracing initialization and the `/metrics` Prometheus exposition surface.
//!
//! Structured logging uses the `tracing`/`tracing-subscriber` pairing;
//! metrics sinks (pushing counters to a collector) are out of scope, but the
//! plain-text exposition endpoint itself is an external interface, so it is
//! hand-assembled here from a small set of in-process atomic counters
//! rather than pulling in a metrics crate.

use std::sync::atomic::{AtomicU64, Ordering};

/// Initializes the global `tracing` subscriber from `log_level` (e.g.
/// `"info"` or `"hyphae=debug,warn"`).
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid `tracing` filter directive.
pub fn init_tracing(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Process-wide request counters, incremented by the REST handlers and read
/// by the `/metrics` endpoint. Deliberately minimal: this is the exposition
/// surface named in scope, not a general metrics pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    broadcasts_total: AtomicU64,
    collects_total: AtomicU64,
    outcomes_total: AtomicU64,
    memory_stores_total: AtomicU64,
    memory_searches_total: AtomicU64,
    errors_total: AtomicU64,
}

impl Metrics {
    /// Builds a fresh, zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one broadcast request.
    pub fn record_broadcast(&self) {
        self.broadcasts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one collect request.
    pub fn record_collect(&self) {
        self.collects_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one outcome-recording request.
    pub fn record_outcome(&self) {
        self.outcomes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one Hyphal Memory store request.
    pub fn record_memory_store(&self) {
        self.memory_stores_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one Hyphal Memory search request.
    pub fn record_memory_search(&self) {
        self.memory_searches_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one request that ended in an error response.
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Renders the current counters as Prometheus text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "# HELP hyphae_broadcasts_total Total broadcast requests handled.\n\
             # TYPE hyphae_broadcasts_total counter\n\
             hyphae_broadcasts_total {}\n\
             # HELP hyphae_collects_total Total collect requests handled.\n\
             # TYPE hyphae_collects_total counter\n\
             hyphae_collects_total {}\n\
             # HELP hyphae_outcomes_total Total outcome-recording requests handled.\n\
             # TYPE hyphae_outcomes_total counter\n\
             hyphae_outcomes_total {}\n\
             # HELP hyphae_memory_stores_total Total Hyphal Memory store requests handled.\n\
             # TYPE hyphae_memory_stores_total counter\n\
             hyphae_memory_stores_total {}\n\
             # HELP hyphae_memory_searches_total Total Hyphal Memory search requests handled.\n\
             # TYPE hyphae_memory_searches_total counter\n\
             hyphae_memory_searches_total {}\n\
             # HELP hyphae_errors_total Total requests that ended in an error response.\n\
             # TYPE hyphae_errors_total counter\n\
             hyphae_errors_total {}\n",
            self.broadcasts_total.load(Ordering::Relaxed),
            self.collects_total.load(Ordering::Relaxed),
            self.outcomes_total.load(Ordering::Relaxed),
            self.memory_stores_total.load(Ordering::Relaxed),
            self.memory_searches_total.load(Ordering::Relaxed),
            self.errors_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_reflects_recorded_counts() {
        let metrics = Metrics::new();
        metrics.record_broadcast();
        metrics.record_broadcast();
        metrics.record_error();

        let body = metrics.render();
        assert!(body.contains("hyphae_broadcasts_total 2"));
        assert!(body.contains("hyphae_errors_total 1"));
        assert!(body.contains("hyphae_collects_total 0"));
    }
}
