//! Pure Hebbian reinforcement and decay formulas
//!
//! Strengthens edges that led to good outcomes, weakens edges that led to
//! poor ones, and relaxes all edges toward the floor weight over time so the
//! graph keeps adapting rather than calcifying around early winners.

use crate::domain_types::{EdgeWeight, Quality, W_MIN};

/// Reward learning rate for positive outcomes.
pub const ALPHA_POS: f64 = 0.08;
/// Reward learning rate for negative outcomes, halved when the route was an
/// exploration pick (so a bad random bet doesn't punish the edge as hard as
/// a bad scored pick).
pub const ALPHA_NEG: f64 = 0.04;
/// Outcome score at or above which an update is treated as positive.
pub const THETA_POS: f64 = 0.6;
/// Exponential-moving-average weight applied to `avg_success` updates.
pub const AVG_SUCCESS_EMA_ALPHA: f64 = 0.1;
/// Decay rate applied to edge weights per elapsed day.
pub const LAMBDA_DECAY: f64 = 0.02;

/// Applies one Hebbian update to an edge weight given an outcome score.
///
/// `outcome_score >= THETA_POS` strengthens the edge by
/// `alpha_pos * outcome_score * (1 - w)`, saturating as `w` approaches
/// `W_MAX`; otherwise it weakens the edge by
/// `alpha_neg * (1 - outcome_score) * w`, proportional to the current weight.
/// `alpha_neg` is halved by the caller for exploration-flagged routes before
/// this function is called.
#[must_use]
pub fn hebbian_update(current: EdgeWeight, outcome_score: Quality, alpha_neg: f64) -> EdgeWeight {
    let w = current.into_inner();
    let score = outcome_score.into_inner();
    let delta = if score >= THETA_POS {
        ALPHA_POS * score * (1.0 - w)
    } else {
        -alpha_neg * (1.0 - score) * w
    };
    EdgeWeight::saturating_from(w + delta)
}

/// Updates a running exponential moving average of success with a new
/// outcome score: `avg' = avg + EMA_ALPHA * (score - avg)`.
#[must_use]
pub fn update_avg_success(current_avg: f64, outcome_score: Quality) -> f64 {
    let score = outcome_score.into_inner();
    (current_avg + AVG_SUCCESS_EMA_ALPHA * (score - current_avg)).clamp(0.0, 1.0)
}

/// Updates a memory's quality score at half the normal EMA rate, reflecting
/// that a single retrieval's outcome is weaker evidence about memory
/// relevance than about routing quality.
#[must_use]
pub fn update_memory_quality(current_quality: Quality, outcome_score: Quality) -> Quality {
    let current = current_quality.into_inner();
    let score = outcome_score.into_inner();
    let half_rate = AVG_SUCCESS_EMA_ALPHA / 2.0;
    let updated = (current + half_rate * (score - current)).clamp(0.0, 1.0);
    Quality::try_new(updated).unwrap_or(current_quality)
}

/// Applies exponential decay toward `W_MIN` for an edge that has not been
/// reinforced in `elapsed_days`: `w' = w_min + (w - w_min) * exp(-λ * Δt)`.
#[must_use]
pub fn decay_weight(current: EdgeWeight, elapsed_days: f64) -> EdgeWeight {
    let w = current.into_inner();
    let decayed = W_MIN + (w - W_MIN) * (-LAMBDA_DECAY * elapsed_days).exp();
    EdgeWeight::saturating_from(decayed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(v: f64) -> EdgeWeight {
        EdgeWeight::try_new(v).unwrap()
    }

    fn quality(v: f64) -> Quality {
        Quality::try_new(v).unwrap()
    }

    #[test]
    fn positive_outcome_strengthens_edge() {
        let before = weight(0.5);
        let after = hebbian_update(before, quality(1.0), ALPHA_NEG);
        assert!(after.into_inner() > before.into_inner());
    }

    #[test]
    fn negative_outcome_weakens_edge() {
        let before = weight(0.5);
        let after = hebbian_update(before, quality(0.0), ALPHA_NEG);
        assert!(after.into_inner() < before.into_inner());
    }

    #[test]
    fn exploration_halves_negative_penalty() {
        let before = weight(0.5);
        let scored_penalty = before.into_inner() - hebbian_update(before, quality(0.0), ALPHA_NEG).into_inner();
        let explore_penalty =
            before.into_inner() - hebbian_update(before, quality(0.0), ALPHA_NEG / 2.0).into_inner();
        assert!((explore_penalty - scored_penalty / 2.0).abs() < 1e-9);
    }

    #[test]
    fn update_never_escapes_saturation_bounds() {
        let after = hebbian_update(weight(crate::domain_types::W_MAX), quality(1.0), ALPHA_NEG);
        assert!(after.into_inner() <= crate::domain_types::W_MAX);
        let after_low = hebbian_update(weight(W_MIN), quality(0.0), ALPHA_NEG);
        assert!(after_low.into_inner() >= W_MIN);
    }

    #[test]
    fn decay_relaxes_toward_floor_over_time() {
        let before = weight(1.0);
        let after_one_day = decay_weight(before, 1.0);
        let after_one_year = decay_weight(before, 365.0);
        assert!(after_one_day.into_inner() < before.into_inner());
        assert!(after_one_year.into_inner() < after_one_day.into_inner());
        assert!(after_one_year.into_inner() >= W_MIN);
    }

    #[test]
    fn repeated_full_positive_outcomes_follow_w_k_plus_1_formula() {
        let mut w = weight(W_MIN);
        for _ in 0..10 {
            let expected = w.into_inner() + ALPHA_POS * (1.0 - w.into_inner());
            w = hebbian_update(w, quality(1.0), ALPHA_NEG);
            assert!((w.into_inner() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn decay_at_zero_elapsed_is_identity() {
        let before = weight(0.7);
        let after = decay_weight(before, 0.0);
        assert!((after.into_inner() - before.into_inner()).abs() < 1e-9);
    }
}
