//! Pure scoring logic for the adaptive Routing Engine
//!
//! Everything in this module is deterministic given its inputs (aside from
//! the explicit `rng` parameter threaded through the exploration step) and
//! performs no I/O. The imperative shell that loads candidates from storage
//! and persists route records lives in `router_service.rs`.

use crate::domain_types::{
    AgentId, CandidateBound, EdgeWeight, Epsilon, Token, EMBEDDING_DIM, W_MAX,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while constructing or scoring with routing domain values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    /// An embedding vector did not carry exactly `EMBEDDING_DIM` components.
    #[error("embedding must have exactly {EMBEDDING_DIM} dimensions, got {actual}")]
    WrongDimension {
        /// The number of components actually supplied.
        actual: usize,
    },

    /// No agents survived candidate selection.
    #[error("no routing candidates available")]
    NoCandidates,
}

/// A dense embedding vector, always exactly [`EMBEDDING_DIM`] components.
///
/// Validation happens once, at construction, so malformed JSON is rejected
/// at the deserialization boundary rather than deep inside the scoring
/// logic.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Builds an embedding from a vector, rejecting anything but exactly
    /// [`EMBEDDING_DIM`] components.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::WrongDimension`] if `values.len() != EMBEDDING_DIM`.
    pub fn try_from_vec(values: Vec<f32>) -> Result<Self, RoutingError> {
        if values.len() != EMBEDDING_DIM {
            return Err(RoutingError::WrongDimension {
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// Borrows the underlying components.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Packs the vector into a little-endian byte blob for storage.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Unpacks a little-endian byte blob written by [`Self::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::WrongDimension`] if `bytes.len() != EMBEDDING_DIM * 4`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RoutingError> {
        if bytes.len() != EMBEDDING_DIM * 4 {
            return Err(RoutingError::WrongDimension {
                actual: bytes.len() / 4,
            });
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().expect("chunks_exact(4) yields 4 bytes");
                f32::from_le_bytes(arr)
            })
            .collect();
        Ok(Self(values))
    }

    /// Cosine similarity against another embedding, clamped to `[0, 1]`.
    ///
    /// Negative cosine similarities are clamped to zero: this system treats
    /// "anti-correlated" and "unrelated" the same way when scoring routes.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f64 {
        let dot: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum();
        let norm_a: f64 = self.0.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        let norm_b: f64 = other.0.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EmbeddingVector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        Self::try_from_vec(values).map_err(serde::de::Error::custom)
    }
}

/// A candidate agent as seen by the scoring step: everything the Routing
/// Engine needs about one neighbor, batched in by the imperative shell.
#[derive(Debug, Clone)]
pub struct RoutingCandidate {
    /// The candidate agent's id.
    pub agent_id: AgentId,
    /// The candidate's current profile embedding.
    pub profile_embedding: EmbeddingVector,
    /// The candidate's advertised capability tokens.
    pub capabilities: Vec<Token>,
    /// Current edge weight from the sender to this candidate, if an edge
    /// already exists (`None` means a fresh edge will be materialized at
    /// [`crate::domain_types::W_INIT`] on first delivery).
    pub edge_weight: Option<EdgeWeight>,
}

/// Tunable coefficients for the scoring formula, plus exploration/MMR knobs.
#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Weight on semantic similarity.
    pub alpha: f64,
    /// Weight on normalized edge strength.
    pub beta: f64,
    /// Weight on semantic (lexical) overlap.
    pub gamma: f64,
    /// Floor below which a lexical match does not count as "overlap".
    pub overlap_floor: f64,
    /// Cap on the capability-boost contribution.
    pub capability_boost_cap: f64,
    /// Per-capability-match contribution before capping.
    pub capability_boost_per_match: f64,
    /// Maximum number of capability matches that contribute to the boost.
    pub capability_boost_max_matches: usize,
    /// Default exploration probability.
    pub epsilon: Epsilon,
    /// Minimum fraction of `K` candidates that must be explore-eligible.
    pub epsilon_floor: f64,
    /// MMR diversification trade-off between relevance and novelty.
    pub lambda_mmr: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.25,
            gamma: 0.15,
            overlap_floor: 0.75,
            capability_boost_cap: 0.2,
            capability_boost_per_match: 0.05,
            capability_boost_max_matches: 4,
            epsilon: Epsilon::default(),
            epsilon_floor: 0.3,
            lambda_mmr: 0.5,
        }
    }
}

/// Why a candidate was ultimately selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    /// Chosen by the scored-and-diversified ranking.
    Scored,
    /// Chosen by the ε-greedy exploration step instead of the top score.
    Exploration,
}

/// One scored, selected routing decision for a single candidate.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// The selected agent.
    pub agent_id: AgentId,
    /// The combined score that led to selection (pre-MMR for exploration
    /// picks, since exploration bypasses ranking by construction).
    pub score: f64,
    /// Whether this pick came from scoring or exploration.
    pub reason: RoutingReason,
}

/// Per-call memoized similarity cache: the same candidate's profile
/// similarity against the broadcast embedding is computed at most once
/// per scoring call, even though scoring, MMR, and logging each reference
/// it independently.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    cache: HashMap<AgentId, f64>,
}

impl SimilarityCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_compute(&mut self, candidate: &RoutingCandidate, query: &EmbeddingVector) -> f64 {
        *self
            .cache
            .entry(candidate.agent_id.clone())
            .or_insert_with(|| candidate.profile_embedding.cosine_similarity(query))
    }
}

/// Jaro-Winkler-based lexical overlap between a broadcast's tool hints and a
/// candidate's advertised capabilities: the highest pairwise similarity
/// across all (hint, capability) pairs, or `0.0` if nothing clears
/// `overlap_floor`.
#[must_use]
pub fn semantic_overlap(tool_hints: &[Token], capabilities: &[Token], overlap_floor: f64) -> f64 {
    let mut best = 0.0_f64;
    for hint in tool_hints {
        for capability in capabilities {
            let sim = strsim::jaro_winkler(hint.as_ref(), capability.as_ref());
            if sim >= overlap_floor && sim > best {
                best = sim;
            }
        }
    }
    best
}

/// Exact-token capability boost: up to `capability_boost_max_matches` exact
/// matches between `tool_hints` and `capabilities`, each contributing
/// `capability_boost_per_match`, capped at `capability_boost_cap`.
#[must_use]
pub fn capability_boost(
    tool_hints: &[Token],
    capabilities: &[Token],
    config: &RouterConfig,
) -> f64 {
    let matches = tool_hints
        .iter()
        .filter(|hint| capabilities.contains(hint))
        .count()
        .min(config.capability_boost_max_matches);
    (matches as f64 * config.capability_boost_per_match).min(config.capability_boost_cap)
}

/// Computes the combined routing score for one candidate:
/// `score = α·sim + β·(edge_w/w_max) + γ·overlap + cap`.
pub fn score_candidate(
    candidate: &RoutingCandidate,
    broadcast_embedding: &EmbeddingVector,
    tool_hints: &[Token],
    config: &RouterConfig,
    cache: &mut SimilarityCache,
) -> f64 {
    let sim = cache.get_or_compute(candidate, broadcast_embedding);
    let normalized_edge = candidate.edge_weight.map_or(0.0, |w| w.into_inner() / W_MAX);
    let overlap = semantic_overlap(tool_hints, &candidate.capabilities, config.overlap_floor);
    let cap = capability_boost(tool_hints, &candidate.capabilities, config);

    config.alpha * sim + config.beta * normalized_edge + config.gamma * overlap + cap
}

/// Selects up to `k` agents from `candidates` for one broadcast: scores
/// every candidate, applies ε-greedy exploration, then diversifies the
/// remaining slots via Maximal Marginal Relevance.
///
/// # Errors
///
/// Returns [`RoutingError::NoCandidates`] if `candidates` is empty.
pub fn select_agents<R: Rng>(
    candidates: &[RoutingCandidate],
    broadcast_embedding: &EmbeddingVector,
    tool_hints: &[Token],
    k: CandidateBound,
    config: &RouterConfig,
    rng: &mut R,
) -> Result<Vec<RoutingDecision>, RoutingError> {
    if candidates.is_empty() {
        return Err(RoutingError::NoCandidates);
    }

    let mut cache = SimilarityCache::new();
    let epsilon = config.epsilon.into_inner().clamp(0.0, 1.0);
    let floor = config.epsilon_floor.clamp(0.0, 1.0);

    // ε-greedy applies per candidate, not as a single coin-flip over the
    // whole call: each candidate independently has probability ε of having
    // its score replaced by max(score, uniform(ε_floor, 1.0)) before ranking,
    // so exploration can surface any candidate, not only one drawn from the
    // already-top-ranked slice.
    let mut scored: Vec<(f64, bool, &RoutingCandidate)> = candidates
        .iter()
        .map(|c| {
            let base = score_candidate(c, broadcast_embedding, tool_hints, config, &mut cache);
            if rng.gen_bool(epsilon) {
                let exploration_floor = rng.gen_range(floor..=1.0);
                let boosted = base.max(exploration_floor);
                (boosted, boosted > base, c)
            } else {
                (base, false, c)
            }
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let k = (k.into_inner() as usize).min(scored.len());
    let explored: HashMap<AgentId, bool> = scored
        .iter()
        .map(|(_, explored, c)| (c.agent_id.clone(), *explored))
        .collect();
    let pool: Vec<(f64, &RoutingCandidate)> = scored.into_iter().map(|(s, _, c)| (s, c)).collect();

    let selected = mmr_select(&pool, &mut cache, config, k);
    Ok(selected
        .into_iter()
        .map(|(score, candidate)| {
            let reason = if explored.get(&candidate.agent_id).copied().unwrap_or(false) {
                RoutingReason::Exploration
            } else {
                RoutingReason::Scored
            };
            RoutingDecision {
                agent_id: candidate.agent_id.clone(),
                score,
                reason,
            }
        })
        .collect())
}

/// Maximal Marginal Relevance selection over pre-scored candidates:
/// greedily picks the candidate maximizing
/// `λ·relevance − (1−λ)·max_similarity_to_already_selected`, ties broken by
/// higher relevance-to-query then lexicographic agent id.
fn mmr_select<'a>(
    scored: &[(f64, &'a RoutingCandidate)],
    cache: &mut SimilarityCache,
    config: &RouterConfig,
    want: usize,
) -> Vec<(f64, &'a RoutingCandidate)> {
    let mut pool: Vec<(f64, &RoutingCandidate)> = scored.to_vec();
    let mut selected: Vec<(f64, &RoutingCandidate)> = Vec::with_capacity(want);

    while selected.len() < want && !pool.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f64::NEG_INFINITY;
        let mut best_relevance = f64::NEG_INFINITY;

        for (idx, (relevance, candidate)) in pool.iter().enumerate() {
            let max_sim_to_selected = selected
                .iter()
                .map(|(_, picked)| cache.get_or_compute(picked, &candidate.profile_embedding))
                .fold(0.0_f64, f64::max);
            let mmr =
                config.lambda_mmr * relevance - (1.0 - config.lambda_mmr) * max_sim_to_selected;

            let better = mmr > best_mmr
                || ((mmr - best_mmr).abs() < f64::EPSILON
                    && (*relevance > best_relevance
                        || ((*relevance - best_relevance).abs() < f64::EPSILON
                            && candidate.agent_id < pool[best_idx].1.agent_id)));

            if better {
                best_idx = idx;
                best_mmr = mmr;
                best_relevance = *relevance;
            }
        }

        selected.push(pool.remove(best_idx));
    }

    selected
}

/// Generic Maximal Marginal Relevance diversification over any
/// embedding-bearing item: trades relevance (`scored`'s first element)
/// against novelty relative to what's already been picked. Shared by
/// `collect`'s nutrient ranking and Hyphal Memory's `search`, in addition to
/// [`select_agents`]'s agent-specific path above.
///
/// `scored` MUST already be sorted by descending relevance and contain only
/// candidates that passed whatever relevance/visibility filter the caller
/// applies; this function does not re-filter.
#[must_use]
pub fn mmr_diversify<'a, T>(
    scored: &[(f64, &'a T)],
    embedding_of: impl Fn(&T) -> &EmbeddingVector,
    lambda: f64,
    want: usize,
) -> Vec<&'a T> {
    let mut pool: Vec<(f64, &T)> = scored.to_vec();
    let mut selected: Vec<(f64, &T)> = Vec::with_capacity(want);

    while selected.len() < want && !pool.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f64::NEG_INFINITY;

        for (idx, (relevance, candidate)) in pool.iter().enumerate() {
            let max_sim_to_selected = selected
                .iter()
                .map(|(_, picked)| embedding_of(picked).cosine_similarity(embedding_of(candidate)))
                .fold(0.0_f64, f64::max);
            let mmr = lambda * relevance - (1.0 - lambda) * max_sim_to_selected;
            if mmr > best_mmr {
                best_idx = idx;
                best_mmr = mmr;
            }
        }

        selected.push(pool.remove(best_idx));
    }

    selected.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn embedding(fill: f32) -> EmbeddingVector {
        EmbeddingVector::try_from_vec(vec![fill; EMBEDDING_DIM]).unwrap()
    }

    fn agent(id: &str) -> AgentId {
        AgentId::try_new(id.to_string()).unwrap()
    }

    #[test]
    fn rejects_wrong_dimension_embeddings() {
        let err = EmbeddingVector::try_from_vec(vec![0.0; 10]).unwrap_err();
        assert_eq!(err, RoutingError::WrongDimension { actual: 10 });
    }

    #[test]
    fn byte_round_trip_preserves_values() {
        let original = EmbeddingVector::try_from_vec(vec![0.25; EMBEDDING_DIM]).unwrap();
        let bytes = original.to_bytes();
        let restored = EmbeddingVector::from_bytes(&bytes).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        let a = embedding(1.0);
        let b = embedding(1.0);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_clamps_negative_to_zero() {
        let mut pos = vec![1.0_f32; EMBEDDING_DIM];
        let mut neg = vec![1.0_f32; EMBEDDING_DIM];
        pos[0] = 1.0;
        neg[0] = -1000.0;
        let a = EmbeddingVector::try_from_vec(pos).unwrap();
        let b = EmbeddingVector::try_from_vec(neg).unwrap();
        assert!(a.cosine_similarity(&b) >= 0.0);
    }

    #[test]
    fn semantic_overlap_respects_floor() {
        let hints = vec![Token::try_new("search".to_string()).unwrap()];
        let caps = vec![Token::try_new("xyz".to_string()).unwrap()];
        assert_eq!(semantic_overlap(&hints, &caps, 0.75), 0.0);
    }

    #[test]
    fn capability_boost_caps_at_configured_maximum() {
        let config = RouterConfig::default();
        let hints: Vec<Token> = (0..10)
            .map(|i| Token::try_new(format!("tool{i}")).unwrap())
            .collect();
        let caps = hints.clone();
        let boost = capability_boost(&hints, &caps, &config);
        assert!((boost - config.capability_boost_cap).abs() < 1e-9);
    }

    #[test]
    fn select_agents_errors_on_empty_candidates() {
        let config = RouterConfig::default();
        let mut rng = StepRng::new(0, 1);
        let err = select_agents(
            &[],
            &embedding(0.5),
            &[],
            CandidateBound::try_new(20).unwrap(),
            &config,
            &mut rng,
        )
        .unwrap_err();
        assert_eq!(err, RoutingError::NoCandidates);
    }

    #[test]
    fn select_agents_returns_at_most_k_decisions() {
        let config = RouterConfig::default();
        let candidates: Vec<_> = (0..30)
            .map(|i| RoutingCandidate {
                agent_id: agent(&format!("agent-{i}")),
                profile_embedding: embedding((i as f32) / 100.0),
                capabilities: vec![],
                edge_weight: None,
            })
            .collect();
        let mut rng = StepRng::new(u64::MAX, 1);
        let decisions = select_agents(
            &candidates,
            &embedding(0.1),
            &[],
            CandidateBound::try_new(20).unwrap(),
            &config,
            &mut rng,
        )
        .unwrap();
        assert!(decisions.len() <= 20);
        assert!(!decisions.is_empty());
    }

    #[test]
    fn mmr_diversifies_rather_than_picking_identical_top_scores() {
        let config = RouterConfig::default();
        let query = embedding(1.0);
        let mut cache = SimilarityCache::new();
        let candidates = vec![
            RoutingCandidate {
                agent_id: agent("a"),
                profile_embedding: embedding(1.0),
                capabilities: vec![],
                edge_weight: None,
            },
            RoutingCandidate {
                agent_id: agent("b"),
                profile_embedding: embedding(1.0),
                capabilities: vec![],
                edge_weight: None,
            },
            RoutingCandidate {
                agent_id: agent("c"),
                profile_embedding: embedding(-1.0),
                capabilities: vec![],
                edge_weight: None,
            },
        ];
        let scored: Vec<(f64, &RoutingCandidate)> = candidates
            .iter()
            .map(|c| (score_candidate(c, &query, &[], &config, &mut cache), c))
            .collect();
        let picked = mmr_select(&scored, &mut cache, &config, 2);
        assert_eq!(picked.len(), 2);
    }
}
