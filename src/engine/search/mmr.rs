// ── Maximal Marginal Relevance ──────────────────────────────────────────────
//
//   MMR(d) = λ · relevance(d) − (1 − λ) · max_{s ∈ selected} sim(d, s)
//
// relevance is the fused score divided by the best score, sim is token-set
// Jaccard. λ = 1.0 keeps the fused order; lower values push near-duplicate
// summaries further down.

use std::collections::HashSet;

use super::tokenize;
use crate::atoms::types::SearchHit;

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        a.intersection(b).count() as f64 / union as f64
    }
}

/// Pick up to `k` hits, trading relevance for diversity.
pub fn mmr_rerank(hits: Vec<SearchHit>, k: usize, lambda: f64) -> Vec<SearchHit> {
    if hits.is_empty() || k == 0 {
        return Vec::new();
    }
    let lambda = lambda.clamp(0.0, 1.0);
    let max_score = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
    let relevance: Vec<f64> = hits
        .iter()
        .map(|h| if max_score > 0.0 { h.score / max_score } else { 0.0 })
        .collect();
    let token_sets: Vec<HashSet<String>> = hits
        .iter()
        .map(|h| tokenize(&h.text).into_iter().collect())
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(hits.len()));
    let mut remaining: Vec<usize> = (0..hits.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f64::MIN;
        for (pos, &i) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|&s| jaccard(&token_sets[i], &token_sets[s]))
                .fold(0.0_f64, f64::max);
            let score = lambda * relevance[i] - (1.0 - lambda) * max_sim;
            // Strict comparison keeps the earlier (higher fused) hit on ties.
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }

    let mut slots: Vec<Option<SearchHit>> = hits.into_iter().map(Some).collect();
    selected.into_iter().filter_map(|i| slots[i].take()).collect()
}
