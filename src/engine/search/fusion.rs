// ── Result fusion ───────────────────────────────────────────────────────────
//
// Combines the per-algorithm rankings into one list.
//
//   RRF:          score(d) = Σ w_i / (k + rank_i(d) + 1)
//   Weighted sum: score(d) = Σ w_i · minmax_i(d) / Σ w_i
//
// Query shape shifts weight between the lexical lists (BM25, keyword) and
// the vector list: lookups of names and numbers lean lexical, open-ended
// narrative questions lean semantic.

use std::collections::HashMap;

use crate::atoms::types::{AlgorithmWeights, SearchAlgorithm, SearchConfig};

const AUTO_MIN: f64 = 0.1;
const AUTO_MAX: f64 = 0.9;
const FACTUAL_STEP: f64 = 0.08;
const NARRATIVE_STEP: f64 = 0.06;

fn sort_desc(scores: HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// Standard RRF over ranked id lists, equal weights.
pub fn rrf_fuse(lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    let weighted: Vec<(Vec<String>, f64)> = lists.iter().map(|l| (l.clone(), 1.0)).collect();
    weighted_rrf_fuse(&weighted, k)
}

/// RRF where each ranked list contributes in proportion to its weight.
pub fn weighted_rrf_fuse(lists: &[(Vec<String>, f64)], k: f64) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (ranked, weight) in lists {
        for (rank, id) in ranked.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += weight / (k + rank as f64 + 1.0);
        }
    }
    sort_desc(scores)
}

/// Min–max normalise each list to [0, 1], then take the weighted mean.
/// A list whose scores are all equal normalises to 1.0.
pub fn weighted_sum_fuse(lists: &[(Vec<(String, f64)>, f64)]) -> Vec<(String, f64)> {
    let total_weight: f64 = lists
        .iter()
        .filter(|(l, _)| !l.is_empty())
        .map(|(_, w)| *w)
        .sum();
    if total_weight <= 0.0 {
        return Vec::new();
    }

    let mut scores: HashMap<String, f64> = HashMap::new();
    for (list, weight) in lists {
        if list.is_empty() {
            continue;
        }
        let max = list.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
        let min = list.iter().map(|(_, s)| *s).fold(f64::MAX, f64::min);
        let range = max - min;
        for (id, s) in list {
            let norm = if range.abs() < 1e-12 { 1.0 } else { (s - min) / range };
            *scores.entry(id.clone()).or_default() += weight * norm / total_weight;
        }
    }
    sort_desc(scores)
}

/// Share of the total weight given to lexical algorithms for this query.
///
/// Without `auto_weight` this is the configured lexical share. Otherwise
/// factual signals (digits, quotes, short lookups, proper nouns) raise it and
/// narrative signals ("what happened", "how did", long questions) lower it,
/// clamped to [0.1, 0.9].
pub fn resolve_text_weight(query: &str, config: &SearchConfig) -> f64 {
    let w = &config.weights;
    let lexical = w.bm25 + w.keyword;
    let total = lexical + w.cosine;
    let base = if total > 0.0 { lexical / total } else { 0.5 };
    if !config.auto_weight {
        return base;
    }

    let lower = query.to_lowercase();
    let words: Vec<&str> = query.split_whitespace().collect();
    let word_count = words.len();

    let factual = [
        query.chars().any(|c| c.is_ascii_digit()),
        query.contains('"'),
        word_count > 0 && word_count <= 3,
        // Capitalised word after the first: a proper noun.
        words.iter().skip(1).any(|w| w.chars().next().is_some_and(char::is_uppercase)),
        lower.starts_with("who is") || lower.starts_with("where is") || lower.starts_with("name of"),
    ]
    .iter()
    .filter(|&&b| b)
    .count();

    let narrative = [
        lower.starts_with("how"),
        lower.starts_with("why"),
        lower.starts_with("what happened"),
        lower.starts_with("describe"),
        lower.starts_with("tell me about"),
        lower.starts_with("remember when"),
        word_count > 8,
        ["feel", "felt", "mood", "relationship"].iter().any(|k| lower.contains(k)),
    ]
    .iter()
    .filter(|&&b| b)
    .count();

    let adjusted = base + factual as f64 * FACTUAL_STEP - narrative as f64 * NARRATIVE_STEP;
    adjusted.clamp(AUTO_MIN, AUTO_MAX)
}

/// Configured weights rescaled so the lexical algorithms share
/// `resolve_text_weight` of the total. Unchanged when either side has no weight.
pub fn effective_weights(query: &str, config: &SearchConfig) -> AlgorithmWeights {
    let w = &config.weights;
    let lexical = w.bm25 + w.keyword;
    if lexical <= 0.0 || w.cosine <= 0.0 || !config.algorithms.contains(&SearchAlgorithm::Cosine) {
        return w.clone();
    }
    let text = resolve_text_weight(query, config);
    AlgorithmWeights {
        bm25: text * w.bm25 / lexical,
        keyword: text * w.keyword / lexical,
        cosine: 1.0 - text,
    }
}
