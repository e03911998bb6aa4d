// ── Search engine ───────────────────────────────────────────────────────────
//
// Runs the configured algorithms over one vector-store collection, fuses
// their rankings, drops weak results, optionally diversifies with MMR and
// truncates to the limit.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use super::bm25::{keyword_scores, Bm25Index};
use super::fusion::{effective_weights, weighted_rrf_fuse, weighted_sum_fuse};
use super::mmr::mmr_rerank;
use crate::atoms::error::LoreResult;
use crate::atoms::types::{FusionMethod, SearchAlgorithm, SearchConfig, SearchHit, VectorRecord};
use crate::engine::store::cosine_similarity;
use crate::engine::vector_store::VectorStore;

/// Per-call overrides of `SearchConfig`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub fusion: Option<FusionMethod>,
    pub algorithms: Option<Vec<SearchAlgorithm>>,
    pub min_score: Option<f64>,
    pub mmr: Option<bool>,
}

pub struct SearchEngine {
    vectors: Arc<VectorStore>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(vectors: Arc<VectorStore>, config: SearchConfig) -> Self {
        Self { vectors, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Ranked (id, score) pairs with a positive score for one algorithm.
    async fn run_algorithm(
        &self,
        algorithm: SearchAlgorithm,
        query: &str,
        docs: &[VectorRecord],
    ) -> Vec<(String, f64)> {
        let scores: Vec<f64> = match algorithm {
            SearchAlgorithm::Bm25 => {
                let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
                Bm25Index::build(&texts).score(query)
            }
            SearchAlgorithm::Keyword => {
                let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
                keyword_scores(query, &texts)
            }
            SearchAlgorithm::Cosine => {
                let Some(q) = self.vectors.embed_text(query).await else {
                    debug!("[lorekeep:search] No query embedding; cosine list skipped");
                    return Vec::new();
                };
                docs.iter()
                    .map(|d| d.embedding.as_deref().map(|e| cosine_similarity(&q, e)).unwrap_or(0.0))
                    .collect()
            }
        };

        let mut ranked: Vec<(String, f64)> = docs
            .iter()
            .zip(scores)
            .filter(|(_, s)| *s > 0.0)
            .map(|(d, s)| (d.id.clone(), s))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> LoreResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.vectors.list(collection)?;
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let algorithms = options
            .algorithms
            .clone()
            .unwrap_or_else(|| self.config.algorithms.clone());
        let fusion = options.fusion.unwrap_or(self.config.fusion);
        let limit = options.limit.unwrap_or(self.config.limit);
        let min_score = options.min_score.unwrap_or(self.config.min_score);
        let use_mmr = options.mmr.unwrap_or(self.config.mmr);

        let weight_config = SearchConfig {
            algorithms: algorithms.clone(),
            ..self.config.clone()
        };
        let weights = effective_weights(query, &weight_config);

        let mut lists: Vec<(SearchAlgorithm, Vec<(String, f64)>, f64)> = Vec::new();
        let mut sources: HashMap<String, Vec<SearchAlgorithm>> = HashMap::new();
        for algorithm in algorithms {
            let ranked = self.run_algorithm(algorithm, query, &docs).await;
            for (id, _) in &ranked {
                sources.entry(id.clone()).or_default().push(algorithm);
            }
            lists.push((algorithm, ranked, weights.get(algorithm)));
        }

        let fused = match fusion {
            FusionMethod::Rrf => {
                let ranked: Vec<(Vec<String>, f64)> = lists
                    .iter()
                    .map(|(_, l, w)| (l.iter().map(|(id, _)| id.clone()).collect(), *w))
                    .collect();
                weighted_rrf_fuse(&ranked, self.config.rrf_k)
            }
            FusionMethod::WeightedSum => {
                let scored: Vec<(Vec<(String, f64)>, f64)> =
                    lists.iter().map(|(_, l, w)| (l.clone(), *w)).collect();
                weighted_sum_fuse(&scored)
            }
        };

        let by_id: HashMap<&str, &VectorRecord> = docs.iter().map(|d| (d.id.as_str(), d)).collect();
        let hits: Vec<SearchHit> = fused
            .into_iter()
            .filter(|(_, score)| *score >= min_score)
            .filter_map(|(id, score)| {
                let doc = by_id.get(id.as_str())?;
                Some(SearchHit {
                    sources: sources.remove(&id).unwrap_or_default(),
                    id,
                    text: doc.text.clone(),
                    score,
                    metadata: doc.metadata.clone(),
                })
            })
            .collect();

        let hits = if use_mmr {
            mmr_rerank(hits, limit, self.config.mmr_lambda)
        } else {
            hits.into_iter().take(limit).collect()
        };

        info!(
            "[lorekeep:search] '{}' in '{}': {} hit(s) via {:?}",
            query,
            collection,
            hits.len(),
            fusion
        );
        Ok(hits)
    }
}

const CONTEXT_HEADER: &str = "[Relevant memories]";

/// Render hits as a bullet list under a header, within `max_chars`.
/// Hits that do not fit are left out; a first hit that alone exceeds the
/// budget is truncated.
pub fn format_context(hits: &[SearchHit], max_chars: usize) -> String {
    if hits.is_empty() || max_chars <= CONTEXT_HEADER.len() + 3 {
        return String::new();
    }
    let mut out = String::from(CONTEXT_HEADER);
    let mut used = out.chars().count();
    let mut added = 0;

    for hit in hits {
        let text = hit.text.trim();
        if text.is_empty() {
            continue;
        }
        let line = format!("\n- {}", text);
        let len = line.chars().count();
        if used + len <= max_chars {
            out.push_str(&line);
            used += len;
            added += 1;
        } else if added == 0 {
            let room = max_chars - used - 3;
            let truncated: String = text.chars().take(room.saturating_sub(1)).collect();
            out.push_str("\n- ");
            out.push_str(truncated.trim_end());
            out.push('…');
            added += 1;
            break;
        } else {
            break;
        }
    }

    if added == 0 {
        String::new()
    } else {
        out
    }
}
