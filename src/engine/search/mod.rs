// Lorekeep: Retrieval
//
// Module layout:
//   bm25    - Okapi BM25 index + keyword-overlap scoring
//   fusion  - RRF / weighted RRF / weighted-sum fusion, query-shape weighting
//   mmr     - Maximal Marginal Relevance diversity reranking
//   engine  - SearchEngine over a vector-store collection, prompt formatting

pub mod bm25;
pub mod engine;
pub mod fusion;
pub mod mmr;

pub use bm25::{keyword_scores, Bm25Index};
pub use engine::{format_context, SearchEngine, SearchOptions};
pub use fusion::{
    effective_weights, resolve_text_weight, rrf_fuse, weighted_rrf_fuse, weighted_sum_fuse,
};
pub use mmr::mmr_rerank;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "as", "do",
    "did", "does", "has", "have", "had", "i", "you", "he", "she", "we", "they", "me", "him",
    "her", "us", "them", "my", "your", "his", "our", "their", "what", "who", "where", "when",
    "how", "why", "which", "about", "into", "then", "than", "so", "not", "no",
];

/// Lowercase alphanumeric tokens with stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stop_words_and_punctuation() {
        assert_eq!(
            tokenize("Where is the Sword of Dawn? It's in Ironhold!"),
            vec!["sword", "dawn", "s", "ironhold"]
        );
        assert!(tokenize("the and of").is_empty());
    }
}
