// ── Lexical scoring ─────────────────────────────────────────────────────────
//
// Okapi BM25 over a small in-memory corpus (one collection), plus a plain
// term-overlap score used as a cheap third signal.
//
//   idf(t)   = ln(1 + (N - df + 0.5) / (df + 0.5))
//   score(d) = Σ idf(t) · tf·(k1+1) / (tf + k1·(1 - b + b·|d|/avgdl))

use std::collections::{HashMap, HashSet};

use super::tokenize;
use crate::atoms::constants::{BM25_B, BM25_K1};

pub struct Bm25Index {
    doc_terms: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn build<S: AsRef<str>>(docs: &[S]) -> Self {
        let mut doc_terms = Vec::with_capacity(docs.len());
        let mut doc_lens = Vec::with_capacity(docs.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let tokens = tokenize(doc.as_ref());
            doc_lens.push(tokens.len());
            let mut tf: HashMap<String, usize> = HashMap::new();
            for t in tokens {
                *tf.entry(t).or_default() += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            doc_terms.push(tf);
        }

        let total: usize = doc_lens.iter().sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };
        Self { doc_terms, doc_lens, doc_freq, avg_len }
    }

    pub fn len(&self) -> usize {
        self.doc_terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_terms.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_terms.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// One score per document, in build order.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        let avg = if self.avg_len > 0.0 { self.avg_len } else { 1.0 };
        self.doc_terms
            .iter()
            .zip(&self.doc_lens)
            .map(|(tf, &len)| {
                terms
                    .iter()
                    .filter_map(|t| {
                        let f = *tf.get(t)? as f64;
                        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len as f64 / avg);
                        Some(self.idf(t) * f * (BM25_K1 + 1.0) / (f + norm))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Fraction of distinct query terms present in each document.
pub fn keyword_scores<S: AsRef<str>>(query: &str, docs: &[S]) -> Vec<f64> {
    let terms: HashSet<String> = tokenize(query).into_iter().collect();
    if terms.is_empty() {
        return vec![0.0; docs.len()];
    }
    docs.iter()
        .map(|d| {
            let words: HashSet<String> = tokenize(d.as_ref()).into_iter().collect();
            terms.iter().filter(|t| words.contains(*t)).count() as f64 / terms.len() as f64
        })
        .collect()
}
