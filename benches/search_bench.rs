// Search fusion benchmarks: BM25 scoring, RRF / weighted-sum fusion and MMR
// over synthetic summary collections.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lorekeep::engine::search::{mmr_rerank, rrf_fuse, weighted_sum_fuse, Bm25Index};
use lorekeep::SearchHit;

const WORDS: &[&str] = &[
    "elara", "kael", "mira", "ironhold", "saltmere", "wyvern", "compass", "river", "gate",
    "guild", "sword", "lantern", "harbor", "storm", "oath", "forest", "tower", "bargain",
];

fn corpus(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            (0..24)
                .map(|j| WORDS[(i * 7 + j * 3 + j * j) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn ranked(n: usize, offset: usize) -> Vec<String> {
    (0..n).map(|i| format!("doc-{}", (i * 13 + offset) % n)).collect()
}

fn bench_bm25(c: &mut Criterion) {
    let mut group = c.benchmark_group("bm25");
    for n in [100, 1000] {
        let docs = corpus(n);
        group.bench_with_input(BenchmarkId::new("build_and_score", n), &docs, |b, docs| {
            b.iter(|| Bm25Index::build(docs).score(black_box("elara ironhold gate")))
        });
    }
    group.finish();
}

fn bench_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion");
    for n in [100, 1000] {
        let lists = vec![ranked(n, 0), ranked(n, 5), ranked(n, 11)];
        group.bench_with_input(BenchmarkId::new("rrf", n), &lists, |b, lists| {
            b.iter(|| rrf_fuse(black_box(lists), 60.0))
        });

        let scored: Vec<(Vec<(String, f64)>, f64)> = lists
            .iter()
            .zip([0.3, 0.6, 0.1])
            .map(|(l, w)| {
                let scores = l.iter().enumerate().map(|(i, id)| (id.clone(), 1.0 / (i + 1) as f64)).collect();
                (scores, w)
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("weighted_sum", n), &scored, |b, scored| {
            b.iter(|| weighted_sum_fuse(black_box(scored)))
        });
    }
    group.finish();
}

fn bench_mmr(c: &mut Criterion) {
    let hits: Vec<SearchHit> = corpus(50)
        .into_iter()
        .enumerate()
        .map(|(i, text)| SearchHit {
            id: format!("doc-{i}"),
            text,
            score: 1.0 / (i + 1) as f64,
            sources: Vec::new(),
            metadata: serde_json::Value::Null,
        })
        .collect();
    c.bench_function("mmr_rerank_50_to_5", |b| {
        b.iter(|| mmr_rerank(black_box(hits.clone()), 5, 0.7))
    });
}

criterion_group!(benches, bench_bm25, bench_fusion, bench_mmr);
criterion_main!(benches);
