// Lorekeep: Vector store
//
// Text documents grouped in named collections, each with an optional
// embedding. Records live in SQLite; recently read records sit in an LRU
// cache (`vector_store.cache_size`, 0 disables it). Embedding is best-effort:
// a record whose embedding fails is stored without one and can be filled in
// later with `backfill_embeddings`.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;

use crate::atoms::error::LoreResult;
use crate::atoms::traits::Embedder;
use crate::atoms::types::{CacheStats, VectorRecord, VectorStoreConfig};
use crate::engine::store::{cosine_similarity, now, Store};

pub struct VectorStore {
    store: Arc<Store>,
    embedder: Option<Arc<dyn Embedder>>,
    /// Needs exclusive access even for reads (to update LRU order).
    cache: Option<Mutex<LruCache<String, VectorRecord>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl VectorStore {
    pub fn new(
        store: Arc<Store>,
        embedder: Option<Arc<dyn Embedder>>,
        config: &VectorStoreConfig,
    ) -> Self {
        let cache = NonZeroUsize::new(config.cache_size).map(|n| Mutex::new(LruCache::new(n)));
        VectorStore {
            store,
            embedder,
            cache,
            capacity: config.cache_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Embed `text`, logging and swallowing failures.
    pub async fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("[lorekeep:vector] Embedding via {} failed: {}", embedder.name(), e);
                None
            }
        }
    }

    /// Store a new document under a fresh id.
    pub async fn insert(&self, collection: &str, text: &str, metadata: Value) -> LoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.upsert(&id, collection, text, metadata).await?;
        Ok(id)
    }

    /// Store a document under a caller-chosen id, replacing any previous one.
    pub async fn upsert(
        &self,
        id: &str,
        collection: &str,
        text: &str,
        metadata: Value,
    ) -> LoreResult<VectorRecord> {
        let embedding = self.embed_text(text).await;
        let record = VectorRecord {
            id: id.to_string(),
            collection: collection.to_string(),
            text: text.to_string(),
            embedding,
            metadata,
            created_at: now(),
        };
        self.store.put_vector(&record)?;
        if let Some(cache) = &self.cache {
            cache.lock().put(record.id.clone(), record.clone());
        }
        debug!(
            "[lorekeep:vector] Stored {} in '{}' ({})",
            record.id,
            collection,
            if record.embedding.is_some() { "embedded" } else { "no embedding" }
        );
        Ok(record)
    }

    /// Fetch one record, cache first.
    pub fn get(&self, id: &str) -> LoreResult<Option<VectorRecord>> {
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.lock().get(id) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(record.clone()));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let record = self.store.get_vector(id)?;
        if let (Some(cache), Some(r)) = (&self.cache, &record) {
            cache.lock().put(r.id.clone(), r.clone());
        }
        Ok(record)
    }

    pub fn delete(&self, id: &str) -> LoreResult<bool> {
        if let Some(cache) = &self.cache {
            cache.lock().pop(id);
        }
        self.store.delete_vector(id)
    }

    pub fn list(&self, collection: &str) -> LoreResult<Vec<VectorRecord>> {
        self.store.list_vectors(collection)
    }

    pub fn count(&self, collection: &str) -> LoreResult<usize> {
        self.store.count_vectors(collection)
    }

    /// Remove every record of a collection. Returns how many were removed.
    pub fn clear(&self, collection: &str) -> LoreResult<usize> {
        let ids = self.store.clear_vectors(collection)?;
        if let Some(cache) = &self.cache {
            let mut cache = cache.lock();
            for id in &ids {
                cache.pop(id);
            }
        }
        info!("[lorekeep:vector] Cleared {} record(s) from '{}'", ids.len(), collection);
        Ok(ids.len())
    }

    /// Rank a collection by cosine similarity to an embedding.
    pub fn query_vector(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        threshold: f64,
    ) -> LoreResult<Vec<(VectorRecord, f64)>> {
        let mut scored: Vec<(VectorRecord, f64)> = self
            .list(collection)?
            .into_iter()
            .filter_map(|r| {
                let score = cosine_similarity(query, r.embedding.as_deref()?);
                (score >= threshold).then_some((r, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Embed `text` and rank a collection against it. Empty without an
    /// embedder or when the query cannot be embedded.
    pub async fn query(
        &self,
        collection: &str,
        text: &str,
        limit: usize,
        threshold: f64,
    ) -> LoreResult<Vec<(VectorRecord, f64)>> {
        match self.embed_text(text).await {
            Some(q) => self.query_vector(collection, &q, limit, threshold),
            None => Ok(Vec::new()),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0),
            capacity: self.capacity,
        }
    }

    /// Embed records stored without a vector. Stops at the first embedding
    /// failure and returns how many were filled.
    pub async fn backfill_embeddings(&self, collection: &str) -> LoreResult<usize> {
        if self.embedder.is_none() {
            return Ok(0);
        }
        let missing = self.store.vectors_missing_embedding(collection)?;
        let mut filled = 0;
        for (id, text) in missing {
            let Some(embedding) = self.embed_text(&text).await else {
                break;
            };
            self.store.set_vector_embedding(&id, &embedding)?;
            if let Some(cache) = &self.cache {
                if let Some(r) = cache.lock().peek_mut(&id) {
                    r.embedding = Some(embedding);
                }
            }
            filled += 1;
        }
        if filled > 0 {
            info!("[lorekeep:vector] Backfilled {} embedding(s) in '{}'", filled, collection);
        }
        Ok(filled)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::atoms::error::LoreError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    /// Bag-of-letters embedder: similar spelling → similar vectors.
    pub(crate) struct LetterEmbedder {
        pub fail: AtomicBool,
    }

    impl LetterEmbedder {
        pub fn new() -> Self {
            Self { fail: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn name(&self) -> &str {
            "letters"
        }
        async fn embed(&self, text: &str) -> LoreResult<Vec<f32>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LoreError::embedding("offline"));
            }
            let mut v = vec![0.0f32; 26];
            for c in text.to_lowercase().chars() {
                if c.is_ascii_lowercase() {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
            }
            Ok(v)
        }
    }

    fn vector_store(cache_size: usize) -> (VectorStore, Arc<LetterEmbedder>) {
        let embedder = Arc::new(LetterEmbedder::new());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let vs = VectorStore::new(
            store,
            Some(embedder.clone() as Arc<dyn Embedder>),
            &VectorStoreConfig { cache_size },
        );
        (vs, embedder)
    }

    #[tokio::test]
    async fn insert_get_uses_cache() {
        let (vs, _) = vector_store(4);
        let id = vs.insert("summaries", "Elara crossed the river", json!({"n": 1})).await.unwrap();

        let first = vs.get(&id).unwrap().unwrap();
        assert!(first.embedding.is_some());
        assert_eq!(vs.cache_stats().hits, 1);

        assert!(vs.get("missing").unwrap().is_none());
        let stats = vs.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 4);
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used() {
        let (vs, _) = vector_store(2);
        let a = vs.insert("c", "alpha", Value::Null).await.unwrap();
        let _b = vs.insert("c", "beta", Value::Null).await.unwrap();
        let _c = vs.insert("c", "gamma", Value::Null).await.unwrap();
        assert_eq!(vs.cache_stats().entries, 2);
        // `a` was evicted; the read falls through to SQLite.
        assert!(vs.get(&a).unwrap().is_some());
        assert_eq!(vs.cache_stats().misses, 1);
    }

    #[tokio::test]
    async fn embedding_failure_stores_without_vector_then_backfills() {
        let (vs, embedder) = vector_store(8);
        embedder.fail.store(true, Ordering::SeqCst);
        let id = vs.insert("summaries", "Kael sharpened his blade", Value::Null).await.unwrap();
        assert!(vs.get(&id).unwrap().unwrap().embedding.is_none());
        assert_eq!(vs.backfill_embeddings("summaries").await.unwrap(), 0);

        embedder.fail.store(false, Ordering::SeqCst);
        assert_eq!(vs.backfill_embeddings("summaries").await.unwrap(), 1);
        assert!(vs.get(&id).unwrap().unwrap().embedding.is_some());
        assert_eq!(vs.backfill_embeddings("summaries").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_ranks_by_cosine() {
        let (vs, _) = vector_store(0);
        vs.insert("s", "zzzz yyyy", Value::Null).await.unwrap();
        vs.insert("s", "abc abc abc", Value::Null).await.unwrap();
        vs.insert("other", "abc abc abc", Value::Null).await.unwrap();

        let hits = vs.query("s", "abc", 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.text, "abc abc abc");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);

        let strict = vs.query("s", "abc", 10, 0.5).await.unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(vs.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn delete_and_clear_evict_cache() {
        let (vs, _) = vector_store(8);
        let a = vs.insert("m", "one", Value::Null).await.unwrap();
        vs.insert("m", "two", Value::Null).await.unwrap();
        assert!(vs.delete(&a).unwrap());
        assert!(vs.get(&a).unwrap().is_none());
        assert_eq!(vs.clear("m").unwrap(), 1);
        assert_eq!(vs.count("m").unwrap(), 0);
        assert_eq!(vs.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn no_embedder_means_no_vector_results() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let vs = VectorStore::new(store, None, &VectorStoreConfig::default());
        vs.insert("s", "text", Value::Null).await.unwrap();
        assert!(vs.query("s", "text", 5, 0.0).await.unwrap().is_empty());
        assert_eq!(vs.backfill_embeddings("s").await.unwrap(), 0);
    }
}
