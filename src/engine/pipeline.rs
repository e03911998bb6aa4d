// Lorekeep: Pipeline facade
//
// `Lorekeeper` owns every engine component over one shared `Store`:
//
//   ingest_message ─► extractor ─► registry ─► store.entities
//   run_window     ─► planner ─► summarizer ─► store.summaries + vectors
//   search         ─► SearchEngine over a vector collection
//   sync_lorebook  ─► LorebookGenerator over a registry snapshot
//
// Window passes are serialised by an async mutex so a debounced pass and a
// manual one never summarize the same messages twice.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use crate::atoms::constants::{MESSAGE_COLLECTION, SUMMARY_COLLECTION};
use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::traits::{Embedder, TextGenerator};
use crate::atoms::types::{
    CacheStats, ChatMessage, Entity, Lorebook, SearchHit, Summary, WindowReport, WindowState,
};
use crate::engine::config::LorekeepConfig;
use crate::engine::debounce::Debouncer;
use crate::engine::entities::{EntityExtractor, EntityRegistry};
use crate::engine::lorebook::{LorebookGenerator, SyncReport};
use crate::engine::search::{format_context, SearchEngine, SearchOptions};
use crate::engine::store::Store;
use crate::engine::summarizer::Summarizer;
use crate::engine::vector_store::VectorStore;
use crate::engine::window;

/// Snapshot of what the memory holds.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub entities: usize,
    pub summaries: usize,
    pub fallback_summaries: usize,
    pub summarized_until: Option<usize>,
    /// (collection, record count)
    pub collections: Vec<(String, usize)>,
    pub cache: CacheStats,
}

pub struct Lorekeeper {
    config: LorekeepConfig,
    store: Arc<Store>,
    extractor: EntityExtractor,
    registry: Mutex<EntityRegistry>,
    summarizer: Summarizer,
    vectors: Arc<VectorStore>,
    search: SearchEngine,
    lorebook: LorebookGenerator,
    debouncer: Debouncer,
    window_lock: tokio::sync::Mutex<()>,
}

impl Lorekeeper {
    /// Build the engine and reload persisted entities from `store`.
    pub fn new(
        config: LorekeepConfig,
        store: Arc<Store>,
        generator: Option<Arc<dyn TextGenerator>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> LoreResult<Self> {
        config.validate()?;

        let extractor = EntityExtractor::new(config.extraction.clone())?;
        let entities = store.load_entities()?;
        let registry = EntityRegistry::from_entities(entities, config.extraction.max_contexts);
        let vectors = Arc::new(VectorStore::new(
            Arc::clone(&store),
            embedder,
            &config.vector_store,
        ));
        let search = SearchEngine::new(Arc::clone(&vectors), config.search.clone());
        let summarizer = Summarizer::new(generator.clone(), config.summarizer.clone());
        let lorebook = LorebookGenerator::new(generator, config.lorebook.clone());
        let debouncer = Debouncer::new(Duration::from_millis(config.window.debounce_ms));

        info!(
            "[lorekeep:store] Memory ready: {} entities, embedder {}",
            registry.len(),
            if vectors.has_embedder() { "on" } else { "off" }
        );

        Ok(Self {
            config,
            store,
            extractor,
            registry: Mutex::new(registry),
            summarizer,
            vectors,
            search,
            lorebook,
            debouncer,
            window_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &LorekeepConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn vectors(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    // ── Entities ───────────────────────────────────────────────────────────

    /// Extract entities from one message and record them. Returns the
    /// updated entity records.
    pub fn ingest_message(&self, message: &ChatMessage) -> LoreResult<Vec<Entity>> {
        let candidates = self.extractor.extract_message(message);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut registry = self.registry.lock();
        let mut next = registry.clone();
        let mut changed: BTreeMap<String, Entity> = BTreeMap::new();
        for candidate in &candidates {
            let entity = next.observe(candidate, message.index);
            changed.insert(entity.key.clone(), entity.clone());
        }
        // Persist before publishing so memory never runs ahead of the store.
        self.store.save_entities(changed.values())?;
        *registry = next;
        Ok(changed.into_values().collect())
    }

    /// Ingest a whole chat in order. Returns how many distinct entities changed.
    pub fn ingest_chat(&self, messages: &[ChatMessage]) -> LoreResult<usize> {
        let mut registry = self.registry.lock();
        let mut next = registry.clone();
        let mut changed: BTreeMap<String, Entity> = BTreeMap::new();
        for message in messages {
            for candidate in self.extractor.extract_message(message) {
                let entity = next.observe(&candidate, message.index);
                changed.insert(entity.key.clone(), entity.clone());
            }
        }
        let saved = self.store.save_entities(changed.values())?;
        *registry = next;
        drop(registry);
        info!(
            "[lorekeep:entity] Ingested {} messages, {} entities updated",
            messages.len(),
            saved
        );
        Ok(saved)
    }

    pub fn lookup_entity(&self, name: &str) -> Option<Entity> {
        self.registry.lock().lookup(name).cloned()
    }

    /// Every tracked entity, most confident first.
    pub fn entities(&self) -> Vec<Entity> {
        self.registry.lock().all().into_iter().cloned().collect()
    }

    /// Drop an entity from memory and the store.
    pub fn forget_entity(&self, name: &str) -> LoreResult<bool> {
        let mut registry = self.registry.lock();
        let key = match registry.lookup(name) {
            Some(entity) => entity.key.clone(),
            None => return Ok(false),
        };
        let deleted = self.store.delete_entity(&key)?;
        registry.remove(&key);
        Ok(deleted)
    }

    /// Fold `secondary` into `primary` and persist the result.
    pub fn merge_entities(&self, primary: &str, secondary: &str) -> LoreResult<Entity> {
        let mut registry = self.registry.lock();
        let mut next = registry.clone();
        let secondary_key = next
            .lookup(secondary)
            .map(|e| e.key.clone())
            .ok_or_else(|| LoreError::NotFound(format!("entity '{secondary}'")))?;
        let merged = next.merge(primary, secondary)?.clone();
        self.store.save_entity(&merged)?;
        self.store.delete_entity(&secondary_key)?;
        *registry = next;
        Ok(merged)
    }

    // ── Sliding window ─────────────────────────────────────────────────────

    pub fn window_state(&self) -> LoreResult<WindowState> {
        window::load_state(&self.store)
    }

    /// Summarize every message that has left the recent window and is not
    /// summarized yet.
    pub async fn run_window(&self, messages: &[ChatMessage]) -> LoreResult<WindowReport> {
        let _pass = self.window_lock.lock().await;

        let state = window::load_state(&self.store)?;
        let plan = window::plan_window(messages, &state, &self.config.window);
        if plan.is_empty() {
            return Ok(WindowReport::default());
        }

        let selected: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| plan.candidates.binary_search(&m.index).is_ok())
            .cloned()
            .collect();
        info!(
            "[lorekeep:window] Summarizing {} messages ({}-{})",
            selected.len(),
            plan.candidates.first().copied().unwrap_or_default(),
            plan.candidates.last().copied().unwrap_or_default()
        );

        let summaries = self.summarizer.summarize_all(&selected).await;
        let mut written = Vec::new();
        let indexed_messages = match self.persist_window(&summaries, &selected, &mut written).await {
            Ok(n) => n,
            Err(e) => {
                self.rollback_window(&summaries, &written);
                return Err(e);
            }
        };

        let until = plan.candidates.iter().copied().max();
        if let Err(e) = window::save_state(&self.store, &WindowState { summarized_until: until }) {
            self.rollback_window(&summaries, &written);
            return Err(e);
        }

        let fallbacks = summaries.iter().filter(|s| s.fallback).count();
        if fallbacks > 0 {
            warn!("[lorekeep:window] {} summaries fell back to raw text", fallbacks);
        }
        Ok(WindowReport {
            summaries,
            hidden: plan.to_hide,
            fallbacks,
            indexed_messages,
        })
    }

    /// Write summaries (and optionally the raw messages) to the store and the
    /// vector index. Ids of vector records written so far go into `written`.
    async fn persist_window(
        &self,
        summaries: &[Summary],
        selected: &[ChatMessage],
        written: &mut Vec<String>,
    ) -> LoreResult<usize> {
        for summary in summaries {
            self.store.insert_summary(summary)?;
            written.push(summary.id.clone());
            self.vectors
                .upsert(
                    &summary.id,
                    SUMMARY_COLLECTION,
                    &summary.text,
                    json!({
                        "first_index": summary.first_index,
                        "last_index": summary.last_index,
                        "fallback": summary.fallback,
                    }),
                )
                .await?;
        }

        let mut indexed = 0;
        if self.config.window.index_messages {
            for message in selected {
                let id = format!("message-{}", message.index);
                written.push(id.clone());
                self.vectors
                    .upsert(
                        &id,
                        MESSAGE_COLLECTION,
                        &format!("{}: {}", message.name, message.text.trim()),
                        json!({ "index": message.index, "name": message.name }),
                    )
                    .await?;
                indexed += 1;
            }
        }
        Ok(indexed)
    }

    /// Undo a failed pass so the next one starts from the same state.
    fn rollback_window(&self, summaries: &[Summary], written: &[String]) {
        for summary in summaries {
            if let Err(e) = self.store.delete_summary(&summary.id) {
                warn!("[lorekeep:window] Rollback of summary {} failed: {}", summary.id, e);
            }
        }
        for id in written {
            if let Err(e) = self.vectors.delete(id) {
                warn!("[lorekeep:window] Rollback of vector {} failed: {}", id, e);
            }
        }
    }

    /// Queue a window pass after the debounce delay. A newer call replaces
    /// a pass that has not started yet.
    pub fn schedule_window(self: &Arc<Self>, messages: Vec<ChatMessage>) -> LoreResult<()> {
        let this = Arc::clone(self);
        self.debouncer.trigger(async move {
            match this.run_window(&messages).await {
                Ok(report) if !report.summaries.is_empty() => info!(
                    "[lorekeep:window] Background pass stored {} summaries",
                    report.summaries.len()
                ),
                Ok(_) => {}
                Err(e) => warn!("[lorekeep:window] Background pass failed: {}", e),
            }
        })
    }

    pub fn cancel_scheduled_window(&self) -> bool {
        self.debouncer.cancel()
    }

    pub fn window_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Forget all summaries and indexed messages and rewind the window.
    pub async fn reset_window(&self) -> LoreResult<()> {
        let _pass = self.window_lock.lock().await;
        let summaries = self.store.clear_summaries()?;
        self.vectors.clear(SUMMARY_COLLECTION)?;
        self.vectors.clear(MESSAGE_COLLECTION)?;
        window::save_state(&self.store, &WindowState::default())?;
        info!("[lorekeep:window] Reset ({} summaries removed)", summaries);
        Ok(())
    }

    pub fn summaries(&self) -> LoreResult<Vec<Summary>> {
        self.store.list_summaries()
    }

    // ── Retrieval ──────────────────────────────────────────────────────────

    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        options: &SearchOptions,
    ) -> LoreResult<Vec<SearchHit>> {
        self.search.search(collection, query, options).await
    }

    /// Prompt block of the summaries most relevant to `query`. Empty when
    /// nothing matches.
    pub async fn memory_context(&self, query: &str) -> LoreResult<String> {
        let hits = self
            .search
            .search(SUMMARY_COLLECTION, query, &SearchOptions::default())
            .await?;
        Ok(format_context(&hits, self.config.search.context_max_chars))
    }

    // ── Lorebook ───────────────────────────────────────────────────────────

    pub async fn sync_lorebook(&self, lorebook: &mut Lorebook) -> SyncReport {
        let snapshot = self.registry.lock().clone();
        let report = self.lorebook.sync(lorebook, &snapshot).await;
        info!(
            "[lorekeep:lorebook] Sync: {} created, {} updated, {} skipped",
            report.created, report.updated, report.skipped
        );
        report
    }

    pub fn stats(&self) -> LoreResult<MemoryStats> {
        let summaries = self.store.list_summaries()?;
        Ok(MemoryStats {
            entities: self.store.entity_count()?,
            fallback_summaries: summaries.iter().filter(|s| s.fallback).count(),
            summaries: summaries.len(),
            summarized_until: self.window_state()?.summarized_until,
            collections: self.store.vector_collections()?,
            cache: self.vectors.cache_stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{LorebookConfig, WindowConfig};
    use crate::engine::vector_store::tests::LetterEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Summarizes by echoing the first transcript line.
    struct FirstLine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for FirstLine {
        fn name(&self) -> &str {
            "first-line"
        }
        async fn generate(&self, prompt: &str, _max_tokens: Option<u32>) -> LoreResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let line = prompt
                .lines()
                .find(|l| l.contains(": ") && !l.trim_end().ends_with(':'))
                .unwrap_or("nothing");
            Ok(format!("Summary: {}", line.trim()))
        }
    }

    fn msg(index: usize, name: &str, text: &str) -> ChatMessage {
        ChatMessage {
            index,
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn chat(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| msg(i, if i % 2 == 0 { "User" } else { "Narrator" }, &format!("Line {i} about the harbor")))
            .collect()
    }

    fn config() -> LorekeepConfig {
        LorekeepConfig {
            window: WindowConfig {
                keep_recent: 2,
                min_batch: 2,
                debounce_ms: 30,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn keeper(config: LorekeepConfig, store: Arc<Store>) -> (Lorekeeper, Arc<FirstLine>) {
        let gen = Arc::new(FirstLine { calls: AtomicUsize::new(0) });
        let keeper = Lorekeeper::new(
            config,
            store,
            Some(gen.clone() as Arc<dyn TextGenerator>),
            Some(Arc::new(LetterEmbedder::new()) as Arc<dyn Embedder>),
        )
        .unwrap();
        (keeper, gen)
    }

    #[test]
    fn ingested_entities_survive_a_restart() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, _) = keeper(config(), store.clone());
        let changed = k
            .ingest_message(&msg(0, "Narrator", "\"Stay close,\" Elara said, her voice low."))
            .unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(k.lookup_entity("ELARA").unwrap().mentions, 1);
        drop(k);

        let (again, _) = keeper(config(), store);
        assert_eq!(again.entities().len(), 1);
        assert!(again.forget_entity("elara").unwrap());
        assert!(again.lookup_entity("elara").is_none());
        assert_eq!(again.store().entity_count().unwrap(), 0);
    }

    #[test]
    fn failed_entity_save_leaves_registry_untouched() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, _) = keeper(config(), store.clone());
        let line = msg(0, "Narrator", "\"Stay close,\" Elara said, her voice low.");

        store.conn.lock().execute_batch("ALTER TABLE entities RENAME TO entities_off").unwrap();
        assert!(k.ingest_message(&line).is_err());
        assert!(k.ingest_chat(std::slice::from_ref(&line)).is_err());
        assert!(k.lookup_entity("elara").is_none());

        store.conn.lock().execute_batch("ALTER TABLE entities_off RENAME TO entities").unwrap();
        k.ingest_message(&line).unwrap();
        assert_eq!(k.lookup_entity("elara").unwrap().mentions, 1);
        assert_eq!(store.entity_count().unwrap(), 1);
    }

    #[test]
    fn merged_entities_are_persisted() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, _) = keeper(config(), store);
        k.ingest_chat(&[
            msg(0, "Narrator", "\"Stay close,\" Elara said, her voice low."),
            msg(1, "Narrator", "\"Run,\" Mira said, her voice low."),
        ])
        .unwrap();
        assert_eq!(k.store().entity_count().unwrap(), 2);

        let merged = k.merge_entities("Elara", "Mira").unwrap();
        assert_eq!(merged.mentions, 2);
        assert_eq!(merged.aliases, vec!["Mira".to_string()]);
        assert_eq!(k.store().entity_count().unwrap(), 1);
        assert_eq!(k.lookup_entity("mira").unwrap().name, "Elara");
        assert!(k.merge_entities("Elara", "Nobody").is_err());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut bad = config();
        bad.window.min_batch = 0;
        assert!(Lorekeeper::new(bad, store, None, None).is_err());
    }

    #[tokio::test]
    async fn window_pass_summarizes_once_and_advances() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut cfg = config();
        cfg.window.index_messages = true;
        let (k, gen) = keeper(cfg, store);
        let messages = chat(6);

        let report = k.run_window(&messages).await.unwrap();
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.hidden, vec![0, 1, 2, 3]);
        assert_eq!(report.fallbacks, 0);
        assert_eq!(report.indexed_messages, 4);
        assert_eq!(report.summaries[0].text, "User: Line 0 about the harbor");
        assert_eq!(k.window_state().unwrap().summarized_until, Some(3));
        assert_eq!(k.vectors().count(SUMMARY_COLLECTION).unwrap(), 1);
        assert_eq!(k.vectors().count(MESSAGE_COLLECTION).unwrap(), 4);

        let again = k.run_window(&messages).await.unwrap();
        assert!(again.summaries.is_empty());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);

        k.reset_window().await.unwrap();
        assert!(k.summaries().unwrap().is_empty());
        assert_eq!(k.window_state().unwrap(), WindowState::default());
    }

    #[tokio::test]
    async fn failed_window_pass_rolls_back_and_retries_cleanly() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, gen) = keeper(config(), store.clone());
        let messages = chat(6);

        store.conn.lock().execute_batch("ALTER TABLE vectors RENAME TO vectors_off").unwrap();
        assert!(k.run_window(&messages).await.is_err());
        assert!(k.summaries().unwrap().is_empty());
        assert_eq!(k.window_state().unwrap().summarized_until, None);

        store.conn.lock().execute_batch("ALTER TABLE vectors_off RENAME TO vectors").unwrap();
        let report = k.run_window(&messages).await.unwrap();
        assert_eq!(report.summaries.len(), 1);
        let stored = k.summaries().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "summary-0-3");
        assert_eq!(k.vectors().count(SUMMARY_COLLECTION).unwrap(), 1);
        assert_eq!(k.window_state().unwrap().summarized_until, Some(3));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn memory_context_finds_stored_summaries() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, _) = keeper(config(), store);
        k.run_window(&chat(6)).await.unwrap();

        let ctx = k.memory_context("harbor").await.unwrap();
        assert!(ctx.starts_with("[Relevant memories]"));
        assert!(ctx.contains("Line 0 about the harbor"));
        assert!(k.memory_context("").await.unwrap().is_empty());

        let stats = k.stats().unwrap();
        assert_eq!(stats.summaries, 1);
        assert_eq!(stats.summarized_until, Some(3));
    }

    #[tokio::test]
    async fn scheduled_windows_coalesce() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (k, gen) = keeper(config(), store);
        let k = Arc::new(k);

        k.schedule_window(chat(4)).unwrap();
        k.schedule_window(chat(6)).unwrap();
        assert!(k.window_pending());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!k.window_pending());
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
        assert_eq!(k.window_state().unwrap().summarized_until, Some(3));
    }

    #[tokio::test]
    async fn lorebook_sync_uses_registry_snapshot() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut cfg = config();
        cfg.lorebook = LorebookConfig {
            min_confidence: 0.0,
            min_mentions: 1,
            use_generator: false,
            ..Default::default()
        };
        let (k, _) = keeper(cfg, store);
        k.ingest_chat(&[msg(0, "Narrator", "\"Stay close,\" Elara said, her voice low.")])
            .unwrap();

        let mut book = Lorebook::default();
        let report = k.sync_lorebook(&mut book).await;
        assert_eq!(report.created, 1);
        let activated = book.activated("Where did Elara go?");
        assert_eq!(activated.len(), 1);
        assert!(activated[0].content.starts_with("Elara is a character"));
    }
}
