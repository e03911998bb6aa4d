// End-to-end tests over the public API: chat export in, entities, summaries,
// recall and a lorebook file out. Backends are in-process doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use lorekeep::atoms::constants::SUMMARY_COLLECTION;
use lorekeep::engine::chat::parse_chat;
use lorekeep::engine::search::SearchOptions;
use lorekeep::engine::store::Store;
use lorekeep::{
    Embedder, EntityType, FusionMethod, LoreError, LoreResult, Lorebook, LorekeepConfig,
    Lorekeeper, SearchAlgorithm, TextGenerator,
};

struct FixedGenerator {
    reply: Option<&'static str>,
    calls: AtomicUsize,
}

impl FixedGenerator {
    fn new(reply: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self { reply, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    fn name(&self) -> &str {
        "fixed"
    }
    async fn generate(&self, _prompt: &str, _max_tokens: Option<u32>) -> LoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .map(str::to_string)
            .ok_or_else(|| LoreError::generation("fixed", "backend offline"))
    }
}

/// Letter-frequency vectors: enough structure for cosine ranking.
struct Letters;

#[async_trait]
impl Embedder for Letters {
    fn name(&self) -> &str {
        "letters"
    }
    async fn embed(&self, text: &str) -> LoreResult<Vec<f32>> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(v)
    }
}

const CHAT: &str = r#"{"user_name":"You","character_name":"Narrator","create_date":"2024-05-01"}
{"name":"You","is_user":true,"mes":"We ride for the mountains at dawn."}
{"name":"Narrator","is_user":false,"mes":"\"Stay close,\" Elara said, her voice low."}
{"name":"You","is_user":true,"mes":"I check the map again."}
{"name":"Narrator","is_user":false,"mes":"The road climbs toward the Ironhold gate."}
{"name":"Narrator","is_user":false,"is_system":true,"mes":"[scene break]"}
{"name":"You","is_user":true,"mes":"\"Elara, wait,\" I call out."}
{"name":"Narrator","is_user":false,"mes":"\"Quiet,\" Elara said, her voice sharp."}
{"name":"You","is_user":true,"mes":"I nod and follow."}
"#;

fn config() -> LorekeepConfig {
    let mut config = LorekeepConfig::default();
    config.window.keep_recent = 2;
    config.window.min_batch = 2;
    config.lorebook.min_confidence = 0.0;
    config.lorebook.min_mentions = 2;
    config
}

fn keeper(store: Arc<Store>, generator: Arc<FixedGenerator>) -> Lorekeeper {
    Lorekeeper::new(
        config(),
        store,
        Some(generator as Arc<dyn TextGenerator>),
        Some(Arc::new(Letters) as Arc<dyn Embedder>),
    )
    .unwrap()
}

#[tokio::test]
async fn chat_to_memory_to_lorebook() {
    let messages = parse_chat(CHAT).unwrap();
    assert_eq!(messages.len(), 8);

    let store = Arc::new(Store::open_in_memory().unwrap());
    let generator = FixedGenerator::new(Some("Summary: The party rode to the Ironhold gate with Elara."));
    let k = keeper(store, generator.clone());

    k.ingest_chat(&messages).unwrap();
    let elara = k.lookup_entity("elara").expect("Elara tracked");
    assert_eq!(elara.entity_type, EntityType::Character);
    assert!(elara.mentions >= 2);

    let report = k.run_window(&messages).await.unwrap();
    assert_eq!(report.summaries.len(), 1);
    assert_eq!(report.summaries[0].text, "The party rode to the Ironhold gate with Elara.");
    assert_eq!(report.summaries[0].first_index, 0);
    assert_eq!(report.summaries[0].last_index, 5);
    // The system message inside the window is neither summarized nor hidden.
    assert!(!report.hidden.contains(&4));
    assert_eq!(k.window_state().unwrap().summarized_until, Some(5));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let context = k.memory_context("Ironhold gate").await.unwrap();
    assert!(context.contains("The party rode to the Ironhold gate"));

    let path = std::env::temp_dir().join(format!("lorekeep-it-{}.json", uuid::Uuid::new_v4()));
    let mut book = Lorebook { name: Some("Journey".into()), ..Default::default() };
    let created = k.sync_lorebook(&mut book).await;
    assert!(created.created >= 1);
    book.save(&path).unwrap();

    let mut reloaded = Lorebook::load(&path).unwrap();
    assert_eq!(reloaded, book);
    let again = k.sync_lorebook(&mut reloaded).await;
    assert_eq!(again.created, 0);
    assert!(!reloaded.activated("Elara draws a blade").is_empty());
    std::fs::remove_file(&path).ok();
}

#[tokio::test]
async fn offline_generator_falls_back_to_raw_text() {
    let messages = parse_chat(CHAT).unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let k = keeper(store, FixedGenerator::new(None));

    let report = k.run_window(&messages).await.unwrap();
    assert_eq!(report.fallbacks, report.summaries.len());
    assert!(report.summaries[0].fallback);
    assert!(report.summaries[0].text.starts_with("You: We ride for the mountains at dawn."));

    let stats = k.stats().unwrap();
    assert_eq!(stats.fallback_summaries, 1);
}

#[tokio::test]
async fn window_position_survives_reopen() {
    let path = std::env::temp_dir().join(format!("lorekeep-it-{}.db", uuid::Uuid::new_v4()));
    let messages = parse_chat(CHAT).unwrap();
    let generator = FixedGenerator::new(Some("They travelled."));

    {
        let k = keeper(Arc::new(Store::open(&path).unwrap()), generator.clone());
        k.ingest_chat(&messages).unwrap();
        k.run_window(&messages).await.unwrap();
    }

    let k = keeper(Arc::new(Store::open(&path).unwrap()), generator.clone());
    assert!(k.lookup_entity("Elara").is_some());
    assert_eq!(k.summaries().unwrap().len(), 1);
    let report = k.run_window(&messages).await.unwrap();
    assert!(report.summaries.is_empty());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    drop(k);
    for suffix in ["", "-wal", "-shm"] {
        std::fs::remove_file(format!("{}{}", path.display(), suffix)).ok();
    }
}

#[tokio::test]
async fn search_options_override_config() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let k = keeper(store, FixedGenerator::new(Some("unused")));
    for text in [
        "Elara fought the wyvern at the Ironhold gate.",
        "The merchants of Saltmere raised their prices.",
        "Kael lost the silver compass in the river.",
    ] {
        k.vectors().insert(SUMMARY_COLLECTION, text, serde_json::Value::Null).await.unwrap();
    }

    let options = SearchOptions {
        limit: Some(1),
        fusion: Some(FusionMethod::WeightedSum),
        algorithms: Some(vec![SearchAlgorithm::Bm25, SearchAlgorithm::Keyword]),
        ..Default::default()
    };
    let hits = k.search(SUMMARY_COLLECTION, "silver compass", &options).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].text.contains("silver compass"));

    assert!(k.search("nothing-here", "compass", &options).await.unwrap().is_empty());
}

#[test]
fn config_file_sections_reach_the_engine() {
    let config = LorekeepConfig::from_toml_str(
        r#"
        [window]
        keep_recent = 4
        min_batch = 3

        [search]
        fusion = "weighted_sum"
        "#,
    )
    .unwrap();
    assert_eq!(config.window.keep_recent, 4);
    assert_eq!(config.search.fusion, FusionMethod::WeightedSum);
    assert_eq!(config.summarizer, LorekeepConfig::default().summarizer);

    let store = Arc::new(Store::open_in_memory().unwrap());
    let k = Lorekeeper::new(config, store, None, None).unwrap();
    assert_eq!(k.config().window.min_batch, 3);
}
