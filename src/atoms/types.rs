// ── Lorekeep Atoms: Pure Data Types ────────────────────────────────────────
// Plain struct/enum definitions with no I/O. Behaviour lives in engine/.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ═══════════════════════════════════════════════════════════════════════════
// Chat
// ═══════════════════════════════════════════════════════════════════════════

/// One message of the host chat, normalised.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Position in the chat (0-based). Assigned by the parser.
    #[serde(default)]
    pub index: usize,
    /// Speaker display name.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_user: bool,
    /// System/narrator messages are never summarized or mined for entities.
    #[serde(default)]
    pub is_system: bool,
    /// Host exports call this field `mes`.
    #[serde(default, alias = "mes")]
    pub text: String,
    /// Hosts write either a date string or epoch milliseconds.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub send_date: Option<String>,
    /// Hidden from the generation prompt (already summarized).
    #[serde(default)]
    pub hidden: bool,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl ChatMessage {
    pub fn new(index: usize, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn user(index: usize, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            is_user: true,
            ..Self::new(index, name, text)
        }
    }

    pub fn system(index: usize, text: impl Into<String>) -> Self {
        Self {
            is_system: true,
            ..Self::new(index, "System", text)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════════

/// Kinds of named entities tracked in a story.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Character,
    Location,
    Item,
    Organization,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Character,
        EntityType::Location,
        EntityType::Item,
        EntityType::Organization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Character => "character",
            EntityType::Location => "location",
            EntityType::Item => "item",
            EntityType::Organization => "organization",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "character" | "char" | "person" | "npc" => Ok(EntityType::Character),
            "location" | "place" | "loc" => Ok(EntityType::Location),
            "item" | "object" | "artifact" => Ok(EntityType::Item),
            "organization" | "organisation" | "org" | "faction" | "guild" => {
                Ok(EntityType::Organization)
            }
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// A single scored match produced by the extractor for one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityCandidate {
    /// Surface form as it appeared in the text.
    pub name: String,
    pub entity_type: EntityType,
    /// Final score after heuristics, clamped to [0, 1].
    pub confidence: f32,
    /// Byte offset of the name in the source text.
    pub offset: usize,
    /// Identifier of the pattern rule that matched.
    pub pattern: String,
    /// Surrounding text snippet.
    pub context: String,
}

/// A tracked entity, merged across every message it was seen in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Lowercase, trimmed name. Registry key.
    pub key: String,
    /// Display name (first surface form seen).
    pub name: String,
    pub entity_type: EntityType,
    /// Mention-weighted running average of observation confidences.
    pub confidence: f32,
    pub mentions: u32,
    /// Index of the first message that mentioned the entity.
    pub first_seen: usize,
    pub last_seen: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Most recent context snippets, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    pub updated_at: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// Summaries & sliding window
// ═══════════════════════════════════════════════════════════════════════════

/// Condensed representation of a contiguous block of chat messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub id: String,
    pub first_index: usize,
    pub last_index: usize,
    pub text: String,
    /// True when generation failed and `text` is the raw transcript.
    pub fallback: bool,
    pub created_at: String,
}

/// Persistent position of the sliding window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowState {
    /// Highest message index already summarized, if any.
    pub summarized_until: Option<usize>,
}

/// Work computed by the window planner for one pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WindowPlan {
    /// Message indices to summarize, ascending.
    pub candidates: Vec<usize>,
    /// Indices the host should hide once summaries are stored.
    pub to_hide: Vec<usize>,
}

impl WindowPlan {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Outcome of executing a window pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowReport {
    pub summaries: Vec<Summary>,
    pub hidden: Vec<usize>,
    pub fallbacks: usize,
    pub indexed_messages: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Vector store & search
// ═══════════════════════════════════════════════════════════════════════════

/// A text document with its (optional) embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub collection: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Retrieval algorithms the search engine can run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchAlgorithm {
    /// Okapi BM25 over the collection text.
    Bm25,
    /// Cosine similarity between embeddings.
    Cosine,
    /// Plain query-term overlap.
    Keyword,
}

impl std::fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchAlgorithm::Bm25 => write!(f, "bm25"),
            SearchAlgorithm::Cosine => write!(f, "cosine"),
            SearchAlgorithm::Keyword => write!(f, "keyword"),
        }
    }
}

/// How per-algorithm rankings are combined.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Reciprocal Rank Fusion, weighted per algorithm.
    #[default]
    Rrf,
    /// Min–max normalised scores, weighted and summed.
    WeightedSum,
}

impl std::str::FromStr for FusionMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rrf" => Ok(FusionMethod::Rrf),
            "weighted" | "weighted_sum" | "sum" => Ok(FusionMethod::WeightedSum),
            other => Err(format!("unknown fusion method '{other}'")),
        }
    }
}

/// One fused search result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f64,
    /// Algorithms that returned this document.
    pub sources: Vec<SearchAlgorithm>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ═══════════════════════════════════════════════════════════════════════════
// Lorebook (host world-info format)
// ═══════════════════════════════════════════════════════════════════════════

/// One world-info entry. Field names follow the host's JSON shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LorebookEntry {
    pub uid: u32,
    /// Primary trigger keys.
    #[serde(default)]
    pub key: Vec<String>,
    #[serde(default)]
    pub keysecondary: Vec<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub content: String,
    /// Always injected regardless of keys.
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub selective: bool,
    /// Insertion priority; higher goes first.
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub position: u8,
    #[serde(default)]
    pub disable: bool,
    /// Registry key of the entity this entry was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entity: Option<String>,
    /// Host fields not modelled here (`probability`, `depth`, `extensions`…),
    /// kept so a load/save cycle does not lose them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A world-info book: entries keyed by uid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Lorebook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "entries_by_uid")]
    pub entries: BTreeMap<u32, LorebookEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Entry maps are keyed by the uid as a string. Parsed here because integer
/// map keys do not survive the buffering `flatten` does.
fn entries_by_uid<'de, D>(deserializer: D) -> Result<BTreeMap<u32, LorebookEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    BTreeMap::<String, LorebookEntry>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, entry)| {
            key.trim()
                .parse::<u32>()
                .map(|uid| (uid, entry))
                .map_err(|_| serde::de::Error::custom(format!("lorebook entry key '{key}' is not a uid")))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration sections
// ═══════════════════════════════════════════════════════════════════════════

/// Minimum confidence an extracted candidate needs, per entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypeThresholds {
    pub character: f32,
    pub location: f32,
    pub item: f32,
    pub organization: f32,
}

impl TypeThresholds {
    pub fn get(&self, entity_type: EntityType) -> f32 {
        match entity_type {
            EntityType::Character => self.character,
            EntityType::Location => self.location,
            EntityType::Item => self.item,
            EntityType::Organization => self.organization,
        }
    }
}

impl Default for TypeThresholds {
    fn default() -> Self {
        Self {
            character: 0.5,
            location: 0.55,
            item: 0.55,
            organization: 0.55,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    pub thresholds: TypeThresholds,
    pub enabled_types: Vec<EntityType>,
    /// Names never reported as entities (user persona, card character…).
    pub exclude_names: Vec<String>,
    pub min_name_len: usize,
    /// Context snippets kept per entity in the registry.
    pub max_contexts: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            thresholds: TypeThresholds::default(),
            enabled_types: EntityType::ALL.to_vec(),
            exclude_names: Vec::new(),
            min_name_len: 2,
            max_contexts: 3,
        }
    }
}

pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the following roleplay excerpt in a few sentences. \
Keep names, places, items and decisions. Write in past tense, third person. \
Output only the summary.\n\n{{transcript}}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SummarizerConfig {
    pub max_batch_chars: usize,
    pub max_batch_messages: usize,
    /// Must contain `{{transcript}}`.
    pub prompt_template: String,
    pub max_tokens: u32,
    /// Length cap of the raw-text fallback when generation fails.
    pub fallback_max_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_batch_chars: 4000,
            max_batch_messages: 20,
            prompt_template: DEFAULT_SUMMARY_PROMPT.to_string(),
            max_tokens: 300,
            fallback_max_chars: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Most recent messages never summarized.
    pub keep_recent: usize,
    /// Minimum number of out-of-window messages before a pass runs.
    pub min_batch: usize,
    pub hide_summarized: bool,
    /// Also index raw summarized messages in the `messages` collection.
    pub index_messages: bool,
    pub debounce_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            keep_recent: 20,
            min_batch: 10,
            hide_summarized: true,
            index_messages: false,
            debounce_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub cache_size: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self { cache_size: 256 }
    }
}

/// Relative weight of each algorithm during fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlgorithmWeights {
    pub bm25: f64,
    pub cosine: f64,
    pub keyword: f64,
}

impl AlgorithmWeights {
    pub fn get(&self, algorithm: SearchAlgorithm) -> f64 {
        match algorithm {
            SearchAlgorithm::Bm25 => self.bm25,
            SearchAlgorithm::Cosine => self.cosine,
            SearchAlgorithm::Keyword => self.keyword,
        }
    }
}

impl Default for AlgorithmWeights {
    fn default() -> Self {
        Self {
            bm25: 0.3,
            cosine: 0.6,
            keyword: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub algorithms: Vec<SearchAlgorithm>,
    pub fusion: FusionMethod,
    pub rrf_k: f64,
    pub weights: AlgorithmWeights,
    /// Shift weight between lexical and vector lists based on query shape.
    pub auto_weight: bool,
    pub limit: usize,
    pub min_score: f64,
    pub mmr: bool,
    pub mmr_lambda: f64,
    pub context_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithms: vec![
                SearchAlgorithm::Bm25,
                SearchAlgorithm::Cosine,
                SearchAlgorithm::Keyword,
            ],
            fusion: FusionMethod::Rrf,
            rrf_k: crate::atoms::constants::DEFAULT_RRF_K,
            weights: AlgorithmWeights::default(),
            auto_weight: true,
            limit: 5,
            min_score: 0.0,
            mmr: true,
            mmr_lambda: 0.7,
            context_max_chars: 2000,
        }
    }
}

pub const DEFAULT_LOREBOOK_PROMPT: &str = "Write a short world-info entry (2-4 sentences) for the {{type}} \
\"{{name}}\" in an ongoing story. Use only facts from these excerpts:\n\n{{contexts}}\n\nEntry:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LorebookConfig {
    pub min_confidence: f32,
    pub min_mentions: u32,
    /// Ask the text generator for entry content; template otherwise.
    pub use_generator: bool,
    pub max_tokens: u32,
    pub prompt_template: String,
}

impl Default for LorebookConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_mentions: 2,
            use_generator: true,
            max_tokens: 200,
            prompt_template: DEFAULT_LOREBOOK_PROMPT.to_string(),
        }
    }
}

/// OpenAI-compatible chat completion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434/v1".into(),
            model: "llama3.1".into(),
            api_key: None,
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// Embedding backend (Ollama or OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    /// Base URL for embedding API (Ollama: http://localhost:11434)
    pub base_url: String,
    /// Embedding model name (e.g., "nomic-embed-text", "all-minilm")
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".into(),
            model: "nomic-embed-text".into(),
            api_key: None,
        }
    }
}
