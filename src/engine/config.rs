// Lorekeep: Configuration file
//
// One TOML file, every section optional:
//
//   [extraction]   thresholds, enabled types, excluded names
//   [summarizer]   batch sizes, prompt template
//   [window]       keep_recent, min_batch, hiding, debounce
//   [vector_store] LRU cache size
//   [search]       algorithms, fusion, weights, MMR
//   [lorebook]     eligibility, generation
//   [generation]   OpenAI-compatible completion backend
//   [embedding]    Ollama / OpenAI-compatible embedding backend

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::types::{
    EmbeddingConfig, ExtractionConfig, GenerationConfig, LorebookConfig, SearchConfig,
    SummarizerConfig, VectorStoreConfig, WindowConfig,
};
use crate::engine::summarizer::TRANSCRIPT_PLACEHOLDER;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LorekeepConfig {
    pub extraction: ExtractionConfig,
    pub summarizer: SummarizerConfig,
    pub window: WindowConfig,
    pub vector_store: VectorStoreConfig,
    pub search: SearchConfig,
    pub lorebook: LorebookConfig,
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
}

/// `<config dir>/lorekeep/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lorekeep")
        .join("config.toml")
}

/// `<data dir>/lorekeep/lorekeep.db`
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lorekeep")
        .join("lorekeep.db")
}

impl LorekeepConfig {
    pub fn from_toml_str(text: &str) -> LoreResult<Self> {
        let config: LorekeepConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> LoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("[lorekeep:config] Loaded {:?}", path);
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise. A file that exists but
    /// fails to parse or validate is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> LoreResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("[lorekeep:config] No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> LoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = self.to_toml()?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn to_toml(&self) -> LoreResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| LoreError::config(format!("cannot serialize config: {e}")))
    }

    /// Fill missing API keys from an environment value.
    pub fn apply_api_key(&mut self, key: Option<String>) {
        let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
            return;
        };
        if self.generation.api_key.is_none() {
            self.generation.api_key = Some(key.clone());
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = Some(key);
        }
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> LoreResult<()> {
        let t = &self.extraction.thresholds;
        for (name, value) in [
            ("character", t.character),
            ("location", t.location),
            ("item", t.item),
            ("organization", t.organization),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(LoreError::config(format!(
                    "extraction.thresholds.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.extraction.enabled_types.is_empty() {
            warn!("[lorekeep:config] extraction.enabled_types is empty; no entities will be extracted");
        }

        let s = &self.summarizer;
        if s.max_batch_chars == 0 || s.max_batch_messages == 0 {
            return Err(LoreError::config(
                "summarizer.max_batch_chars and max_batch_messages must be positive",
            ));
        }
        if !s.prompt_template.contains(TRANSCRIPT_PLACEHOLDER) {
            warn!(
                "[lorekeep:config] summarizer.prompt_template has no {}; transcript will be appended",
                TRANSCRIPT_PLACEHOLDER
            );
        }

        if self.window.min_batch == 0 {
            return Err(LoreError::config("window.min_batch must be at least 1"));
        }

        let q = &self.search;
        if q.algorithms.is_empty() {
            return Err(LoreError::config("search.algorithms must not be empty"));
        }
        let w = &q.weights;
        if [w.bm25, w.cosine, w.keyword].iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(LoreError::config("search.weights must be finite and non-negative"));
        }
        let active: f64 = q.algorithms.iter().map(|a| w.get(*a)).sum();
        if active <= 0.0 {
            return Err(LoreError::config(
                "search.weights of the enabled algorithms must sum to a positive number",
            ));
        }
        if q.rrf_k <= 0.0 {
            return Err(LoreError::config("search.rrf_k must be positive"));
        }
        if !(0.0..=1.0).contains(&q.mmr_lambda) {
            return Err(LoreError::config("search.mmr_lambda must be within [0, 1]"));
        }
        if q.limit == 0 {
            return Err(LoreError::config("search.limit must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.lorebook.min_confidence) {
            return Err(LoreError::config("lorebook.min_confidence must be within [0, 1]"));
        }

        if self.generation.enabled && self.generation.base_url.trim().is_empty() {
            return Err(LoreError::config("generation.base_url is empty"));
        }
        if self.embedding.enabled && self.embedding.base_url.trim().is_empty() {
            return Err(LoreError::config("embedding.base_url is empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{EntityType, FusionMethod, SearchAlgorithm};

    #[test]
    fn defaults_validate() {
        LorekeepConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = LorekeepConfig::from_toml_str(
            r#"
            [extraction]
            enabled_types = ["character", "location"]
            exclude_names = ["Elara"]

            [extraction.thresholds]
            character = 0.7

            [search]
            fusion = "weighted_sum"
            algorithms = ["bm25", "keyword"]

            [window]
            keep_recent = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.extraction.thresholds.character, 0.7);
        assert_eq!(config.extraction.thresholds.location, 0.55);
        assert_eq!(
            config.extraction.enabled_types,
            vec![EntityType::Character, EntityType::Location]
        );
        assert_eq!(config.search.fusion, FusionMethod::WeightedSum);
        assert_eq!(config.search.algorithms, vec![SearchAlgorithm::Bm25, SearchAlgorithm::Keyword]);
        assert_eq!(config.window.keep_recent, 8);
        assert_eq!(config.window.min_batch, 10);
        assert_eq!(config.summarizer.max_batch_chars, 4000);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = LorekeepConfig::from_toml_str("[extraction.thresholds]\nitem = 1.5\n").unwrap_err();
        assert!(matches!(err, LoreError::Config(_)));

        let mut config = LorekeepConfig::default();
        config.summarizer.max_batch_messages = 0;
        assert!(config.validate().is_err());

        let mut config = LorekeepConfig::default();
        config.search.algorithms = vec![SearchAlgorithm::Cosine];
        config.search.weights.cosine = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = LorekeepConfig::from_toml_str("[window\nkeep_recent = ").unwrap_err();
        assert!(matches!(err, LoreError::Toml(_)));
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = std::env::temp_dir().join(format!("lorekeep-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        assert_eq!(LorekeepConfig::load_or_default(&path).unwrap(), LorekeepConfig::default());

        let mut config = LorekeepConfig::default();
        config.window.keep_recent = 4;
        config.save(&path).unwrap();
        let loaded = LorekeepConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.window.keep_recent, 4);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn env_api_key_fills_only_missing_keys() {
        let mut config = LorekeepConfig::default();
        config.generation.api_key = Some("gen-key".into());
        config.apply_api_key(Some("env-key".into()));
        assert_eq!(config.generation.api_key.as_deref(), Some("gen-key"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("env-key"));
        config.apply_api_key(Some("  ".into()));
        assert_eq!(config.embedding.api_key.as_deref(), Some("env-key"));
    }
}
