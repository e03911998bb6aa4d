// Lorekeep: Lorebook (world info)
//
// Entries are stored in the host's world-info JSON shape:
//   { "name": "...", "entries": { "0": { "uid": 0, "key": [...], "content": "..." } } }
//
// Generated entries remember the registry key of their entity in
// `source_entity`, so later syncs extend their keys instead of duplicating
// them. Content of an existing entry is never overwritten; users edit it.

use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use crate::atoms::error::LoreResult;
use crate::atoms::traits::TextGenerator;
use crate::atoms::types::{Entity, EntityType, Lorebook, LorebookConfig, LorebookEntry};
use crate::engine::entities::EntityRegistry;
use crate::engine::summarizer::clean_summary;

/// Case-insensitive whole-word containment.
fn contains_word(haystack_lower: &str, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut from = 0;
    while let Some(pos) = haystack_lower[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before = haystack_lower[..start].chars().next_back();
        let after = haystack_lower[end..].chars().next();
        if !is_word(before) && !is_word(after) {
            return true;
        }
        from = start + needle.chars().next().map(char::len_utf8).unwrap_or(1);
    }
    false
}

impl Lorebook {
    pub fn load(path: impl AsRef<Path>) -> LoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> LoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// First entry with a primary key equal to `key`, ignoring case.
    pub fn find_by_key(&self, key: &str) -> Option<&LorebookEntry> {
        let key = key.trim();
        self.entries
            .values()
            .find(|e| e.key.iter().any(|k| k.trim().eq_ignore_ascii_case(key)))
    }

    pub fn find_by_source(&self, entity_key: &str) -> Option<&LorebookEntry> {
        self.entries
            .values()
            .find(|e| e.source_entity.as_deref() == Some(entity_key))
    }

    fn next_uid(&self) -> u32 {
        self.entries.keys().next_back().map(|u| u + 1).unwrap_or(0)
    }

    /// Insert or replace an entry. Entries generated from an entity replace
    /// the previous entry for that entity; other entries match on `uid`. New
    /// entries get the next free uid. Returns (uid, created).
    pub fn upsert(&mut self, mut entry: LorebookEntry) -> (u32, bool) {
        let existing = match entry.source_entity.as_deref() {
            Some(key) => self.find_by_source(key).map(|e| e.uid),
            None => self.entries.contains_key(&entry.uid).then_some(entry.uid),
        };

        match existing {
            Some(uid) => {
                entry.uid = uid;
                if let Some(old) = self.entries.remove(&uid) {
                    for (k, v) in old.extra {
                        entry.extra.entry(k).or_insert(v);
                    }
                }
                self.entries.insert(uid, entry);
                (uid, false)
            }
            None => {
                let uid = if self.entries.contains_key(&entry.uid) {
                    self.next_uid()
                } else {
                    entry.uid.max(self.next_uid())
                };
                entry.uid = uid;
                self.entries.insert(uid, entry);
                (uid, true)
            }
        }
    }

    pub fn remove(&mut self, uid: u32) -> Option<LorebookEntry> {
        self.entries.remove(&uid)
    }

    /// Entries that should be injected for `text`: constant entries plus
    /// entries with a primary key present as a whole word. Selective entries
    /// also need one secondary key. Highest `order` first.
    pub fn activated(&self, text: &str) -> Vec<&LorebookEntry> {
        let lower = text.to_lowercase();
        let mut hits: Vec<&LorebookEntry> = self
            .entries
            .values()
            .filter(|e| !e.disable)
            .filter(|e| {
                if e.constant {
                    return true;
                }
                let primary = e.key.iter().any(|k| contains_word(&lower, k));
                if !primary {
                    return false;
                }
                !e.selective
                    || e.keysecondary.is_empty()
                    || e.keysecondary.iter().any(|k| contains_word(&lower, k))
            })
            .collect();
        hits.sort_by(|a, b| b.order.cmp(&a.order).then_with(|| a.uid.cmp(&b.uid)));
        hits
    }
}

/// Counts produced by `LorebookGenerator::sync`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Eligible entities that already have a hand-written entry.
    pub skipped: usize,
}

pub struct LorebookGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    config: LorebookConfig,
}

fn type_order(entity_type: EntityType) -> i32 {
    match entity_type {
        EntityType::Character => 100,
        EntityType::Location => 90,
        EntityType::Organization => 80,
        EntityType::Item => 70,
    }
}

/// Name first, then aliases, without case-insensitive duplicates.
fn entity_keys(entity: &Entity) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for k in std::iter::once(&entity.name).chain(entity.aliases.iter()) {
        if !keys.iter().any(|e| e.eq_ignore_ascii_case(k)) {
            keys.push(k.clone());
        }
    }
    keys
}

impl LorebookGenerator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: LorebookConfig) -> Self {
        Self { generator, config }
    }

    pub fn is_eligible(&self, entity: &Entity) -> bool {
        entity.confidence >= self.config.min_confidence && entity.mentions >= self.config.min_mentions
    }

    pub fn build_prompt(&self, entity: &Entity) -> String {
        let contexts = if entity.contexts.is_empty() {
            "(no excerpts)".to_string()
        } else {
            entity
                .contexts
                .iter()
                .map(|c| format!("- {}", c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.config
            .prompt_template
            .replace("{{type}}", entity.entity_type.as_str())
            .replace("{{name}}", &entity.name)
            .replace("{{contexts}}", &contexts)
    }

    /// Entry text used when no generator is available or generation fails.
    pub fn template_content(entity: &Entity) -> String {
        let mut text = format!(
            "{} is a {} in the story, first mentioned at message {} and mentioned {} time{}.",
            entity.name,
            entity.entity_type,
            entity.first_seen,
            entity.mentions,
            if entity.mentions == 1 { "" } else { "s" }
        );
        if !entity.aliases.is_empty() {
            text.push_str(&format!(" Also known as: {}.", entity.aliases.join(", ")));
        }
        for ctx in &entity.contexts {
            text.push_str(&format!("\n\"{}\"", ctx));
        }
        text
    }

    async fn content_for(&self, entity: &Entity) -> String {
        if self.config.use_generator {
            if let Some(generator) = &self.generator {
                match generator
                    .generate(&self.build_prompt(entity), Some(self.config.max_tokens))
                    .await
                {
                    Ok(raw) => {
                        let cleaned = clean_summary(&raw);
                        if !cleaned.is_empty() {
                            return cleaned;
                        }
                        warn!("[lorekeep:lorebook] Empty entry for '{}'; using template", entity.name);
                    }
                    Err(e) => {
                        warn!(
                            "[lorekeep:lorebook] Generation failed for '{}': {}; using template",
                            entity.name, e
                        );
                    }
                }
            }
        }
        Self::template_content(entity)
    }

    pub async fn entry_for(&self, entity: &Entity) -> LorebookEntry {
        LorebookEntry {
            uid: 0,
            key: entity_keys(entity),
            keysecondary: Vec::new(),
            comment: format!("{} ({})", entity.name, entity.entity_type),
            content: self.content_for(entity).await,
            constant: false,
            selective: false,
            order: type_order(entity.entity_type),
            position: 0,
            disable: false,
            source_entity: Some(entity.key.clone()),
            extra: serde_json::Map::new(),
        }
    }

    /// Add entries for eligible entities and extend the keys of entries
    /// generated earlier.
    pub async fn sync(&self, lorebook: &mut Lorebook, registry: &EntityRegistry) -> SyncReport {
        let mut report = SyncReport::default();
        for entity in registry.all() {
            if !self.is_eligible(entity) {
                continue;
            }

            if let Some(existing) = lorebook.find_by_source(&entity.key) {
                let mut keys = existing.key.clone();
                let mut changed = false;
                for k in entity_keys(entity) {
                    if !keys.iter().any(|e| e.eq_ignore_ascii_case(&k)) {
                        keys.push(k);
                        changed = true;
                    }
                }
                if changed {
                    let mut entry = existing.clone();
                    entry.key = keys;
                    lorebook.upsert(entry);
                    report.updated += 1;
                }
                continue;
            }

            if lorebook.find_by_key(&entity.name).is_some() {
                report.skipped += 1;
                continue;
            }

            let entry = self.entry_for(entity).await;
            let (uid, _) = lorebook.upsert(entry);
            info!("[lorekeep:lorebook] Created entry {} for '{}'", uid, entity.name);
            report.created += 1;
        }
        report
    }
}
