// ── Entity registry ─────────────────────────────────────────────────────────
//
// In-memory map of tracked entities keyed by lowercase name. Repeat
// observations merge into one record:
//
//   confidence' = (confidence * mentions + observed) / (mentions + 1)
//
// The registry does no I/O; the pipeline writes changed entities through
// `Store::save_entity`.

use std::collections::HashMap;

use log::info;

use crate::atoms::error::{LoreError, LoreResult};
use crate::atoms::types::{Entity, EntityCandidate, EntityType};

/// Canonical registry key for a name.
pub fn entity_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Entity>,
    /// alias key → canonical key
    aliases: HashMap<String, String>,
    max_contexts: usize,
}

impl EntityRegistry {
    pub fn new(max_contexts: usize) -> Self {
        Self {
            entities: HashMap::new(),
            aliases: HashMap::new(),
            max_contexts,
        }
    }

    /// Rebuild a registry from persisted entities.
    pub fn from_entities(entities: Vec<Entity>, max_contexts: usize) -> Self {
        let mut registry = Self::new(max_contexts);
        for entity in entities {
            registry.insert(entity);
        }
        registry
    }

    /// Insert (or replace) a full record.
    pub fn insert(&mut self, entity: Entity) {
        for alias in &entity.aliases {
            let alias_key = entity_key(alias);
            if alias_key != entity.key {
                self.aliases.insert(alias_key, entity.key.clone());
            }
        }
        self.entities.insert(entity.key.clone(), entity);
    }

    /// Record one observation of a candidate in message `message_index`.
    pub fn observe(&mut self, candidate: &EntityCandidate, message_index: usize) -> &Entity {
        let key = self.resolve_key(&candidate.name);
        let observed = candidate.confidence.clamp(0.0, 1.0);
        let max_contexts = self.max_contexts;

        if let Some(entity) = self.entities.get_mut(&key) {
            let n = entity.mentions as f32;
            let stored = entity.confidence;
            if observed > stored && candidate.entity_type != entity.entity_type {
                entity.entity_type = candidate.entity_type;
            }
            entity.confidence = ((stored * n + observed) / (n + 1.0)).clamp(0.0, 1.0);
            entity.mentions += 1;
            entity.first_seen = entity.first_seen.min(message_index);
            entity.last_seen = entity.last_seen.max(message_index);
            if candidate.name != entity.name && !entity.aliases.contains(&candidate.name) {
                entity.aliases.push(candidate.name.clone());
            }
            push_context(&mut entity.contexts, &candidate.context, max_contexts);
            entity.updated_at = now();
        } else {
            let mut contexts = Vec::new();
            push_context(&mut contexts, &candidate.context, max_contexts);
            info!(
                "[lorekeep:entity] New entity: {} ({}, {:.2})",
                candidate.name, candidate.entity_type, observed
            );
            self.entities.insert(
                key.clone(),
                Entity {
                    key: key.clone(),
                    name: candidate.name.clone(),
                    entity_type: candidate.entity_type,
                    confidence: observed,
                    mentions: 1,
                    first_seen: message_index,
                    last_seen: message_index,
                    aliases: Vec::new(),
                    contexts,
                    updated_at: now(),
                },
            );
        }

        &self.entities[&key]
    }

    /// Case-insensitive lookup by name or alias.
    pub fn lookup(&self, name: &str) -> Option<&Entity> {
        let key = self.resolve_key(name);
        self.entities.get(&key)
    }

    /// All entities, most confident first.
    pub fn all(&self) -> Vec<&Entity> {
        let mut list: Vec<&Entity> = self.entities.values().collect();
        list.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        list
    }

    pub fn by_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        self.all()
            .into_iter()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }

    pub fn above(&self, min_confidence: f32) -> Vec<&Entity> {
        self.all()
            .into_iter()
            .filter(|e| e.confidence >= min_confidence)
            .collect()
    }

    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let key = self.resolve_key(name);
        let removed = self.entities.remove(&key)?;
        self.aliases.retain(|_, canonical| canonical != &key);
        Some(removed)
    }

    /// Fold `secondary` into `primary`. The secondary's name becomes an alias,
    /// mentions add up and confidence is re-weighted by mention count.
    pub fn merge(&mut self, primary: &str, secondary: &str) -> LoreResult<&Entity> {
        let primary_key = self.resolve_key(primary);
        let secondary_key = self.resolve_key(secondary);
        if primary_key == secondary_key {
            return Err(LoreError::Other(format!("cannot merge '{primary}' into itself")));
        }
        if !self.entities.contains_key(&primary_key) {
            return Err(LoreError::NotFound(format!("entity '{primary}'")));
        }
        let absorbed = self
            .entities
            .remove(&secondary_key)
            .ok_or_else(|| LoreError::NotFound(format!("entity '{secondary}'")))?;

        let max_contexts = self.max_contexts;
        let target = self
            .entities
            .get_mut(&primary_key)
            .ok_or_else(|| LoreError::NotFound(format!("entity '{primary}'")))?;

        let total = target.mentions + absorbed.mentions;
        if total > 0 {
            target.confidence = ((target.confidence * target.mentions as f32
                + absorbed.confidence * absorbed.mentions as f32)
                / total as f32)
                .clamp(0.0, 1.0);
        }
        target.mentions = total;
        target.first_seen = target.first_seen.min(absorbed.first_seen);
        target.last_seen = target.last_seen.max(absorbed.last_seen);
        for alias in std::iter::once(&absorbed.name).chain(absorbed.aliases.iter()) {
            if alias != &target.name && !target.aliases.contains(alias) {
                target.aliases.push(alias.clone());
            }
        }
        for ctx in &absorbed.contexts {
            push_context(&mut target.contexts, ctx, max_contexts);
        }
        target.updated_at = now();

        for canonical in self.aliases.values_mut() {
            if *canonical == secondary_key {
                *canonical = primary_key.clone();
            }
        }
        self.aliases.insert(secondary_key, primary_key.clone());
        for alias in &self.entities[&primary_key].aliases.clone() {
            let k = entity_key(alias);
            if k != primary_key {
                self.aliases.insert(k, primary_key.clone());
            }
        }

        info!(
            "[lorekeep:entity] Merged '{}' into '{}'",
            absorbed.name, self.entities[&primary_key].name
        );
        Ok(&self.entities[&primary_key])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn resolve_key(&self, name: &str) -> String {
        let key = entity_key(name);
        if self.entities.contains_key(&key) {
            return key;
        }
        self.aliases.get(&key).cloned().unwrap_or(key)
    }
}

fn push_context(contexts: &mut Vec<String>, context: &str, max: usize) {
    if max == 0 || context.is_empty() || contexts.iter().any(|c| c == context) {
        return;
    }
    contexts.push(context.to_string());
    if contexts.len() > max {
        let overflow = contexts.len() - max;
        contexts.drain(..overflow);
    }
}
