// ── Entity extraction ───────────────────────────────────────────────────────
//
// Runs every enabled pattern rule over a message, scores each match with
// additive heuristics, deduplicates, and drops candidates under the per-type
// threshold.
//
// Score = base (from the rule)
//       + capitalisation bonus (multi-word name, every word capitalised)
//       − short / all-caps penalty
//       + repeat mentions in the same text (capped)
//       + type keyword co-occurrence (capped)
// clamped to [0, 1].

use std::collections::{HashMap, HashSet};

use log::debug;

use super::patterns::{build_rules, type_keywords, PatternRule, COMMON_WORDS, LEADING_NOISE};
use crate::atoms::constants::{
    CAPITALIZATION_BONUS, CONTEXT_RADIUS, KEYWORD_BONUS, KEYWORD_CAP, REPEAT_MENTION_BONUS,
    REPEAT_MENTION_CAP, SHORT_NAME_PENALTY,
};
use crate::atoms::error::LoreResult;
use crate::atoms::types::{ChatMessage, EntityCandidate, EntityType, ExtractionConfig};

pub struct EntityExtractor {
    rules: Vec<PatternRule>,
    config: ExtractionConfig,
    excluded: HashSet<String>,
}

impl EntityExtractor {
    pub fn new(config: ExtractionConfig) -> LoreResult<Self> {
        let rules = build_rules(&config.enabled_types)?;
        let excluded = config
            .exclude_names
            .iter()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Ok(Self { rules, config, excluded })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Add a name that must never be reported (e.g. the user's persona).
    pub fn exclude(&mut self, name: &str) {
        let key = name.trim().to_lowercase();
        if !key.is_empty() {
            self.excluded.insert(key);
        }
    }

    /// Extract entities from a chat message. System messages yield nothing.
    pub fn extract_message(&self, message: &ChatMessage) -> Vec<EntityCandidate> {
        if message.is_system {
            return Vec::new();
        }
        self.extract(&message.text)
    }

    /// Extract scored, deduplicated, threshold-filtered candidates from text.
    pub fn extract(&self, text: &str) -> Vec<EntityCandidate> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let lower_words: HashSet<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let mut raw: Vec<EntityCandidate> = Vec::new();
        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let Some(m) = caps.get(1) else { continue };
                if rule.reject_possessive && is_followed_by_possessive(text, m.end()) {
                    continue;
                }
                let Some((name, shift)) = normalize_name(m.as_str()) else {
                    continue;
                };
                if !self.is_acceptable(&name) {
                    continue;
                }
                let offset = m.start() + shift;
                let confidence =
                    score_candidate(rule.base_confidence, &name, rule.entity_type, text, &lower_words);
                raw.push(EntityCandidate {
                    context: context_snippet(text, offset, name.len()),
                    name,
                    entity_type: rule.entity_type,
                    confidence,
                    offset,
                    pattern: rule.id.to_string(),
                });
            }
        }

        let deduped = deduplicate(raw);
        let kept: Vec<EntityCandidate> = deduped
            .into_iter()
            .filter(|c| c.confidence >= self.config.thresholds.get(c.entity_type))
            .collect();

        if !kept.is_empty() {
            debug!(
                "[lorekeep:entity] {} candidate(s): {}",
                kept.len(),
                kept.iter()
                    .map(|c| format!("{} ({}, {:.2})", c.name, c.entity_type, c.confidence))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        kept
    }

    fn is_acceptable(&self, name: &str) -> bool {
        if name.chars().count() < self.config.min_name_len {
            return false;
        }
        let lower = name.to_lowercase();
        if self.excluded.contains(&lower) {
            return false;
        }
        // A name made only of common words is noise ("Then She").
        !lower.split_whitespace().all(|w| COMMON_WORDS.contains(&w))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoring
// ═══════════════════════════════════════════════════════════════════════════

/// Apply the additive heuristics to a rule's base confidence.
pub fn score_candidate(
    base: f32,
    name: &str,
    entity_type: EntityType,
    text: &str,
    lower_words: &HashSet<String>,
) -> f32 {
    let mut score = base;

    let words: Vec<&str> = name.split_whitespace().collect();
    if words.len() >= 2 && words.iter().all(|w| starts_uppercase(w)) {
        score += CAPITALIZATION_BONUS;
    }
    if name.chars().count() <= 2 || (name.len() > 1 && name == name.to_uppercase()) {
        score -= SHORT_NAME_PENALTY;
    }

    let repeats = count_occurrences(text, name).saturating_sub(1);
    score += (repeats as f32 * REPEAT_MENTION_BONUS).min(REPEAT_MENTION_CAP);

    let keyword_hits = type_keywords(entity_type)
        .iter()
        .filter(|k| lower_words.contains(**k))
        .count();
    score += (keyword_hits as f32 * KEYWORD_BONUS).min(KEYWORD_CAP);

    score.clamp(0.0, 1.0)
}

fn starts_uppercase(word: &str) -> bool {
    word.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Count whole-word, case-sensitive occurrences of `needle` in `haystack`.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let bytes = haystack.as_bytes();
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let end = abs + needle.len();
        let before_ok = abs == 0 || !bytes[abs - 1].is_ascii_alphanumeric();
        let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
        if before_ok && after_ok {
            count += 1;
        }
        start = end;
    }
    count
}

fn is_followed_by_possessive(text: &str, end: usize) -> bool {
    let rest = &text[end..];
    rest.starts_with("'s") || rest.starts_with("\u{2019}s")
}

// ═══════════════════════════════════════════════════════════════════════════
// Normalisation
// ═══════════════════════════════════════════════════════════════════════════

/// Collapse whitespace and strip leading articles / sentence starters.
/// Returns the cleaned name and the byte shift from the match start.
pub(crate) fn normalize_name(raw: &str) -> Option<(String, usize)> {
    let mut rest = raw;
    loop {
        let trimmed = rest.trim_start();
        let Some(first) = trimmed.split_whitespace().next() else {
            return None;
        };
        let has_more = trimmed.len() > first.len();
        if has_more && LEADING_NOISE.contains(&first.to_lowercase().as_str()) {
            rest = &trimmed[first.len()..];
        } else {
            rest = trimmed;
            break;
        }
    }
    let shift = raw.len() - rest.len();
    let name = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        None
    } else {
        Some((name, shift))
    }
}

fn context_snippet(text: &str, offset: usize, len: usize) -> String {
    let mut start = offset.saturating_sub(CONTEXT_RADIUS);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + len + CONTEXT_RADIUS).min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

// ═══════════════════════════════════════════════════════════════════════════
// Deduplication
// ═══════════════════════════════════════════════════════════════════════════

/// Merge candidates that name the same thing.
///
/// 1. Same lowercase name → keep the highest-confidence observation.
/// 2. A name contained in a longer kept name → dropped; the longer one keeps
///    the higher confidence of the two.
///
/// Output is ordered by offset.
pub(crate) fn deduplicate(candidates: Vec<EntityCandidate>) -> Vec<EntityCandidate> {
    let mut by_name: HashMap<String, EntityCandidate> = HashMap::new();
    for c in candidates {
        let key = c.name.to_lowercase();
        match by_name.get_mut(&key) {
            Some(existing) => {
                if c.confidence > existing.confidence {
                    *existing = c;
                }
            }
            None => {
                by_name.insert(key, c);
            }
        }
    }

    let mut sorted: Vec<EntityCandidate> = by_name.into_values().collect();
    // Longest first so containers are kept before their substrings.
    sorted.sort_by(|a, b| {
        b.name
            .len()
            .cmp(&a.name.len())
            .then_with(|| a.offset.cmp(&b.offset))
    });

    let mut kept: Vec<EntityCandidate> = Vec::with_capacity(sorted.len());
    for c in sorted {
        let lower = c.name.to_lowercase();
        if let Some(container) = kept
            .iter_mut()
            .find(|k| k.name.to_lowercase().contains(&lower))
        {
            if c.confidence > container.confidence {
                container.confidence = c.confidence;
            }
            continue;
        }
        kept.push(c);
    }

    kept.sort_by_key(|c| c.offset);
    kept
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════
