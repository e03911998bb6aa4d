// Lorekeep: Summarizer
//
// Batches chat messages by character length, asks the text generator for a
// summary of each batch, and cleans the result. Generation failures never
// propagate: the batch falls back to its raw transcript (truncated) and the
// summary is flagged `fallback = true`.

use std::sync::Arc;

use log::{info, warn};

use crate::atoms::traits::TextGenerator;
use crate::atoms::types::{ChatMessage, Summary, SummarizerConfig};
use crate::engine::chat::transcript;

pub const TRANSCRIPT_PLACEHOLDER: &str = "{{transcript}}";

/// Group consecutive messages into batches of at most `max_chars` characters
/// and `max_messages` messages. A message longer than `max_chars` gets a batch
/// of its own. System and empty messages are skipped.
pub fn batch_messages<'a>(
    messages: &'a [ChatMessage],
    max_chars: usize,
    max_messages: usize,
) -> Vec<Vec<&'a ChatMessage>> {
    let max_messages = max_messages.max(1);
    let mut batches: Vec<Vec<&ChatMessage>> = Vec::new();
    let mut current: Vec<&ChatMessage> = Vec::new();
    let mut current_chars = 0usize;

    for msg in messages {
        if msg.is_system || msg.text.trim().is_empty() {
            continue;
        }
        let len = msg.text.chars().count();
        let would_overflow = !current.is_empty()
            && (current_chars + len > max_chars || current.len() >= max_messages);
        if would_overflow {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(msg);
        current_chars += len;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Substitute the batch transcript into the prompt template. Templates without
/// the placeholder get the transcript appended.
pub fn build_prompt(batch: &[&ChatMessage], template: &str) -> String {
    let text = transcript(batch);
    if template.contains(TRANSCRIPT_PLACEHOLDER) {
        template.replace(TRANSCRIPT_PLACEHOLDER, &text)
    } else {
        format!("{}\n\n{}", template.trim_end(), text)
    }
}

/// Tidy raw model output: trim, drop a leading "Summary:" label and wrapping
/// quotes, collapse runs of blank lines.
pub fn clean_summary(raw: &str) -> String {
    let mut text = raw.trim();

    for label in ["summary:", "**summary:**", "**summary**:", "[summary]"] {
        if text.len() >= label.len()
            && text.is_char_boundary(label.len())
            && text[..label.len()].eq_ignore_ascii_case(label)
        {
            text = text[label.len()..].trim_start();
            break;
        }
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out.trim().to_string()
}

/// Truncate at a char boundary, preferring the last whitespace in the back half.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut end = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    if let Some(space) = text[..end].rfind(char::is_whitespace) {
        if space > end / 2 {
            end = space;
        }
    }
    format!("{}…", text[..end].trim_end())
}

/// Stable id for the summary of messages `first..=last`, so a retried pass
/// replaces its earlier rows instead of duplicating them.
pub fn summary_id(first: usize, last: usize) -> String {
    format!("summary-{first}-{last}")
}

pub struct Summarizer {
    generator: Option<Arc<dyn TextGenerator>>,
    config: SummarizerConfig,
}

impl Summarizer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: SummarizerConfig) -> Self {
        Self { generator, config }
    }

    pub fn config(&self) -> &SummarizerConfig {
        &self.config
    }

    /// Summarize one batch. Returns `None` for an empty batch.
    pub async fn summarize_batch(&self, batch: &[&ChatMessage]) -> Option<Summary> {
        let first = batch.first()?;
        let last = batch.last()?;
        let raw_transcript = transcript(batch);
        if raw_transcript.is_empty() {
            return None;
        }

        let generated = match &self.generator {
            Some(generator) => {
                let prompt = build_prompt(batch, &self.config.prompt_template);
                match generator.generate(&prompt, Some(self.config.max_tokens)).await {
                    Ok(raw) => {
                        let cleaned = clean_summary(&raw);
                        if cleaned.is_empty() {
                            warn!(
                                "[lorekeep:summary] {} returned an empty summary for messages {}-{}; using raw text",
                                generator.name(), first.index, last.index
                            );
                            None
                        } else {
                            Some(cleaned)
                        }
                    }
                    Err(e) => {
                        warn!(
                            "[lorekeep:summary] Generation failed for messages {}-{}: {}; using raw text",
                            first.index, last.index, e
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let (text, fallback) = match generated {
            Some(text) => (text, false),
            None => (truncate_chars(&raw_transcript, self.config.fallback_max_chars), true),
        };

        info!(
            "[lorekeep:summary] Messages {}-{} → {} chars{}",
            first.index,
            last.index,
            text.len(),
            if fallback { " (fallback)" } else { "" }
        );

        Some(Summary {
            id: summary_id(first.index, last.index),
            first_index: first.index,
            last_index: last.index,
            text,
            fallback,
            created_at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        })
    }

    /// Batch and summarize every eligible message, in order.
    pub async fn summarize_all(&self, messages: &[ChatMessage]) -> Vec<Summary> {
        let batches = batch_messages(
            messages,
            self.config.max_batch_chars,
            self.config.max_batch_messages,
        );
        let mut summaries = Vec::with_capacity(batches.len());
        for batch in &batches {
            if let Some(summary) = self.summarize_batch(batch).await {
                summaries.push(summary);
            }
        }
        summaries
    }
}
