// ── Lorekeep Atoms: Collaborator Traits ────────────────────────────────────
// The host application owns text generation and embeddings. The engine only
// sees these two traits, so any backend (HTTP API, local model, test double)
// can be plugged in.

use async_trait::async_trait;

use crate::atoms::error::LoreResult;

/// Produces text from a prompt (summaries, lorebook entries).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`. `max_tokens` caps the response
    /// length when the backend supports it.
    async fn generate(&self, prompt: &str, max_tokens: Option<u32>) -> LoreResult<String>;
}

/// Turns text into a vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> LoreResult<Vec<f32>>;
}
