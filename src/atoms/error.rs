// ── Lorekeep Atoms: Error Types ────────────────────────────────────────────
// Single canonical error enum for the crate, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Generation, Config…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • No variant carries secret material (API keys) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LoreError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML config parse failure.
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Text-generation backend failure (non-secret detail only).
    #[error("Generation error: {backend}: {message}")]
    Generation { backend: String, message: String },

    /// Embedding backend failure.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A looked-up record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl LoreError {
    /// Create a generation error with backend name and message.
    pub fn generation(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation { backend: backend.into(), message: message.into() }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<String> for LoreError {
    fn from(s: String) -> Self {
        LoreError::Other(s)
    }
}

impl From<&str> for LoreError {
    fn from(s: &str) -> Self {
        LoreError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All fallible operations in the crate return this type.
pub type LoreResult<T> = Result<T, LoreError>;

impl From<LoreError> for String {
    fn from(e: LoreError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_display() {
        let e = LoreError::generation("openai", "HTTP 500");
        assert_eq!(e.to_string(), "Generation error: openai: HTTP 500");
    }

    #[test]
    fn string_conversions_round_trip_through_other() {
        let e: LoreError = "boom".into();
        assert!(matches!(e, LoreError::Other(_)));
        let s: String = e.into();
        assert_eq!(s, "boom");
    }
}
