// Lorekeep engine: everything with behaviour.
//
// Module layout:
//   chat          - host chat parsing (JSON array / JSONL)
//   config        - TOML config file loading + validation
//   entities      - regex extraction, scoring, registry
//   summarizer    - batching, prompting, raw-text fallback
//   window        - sliding-window planning over the chat
//   debounce      - coalescing timer for background passes
//   store         - SQLite persistence
//   embedding     - HTTP embedding client
//   http          - retry/backoff helpers shared by the HTTP clients
//   generation    - HTTP text generator
//   vector_store  - embedding-backed document store with LRU cache
//   search        - BM25 / cosine / keyword retrieval and fusion
//   lorebook      - world-info entries from tracked entities
//   pipeline      - `Lorekeeper` facade

pub mod chat;
pub mod config;
pub mod debounce;
pub mod embedding;
pub mod entities;
pub mod generation;
pub mod http;
pub mod lorebook;
pub mod pipeline;
pub mod search;
pub mod store;
pub mod summarizer;
pub mod vector_store;
pub mod window;
