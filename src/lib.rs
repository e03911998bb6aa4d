// lorekeep: memory core for roleplay chat.
//
// Layers:
//   atoms/  - pure data types, constants, error enum and collaborator traits
//   engine/ - extraction, summarization, persistence, search, lorebook output
//
// Most callers only need `Lorekeeper` (engine::pipeline), which wires the
// pieces together over a single SQLite `Store`.

pub mod atoms;
pub mod engine;

pub use atoms::error::{LoreError, LoreResult};
pub use atoms::traits::{Embedder, TextGenerator};
pub use atoms::types::*;
pub use engine::config::LorekeepConfig;
pub use engine::pipeline::Lorekeeper;
