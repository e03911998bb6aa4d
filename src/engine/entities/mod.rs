// ── Entities ────────────────────────────────────────────────────────────────
//
//   patterns  - regex rule table and word lists
//   extractor - match, score, dedup, threshold
//   registry  - merged per-entity records keyed by lowercase name

pub mod extractor;
pub mod patterns;
pub mod registry;

pub use extractor::{score_candidate, EntityExtractor};
pub use registry::{entity_key, EntityRegistry};
