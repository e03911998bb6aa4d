// ── Lorekeep Atoms: Constants ──────────────────────────────────────────────
// Named constants shared across the engine. Tunables that users may want to
// change live in the config structs instead; these are fixed identifiers and
// defaults.

// ── Vector collections ─────────────────────────────────────────────────────
pub const SUMMARY_COLLECTION: &str = "summaries";
pub const MESSAGE_COLLECTION: &str = "messages";

// ── Meta keys (stored in the `meta` table) ─────────────────────────────────
// Changing these makes existing databases lose their window position.
pub(crate) const META_SUMMARIZED_UNTIL: &str = "window.summarized_until";
pub(crate) const META_SCHEMA_VERSION: &str = "schema.version";
pub(crate) const SCHEMA_VERSION: i64 = 1;

// ── Entity scoring ─────────────────────────────────────────────────────────
pub(crate) const CAPITALIZATION_BONUS: f32 = 0.1;
pub(crate) const SHORT_NAME_PENALTY: f32 = 0.2;
pub(crate) const REPEAT_MENTION_BONUS: f32 = 0.05;
pub(crate) const REPEAT_MENTION_CAP: f32 = 0.15;
pub(crate) const KEYWORD_BONUS: f32 = 0.05;
pub(crate) const KEYWORD_CAP: f32 = 0.15;
/// Characters of surrounding text captured with each candidate.
pub(crate) const CONTEXT_RADIUS: usize = 80;

// ── Search ─────────────────────────────────────────────────────────────────
/// Standard RRF damping constant.
pub const DEFAULT_RRF_K: f64 = 60.0;
pub(crate) const BM25_K1: f64 = 1.2;
pub(crate) const BM25_B: f64 = 0.75;

// ── Environment ────────────────────────────────────────────────────────────
pub const API_KEY_ENV: &str = "LOREKEEP_API_KEY";
