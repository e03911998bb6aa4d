// Lorekeep: SQLite store
// Persists entities, summaries, vector records and small key/value state
// through one rusqlite connection behind a parking_lot mutex.
//
// Module layout:
//   schema     - idempotent migrations
//   meta       - key/value state (window position, schema version)
//   entities   - entity registry rows
//   summaries  - window summaries
//   vectors    - vector records (text + f32 BLOB embedding)
//   embedding  - bytes_to_f32_vec, f32_vec_to_bytes, cosine_similarity

use std::path::Path;

use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::atoms::error::LoreResult;

pub(crate) mod embedding;
mod entities;
mod meta;
mod schema;
mod summaries;
mod vectors;

pub use embedding::{bytes_to_f32_vec, cosine_similarity, f32_vec_to_bytes};

/// Thread-safe database wrapper.
pub struct Store {
    /// `pub` so tests can run ad-hoc SQL against the same connection.
    pub conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database file and run migrations.
    pub fn open(path: impl AsRef<Path>) -> LoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("[lorekeep:store] Opening store at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
        schema::run_migrations(&conn)?;

        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh in-memory database with the full schema.
    pub fn open_in_memory() -> LoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }
}

pub(crate) fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
