// Database schema for the lorekeep store.
// Adding a table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN at the end of run_migrations(). Existing SQL is
// never edited.

use log::info;
use rusqlite::{params, Connection};

use crate::atoms::constants::{META_SCHEMA_VERSION, SCHEMA_VERSION};
use crate::atoms::error::LoreResult;

pub(crate) fn run_migrations(conn: &Connection) -> LoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entities (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            mentions INTEGER NOT NULL DEFAULT 0,
            first_seen INTEGER NOT NULL DEFAULT 0,
            last_seen INTEGER NOT NULL DEFAULT 0,
            aliases_json TEXT NOT NULL DEFAULT '[]',
            contexts_json TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_entities_type
            ON entities(entity_type, confidence DESC);

        CREATE TABLE IF NOT EXISTS summaries (
            id TEXT PRIMARY KEY,
            first_index INTEGER NOT NULL,
            last_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            fallback INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_range
            ON summaries(first_index);

        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_vectors_collection
            ON vectors(collection, created_at);
        ",
    )?;

    let current: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![META_SCHEMA_VERSION],
            |row| row.get::<_, String>(0),
        )
        .ok()
        .and_then(|v| v.parse().ok());

    if current != Some(SCHEMA_VERSION) {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![META_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
        )?;
        info!("[lorekeep:store] Schema at version {}", SCHEMA_VERSION);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        for table in ["meta", "entities", "summaries", "vectors"] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES ('window.summarized_until', '12')",
            [],
        )
        .unwrap();
        run_migrations(&conn).unwrap();
        let kept: String = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'window.summarized_until'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kept, "12");
    }
}
