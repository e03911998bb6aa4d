use rusqlite::params;

use super::embedding::{bytes_to_f32_vec, f32_vec_to_bytes};
use super::Store;
use crate::atoms::error::LoreResult;
use crate::atoms::types::VectorRecord;

const VECTOR_COLUMNS: &str = "id, collection, text, embedding, metadata_json, created_at";

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VectorRecord> {
    let blob: Option<Vec<u8>> = row.get(3)?;
    let metadata_json: String = row.get(4)?;
    Ok(VectorRecord {
        id: row.get(0)?,
        collection: row.get(1)?,
        text: row.get(2)?,
        embedding: blob.filter(|b| !b.is_empty()).map(|b| bytes_to_f32_vec(&b)),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null),
        created_at: row.get(5)?,
    })
}

impl Store {
    // ── Vector records ─────────────────────────────────────────────────

    pub fn put_vector(&self, record: &VectorRecord) -> LoreResult<()> {
        let blob = record.embedding.as_deref().map(f32_vec_to_bytes);
        let metadata = serde_json::to_string(&record.metadata)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO vectors (id, collection, text, embedding, metadata_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.collection,
                record.text,
                blob,
                metadata,
                record.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_vector(&self, id: &str) -> LoreResult<Option<VectorRecord>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {VECTOR_COLUMNS} FROM vectors WHERE id = ?1"),
            params![id],
            record_from_row,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace only the embedding of an existing record.
    pub fn set_vector_embedding(&self, id: &str, embedding: &[f32]) -> LoreResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE vectors SET embedding = ?1 WHERE id = ?2",
            params![f32_vec_to_bytes(embedding), id],
        )?;
        Ok(n > 0)
    }

    pub fn delete_vector(&self, id: &str) -> LoreResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM vectors WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Records of a collection, oldest first.
    pub fn list_vectors(&self, collection: &str) -> LoreResult<Vec<VectorRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {VECTOR_COLUMNS} FROM vectors WHERE collection = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let records = stmt
            .query_map(params![collection], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Ids of records in `collection` stored without an embedding.
    pub fn vectors_missing_embedding(&self, collection: &str) -> LoreResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, text FROM vectors
             WHERE collection = ?1 AND (embedding IS NULL OR length(embedding) = 0)
             ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_vectors(&self, collection: &str) -> LoreResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Distinct collection names with their record counts.
    pub fn vector_collections(&self) -> LoreResult<Vec<(String, usize)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT collection, COUNT(*) FROM vectors GROUP BY collection ORDER BY collection",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete every record of a collection. Returns the ids removed.
    pub fn clear_vectors(&self, collection: &str) -> LoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let ids = {
            let mut stmt = conn.prepare("SELECT id FROM vectors WHERE collection = ?1")?;
            let ids = stmt
                .query_map(params![collection], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        conn.execute("DELETE FROM vectors WHERE collection = ?1", params![collection])?;
        Ok(ids)
    }
}
