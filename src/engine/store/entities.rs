use log::warn;
use rusqlite::{params, Connection};

use super::Store;
use crate::atoms::error::LoreResult;
use crate::atoms::types::{Entity, EntityType};

const ENTITY_COLUMNS: &str = "key, name, entity_type, confidence, mentions, first_seen, last_seen, \
     aliases_json, contexts_json, updated_at";

struct EntityRow {
    key: String,
    name: String,
    entity_type: String,
    confidence: f64,
    mentions: i64,
    first_seen: i64,
    last_seen: i64,
    aliases_json: String,
    contexts_json: String,
    updated_at: String,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            name: row.get(1)?,
            entity_type: row.get(2)?,
            confidence: row.get(3)?,
            mentions: row.get(4)?,
            first_seen: row.get(5)?,
            last_seen: row.get(6)?,
            aliases_json: row.get(7)?,
            contexts_json: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Rows with an unknown type are skipped rather than failing the load.
    fn into_entity(self) -> Option<Entity> {
        let entity_type = match self.entity_type.parse::<EntityType>() {
            Ok(t) => t,
            Err(e) => {
                warn!("[lorekeep:store] Skipping entity '{}': {}", self.key, e);
                return None;
            }
        };
        Some(Entity {
            key: self.key,
            name: self.name,
            entity_type,
            confidence: (self.confidence as f32).clamp(0.0, 1.0),
            mentions: self.mentions.max(0) as u32,
            first_seen: self.first_seen.max(0) as usize,
            last_seen: self.last_seen.max(0) as usize,
            aliases: serde_json::from_str(&self.aliases_json).unwrap_or_default(),
            contexts: serde_json::from_str(&self.contexts_json).unwrap_or_default(),
            updated_at: self.updated_at,
        })
    }
}

fn write_entity(conn: &Connection, entity: &Entity) -> LoreResult<()> {
    let aliases = serde_json::to_string(&entity.aliases)?;
    let contexts = serde_json::to_string(&entity.contexts)?;
    conn.execute(
        "INSERT OR REPLACE INTO entities
            (key, name, entity_type, confidence, mentions, first_seen, last_seen,
             aliases_json, contexts_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entity.key,
            entity.name,
            entity.entity_type.as_str(),
            entity.confidence as f64,
            entity.mentions as i64,
            entity.first_seen as i64,
            entity.last_seen as i64,
            aliases,
            contexts,
            entity.updated_at,
        ],
    )?;
    Ok(())
}

impl Store {
    // ── Entity CRUD ────────────────────────────────────────────────────

    /// Insert or replace one entity row.
    pub fn save_entity(&self, entity: &Entity) -> LoreResult<()> {
        let conn = self.conn.lock();
        write_entity(&conn, entity)
    }

    /// Save a batch in one transaction: either every row lands or none does.
    pub fn save_entities<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> LoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut count = 0;
        for entity in entities {
            write_entity(&tx, entity)?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    /// All stored entities, most confident first.
    pub fn load_entities(&self) -> LoreResult<Vec<Entity>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities ORDER BY confidence DESC, key ASC"
        ))?;
        let rows = stmt
            .query_map([], EntityRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().filter_map(EntityRow::into_entity).collect())
    }

    pub fn get_entity(&self, key: &str) -> LoreResult<Option<Entity>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE key = ?1"),
            params![key],
            EntityRow::from_row,
        );
        match result {
            Ok(row) => Ok(row.into_entity()),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether a row was removed.
    pub fn delete_entity(&self, key: &str) -> LoreResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM entities WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    pub fn entity_count(&self) -> LoreResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, t: EntityType, confidence: f32) -> Entity {
        Entity {
            key: name.to_lowercase(),
            name: name.into(),
            entity_type: t,
            confidence,
            mentions: 2,
            first_seen: 1,
            last_seen: 9,
            aliases: vec!["Ela".into()],
            contexts: vec!["Elara drew her bow.".into()],
            updated_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn entity_save_load_replace_delete() {
        let store = Store::open_in_memory().unwrap();
        store.save_entity(&entity("Elara", EntityType::Character, 0.7)).unwrap();
        store.save_entity(&entity("Ironhold", EntityType::Location, 0.9)).unwrap();

        let all = store.load_entities().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, "ironhold");
        assert_eq!(all[1].aliases, vec!["Ela".to_string()]);

        let mut updated = entity("Elara", EntityType::Character, 0.95);
        updated.mentions = 5;
        store.save_entity(&updated).unwrap();
        let got = store.get_entity("elara").unwrap().unwrap();
        assert_eq!(got.mentions, 5);
        assert_eq!(store.entity_count().unwrap(), 2);

        assert!(store.delete_entity("elara").unwrap());
        assert!(!store.delete_entity("elara").unwrap());
        assert!(store.get_entity("elara").unwrap().is_none());
    }

    #[test]
    fn unknown_entity_type_rows_are_skipped() {
        let store = Store::open_in_memory().unwrap();
        store.save_entity(&entity("Kael", EntityType::Character, 0.6)).unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO entities (key, name, entity_type) VALUES ('x', 'X', 'weather')",
                [],
            )
            .unwrap();
        let all = store.load_entities().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Kael");
    }
}
