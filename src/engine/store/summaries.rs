use rusqlite::params;

use super::Store;
use crate::atoms::error::LoreResult;
use crate::atoms::types::Summary;

impl Store {
    // ── Window summaries ───────────────────────────────────────────────

    pub fn insert_summary(&self, summary: &Summary) -> LoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO summaries (id, first_index, last_index, text, fallback, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.id,
                summary.first_index as i64,
                summary.last_index as i64,
                summary.text,
                summary.fallback as i32,
                summary.created_at,
            ],
        )?;
        Ok(())
    }

    /// All summaries in chat order.
    pub fn list_summaries(&self) -> LoreResult<Vec<Summary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, first_index, last_index, text, fallback, created_at
             FROM summaries ORDER BY first_index ASC, created_at ASC",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(Summary {
                    id: row.get(0)?,
                    first_index: row.get::<_, i64>(1)?.max(0) as usize,
                    last_index: row.get::<_, i64>(2)?.max(0) as usize,
                    text: row.get(3)?,
                    fallback: row.get::<_, i32>(4)? != 0,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    pub fn delete_summary(&self, id: &str) -> LoreResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM summaries WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Delete every summary. Returns the number removed.
    pub fn clear_summaries(&self) -> LoreResult<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute("DELETE FROM summaries", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, first: usize, last: usize) -> Summary {
        Summary {
            id: id.into(),
            first_index: first,
            last_index: last,
            text: format!("messages {first}-{last}"),
            fallback: first == 0,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn summaries_list_in_chat_order() {
        let store = Store::open_in_memory().unwrap();
        store.insert_summary(&summary("b", 10, 19)).unwrap();
        store.insert_summary(&summary("a", 0, 9)).unwrap();
        let all = store.list_summaries().unwrap();
        assert_eq!(all.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(all[0].fallback);
        assert!(!all[1].fallback);
        assert!(store.delete_summary("a").unwrap());
        assert!(!store.delete_summary("a").unwrap());
        store.insert_summary(&summary("a", 0, 9)).unwrap();
        assert_eq!(store.clear_summaries().unwrap(), 2);
        assert!(store.list_summaries().unwrap().is_empty());
    }
}
