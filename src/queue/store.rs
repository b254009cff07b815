use rusqlite::{Connection, OptionalExtension, params};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

/// Durable FIFO backing for the hit queue. Rows are opaque JSON payloads;
/// `peek` always returns the oldest surviving row.
pub trait HitStore: Send + Sync {
    fn push(&self, payload: &str) -> anyhow::Result<()>;
    fn peek(&self) -> anyhow::Result<Option<(i64, String)>>;
    fn remove(&self, row: i64) -> anyhow::Result<()>;
    fn count(&self) -> anyhow::Result<u64>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// SQLite-backed hit store. Rowid order is enqueue order.
pub struct SqliteHitStore {
    conn: Mutex<Connection>,
}

impl SqliteHitStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS hits (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl HitStore for SqliteHitStore {
    fn push(&self, payload: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("hit store mutex poisoned");
        conn.execute("INSERT INTO hits (payload) VALUES (?1)", params![payload])?;
        Ok(())
    }

    fn peek(&self) -> anyhow::Result<Option<(i64, String)>> {
        let conn = self.conn.lock().expect("hit store mutex poisoned");
        let head = conn
            .query_row(
                "SELECT id, payload FROM hits ORDER BY id ASC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(head)
    }

    fn remove(&self, row: i64) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("hit store mutex poisoned");
        conn.execute("DELETE FROM hits WHERE id = ?1", params![row])?;
        Ok(())
    }

    fn count(&self) -> anyhow::Result<u64> {
        let conn = self.conn.lock().expect("hit store mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("hit store mutex poisoned");
        conn.execute("DELETE FROM hits", [])?;
        Ok(())
    }
}

/// In-memory hit store for tests and ephemeral embedding.
#[derive(Default)]
pub struct MemoryHitStore {
    inner: Mutex<MemoryHitStoreInner>,
}

#[derive(Default)]
struct MemoryHitStoreInner {
    rows: VecDeque<(i64, String)>,
    next_id: i64,
}

impl MemoryHitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HitStore for MemoryHitStore {
    fn push(&self, payload: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("hit store mutex poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.push_back((id, payload.to_string()));
        Ok(())
    }

    fn peek(&self) -> anyhow::Result<Option<(i64, String)>> {
        let inner = self.inner.lock().expect("hit store mutex poisoned");
        Ok(inner.rows.front().cloned())
    }

    fn remove(&self, row: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("hit store mutex poisoned");
        inner.rows.retain(|(id, _)| *id != row);
        Ok(())
    }

    fn count(&self) -> anyhow::Result<u64> {
        let inner = self.inner.lock().expect("hit store mutex poisoned");
        Ok(inner.rows.len() as u64)
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().expect("hit store mutex poisoned");
        inner.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_store_is_fifo_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.db");

        {
            let store = SqliteHitStore::open(&path).unwrap();
            store.push("first").unwrap();
            store.push("second").unwrap();
        }

        let store = SqliteHitStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let (row, payload) = store.peek().unwrap().unwrap();
        assert_eq!(payload, "first");
        store.remove(row).unwrap();

        let (_, payload) = store.peek().unwrap().unwrap();
        assert_eq!(payload, "second");
    }

    #[test]
    fn memory_store_clear_empties_queue() {
        let store = MemoryHitStore::new();
        store.push("a").unwrap();
        store.push("b").unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.peek().unwrap().is_none());
    }

    #[test]
    fn peek_leaves_the_row_in_place() {
        let store = MemoryHitStore::new();
        store.push("a").unwrap();
        assert_eq!(store.peek().unwrap().unwrap().1, "a");
        assert_eq!(store.count().unwrap(), 1);
    }
}
