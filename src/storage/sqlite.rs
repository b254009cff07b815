use super::KeyValueStore;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed key/value store.
///
/// One `kv` table keyed by `(store, key)`; map values are stored as JSON
/// text. Survives process restarts, which is what the identifier state and
/// hit queue rely on.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
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
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                store TEXT NOT NULL,
                key   TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );",
        )?;
        Ok(())
    }

    fn get_raw(&self, store: &str, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn.lock().expect("kv store mutex poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE store = ?1 AND key = ?2",
                params![store, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_raw(&self, store: &str, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("kv store mutex poisoned");
        conn.execute(
            "INSERT INTO kv (store, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (store, key) DO UPDATE SET value = excluded.value",
            params![store, key, value],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get_string(&self, store: &str, key: &str) -> anyhow::Result<Option<String>> {
        self.get_raw(store, key)
    }

    fn set_string(&self, store: &str, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_raw(store, key, value)
    }

    fn get_map(&self, store: &str, key: &str) -> anyhow::Result<Option<HashMap<String, String>>> {
        match self.get_raw(store, key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_map(
        &self,
        store: &str,
        key: &str,
        value: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        self.set_raw(store, key, &serde_json::to_string(value)?)
    }

    fn remove(&self, store: &str, key: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("kv store mutex poisoned");
        conn.execute(
            "DELETE FROM kv WHERE store = ?1 AND key = ?2",
            params![store, key],
        )?;
        Ok(())
    }
}
