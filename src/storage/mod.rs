mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::HashMap;

/// Durable key/value persistence, scoped by a store name.
///
/// Identifier state and the hit queue's backing rows live behind this seam.
/// Methods are fallible; callers in the state store swallow failures and log
/// them, because the in-memory value stays authoritative within a process
/// lifetime.
pub trait KeyValueStore: Send + Sync {
    fn get_string(&self, store: &str, key: &str) -> anyhow::Result<Option<String>>;
    fn set_string(&self, store: &str, key: &str, value: &str) -> anyhow::Result<()>;

    fn get_map(&self, store: &str, key: &str) -> anyhow::Result<Option<HashMap<String, String>>>;
    fn set_map(&self, store: &str, key: &str, value: &HashMap<String, String>)
    -> anyhow::Result<()>;

    fn remove(&self, store: &str, key: &str) -> anyhow::Result<()>;
}
