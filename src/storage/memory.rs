use super::KeyValueStore;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory key/value store for tests and ephemeral embedding.
#[derive(Default)]
pub struct MemoryStore {
    strings: Mutex<HashMap<(String, String), String>>,
    maps: Mutex<HashMap<(String, String), HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, store: &str, key: &str) -> anyhow::Result<Option<String>> {
        let strings = self.strings.lock().expect("memory store mutex poisoned");
        Ok(strings.get(&(store.to_string(), key.to_string())).cloned())
    }

    fn set_string(&self, store: &str, key: &str, value: &str) -> anyhow::Result<()> {
        let mut strings = self.strings.lock().expect("memory store mutex poisoned");
        strings.insert((store.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn get_map(&self, store: &str, key: &str) -> anyhow::Result<Option<HashMap<String, String>>> {
        let maps = self.maps.lock().expect("memory store mutex poisoned");
        Ok(maps.get(&(store.to_string(), key.to_string())).cloned())
    }

    fn set_map(
        &self,
        store: &str,
        key: &str,
        value: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        let mut maps = self.maps.lock().expect("memory store mutex poisoned");
        maps.insert((store.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    fn remove(&self, store: &str, key: &str) -> anyhow::Result<()> {
        let id = (store.to_string(), key.to_string());
        self.strings
            .lock()
            .expect("memory store mutex poisoned")
            .remove(&id);
        self.maps
            .lock()
            .expect("memory store mutex poisoned")
            .remove(&id);
        Ok(())
    }
}
