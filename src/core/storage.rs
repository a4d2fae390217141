use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

/// The persistence collaborator. One `get` is a single round trip for all
/// requested keys; `set` merges the given entries and the returned
/// `Result` is the completion signal callers wait on before relying on
/// persistence (the key-binding migration does).
pub trait KeyValueStore {
    fn get(&self, keys: &[&str]) -> anyhow::Result<HashMap<String, Value>>;
    fn set(&mut self, entries: HashMap<String, Value>) -> anyhow::Result<()>;
}

/// In-memory store used by tests and as the driver default.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(values: HashMap<String, Value>) -> Self {
        MemoryStore { values }
    }

    pub fn raw(&self) -> &HashMap<String, Value> {
        &self.values
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> anyhow::Result<HashMap<String, Value>> {
        let mut out = HashMap::new();
        for &key in keys {
            if let Some(value) = self.values.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        Ok(out)
    }

    fn set(&mut self, entries: HashMap<String, Value>) -> anyhow::Result<()> {
        self.values.extend(entries);
        Ok(())
    }
}

/// File-backed store: one JSON object per installation, rewritten on each
/// `set`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new() -> Self {
        JsonFileStore { path: Self::default_path() }
    }

    pub fn at(path: PathBuf) -> Self {
        JsonFileStore { path }
    }

    fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speed-overlay")
            .join("settings.json")
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, Value> {
        if !self.path.exists() {
            return HashMap::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!(
                        "Store file {} is not a JSON object ({}), starting empty",
                        self.path.display(),
                        e
                    );
                    HashMap::new()
                }
            },
            Err(e) => {
                log::warn!("Failed to read store file {}: {}", self.path.display(), e);
                HashMap::new()
            }
        }
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> anyhow::Result<HashMap<String, Value>> {
        let all = self.read_all();
        let mut out = HashMap::new();
        for &key in keys {
            if let Some(value) = all.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
        Ok(out)
    }

    fn set(&mut self, entries: HashMap<String, Value>) -> anyhow::Result<()> {
        let mut all = self.read_all();
        all.extend(entries);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let mut entries = HashMap::new();
        entries.insert("lastSpeed".to_string(), json!(1.5));
        entries.insert("enabled".to_string(), json!(true));
        store.set(entries).unwrap();

        let got = store.get(&["lastSpeed", "enabled", "missing"]).unwrap();
        assert_eq!(got.get("lastSpeed"), Some(&json!(1.5)));
        assert_eq!(got.get("enabled"), Some(&json!(true)));
        assert!(!got.contains_key("missing"));
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = JsonFileStore::at(path.clone());

        let mut entries = HashMap::new();
        entries.insert("blacklist".to_string(), json!(["x.com"]));
        store.set(entries).unwrap();

        let mut more = HashMap::new();
        more.insert("lastSpeed".to_string(), json!(2.0));
        store.set(more).unwrap();

        // A fresh store over the same file sees the merged object.
        let reopened = JsonFileStore::at(path);
        let got = reopened.get(&["blacklist", "lastSpeed"]).unwrap();
        assert_eq!(got.get("blacklist"), Some(&json!(["x.com"])));
        assert_eq!(got.get("lastSpeed"), Some(&json!(2.0)));
    }

    #[test]
    fn test_json_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json at all").unwrap();

        let mut store = JsonFileStore::at(path);
        assert!(store.get(&["enabled"]).unwrap().is_empty());
        let mut entries = HashMap::new();
        entries.insert("enabled".to_string(), json!(false));
        store.set(entries).unwrap();
        assert_eq!(store.get(&["enabled"]).unwrap().get("enabled"), Some(&json!(false)));
    }
}
