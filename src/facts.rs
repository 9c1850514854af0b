//! Long-lived facts store
//!
//! A whole-file JSON map of canonical facts the council has learned across
//! runs (derived non-functional hints, org-wide constraints). Fully loaded on
//! open, fully rewritten on every mutation. Single-writer by assumption;
//! concurrent runs sharing a store need external serialization.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub struct FactsStore {
    path: PathBuf,
    cache: BTreeMap<String, Value>,
}

impl FactsStore {
    /// Open a store, creating an empty one if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create facts dir {parent:?}"))?;
            }
        }
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read facts store {path:?}"))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("facts store {path:?} is not a JSON map"))?
        } else {
            BTreeMap::new()
        };
        let store = Self { path, cache };
        if !store.path.exists() {
            store.flush()?;
        }
        Ok(store)
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.cache)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write facts store {:?}", self.path))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cache.get(key)
    }

    /// Set a fact and rewrite the whole file.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.cache.insert(key.into(), value);
        self.flush()
    }

    pub fn all(&self) -> &BTreeMap<String, Value> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_creates_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.json");
        let store = FactsStore::open(&path).unwrap();
        assert!(store.all().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn set_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.json");

        let mut store = FactsStore::open(&path).unwrap();
        store.set("peak_rps", json!(10000)).unwrap();
        store.set("residency", json!("EU")).unwrap();
        drop(store);

        let reopened = FactsStore::open(&path).unwrap();
        assert_eq!(reopened.get("peak_rps"), Some(&json!(10000)));
        assert_eq!(reopened.get("residency"), Some(&json!("EU")));
    }

    #[test]
    fn set_overwrites_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FactsStore::open(dir.path().join("facts.json")).unwrap();
        store.set("consistency", json!("eventual")).unwrap();
        store.set("consistency", json!("strong")).unwrap();
        assert_eq!(store.get("consistency"), Some(&json!("strong")));
    }
}
