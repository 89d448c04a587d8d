use std::collections::{BTreeMap, HashMap};

use super::{Backend, Collection};
use crate::error::Result;

/// Process-local backend; everything is lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    collections: HashMap<Collection, BTreeMap<String, String>>,
}

impl Backend for MemoryBackend {
    fn get(&mut self, collection: Collection, key: &str) -> Result<Option<String>> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn put(&mut self, collection: Collection, key: &str, payload: &str) -> Result<()> {
        self.collections
            .entry(collection)
            .or_default()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn scan(&mut self, collection: Collection) -> Result<Vec<String>> {
        Ok(self
            .collections
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&mut self, collection: Collection) -> Result<()> {
        self.collections.remove(&collection);
        Ok(())
    }
}
