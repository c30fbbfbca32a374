//! In-memory index.
//!
//! Namespace listing can be switched off to mimic platforms that cannot
//! enumerate their stores.

use super::{
    validate_name, IndexCatalog, IndexEntry, IndexResult, NamespaceSnapshot, SubStore,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Stores = BTreeMap<String, BTreeMap<String, Value>>;

/// In-memory index.
#[derive(Clone)]
pub struct MemoryIndex {
    namespaces: Arc<Mutex<BTreeMap<String, Stores>>>,
    listing_supported: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            namespaces: Arc::new(Mutex::new(BTreeMap::new())),
            listing_supported: true,
        }
    }

    /// An index that answers `None` to `list_namespaces`.
    pub fn without_listing() -> Self {
        Self {
            listing_supported: false,
            ..Self::new()
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexCatalog for MemoryIndex {
    async fn list_namespaces(&self) -> IndexResult<Option<Vec<String>>> {
        if !self.listing_supported {
            return Ok(None);
        }
        Ok(Some(self.namespaces.lock().await.keys().cloned().collect()))
    }

    async fn open_namespace(&self, name: &str) -> IndexResult<Option<NamespaceSnapshot>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces.get(name).map(|stores| NamespaceSnapshot {
            name: name.to_string(),
            stores: stores
                .iter()
                .map(|(store, entries)| SubStore {
                    name: store.clone(),
                    entries: entries
                        .iter()
                        .map(|(key, value)| IndexEntry {
                            key: key.clone(),
                            value: value.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }))
    }

    async fn put_entry(
        &self,
        namespace: &str,
        store: &str,
        key: &str,
        value: Value,
    ) -> IndexResult<()> {
        validate_name(namespace)?;
        validate_name(store)?;
        self.namespaces
            .lock()
            .await
            .entry(namespace.to_string())
            .or_default()
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_entry(&self, namespace: &str, store: &str, key: &str) -> IndexResult<bool> {
        let mut namespaces = self.namespaces.lock().await;
        Ok(namespaces
            .get_mut(namespace)
            .and_then(|stores| stores.get_mut(store))
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }
}
