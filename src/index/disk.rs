//! Directory-backed index.
//!
//! ```text
//! <root>/<namespace>/<store>.json    JSON object of key -> value
//! ```

use super::{
    validate_name, IndexCatalog, IndexEntry, IndexError, IndexResult, NamespaceSnapshot, SubStore,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

const STORE_EXTENSION: &str = "json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Index persisted as one directory per namespace.
///
/// Writes are read-modify-write over a whole store file, so clones share
/// one write lock.
#[derive(Debug, Clone)]
pub struct DiskIndex {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DiskIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_path(&self, namespace: &str, store: &str) -> IndexResult<PathBuf> {
        validate_name(namespace)?;
        validate_name(store)?;
        Ok(self
            .root
            .join(namespace)
            .join(format!("{}.{}", store, STORE_EXTENSION)))
    }

    async fn read_store(
        &self,
        namespace: &str,
        store: &str,
        path: &Path,
    ) -> IndexResult<Map<String, Value>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(IndexError::Corrupt {
                namespace: namespace.to_string(),
                store: store.to_string(),
                reason: "top-level value is not an object".to_string(),
            }),
            Err(e) => Err(IndexError::Corrupt {
                namespace: namespace.to_string(),
                store: store.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write_store(&self, path: &Path, map: &Map<String, Value>) -> IndexResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(map)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(format!(".{}.tmp", seq));
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl IndexCatalog for DiskIndex {
    async fn list_namespaces(&self) -> IndexResult<Option<Vec<String>>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Some(Vec::new())),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(Some(names))
    }

    async fn open_namespace(&self, name: &str) -> IndexResult<Option<NamespaceSnapshot>> {
        validate_name(name)?;
        let ns_dir = self.root.join(name);
        let mut dir = match tokio::fs::read_dir(&ns_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut stores = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            let Some(store) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let map = self.read_store(name, store, &path).await?;
            stores.push(SubStore {
                name: store.to_string(),
                entries: map
                    .into_iter()
                    .map(|(key, value)| IndexEntry { key, value })
                    .collect(),
            });
        }
        stores.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(NamespaceSnapshot {
            name: name.to_string(),
            stores,
        }))
    }

    async fn put_entry(
        &self,
        namespace: &str,
        store: &str,
        key: &str,
        value: Value,
    ) -> IndexResult<()> {
        let path = self.store_path(namespace, store)?;
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_store(namespace, store, &path).await?;
        map.insert(key.to_string(), value);
        self.write_store(&path, &map).await
    }

    async fn remove_entry(&self, namespace: &str, store: &str, key: &str) -> IndexResult<bool> {
        let path = self.store_path(namespace, store)?;
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_store(namespace, store, &path).await?;
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_store(&path, &map).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::new(dir.path().join("absent"));
        assert_eq!(index.list_namespaces().await.unwrap(), Some(Vec::new()));
        assert!(index.open_namespace("pins").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_and_open_namespace() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::new(dir.path());

        index
            .put_entry("app", "uploads", "b", json!({"size": 2}))
            .await
            .unwrap();
        index
            .put_entry("app", "uploads", "a", json!({"size": 1}))
            .await
            .unwrap();
        index
            .put_entry("app", "names", "k", json!("v"))
            .await
            .unwrap();

        assert_eq!(
            index.list_namespaces().await.unwrap(),
            Some(vec!["app".to_string()])
        );

        let snapshot = index.open_namespace("app").await.unwrap().unwrap();
        let store_names: Vec<_> = snapshot.stores.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(store_names, vec!["names", "uploads"]);
        assert_eq!(snapshot.stores[1].entries.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::new(dir.path());

        index.put_entry("ns", "s", "k", json!(1)).await.unwrap();
        assert!(index.remove_entry("ns", "s", "k").await.unwrap());
        assert!(!index.remove_entry("ns", "s", "k").await.unwrap());

        let snapshot = index.open_namespace("ns").await.unwrap().unwrap();
        assert!(snapshot.stores[0].entries.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_keep_every_entry() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::new(dir.path());

        let writers: Vec<_> = (0..32)
            .map(|i| {
                let index = index.clone();
                tokio::spawn(async move {
                    index
                        .put_entry("ns", "records", &format!("k{}", i), json!(i))
                        .await
                })
            })
            .collect();
        for writer in futures::future::join_all(writers).await {
            writer.unwrap().unwrap();
        }

        let snapshot = index.open_namespace("ns").await.unwrap().unwrap();
        assert_eq!(snapshot.stores.len(), 1);
        assert_eq!(snapshot.stores[0].entries.len(), 32);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let index = DiskIndex::new(dir.path());
        assert!(matches!(
            index.put_entry("..", "s", "k", json!(1)).await,
            Err(IndexError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_store_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("ns")).unwrap();
        std::fs::write(dir.path().join("ns").join("s.json"), b"[1,2,3]").unwrap();

        let index = DiskIndex::new(dir.path());
        assert!(matches!(
            index.open_namespace("ns").await,
            Err(IndexError::Corrupt { .. })
        ));
    }
}
