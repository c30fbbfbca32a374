//! Embedded local node backed by a data directory.
//!
//! Layout:
//!
//! ```text
//! <data_dir>/blocks/<derived block key>   raw block bytes
//! <data_dir>/pins.json                    pin registry (sorted identifier list)
//! ```
//!
//! Blocks are keyed by the upper-case base32 multihash for current-format
//! identifiers and by the identifier itself for legacy ones. All writes go to a
//! temporary file first and are renamed into place.
//!
//! When a block is missing locally the node may consult a network
//! `BlockSource`, bounded by `fetch_timeout`. Network bytes are verified
//! against the identifier before they are cached.

use crate::cid::ContentId;
use crate::store::traits::{BlockSource, ContentStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const BLOCKS_DIR: &str = "blocks";
const PIN_REGISTRY_FILE: &str = "pins.json";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Default bound on a network block fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for opening an embedded node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding blocks and the pin registry.
    pub data_dir: PathBuf,

    /// Upper bound on a single network block fetch.
    pub fetch_timeout: Duration,
}

impl NodeConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Local embedded node.
pub struct EmbeddedNode {
    root: PathBuf,
    pins: RwLock<BTreeSet<ContentId>>,
    network: Option<Arc<dyn BlockSource>>,
    fetch_timeout: Duration,
}

impl EmbeddedNode {
    /// Open (or create) a node rooted at `config.data_dir`.
    pub async fn open(
        config: NodeConfig,
        network: Option<Arc<dyn BlockSource>>,
    ) -> StoreResult<Self> {
        let root = config.data_dir;
        tokio::fs::create_dir_all(root.join(BLOCKS_DIR))
            .await
            .map_err(|e| {
                StoreError::Initialization(format!(
                    "cannot create block store under '{}': {}",
                    root.display(),
                    e
                ))
            })?;

        let pins = load_pin_registry(&root.join(PIN_REGISTRY_FILE)).await?;
        info!(
            data_dir = %root.display(),
            pins = pins.len(),
            network = network.is_some(),
            "embedded node opened"
        );

        Ok(Self {
            root,
            pins: RwLock::new(pins),
            network,
            fetch_timeout: config.fetch_timeout,
        })
    }

    /// Data directory this node is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a block for `cid` is (or would be) stored at.
    pub fn block_path(&self, cid: &ContentId) -> PathBuf {
        let key = cid
            .derived_block_key()
            .unwrap_or_else(|| cid.as_str().to_string());
        self.root.join(BLOCKS_DIR).join(key)
    }

    async fn write_block(&self, cid: &ContentId, data: &[u8]) -> StoreResult<()> {
        let path = self.block_path(cid);
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        write_atomic(&path, data).await?;
        debug!(cid = %cid, bytes = data.len(), "block stored");
        Ok(())
    }

    async fn fetch_from_network(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        let Some(network) = &self.network else {
            return Err(StoreError::NotFound(cid.clone()));
        };

        let data = match tokio::time::timeout(self.fetch_timeout, network.fetch_block(cid)).await
        {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(cid = %cid, error = %e, "network block fetch failed");
                return Err(StoreError::NotFound(cid.clone()));
            }
            Err(_) => {
                warn!(
                    cid = %cid,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "network block fetch timed out"
                );
                return Err(StoreError::NotFound(cid.clone()));
            }
        };

        match cid.verify(&data) {
            Some(false) => return Err(StoreError::HashMismatch(cid.clone())),
            None => debug!(cid = %cid, "identifier not locally verifiable, accepting fetched block"),
            Some(true) => {}
        }

        self.write_block(cid, &data).await?;
        Ok(data)
    }

    async fn persist_pins(&self, pins: &BTreeSet<ContentId>) -> StoreResult<()> {
        let list: Vec<&str> = pins.iter().map(ContentId::as_str).collect();
        let json = serde_json::to_vec_pretty(&list)
            .map_err(|e| StoreError::Other(format!("cannot encode pin registry: {}", e)))?;
        write_atomic(&self.root.join(PIN_REGISTRY_FILE), &json).await
    }
}

#[async_trait]
impl ContentStore for EmbeddedNode {
    async fn put(&self, data: &[u8]) -> StoreResult<ContentId> {
        let cid = ContentId::for_bytes(data);
        self.write_block(&cid, data).await?;
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        if let Some(data) = self.read_local(cid).await? {
            return Ok(data);
        }
        self.fetch_from_network(cid).await
    }

    async fn read_local(&self, cid: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.block_path(cid)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn pin_local(&self, cid: &ContentId) -> StoreResult<()> {
        if self.pins.read().await.contains(cid) {
            debug!(cid = %cid, "already pinned locally");
            return Ok(());
        }

        // A pin asserts retention, so the block has to be here first.
        self.get(cid).await?;

        let mut pins = self.pins.write().await;
        if pins.insert(cid.clone()) {
            self.persist_pins(&pins).await?;
            info!(cid = %cid, "pinned locally");
        }
        Ok(())
    }

    async fn unpin_local(&self, cid: &ContentId) -> StoreResult<()> {
        let mut pins = self.pins.write().await;
        if pins.remove(cid) {
            self.persist_pins(&pins).await?;
            info!(cid = %cid, "unpinned locally");
        }
        Ok(())
    }

    async fn is_pinned_local(&self, cid: &ContentId) -> StoreResult<bool> {
        Ok(self.pins.read().await.contains(cid))
    }

    async fn list_local_pins(&self) -> StoreResult<Vec<ContentId>> {
        Ok(self.pins.read().await.iter().cloned().collect())
    }
}

async fn load_pin_registry(path: &Path) -> StoreResult<BTreeSet<ContentId>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };

    let entries: Vec<String> = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::CorruptRegistry(format!("{}: {}", path.display(), e)))?;

    entries
        .iter()
        .map(|entry| {
            ContentId::parse(entry)
                .map_err(|e| StoreError::CorruptRegistry(format!("{}: {}", path.display(), e)))
        })
        .collect()
}

async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", seq));
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
