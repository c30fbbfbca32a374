//! In-memory content store for testing.
//!
//! Mirrors the embedded node's contract without touching disk. Failure
//! switches let tests simulate a local store that cannot pin.

use crate::cid::ContentId;
use crate::store::traits::{ContentStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory content store.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    blocks: HashMap<ContentId, Vec<u8>>,
    pins: BTreeSet<ContentId>,
    fail_pins: bool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `pin_local` fail (for test setup).
    pub async fn set_pin_failure(&self, fail: bool) {
        self.state.lock().await.fail_pins = fail;
    }

    /// Insert a block under an arbitrary identifier (for test setup).
    pub async fn insert_block(&self, cid: ContentId, data: Vec<u8>) {
        self.state.lock().await.blocks.insert(cid, data);
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: &[u8]) -> StoreResult<ContentId> {
        let cid = ContentId::for_bytes(data);
        self.state
            .lock()
            .await
            .blocks
            .entry(cid.clone())
            .or_insert_with(|| data.to_vec());
        Ok(cid)
    }

    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        self.read_local(cid)
            .await?
            .ok_or_else(|| StoreError::NotFound(cid.clone()))
    }

    async fn read_local(&self, cid: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.state.lock().await.blocks.get(cid).cloned())
    }

    async fn pin_local(&self, cid: &ContentId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_pins {
            return Err(StoreError::Other("simulated local pin failure".to_string()));
        }
        if !state.blocks.contains_key(cid) {
            return Err(StoreError::NotFound(cid.clone()));
        }
        state.pins.insert(cid.clone());
        Ok(())
    }

    async fn unpin_local(&self, cid: &ContentId) -> StoreResult<()> {
        self.state.lock().await.pins.remove(cid);
        Ok(())
    }

    async fn is_pinned_local(&self, cid: &ContentId) -> StoreResult<bool> {
        Ok(self.state.lock().await.pins.contains(cid))
    }

    async fn list_local_pins(&self) -> StoreResult<Vec<ContentId>> {
        Ok(self.state.lock().await.pins.iter().cloned().collect())
    }
}
