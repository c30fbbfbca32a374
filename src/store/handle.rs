//! Lazily initialized, single-owner handle to the local node.
//!
//! The local node is a process-wide singleton, but it is modelled as an
//! explicitly constructed handle that is injected into every component that
//! needs it. Construction happens on first use. Concurrent first callers share
//! one in-flight initialization future, so the node is never built twice.

use crate::cid::ContentId;
use crate::store::embedded_node::{EmbeddedNode, NodeConfig};
use crate::store::traits::{BlockSource, ContentStore, StoreResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type Initializer<S> = Box<dyn Fn() -> BoxFuture<'static, StoreResult<S>> + Send + Sync>;

/// Handle owning a lazily constructed store.
pub struct NodeHandle<S> {
    cell: OnceCell<Arc<S>>,
    init: Initializer<S>,
}

/// Handle to the disk-backed embedded node.
pub type EmbeddedNodeHandle = NodeHandle<EmbeddedNode>;

impl<S: Send + Sync + 'static> NodeHandle<S> {
    /// Create a handle that builds its store with `init` on first use.
    pub fn new<F>(init: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, StoreResult<S>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            init: Box::new(init),
        }
    }

    /// Resolve the store, initializing it if this is the first call.
    ///
    /// A failed initialization leaves the handle empty; the next caller retries.
    pub async fn get(&self) -> StoreResult<Arc<S>> {
        let node = self
            .cell
            .get_or_try_init(|| async {
                debug!("initializing local node");
                (self.init)().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(node))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

impl NodeHandle<EmbeddedNode> {
    /// Handle that opens an [`EmbeddedNode`] on first use.
    pub fn embedded(config: NodeConfig, network: Option<Arc<dyn BlockSource>>) -> Self {
        Self::new(move || {
            let config = config.clone();
            let network = network.clone();
            EmbeddedNode::open(config, network).boxed()
        })
    }
}

#[async_trait]
impl<S: ContentStore + 'static> ContentStore for NodeHandle<S> {
    async fn put(&self, data: &[u8]) -> StoreResult<ContentId> {
        self.get().await?.put(data).await
    }

    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        NodeHandle::get(self).await?.get(cid).await
    }

    async fn read_local(&self, cid: &ContentId) -> StoreResult<Option<Vec<u8>>> {
        self.get().await?.read_local(cid).await
    }

    async fn pin_local(&self, cid: &ContentId) -> StoreResult<()> {
        self.get().await?.pin_local(cid).await
    }

    async fn unpin_local(&self, cid: &ContentId) -> StoreResult<()> {
        self.get().await?.unpin_local(cid).await
    }

    async fn is_pinned_local(&self, cid: &ContentId) -> StoreResult<bool> {
        self.get().await?.is_pinned_local(cid).await
    }

    async fn list_local_pins(&self) -> StoreResult<Vec<ContentId>> {
        self.get().await?.list_local_pins().await
    }
}
