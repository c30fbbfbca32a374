//! Trait abstractions for the local content store.
//!
//! Components never talk to the embedded node directly; they hold a
//! `ContentStore` so tests can substitute an in-memory double.

use crate::cid::ContentId;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for content store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Content store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Block is absent locally and could not be fetched in time.
    #[error("Block not found: {0}")]
    NotFound(ContentId),

    /// Bytes fetched for an identifier hash to something else.
    #[error("Fetched content does not match identifier {0}")]
    HashMismatch(ContentId),

    /// Node could not be brought up.
    #[error("Node initialization failed: {0}")]
    Initialization(String),

    /// Pin registry on disk could not be decoded.
    #[error("Corrupt pin registry: {0}")]
    CorruptRegistry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Local content store: put/get plus local pinning.
///
/// No remote-provider knowledge lives behind this trait.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their identifier. Storing the same bytes twice
    /// returns the same identifier.
    async fn put(&self, data: &[u8]) -> StoreResult<ContentId>;

    /// Read content, falling back to the network when the block is not held
    /// locally. Fails with `NotFound` when neither source produces it.
    async fn get(&self, cid: &ContentId) -> StoreResult<Vec<u8>>;

    /// Read content from the local block store only.
    async fn read_local(&self, cid: &ContentId) -> StoreResult<Option<Vec<u8>>>;

    /// Mark content as pinned locally. Idempotent.
    async fn pin_local(&self, cid: &ContentId) -> StoreResult<()>;

    /// Remove a local pin. Removing an absent pin succeeds.
    async fn unpin_local(&self, cid: &ContentId) -> StoreResult<()>;

    async fn is_pinned_local(&self, cid: &ContentId) -> StoreResult<bool>;

    /// Every identifier in the local pin registry.
    async fn list_local_pins(&self) -> StoreResult<Vec<ContentId>>;
}

/// A network source the local node can fetch missing blocks from.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, cid: &ContentId) -> StoreResult<Vec<u8>>;
}
