//! Content store adapter.
//!
//! Thin façade over the local embedded node's put/get/local-pin primitives:
//! - `EmbeddedNode`: disk-backed node with optional network block fetch
//! - `NodeHandle`: lazily initialized, single-owner handle injected into
//!   every component that needs the node
//! - `MemoryContentStore`: in-memory double for tests

pub mod embedded_node;
pub mod handle;
pub mod mock;
pub mod traits;

pub use embedded_node::{EmbeddedNode, NodeConfig, DEFAULT_FETCH_TIMEOUT};
pub use handle::{EmbeddedNodeHandle, NodeHandle};
pub use mock::MemoryContentStore;
pub use traits::{BlockSource, ContentStore, StoreError, StoreResult};
