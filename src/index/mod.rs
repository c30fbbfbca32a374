//! Persistent key-value namespaces.
//!
//! The third local storage tier: named namespaces, each holding one or more
//! sub-stores of `key -> JSON value` entries. Pin ledgers are persisted here,
//! and the storage locator scans every namespace it can reach.
//!
//! Some backends cannot enumerate their namespaces. They answer `None` from
//! `list_namespaces`, and callers fall back to [`WELL_KNOWN_NAMESPACES`].
//!
//! Each namespace is expected to have a single writer.

pub mod disk;
pub mod memory;

pub use disk::DiskIndex;
pub use memory::MemoryIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespaces probed when the backend cannot list its own.
pub const WELL_KNOWN_NAMESPACES: &[&str] = &[
    "pinrelay",
    "datastore",
    "blockstore",
    "pins",
    "pin-ledger-cloud",
    "pin-ledger-companion",
];

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid namespace or store name '{0}'")]
    InvalidName(String),

    #[error("Corrupt store {namespace}/{store}: {reason}")]
    Corrupt {
        namespace: String,
        store: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One key/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub value: serde_json::Value,
}

/// A named sub-store within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStore {
    pub name: String,
    pub entries: Vec<IndexEntry>,
}

/// Point-in-time copy of a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub stores: Vec<SubStore>,
}

/// Access to the persistent key-value tier.
#[async_trait]
pub trait IndexCatalog: Send + Sync {
    /// Every namespace, or `None` when the backend cannot enumerate them.
    async fn list_namespaces(&self) -> IndexResult<Option<Vec<String>>>;

    /// Snapshot of a namespace, or `None` if it does not exist.
    async fn open_namespace(&self, name: &str) -> IndexResult<Option<NamespaceSnapshot>>;

    async fn put_entry(
        &self,
        namespace: &str,
        store: &str,
        key: &str,
        value: serde_json::Value,
    ) -> IndexResult<()>;

    /// Remove an entry. Returns whether it existed.
    async fn remove_entry(&self, namespace: &str, store: &str, key: &str) -> IndexResult<bool>;
}

/// Namespace and store names become path components, so keep them plain.
pub(crate) fn validate_name(name: &str) -> IndexResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidName(name.to_string()))
    }
}
