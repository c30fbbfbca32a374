//! Storage locator.
//!
//! Diagnostic search for identifiers across the three local storage tiers:
//!
//! | Tier | Source | Matches |
//! |---|---|---|
//! | `PinRegistry` | local pin registry | exact pin, substring of a pinned identifier |
//! | `BlockStore` | local block store | block present (never fetched from the network) |
//! | `PersistentIndex` | every reachable namespace | key or serialized value containing the identifier or its derived block key |
//!
//! Substring and derived-key hits are heuristic. They say "something here
//! mentions this identifier", not "this content is stored here".
//!
//! When the index cannot enumerate its namespaces, the well-known list plus
//! every configured provider's ledger namespace is probed instead.
//!
//! Search is read-only and never fails as a whole: a tier that errors is
//! skipped and its error reported on the result.

use crate::cid::ContentId;
use crate::index::{IndexCatalog, NamespaceSnapshot, WELL_KNOWN_NAMESPACES};
use crate::store::ContentStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shortest needle used for substring matching.
pub const MIN_SUBSTRING_LEN: usize = 8;

/// Characters of surrounding text kept on each side of a value match.
const CONTEXT_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageTier {
    PinRegistry,
    BlockStore,
    PersistentIndex,
}

/// How a location matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    Exact,
    /// The identifier appears inside a longer key, value or identifier.
    Substring,
    /// The derived block key appears instead of the identifier.
    Derived,
}

impl MatchKind {
    pub fn is_heuristic(&self) -> bool {
        !matches!(self, MatchKind::Exact)
    }
}

/// One place an identifier was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub tier: StorageTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub match_kind: MatchKind,
    pub detail: String,
}

/// Search outcome for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidSearchResult {
    pub identifier: String,
    pub found: bool,
    pub locations: Vec<StorageLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Searches local storage tiers for identifiers.
pub struct StorageLocator {
    store: Arc<dyn ContentStore>,
    index: Option<Arc<dyn IndexCatalog>>,
    fallback_namespaces: Vec<String>,
}

impl StorageLocator {
    pub fn new(store: Arc<dyn ContentStore>, index: Option<Arc<dyn IndexCatalog>>) -> Self {
        Self {
            store,
            index,
            fallback_namespaces: WELL_KNOWN_NAMESPACES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Also probe `namespaces` when the index cannot list its own.
    pub fn with_fallback_namespaces(mut self, namespaces: impl IntoIterator<Item = String>) -> Self {
        for namespace in namespaces {
            if !self.fallback_namespaces.contains(&namespace) {
                self.fallback_namespaces.push(namespace);
            }
        }
        self
    }

    pub async fn search(&self, identifiers: &[String]) -> Vec<CidSearchResult> {
        let mut load_errors = Vec::new();
        let snapshots = self.load_index(&mut load_errors).await;
        let local_pins = match self.store.list_local_pins().await {
            Ok(pins) => Some(pins),
            Err(e) => {
                load_errors.push(format!("pin registry: {}", e));
                None
            }
        };

        let mut results = Vec::with_capacity(identifiers.len());
        for raw in identifiers {
            let mut result = self
                .search_one(raw.trim(), local_pins.as_deref(), &snapshots)
                .await;
            result.errors.extend(load_errors.iter().cloned());
            debug!(identifier = %result.identifier, locations = result.locations.len(), "search finished");
            results.push(result);
        }
        results
    }

    async fn search_one(
        &self,
        needle: &str,
        local_pins: Option<&[ContentId]>,
        snapshots: &[NamespaceSnapshot],
    ) -> CidSearchResult {
        let mut locations = Vec::new();
        let mut errors = Vec::new();
        let cid = ContentId::parse(needle).ok();
        let derived = cid.as_ref().and_then(ContentId::derived_block_key);

        if let Some(cid) = &cid {
            match self.store.is_pinned_local(cid).await {
                Ok(true) => locations.push(StorageLocation {
                    tier: StorageTier::PinRegistry,
                    namespace: None,
                    store: None,
                    key: Some(cid.to_string()),
                    match_kind: MatchKind::Exact,
                    detail: "pinned in local registry".to_string(),
                }),
                Ok(false) => {}
                Err(e) => errors.push(format!("pin registry: {}", e)),
            }
        }
        if needle.len() >= MIN_SUBSTRING_LEN {
            for pinned in local_pins.unwrap_or_default() {
                if pinned.as_str() != needle && pinned.as_str().contains(needle) {
                    locations.push(StorageLocation {
                        tier: StorageTier::PinRegistry,
                        namespace: None,
                        store: None,
                        key: Some(pinned.to_string()),
                        match_kind: MatchKind::Substring,
                        detail: format!("pinned identifier {} contains the search term", pinned),
                    });
                }
            }
        }

        if let Some(cid) = &cid {
            match self.store.read_local(cid).await {
                Ok(Some(bytes)) => locations.push(StorageLocation {
                    tier: StorageTier::BlockStore,
                    namespace: None,
                    store: None,
                    key: derived.clone().or_else(|| Some(cid.to_string())),
                    match_kind: MatchKind::Exact,
                    detail: format!("block present ({} bytes)", bytes.len()),
                }),
                Ok(None) => {}
                Err(e) => errors.push(format!("block store: {}", e)),
            }
        }

        for snapshot in snapshots {
            scan_namespace(snapshot, needle, derived.as_deref(), &mut locations);
        }

        CidSearchResult {
            identifier: needle.to_string(),
            found: !locations.is_empty(),
            locations,
            errors,
        }
    }

    async fn load_index(&self, errors: &mut Vec<String>) -> Vec<NamespaceSnapshot> {
        let Some(index) = &self.index else {
            return Vec::new();
        };

        let names = match index.list_namespaces().await {
            Ok(Some(names)) => names,
            Ok(None) => {
                debug!("index cannot list namespaces, probing well-known names");
                self.fallback_namespaces.clone()
            }
            Err(e) => {
                warn!(error = %e, "namespace listing failed, probing well-known names");
                errors.push(format!("namespace listing: {}", e));
                self.fallback_namespaces.clone()
            }
        };

        let mut seen = BTreeSet::new();
        let mut snapshots = Vec::new();
        for name in names {
            if !seen.insert(name.clone()) {
                continue;
            }
            match index.open_namespace(&name).await {
                Ok(Some(snapshot)) => snapshots.push(snapshot),
                Ok(None) => {}
                Err(e) => {
                    warn!(namespace = %name, error = %e, "skipping unreadable namespace");
                    errors.push(format!("namespace {}: {}", name, e));
                }
            }
        }
        snapshots
    }
}

fn scan_namespace(
    snapshot: &NamespaceSnapshot,
    needle: &str,
    derived: Option<&str>,
    locations: &mut Vec<StorageLocation>,
) {
    let substring_ok = needle.len() >= MIN_SUBSTRING_LEN;

    for store in &snapshot.stores {
        for entry in &store.entries {
            let key_match = if entry.key == needle {
                Some((MatchKind::Exact, format!("key '{}'", entry.key)))
            } else if substring_ok && entry.key.contains(needle) {
                Some((MatchKind::Substring, format!("key '{}'", entry.key)))
            } else {
                None
            };

            let value_match = key_match.or_else(|| match &entry.value {
                Value::String(value) if value == needle => {
                    Some((MatchKind::Exact, format!("value '{}'", value)))
                }
                _ => None,
            });

            let found = value_match.or_else(|| {
                let text = entry.value.to_string();
                if substring_ok {
                    if let Some(pos) = text.find(needle) {
                        return Some((
                            MatchKind::Substring,
                            format!("value: {}", context(&text, pos, needle.len())),
                        ));
                    }
                }
                let derived = derived?;
                if let Some(pos) = entry.key.find(derived) {
                    return Some((
                        MatchKind::Derived,
                        format!("key: {}", context(&entry.key, pos, derived.len())),
                    ));
                }
                text.find(derived).map(|pos| {
                    (
                        MatchKind::Derived,
                        format!("value: {}", context(&text, pos, derived.len())),
                    )
                })
            });

            if let Some((match_kind, detail)) = found {
                locations.push(StorageLocation {
                    tier: StorageTier::PersistentIndex,
                    namespace: Some(snapshot.name.clone()),
                    store: Some(store.name.clone()),
                    key: Some(entry.key.clone()),
                    match_kind,
                    detail,
                });
            }
        }
    }
}

/// `text` around the match at `pos..pos + len`, trimmed to
/// [`CONTEXT_CHARS`] on each side.
fn context(text: &str, pos: usize, len: usize) -> String {
    let mut start = pos.saturating_sub(CONTEXT_CHARS);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (pos + len + CONTEXT_CHARS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(&text[start..end]);
    if end < text.len() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::store::MemoryContentStore;
    use serde_json::json;

    fn locator_with(store: &MemoryContentStore, index: &MemoryIndex) -> StorageLocator {
        StorageLocator::new(Arc::new(store.clone()), Some(Arc::new(index.clone())))
    }

    #[tokio::test]
    async fn test_block_only_identifier_has_one_location() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let cid = store.put(b"block only").await.unwrap();

        let results = locator_with(&store, &index)
            .search(&[cid.to_string()])
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].found);
        assert_eq!(results[0].locations.len(), 1);
        assert_eq!(results[0].locations[0].tier, StorageTier::BlockStore);
        assert_eq!(results[0].locations[0].match_kind, MatchKind::Exact);
        assert!(results[0].errors.is_empty());
    }

    #[tokio::test]
    async fn test_value_equal_to_identifier_is_exact() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let cid = store.put(b"named by value").await.unwrap();
        index
            .put_entry("app", "latest", "upload", json!(cid.as_str()))
            .await
            .unwrap();
        index
            .put_entry("app", "history", "upload", json!(format!("{} (old)", cid)))
            .await
            .unwrap();

        let results = locator_with(&store, &index)
            .search(&[cid.to_string()])
            .await;
        let by_store = |name: &str| {
            results[0]
                .locations
                .iter()
                .find(|l| l.store.as_deref() == Some(name))
                .map(|l| l.match_kind)
        };

        assert_eq!(by_store("latest"), Some(MatchKind::Exact));
        assert_eq!(by_store("history"), Some(MatchKind::Substring));
    }

    #[tokio::test]
    async fn test_pinned_and_indexed() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let cid = store.put(b"everywhere").await.unwrap();
        store.pin_local(&cid).await.unwrap();
        index
            .put_entry("pin-ledger-cloud", "records", cid.as_str(), json!({"state": "Pending"}))
            .await
            .unwrap();
        index
            .put_entry("app", "uploads", "latest", json!({"files": [cid.as_str()]}))
            .await
            .unwrap();

        let result = locator_with(&store, &index)
            .search(&[cid.to_string()])
            .await
            .remove(0);

        let tiers: Vec<_> = result.locations.iter().map(|l| l.tier).collect();
        assert_eq!(
            tiers,
            vec![
                StorageTier::PinRegistry,
                StorageTier::BlockStore,
                StorageTier::PersistentIndex,
                StorageTier::PersistentIndex,
            ]
        );

        let app = &result.locations[2];
        assert_eq!(app.namespace.as_deref(), Some("app"));
        assert_eq!(app.match_kind, MatchKind::Substring);
        assert!(app.detail.contains(cid.as_str()));

        let ledger = &result.locations[3];
        assert_eq!(ledger.namespace.as_deref(), Some("pin-ledger-cloud"));
        assert_eq!(ledger.match_kind, MatchKind::Exact);
    }

    #[tokio::test]
    async fn test_derived_key_is_heuristic() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let cid = ContentId::for_bytes(b"hello-world");
        let derived = cid.derived_block_key().unwrap();
        index
            .put_entry("blockstore", "keys", &format!("/blocks/{}", derived), json!(11))
            .await
            .unwrap();

        let result = locator_with(&store, &index)
            .search(&[cid.to_string()])
            .await
            .remove(0);

        assert!(result.found);
        assert_eq!(result.locations.len(), 1);
        assert_eq!(result.locations[0].match_kind, MatchKind::Derived);
        assert!(result.locations[0].match_kind.is_heuristic());
    }

    #[tokio::test]
    async fn test_fallback_namespaces_when_listing_unsupported() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::without_listing();
        let cid = ContentId::for_bytes(b"ledgered");
        index
            .put_entry("pin-ledger-backup", "records", cid.as_str(), json!({}))
            .await
            .unwrap();
        index
            .put_entry("unlisted", "s", cid.as_str(), json!({}))
            .await
            .unwrap();

        let locator = StorageLocator::new(Arc::new(store), Some(Arc::new(index)))
            .with_fallback_namespaces(vec!["pin-ledger-backup".to_string()]);
        let result = locator.search(&[cid.to_string()]).await.remove(0);

        assert_eq!(result.locations.len(), 1);
        assert_eq!(
            result.locations[0].namespace.as_deref(),
            Some("pin-ledger-backup")
        );
    }

    #[tokio::test]
    async fn test_not_found_and_invalid_input() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let locator = locator_with(&store, &index);

        let results = locator
            .search(&[
                ContentId::for_bytes(b"absent").to_string(),
                "  not a cid  ".to_string(),
            ])
            .await;

        assert!(!results[0].found);
        assert!(results[0].locations.is_empty());
        assert_eq!(results[1].identifier, "not a cid");
        assert!(!results[1].found);
    }

    #[tokio::test]
    async fn test_partial_identifier_matches_pinned() {
        let store = MemoryContentStore::new();
        let index = MemoryIndex::new();
        let cid = store.put(b"partial").await.unwrap();
        store.pin_local(&cid).await.unwrap();

        let prefix = cid.as_str()[..20].to_string();
        let result = locator_with(&store, &index)
            .search(&[prefix])
            .await
            .remove(0);

        assert_eq!(result.locations.len(), 1);
        assert_eq!(result.locations[0].tier, StorageTier::PinRegistry);
        assert_eq!(result.locations[0].match_kind, MatchKind::Substring);
    }

    #[test]
    fn test_context_truncates() {
        let text = format!("{}NEEDLE{}", "a".repeat(100), "b".repeat(100));
        let snippet = context(&text, 100, 6);
        assert!(snippet.starts_with("..."));
        assert!(snippet.ends_with("..."));
        assert!(snippet.contains("NEEDLE"));
        assert_eq!(snippet.len(), 3 + 40 + 6 + 40 + 3);

        assert_eq!(context("xNEEDLEx", 1, 6), "xNEEDLEx");
    }

    #[test]
    fn test_context_respects_char_boundaries() {
        let text = format!("{}NEEDLE", "é".repeat(30));
        let snippet = context(&text, text.find("NEEDLE").unwrap(), 6);
        assert!(snippet.ends_with("NEEDLE"));
    }
}
