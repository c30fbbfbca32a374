//! Property-based tests
//!
//! Tests for:
//! - Content store: put/get round trip, idempotent local pinning
//! - Identifiers: determinism, parse round trip, collision freedom
//! - Listings: deduplication across overlapping status filters
//! - Status normalization: case and whitespace insensitivity

use crate::cid::ContentId;
use crate::remote::{ConfirmationPolicy, MockPinningProvider, ProviderStatus, RemotePinClient};
use crate::store::{ContentStore, EmbeddedNode, MemoryContentStore, NodeConfig};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn status_strategy() -> impl Strategy<Value = ProviderStatus> {
    prop_oneof![
        Just(ProviderStatus::Pinned),
        Just(ProviderStatus::Pending),
        Just(ProviderStatus::Searching),
        Just(ProviderStatus::Failed),
    ]
}

// ============================================================================
// CONTENT STORE
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: get(put(B)) == B for the in-memory store
    #[test]
    fn memory_store_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let store = MemoryContentStore::new();
        let back = block_on(async {
            let cid = store.put(&data).await.unwrap();
            store.get(&cid).await.unwrap()
        });
        prop_assert_eq!(back, data);
    }

    /// Property: get(put(B)) == B for the disk-backed node, and the block
    /// verifies against its identifier
    #[test]
    fn embedded_node_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let dir = TempDir::new().unwrap();
        let (cid, back) = block_on(async {
            let node = EmbeddedNode::open(NodeConfig::new(dir.path()), None).await.unwrap();
            let cid = node.put(&data).await.unwrap();
            let back = node.get(&cid).await.unwrap();
            (cid, back)
        });
        prop_assert_eq!(cid.verify(&back), Some(true));
        prop_assert_eq!(back, data);
    }

    /// Property: pinning locally any number of times leaves the content
    /// pinned and never errors
    #[test]
    fn local_pin_is_idempotent(
        data in prop::collection::vec(any::<u8>(), 1..256),
        repeats in 1usize..5,
    ) {
        let store = MemoryContentStore::new();
        let (pinned, listed) = block_on(async {
            let cid = store.put(&data).await.unwrap();
            for _ in 0..repeats {
                store.pin_local(&cid).await.unwrap();
            }
            (
                store.is_pinned_local(&cid).await.unwrap(),
                store.list_local_pins().await.unwrap().len(),
            )
        });
        prop_assert!(pinned);
        prop_assert_eq!(listed, 1);
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

proptest! {
    /// Property: identifiers depend only on content
    #[test]
    fn identifier_is_deterministic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let copy = data.clone();
        prop_assert_eq!(ContentId::for_bytes(&data), ContentId::for_bytes(&copy));
    }

    /// Property: the canonical string parses back to the same identifier
    #[test]
    fn identifier_parse_roundtrip(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let cid = ContentId::for_bytes(&data);
        let parsed = ContentId::parse(cid.as_str()).unwrap();
        prop_assert_eq!(parsed, cid);
    }

    /// Property: different content gets different identifiers
    #[test]
    fn distinct_content_distinct_identifiers(
        a in prop::collection::vec(any::<u8>(), 0..256),
        b in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(ContentId::for_bytes(&a), ContentId::for_bytes(&b));
    }
}

// ============================================================================
// LISTINGS AND STATUS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: merged listings never repeat an identifier, and lose none
    #[test]
    fn merged_listing_is_deduplicated(
        pins in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 1..32), status_strategy(), any::<bool>()),
            0..40,
        ),
    ) {
        let provider = MockPinningProvider::new("overlap")
            .with_pending_filters(vec![ProviderStatus::Pending, ProviderStatus::Searching]);

        let mut expected = BTreeSet::new();
        for (data, status, hidden) in &pins {
            let cid = ContentId::for_bytes(data);
            provider.insert_pin(cid.clone(), *status);
            // Hidden pins only surface through a pending filter.
            if *hidden && status.is_pending_like() {
                provider.hide_from_unfiltered(&cid);
            }
            expected.insert(cid);
        }

        let client = RemotePinClient::new(
            Arc::new(provider),
            ConfirmationPolicy::new(1, Duration::from_millis(1)),
        );
        let records = block_on(client.list_pins(None)).unwrap();

        let identifiers: Vec<ContentId> = records.into_iter().map(|r| r.identifier).collect();
        let unique: BTreeSet<ContentId> = identifiers.iter().cloned().collect();
        prop_assert_eq!(unique.len(), identifiers.len(), "no identifier appears twice");
        prop_assert_eq!(unique, expected);
    }

    /// Property: status normalization ignores case and surrounding whitespace
    #[test]
    fn status_normalization_ignores_case(
        raw in prop_oneof![
            Just("pinned"), Just("queued"), Just("pin_queued"), Just("searching"),
            Just("failed"), Just("expired"), Just("completed"), Just("garbage"),
        ],
        upper in any::<bool>(),
        pad in 0usize..3,
    ) {
        let mut variant = if upper { raw.to_uppercase() } else { raw.to_string() };
        variant = format!("{}{}{}", " ".repeat(pad), variant, "\t".repeat(pad));
        prop_assert_eq!(ProviderStatus::normalize(&variant), ProviderStatus::normalize(raw));
    }
}
