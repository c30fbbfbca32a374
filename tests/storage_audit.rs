// Integration tests for the storage audit path
// Status reconciliation and diagnostic search over the disk-backed node and
// index, independent of what any provider claims.

use pinrelay::cid::ContentId;
use pinrelay::config::PinrelayConfig;
use pinrelay::index::{IndexCatalog, MemoryIndex};
use pinrelay::locator::{MatchKind, StorageTier};
use pinrelay::remote::{ConfirmationPolicy, MockPinningProvider, RemotePinClient};
use pinrelay::service::PinService;
use pinrelay::store::MemoryContentStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn local_service(temp_dir: &TempDir) -> PinService {
    let config = PinrelayConfig::new(temp_dir.path().join("data"));
    PinService::from_config(&config).await.unwrap()
}

#[tokio::test]
async fn test_block_only_identifier_has_one_block_store_location() {
    let temp_dir = TempDir::new().unwrap();
    let service = local_service(&temp_dir).await;

    let cid = service.upload(b"unpinned block").await.unwrap();
    let results = service.search(&[cid.to_string()]).await;

    assert_eq!(results.len(), 1);
    assert!(results[0].found);
    assert_eq!(results[0].locations.len(), 1);
    assert_eq!(results[0].locations[0].tier, StorageTier::BlockStore);
    assert_eq!(results[0].locations[0].match_kind, MatchKind::Exact);
}

#[tokio::test]
async fn test_pinned_identifier_is_found_in_registry_and_blocks() {
    let temp_dir = TempDir::new().unwrap();
    let service = local_service(&temp_dir).await;

    let cid = service.upload(b"pinned block").await.unwrap();
    service.pin_to_all_providers(&cid, None).await;

    let results = service.search(&[cid.to_string()]).await;
    let tiers: Vec<StorageTier> = results[0].locations.iter().map(|l| l.tier).collect();
    assert_eq!(tiers, vec![StorageTier::PinRegistry, StorageTier::BlockStore]);
}

#[tokio::test]
async fn test_unknown_and_malformed_identifiers() {
    let temp_dir = TempDir::new().unwrap();
    let service = local_service(&temp_dir).await;
    service.upload(b"something else").await.unwrap();

    let absent = ContentId::for_bytes(b"never stored").to_string();
    let results = service
        .search(&[absent.clone(), "definitely not an identifier".to_string()])
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].identifier, absent);
    assert!(!results[0].found);
    assert!(results[0].locations.is_empty());
    assert!(!results[1].found);
}

#[tokio::test]
async fn test_unpinned_content_disappears_from_registry_and_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let service = local_service(&temp_dir).await;

    let cid = service.upload(b"short lived").await.unwrap();
    service.pin_to_all_providers(&cid, None).await;
    assert_eq!(service.reconcile(&cid).await.is_pinned("local"), Some(true));

    let results = service.unpin(&cid).await;
    assert!(results.iter().all(|r| r.success));
    assert_eq!(service.reconcile(&cid).await.is_pinned("local"), Some(false));

    // The block itself stays until garbage collection, which is not ours.
    let found = service.search(&[cid.to_string()]).await;
    let tiers: Vec<StorageTier> = found[0].locations.iter().map(|l| l.tier).collect();
    assert_eq!(tiers, vec![StorageTier::BlockStore]);
}

#[tokio::test]
async fn test_search_probes_fallback_namespaces_when_listing_unsupported() {
    let index = Arc::new(MemoryIndex::without_listing());
    let provider = MockPinningProvider::new("archive");
    let client = RemotePinClient::persistent(
        Arc::new(provider),
        ConfirmationPolicy::new(2, Duration::from_millis(5)),
        Arc::clone(&index) as Arc<dyn IndexCatalog>,
    )
    .await;

    let service = PinService::new(
        Arc::new(MemoryContentStore::new()),
        vec![Arc::new(client)],
        Some(index.clone() as Arc<dyn IndexCatalog>),
    )
    .with_fallback_namespaces(vec!["pin-ledger-archive".to_string()]);

    let cid = service.upload(b"ledgered").await.unwrap();
    service.pin_to_all_providers(&cid, None).await;

    // A well-known namespace written by some other component.
    index
        .put_entry(
            "pinrelay",
            "uploads",
            "latest",
            json!({ "note": format!("uploaded {} yesterday", cid) }),
        )
        .await
        .unwrap();

    let results = service.search(&[cid.to_string()]).await;
    let index_hits: Vec<_> = results[0]
        .locations
        .iter()
        .filter(|l| l.tier == StorageTier::PersistentIndex)
        .collect();

    assert!(index_hits
        .iter()
        .any(|l| l.namespace.as_deref() == Some("pin-ledger-archive") && !l.match_kind.is_heuristic()));
    assert!(index_hits
        .iter()
        .any(|l| l.namespace.as_deref() == Some("pinrelay") && l.match_kind == MatchKind::Substring));
}
