//! Consumer-facing surface.
//!
//! [`PinService`] wires one content store, the remote clients, the status
//! reconciler and the storage locator together and exposes the operations a
//! UI or CLI calls. Replication outcomes come back as values: a failing
//! provider shows up in a result list, never as an error from the call.
//!
//! ## Construction
//!
//! - [`PinService::new`] takes already built parts (tests, embedding)
//! - [`PinService::from_config`] builds the embedded node, the disk index,
//!   and one persistent client per configured provider

use crate::cid::ContentId;
use crate::config::{fallback_namespaces, ConfigError, PinrelayConfig};
use crate::index::{DiskIndex, IndexCatalog};
use crate::locator::{CidSearchResult, StorageLocator};
use crate::orchestrator::{PinOrchestrator, PinningResult, ReplicationHandle, ReplicationReport, LOCAL_PROVIDER};
use crate::reconcile::{PinningStatusSnapshot, StatusReconciler};
use crate::remote::{
    BulkUnpinReport, CloudPinningService, CompanionNode, PinError, PinRecord, PinState,
    PinningProvider, ProviderStatus, RemotePinClient,
};
use crate::store::{BlockSource, ContentStore, EmbeddedNodeHandle, StoreResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Errors building a service from configuration.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up provider '{provider}': {source}")]
    Provider { provider: String, source: PinError },
}

/// Pins held by one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderListing {
    pub provider: String,
    pub records: Vec<PinRecord>,
    /// Listing failed; `records` is empty.
    pub error: Option<String>,
}

/// Pinning service over one local store and any number of remote providers.
pub struct PinService {
    store: Arc<dyn ContentStore>,
    clients: Vec<Arc<RemotePinClient>>,
    orchestrator: Arc<PinOrchestrator>,
    reconciler: StatusReconciler,
    locator: StorageLocator,
}

impl PinService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        clients: Vec<Arc<RemotePinClient>>,
        index: Option<Arc<dyn IndexCatalog>>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(PinOrchestrator::new(Arc::clone(&store), clients.clone())),
            reconciler: StatusReconciler::new(Arc::clone(&store), clients.clone()),
            locator: StorageLocator::new(Arc::clone(&store), index),
            store,
            clients,
        }
    }

    /// Build everything `config` describes.
    ///
    /// The node itself opens lazily on first use, so this does no disk IO.
    pub async fn from_config(config: &PinrelayConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let policy = config.confirmation_policy();
        let index: Arc<dyn IndexCatalog> = Arc::new(DiskIndex::new(config.index_dir()));

        let mut providers: Vec<Arc<dyn PinningProvider>> = Vec::new();
        let mut block_source: Option<Arc<dyn BlockSource>> = None;

        if let Some(cloud) = config.cloud_service() {
            let name = cloud.name.clone();
            if cloud.token.is_none() {
                warn!(provider = %name, "no API token configured; requests to this provider will fail");
            }
            let service = CloudPinningService::new(cloud)
                .map_err(|source| ServiceError::Provider { provider: name, source })?;
            providers.push(Arc::new(service));
        }

        if let Some(companion) = config.companion_node() {
            let name = companion.name.clone();
            let node = Arc::new(
                CompanionNode::new(companion)
                    .map_err(|source| ServiceError::Provider { provider: name, source })?,
            );
            if config.companion.as_ref().is_some_and(|c| c.serve_blocks) {
                block_source = Some(Arc::clone(&node) as Arc<dyn BlockSource>);
            }
            providers.push(node);
        }

        let mut clients = Vec::with_capacity(providers.len());
        for provider in providers {
            let client = RemotePinClient::persistent(provider, policy, Arc::clone(&index)).await;
            clients.push(Arc::new(client));
        }

        let store: Arc<dyn ContentStore> =
            Arc::new(EmbeddedNodeHandle::embedded(config.node_config(), block_source));

        info!(
            data_dir = %config.node.data_dir.display(),
            providers = ?config.provider_names(),
            "pin service ready"
        );

        Ok(Self::new(store, clients, Some(Arc::clone(&index)))
            .with_check_timeout(config.check_timeout())
            .with_fallback_namespaces(fallback_namespaces(config)))
    }

    /// Bound each provider check in [`reconcile`](Self::reconcile).
    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.reconciler = StatusReconciler::new(Arc::clone(&self.store), self.clients.clone())
            .with_check_timeout(check_timeout);
        self
    }

    /// Namespaces searched when the index cannot list its own.
    pub fn with_fallback_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.locator = self.locator.with_fallback_namespaces(namespaces);
        self
    }

    /// Push a report for every detached replication.
    pub fn with_reports(mut self, sender: UnboundedSender<ReplicationReport>) -> Self {
        self.orchestrator = Arc::new(
            PinOrchestrator::new(Arc::clone(&self.store), self.clients.clone()).with_reports(sender),
        );
        self
    }

    /// Names of the remote providers, in orchestration order.
    pub fn providers(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name().to_string()).collect()
    }

    /// Store bytes locally. Replication is not attempted.
    pub async fn upload(&self, data: &[u8]) -> StoreResult<ContentId> {
        let cid = self.store.put(data).await?;
        info!(cid = %cid, bytes = data.len(), "uploaded");
        Ok(cid)
    }

    /// Store bytes and replicate them on a background task.
    ///
    /// The upload succeeds once the bytes are stored; replication outcomes
    /// arrive through the returned handle.
    pub async fn upload_and_replicate(&self, data: &[u8]) -> StoreResult<(ContentId, ReplicationHandle)> {
        let cid = self.upload(data).await?;
        let handle = self
            .orchestrator
            .spawn_replication(cid.clone(), Some(data.to_vec()));
        Ok((cid, handle))
    }

    pub async fn retrieve(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        self.store.get(cid).await
    }

    pub async fn pin_to_all_providers(&self, cid: &ContentId, data: Option<&[u8]>) -> Vec<PinningResult> {
        self.orchestrator.pin_to_all_providers(cid, data).await
    }

    pub fn spawn_replication(&self, cid: ContentId, data: Option<Vec<u8>>) -> ReplicationHandle {
        self.orchestrator.spawn_replication(cid, data)
    }

    pub async fn reconcile(&self, cid: &ContentId) -> PinningStatusSnapshot {
        self.reconciler.reconcile(cid).await
    }

    /// Pins per target: `local` first, then every remote provider.
    pub async fn list_pins(&self) -> Vec<ProviderListing> {
        let local = match self.store.list_local_pins().await {
            Ok(cids) => ProviderListing {
                provider: LOCAL_PROVIDER.to_string(),
                records: cids.into_iter().map(local_record).collect(),
                error: None,
            },
            Err(e) => ProviderListing {
                provider: LOCAL_PROVIDER.to_string(),
                records: Vec::new(),
                error: Some(e.to_string()),
            },
        };

        let remote = join_all(self.clients.iter().map(|client| async move {
            match client.list_pins(None).await {
                Ok(records) => ProviderListing {
                    provider: client.name().to_string(),
                    records,
                    error: None,
                },
                Err(e) => ProviderListing {
                    provider: client.name().to_string(),
                    records: Vec::new(),
                    error: Some(e.to_string()),
                },
            }
        }))
        .await;

        std::iter::once(local).chain(remote).collect()
    }

    /// Remove the pin from every target. One result per target; an absent
    /// pin counts as removed.
    pub async fn unpin(&self, cid: &ContentId) -> Vec<PinningResult> {
        let local = removal(
            LOCAL_PROVIDER,
            self.store.unpin_local(cid).await.map_err(|e| e.to_string()),
        );

        let remote = join_all(self.clients.iter().map(|client| async move {
            removal(client.name(), client.unpin(cid).await.map_err(|e| e.to_string()))
        }))
        .await;

        std::iter::once(local).chain(remote).collect()
    }

    pub async fn search(&self, identifiers: &[String]) -> Vec<CidSearchResult> {
        self.locator.search(identifiers).await
    }

    /// Remove remote pins stuck in any of `statuses`. Pins confirmed on
    /// re-check are always kept.
    pub async fn cleanup_stuck(&self, statuses: &[ProviderStatus]) -> Vec<BulkUnpinReport> {
        join_all(self.clients.iter().map(|client| {
            client.unpin_by_status(|status: ProviderStatus| statuses.contains(&status))
        }))
        .await
    }
}

fn local_record(cid: ContentId) -> PinRecord {
    let mut record = PinRecord::new(LOCAL_PROVIDER, cid);
    record.state = PinState::Confirmed;
    record.provider_status = Some(ProviderStatus::Pinned);
    record
}

fn removal(provider: &str, outcome: Result<(), String>) -> PinningResult {
    match outcome {
        Ok(()) => PinningResult {
            provider: provider.to_string(),
            success: true,
            acknowledged: true,
            error: None,
        },
        Err(error) => PinningResult::failed(provider, error),
    }
}
