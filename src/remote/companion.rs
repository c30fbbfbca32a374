//! Self-hosted companion node, driven over its admin RPC.
//!
//! The companion is a full content node the operator runs next to the
//! embedded one. It serves two roles: a pinning provider, and the network
//! [`BlockSource`] the embedded node falls back to for blocks it lacks.
//!
//! ```text
//! POST /api/v0/pin/add?arg=<cid>&recursive=true
//! POST /api/v0/pin/ls?arg=<cid>&type=recursive
//! POST /api/v0/pin/rm?arg=<cid>
//! POST /api/v0/block/put?cid-codec=raw&mhtype=sha2-256&pin=true   multipart `file`
//! POST /api/v0/block/get?arg=<cid>
//! ```
//!
//! Uploads store exactly one raw block, so the returned `Key` equals the
//! identifier the embedded node assigned. `add` would chunk anything over
//! 256 KiB into a dag-pb root.
//!
//! The RPC reports "not pinned" as an HTTP 500 with a message body; that is
//! normalized to an absent record. The companion has no queue: its pins are
//! either present and `Pinned`, or absent.

use super::status::{identifier_field, ListPage, ProviderStatus, RemotePin};
use super::traits::{PinError, PinResult, PinningProvider};
use crate::cid::ContentId;
use crate::store::{BlockSource, StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default companion RPC address.
pub const DEFAULT_COMPANION_ADDRESS: &str = "http://127.0.0.1:5001";

const NOT_PINNED: &str = "not pinned";

/// Connection settings for a companion node.
#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub name: String,
    pub address: String,
    /// Whether the companion can fetch content by identifier alone. The
    /// embedded node is not a network peer, so this is normally `false` and
    /// content is uploaded.
    pub resolves_by_reference: bool,
    pub request_timeout: Duration,
}

impl CompanionConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            resolves_by_reference: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Companion node RPC client.
#[derive(Debug)]
pub struct CompanionNode {
    client: Client,
    name: String,
    base_url: String,
    resolves_by_reference: bool,
}

/// Failure classes of one RPC call.
enum RpcFailure {
    NotPinned,
    Pin(PinError),
}

impl CompanionNode {
    pub fn new(config: CompanionConfig) -> PinResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PinError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            name: config.name,
            base_url: format!("{}/api/v0", config.address.trim_end_matches('/')),
            resolves_by_reference: config.resolves_by_reference,
        })
    }

    async fn call(&self, command: &str, params: &[(&str, &str)]) -> Result<Response, RpcFailure> {
        let resp = self
            .client
            .post(format!("{}/{}", self.base_url, command))
            .query(params)
            .send()
            .await
            .map_err(|e| RpcFailure::Pin(PinError::Network(format!("{command}: {e}"))))?;
        Self::check(command, resp).await
    }

    async fn check(command: &str, resp: Response) -> Result<Response, RpcFailure> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("Message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(body);

        if message.contains(NOT_PINNED) {
            return Err(RpcFailure::NotPinned);
        }
        Err(RpcFailure::Pin(match status.as_u16() {
            401 | 403 => PinError::Configuration(format!("{command}: access denied (HTTP {status})")),
            // The RPC reports most command failures as 500 with a message.
            500 => PinError::Provider {
                status: 500,
                message,
            },
            s if status.is_server_error() => PinError::Network(format!("{command}: HTTP {s}: {message}")),
            s => PinError::Provider { status: s, message },
        }))
    }

    async fn json(command: &str, resp: Response) -> PinResult<Value> {
        resp.json::<Value>()
            .await
            .map_err(|e| PinError::Decode(format!("{command}: {e}")))
    }

    async fn pinned_keys(&self, arg: Option<&ContentId>) -> PinResult<Vec<ContentId>> {
        let mut params = vec![("type", "recursive")];
        if let Some(cid) = arg {
            params.push(("arg", cid.as_str()));
        }
        let resp = match self.call("pin/ls", &params).await {
            Ok(resp) => resp,
            Err(RpcFailure::NotPinned) => return Ok(Vec::new()),
            Err(RpcFailure::Pin(e)) => return Err(e),
        };
        let body = Self::json("pin/ls", resp).await?;
        let keys = body
            .get("Keys")
            .and_then(Value::as_object)
            .ok_or_else(|| PinError::Decode("pin/ls: missing Keys".into()))?;

        let mut pinned: Vec<ContentId> = keys
            .keys()
            .filter_map(|key| ContentId::parse(key).ok())
            .collect();
        pinned.sort();
        Ok(pinned)
    }
}

impl RpcFailure {
    fn into_pin_error(self) -> PinError {
        match self {
            RpcFailure::NotPinned => PinError::Decode("unexpected 'not pinned' response".into()),
            RpcFailure::Pin(e) => e,
        }
    }
}

#[async_trait]
impl PinningProvider for CompanionNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolves_by_reference(&self) -> bool {
        self.resolves_by_reference
    }

    async fn submit(&self, cid: &ContentId) -> PinResult<()> {
        self.call("pin/add", &[("arg", cid.as_str()), ("recursive", "true")])
            .await
            .map_err(RpcFailure::into_pin_error)?;
        Ok(())
    }

    async fn upload(&self, data: &[u8]) -> PinResult<String> {
        let form = Form::new().part("file", Part::bytes(data.to_vec()).file_name("blob"));
        let resp = self
            .client
            .post(format!("{}/block/put", self.base_url))
            .query(&[("cid-codec", "raw"), ("mhtype", "sha2-256"), ("pin", "true")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| PinError::Network(format!("block/put: {e}")))?;
        let resp = Self::check("block/put", resp)
            .await
            .map_err(RpcFailure::into_pin_error)?;
        let body = Self::json("block/put", resp).await?;
        identifier_field(&body)
            .map(str::to_string)
            .ok_or_else(|| PinError::Decode("block/put: response carries no Key".into()))
    }

    async fn status(&self, cid: &ContentId) -> PinResult<Option<ProviderStatus>> {
        let pinned = self.pinned_keys(Some(cid)).await?;
        Ok(pinned
            .contains(cid)
            .then_some(ProviderStatus::Pinned))
    }

    async fn list_page(
        &self,
        filter: Option<ProviderStatus>,
        offset: usize,
        limit: usize,
    ) -> PinResult<ListPage> {
        if filter.is_some_and(|f| f != ProviderStatus::Pinned) {
            return Ok(ListPage {
                pins: Vec::new(),
                total: Some(0),
            });
        }

        let pinned = self.pinned_keys(None).await?;
        let total = pinned.len() as u64;
        Ok(ListPage {
            pins: pinned
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|cid| RemotePin {
                    cid,
                    status: ProviderStatus::Pinned,
                    name: None,
                    size: None,
                })
                .collect(),
            total: Some(total),
        })
    }

    async fn remove(&self, cid: &ContentId) -> PinResult<()> {
        match self.call("pin/rm", &[("arg", cid.as_str())]).await {
            Ok(_) => Ok(()),
            Err(RpcFailure::NotPinned) => Err(PinError::NotFound(cid.clone())),
            Err(RpcFailure::Pin(e)) => Err(e),
        }
    }
}

#[async_trait]
impl BlockSource for CompanionNode {
    async fn fetch_block(&self, cid: &ContentId) -> StoreResult<Vec<u8>> {
        debug!(provider = %self.name, cid = %cid, "fetching block from companion");
        let resp = match self.call("block/get", &[("arg", cid.as_str())]).await {
            Ok(resp) => resp,
            Err(RpcFailure::Pin(PinError::Provider { .. })) | Err(RpcFailure::NotPinned) => {
                return Err(StoreError::NotFound(cid.clone()));
            }
            Err(RpcFailure::Pin(e)) => return Err(StoreError::Other(e.to_string())),
        };
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StoreError::Other(format!("block/get: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cid() -> ContentId {
        ContentId::for_bytes(b"companion-test")
    }

    fn node(server: &MockServer) -> CompanionNode {
        CompanionNode::new(CompanionConfig::new("companion", server.uri())).unwrap()
    }

    fn not_pinned() -> ResponseTemplate {
        ResponseTemplate::new(500).set_body_json(json!({
            "Message": format!("path '{}' is not pinned", cid()),
            "Code": 0,
            "Type": "error"
        }))
    }

    #[tokio::test]
    async fn test_upload_puts_single_raw_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/block/put"))
            .and(query_param("cid-codec", "raw"))
            .and(query_param("mhtype", "sha2-256"))
            .and(query_param("pin", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Key": cid().as_str(), "Size": 14
            })))
            .expect(1)
            .mount(&server)
            .await;

        let node = node(&server);
        assert!(!node.resolves_by_reference());
        assert_eq!(node.upload(b"companion-test").await.unwrap(), cid().as_str());
    }

    #[tokio::test]
    async fn test_large_upload_keeps_raw_identifier() {
        let server = MockServer::start().await;
        let data = vec![7u8; 300 * 1024];
        let expected = ContentId::for_bytes(&data);
        Mock::given(method("POST"))
            .and(path("/api/v0/block/put"))
            .and(query_param("cid-codec", "raw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Key": expected.as_str(), "Size": data.len()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/add"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = crate::remote::RemotePinClient::new(
            std::sync::Arc::new(node(&server)),
            crate::remote::ConfirmationPolicy::default(),
        );
        let submission = client.request_pin(&expected, Some(&data)).await.unwrap();
        assert_eq!(submission.mode, crate::remote::SubmissionMode::Uploaded);
    }

    #[tokio::test]
    async fn test_status_pinned_and_absent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Keys": { cid().as_str(): { "Type": "recursive" } }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .respond_with(not_pinned())
            .mount(&server)
            .await;

        let node = node(&server);
        assert_eq!(node.status(&cid()).await.unwrap(), Some(ProviderStatus::Pinned));
        assert_eq!(node.status(&cid()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_listing_has_no_pending_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/ls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Keys": { cid().as_str(): { "Type": "recursive" }, "garbage": {} }
            })))
            .mount(&server)
            .await;

        let node = node(&server);
        let page = node.list_page(None, 0, 100).await.unwrap();
        assert_eq!(page.total, Some(1));
        assert_eq!(page.pins[0].cid, cid());

        let pending = node.list_page(Some(ProviderStatus::Pending), 0, 100).await.unwrap();
        assert!(pending.pins.is_empty());
    }

    #[tokio::test]
    async fn test_remove_not_pinned_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/pin/rm"))
            .respond_with(not_pinned())
            .mount(&server)
            .await;

        assert_eq!(
            node(&server).remove(&cid()).await,
            Err(PinError::NotFound(cid()))
        );
    }

    #[tokio::test]
    async fn test_block_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/block/get"))
            .and(query_param("arg", cid().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"companion-test".to_vec()))
            .mount(&server)
            .await;

        let node = node(&server);
        assert_eq!(node.fetch_block(&cid()).await.unwrap(), b"companion-test");

        let missing = ContentId::for_bytes(b"elsewhere");
        assert!(matches!(
            node.fetch_block(&missing).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
