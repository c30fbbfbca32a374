//! Hosted pinning service over REST.
//!
//! ```text
//! POST   {base}/pins                  {"cid", "name"}    submit by reference
//! GET    {base}/pins?cid=&status=&limit=&offset=         listing / lookup
//! DELETE {base}/pins/{cid}                               remove
//! POST   {base}/upload                multipart `file`   upload bytes
//! ```
//!
//! Every request carries a bearer token. A service configured without one
//! still exists as a provider, but every call fails with `Configuration`
//! before any request is sent.
//!
//! Status mapping: 401/403 are `Configuration`, 5xx and transport failures
//! are `Network`, 409 on submit is a duplicate and succeeds, 404 on delete
//! is `NotFound`.

use super::status::{normalize_page, identifier_field, ListPage, ProviderStatus};
use super::traits::{PinError, PinResult, PinningProvider};
use crate::cid::ContentId;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a hosted pinning service.
#[derive(Debug, Clone)]
pub struct CloudServiceConfig {
    pub name: String,
    /// Base URL, e.g. `https://pins.example.com/v1`.
    pub endpoint: String,
    pub token: Option<String>,
    pub resolves_by_reference: bool,
    pub request_timeout: Duration,
}

impl CloudServiceConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            token: None,
            resolves_by_reference: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// REST client for a hosted pinning service.
#[derive(Debug)]
pub struct CloudPinningService {
    client: Client,
    name: String,
    base_url: String,
    token: Option<String>,
    resolves_by_reference: bool,
}

impl CloudPinningService {
    pub fn new(config: CloudServiceConfig) -> PinResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PinError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            name: config.name,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.filter(|token| !token.trim().is_empty()),
            resolves_by_reference: config.resolves_by_reference,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn token(&self) -> PinResult<&str> {
        self.token.as_deref().ok_or_else(|| {
            PinError::Configuration(format!("no API token configured for provider '{}'", self.name))
        })
    }

    /// Authenticate, send, and map non-success statuses.
    async fn send(&self, request: RequestBuilder, operation: &str) -> PinResult<Response> {
        let token = self.token()?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(operation, status, body))
    }

    async fn json(resp: Response, operation: &str) -> PinResult<Value> {
        resp.json::<Value>()
            .await
            .map_err(|e| PinError::Decode(format!("{operation}: {e}")))
    }

    async fn query(&self, params: &[(&str, String)]) -> PinResult<ListPage> {
        let resp = self
            .send(self.client.get(self.url("/pins")).query(params), "list pins")
            .await?;
        let body = Self::json(resp, "list pins").await?;
        normalize_page(&body)
            .ok_or_else(|| PinError::Decode("list pins: unrecognized listing shape".into()))
    }

    async fn lookup(&self, cid: &ContentId, filter: Option<ProviderStatus>) -> PinResult<Option<ProviderStatus>> {
        let mut params = vec![("cid", cid.to_string()), ("limit", "10".to_string())];
        if let Some(filter) = filter {
            params.push(("status", filter.as_filter().to_string()));
        }
        let page = self.query(&params).await?;
        Ok(page
            .pins
            .into_iter()
            .find(|pin| &pin.cid == cid)
            .map(|pin| pin.status))
    }
}

fn transport_error(operation: &str, e: reqwest::Error) -> PinError {
    if e.is_timeout() {
        PinError::Network(format!("{operation}: request timed out"))
    } else {
        PinError::Network(format!("{operation}: {e}"))
    }
}

fn status_error(operation: &str, status: StatusCode, body: String) -> PinError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PinError::Configuration(format!("{operation}: credentials rejected (HTTP {status})"))
        }
        s if s.is_server_error() => PinError::Network(format!("{operation}: HTTP {status}: {body}")),
        s => PinError::Provider {
            status: s.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl PinningProvider for CloudPinningService {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolves_by_reference(&self) -> bool {
        self.resolves_by_reference
    }

    fn pending_filters(&self) -> Vec<ProviderStatus> {
        vec![ProviderStatus::Pending, ProviderStatus::Searching]
    }

    async fn submit(&self, cid: &ContentId) -> PinResult<()> {
        let request = self
            .client
            .post(self.url("/pins"))
            .json(&json!({ "cid": cid.as_str(), "name": cid.as_str() }));

        match self.send(request, "submit pin").await {
            Ok(_) => Ok(()),
            Err(PinError::Provider { status: 409, .. }) => {
                debug!(provider = %self.name, cid = %cid, "duplicate pin request");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn upload(&self, data: &[u8]) -> PinResult<String> {
        let form = Form::new().part("file", Part::bytes(data.to_vec()).file_name("blob"));
        let resp = self
            .send(self.client.post(self.url("/upload")).multipart(form), "upload")
            .await?;
        let body = Self::json(resp, "upload").await?;
        identifier_field(&body)
            .map(str::to_string)
            .ok_or_else(|| PinError::Decode("upload: response carries no identifier".into()))
    }

    async fn status(&self, cid: &ContentId) -> PinResult<Option<ProviderStatus>> {
        if let Some(status) = self.lookup(cid, None).await? {
            return Ok(Some(status));
        }
        for filter in self.pending_filters() {
            if let Some(status) = self.lookup(cid, Some(filter)).await? {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    async fn list_page(
        &self,
        filter: Option<ProviderStatus>,
        offset: usize,
        limit: usize,
    ) -> PinResult<ListPage> {
        let mut params = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(filter) = filter {
            params.push(("status", filter.as_filter().to_string()));
        }
        self.query(&params).await
    }

    async fn remove(&self, cid: &ContentId) -> PinResult<()> {
        let request = self.client.delete(self.url(&format!("/pins/{}", cid)));
        match self.send(request, "remove pin").await {
            Ok(_) => Ok(()),
            Err(PinError::Provider { status: 404, .. }) => Err(PinError::NotFound(cid.clone())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cid() -> ContentId {
        ContentId::for_bytes(b"cloud-test")
    }

    fn service(server: &MockServer) -> CloudPinningService {
        let config = CloudServiceConfig::new("cloud", format!("{}/", server.uri())).with_token("t0k");
        CloudPinningService::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins"))
            .and(header("Authorization", "Bearer t0k"))
            .and(body_json(json!({"cid": cid().as_str(), "name": cid().as_str()})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"status": "queued"})))
            .expect(1)
            .mount(&server)
            .await;

        service(&server).submit(&cid()).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_submit_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pins"))
            .respond_with(ResponseTemplate::new(409).set_body_string("DUPLICATE_OBJECT"))
            .mount(&server)
            .await;

        service(&server).submit(&cid()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_token_never_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let service =
            CloudPinningService::new(CloudServiceConfig::new("cloud", server.uri())).unwrap();
        assert!(matches!(
            service.submit(&cid()).await,
            Err(PinError::Configuration(_))
        ));
        assert!(matches!(
            service.status(&cid()).await,
            Err(PinError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_configuration_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = service(&server).list_page(None, 0, 100).await.unwrap_err();
        assert!(matches!(err, PinError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_server_errors_are_network_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = service(&server).submit(&cid()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = CloudServiceConfig::new("cloud", "http://127.0.0.1:9").with_token("t");
        let service = CloudPinningService::new(config).unwrap();
        assert!(matches!(
            service.submit(&cid()).await,
            Err(PinError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_status_found_in_pending_view() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .and(query_param("status", "queued"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "results": [{"cid": cid().as_str(), "status": "queued"}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .and(query_param("cid", cid().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0, "results": []})))
            .mount(&server)
            .await;

        let status = service(&server).status(&cid()).await.unwrap();
        assert_eq!(status, Some(ProviderStatus::Pending));
    }

    #[tokio::test]
    async fn test_status_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        assert_eq!(service(&server).status(&cid()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_page_legacy_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pins"))
            .and(query_param("limit", "100"))
            .and(query_param("offset", "200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 201,
                "rows": [{"ipfs_pin_hash": cid().as_str(), "state": "pinned", "size": 10}]
            })))
            .mount(&server)
            .await;

        let page = service(&server).list_page(None, 200, 100).await.unwrap();
        assert_eq!(page.total, Some(201));
        assert_eq!(page.pins[0].cid, cid());
        assert_eq!(page.pins[0].status, ProviderStatus::Pinned);
    }

    #[tokio::test]
    async fn test_unrecognized_listing_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"weird": true})))
            .mount(&server)
            .await;

        assert!(matches!(
            service(&server).list_page(None, 0, 100).await,
            Err(PinError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_returns_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"IpfsHash": cid().as_str()})),
            )
            .mount(&server)
            .await;

        let id = service(&server).upload(b"cloud-test").await.unwrap();
        assert_eq!(id, cid().as_str());
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("/pins/{}", cid())))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(
            service(&server).remove(&cid()).await,
            Err(PinError::NotFound(cid()))
        );
    }
}
