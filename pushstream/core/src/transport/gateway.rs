//! Gateway Transport
//!
//! Pushes envelopes through a managed WebSocket gateway's connection
//! management API: one `POST {endpoint}/@connections/{connection_id}` per
//! message with the JSON envelope as body.
//!
//! The endpoint is expected to accept the request as-is (request signing, if
//! the gateway needs it, is done by a proxy in front of it). An optional
//! bearer token is attached to every request.
//!
//! # Failure Classification
//!
//! - `410 Gone` means the connection no longer exists ([`TransportError::PeerGone`])
//! - any other non-2xx status or a network failure is [`TransportError::SendFailed`]

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, StatusCode, Url};

use crate::envelope::Envelope;

use super::config::{GatewayConfig, TransportMode};
use super::traits::{ConnectionHandle, PushTransport, TransportError};

/// [`PushTransport`] backed by the gateway management API
///
/// The HTTP client is built on first use and dropped on [`close`](PushTransport::close).
#[derive(Debug)]
pub struct GatewayAdapter {
    endpoint: Url,
    auth_token: Option<String>,
    request_timeout: std::time::Duration,
    client: Mutex<Option<Client>>,
    closed: AtomicBool,
}

impl GatewayAdapter {
    /// Create an adapter for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidState` if no endpoint is configured or
    /// it is not an absolute http(s) URL.
    pub fn new(config: &GatewayConfig) -> Result<Self, TransportError> {
        let raw = config.endpoint.as_deref().ok_or_else(|| {
            TransportError::InvalidState("gateway endpoint is not configured".into())
        })?;
        let endpoint = Url::parse(raw).map_err(|e| {
            TransportError::InvalidState(format!("invalid gateway endpoint {raw:?}: {e}"))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") || endpoint.cannot_be_a_base() {
            return Err(TransportError::InvalidState(format!(
                "gateway endpoint must be an http(s) URL, got {raw:?}"
            )));
        }

        Ok(Self {
            endpoint,
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
            client: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the HTTP client has been built
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.client.lock().is_some()
    }

    fn client(&self) -> Result<Client, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::InvalidState("gateway adapter is closed".into()));
        }
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| TransportError::InvalidState(format!("failed to build HTTP client: {e}")))?;
        tracing::debug!(endpoint = %self.endpoint, "Opened gateway client");
        *slot = Some(client.clone());
        Ok(client)
    }

    fn connection_url(&self, connection_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        // cannot_be_a_base endpoints are rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("@connections").push(connection_id);
        }
        url
    }
}

#[async_trait]
impl PushTransport for GatewayAdapter {
    fn mode(&self) -> TransportMode {
        TransportMode::Gateway
    }

    async fn open(&self) -> Result<(), TransportError> {
        self.client().map(|_| ())
    }

    async fn push(
        &self,
        handle: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let client = self.client()?;
        let body = envelope.to_json()?;
        let url = self.connection_url(handle.connection_id());

        let mut request = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GONE {
            return Err(TransportError::PeerGone(handle.connection_id().to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::SendFailed(format!(
            "gateway returned {status}: {body}"
        )))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.client.lock().take().is_some() {
            tracing::debug!(endpoint = %self.endpoint, "Closed gateway client");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageType;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handle() -> ConnectionHandle {
        ConnectionHandle::new("conn-1", TransportMode::Gateway)
    }

    #[test]
    fn test_missing_endpoint_rejected() {
        let result = GatewayAdapter::new(&GatewayConfig::default());
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let result = GatewayAdapter::new(&GatewayConfig::new("mailto:ops@example.com"));
        assert!(matches!(result, Err(TransportError::InvalidState(_))));
    }

    #[test]
    fn test_connection_url() {
        let adapter = GatewayAdapter::new(&GatewayConfig::new("https://gw.example/prod/")).unwrap();
        assert_eq!(
            adapter.connection_url("abc=").as_str(),
            "https://gw.example/prod/@connections/abc="
        );
    }

    #[tokio::test]
    async fn test_client_is_lazy() {
        let adapter = GatewayAdapter::new(&GatewayConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(!adapter.is_open());
        adapter.open().await.unwrap();
        assert!(adapter.is_open());
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
        assert!(!adapter.is_open());
    }

    #[tokio::test]
    async fn test_push_after_close_is_invalid_state() {
        let adapter = GatewayAdapter::new(&GatewayConfig::new("http://127.0.0.1:9")).unwrap();
        adapter.close().await.unwrap();
        let err = adapter
            .push(&handle(), &Envelope::new(MessageType::IN_PROGRESS))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_push_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/@connections/conn-1"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"type": "ITEM_START", "item_id": 7})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let adapter =
            GatewayAdapter::new(&GatewayConfig::new(server.uri()).with_auth_token("secret"))
                .unwrap();
        adapter
            .push(&handle(), &Envelope::new(MessageType::ITEM_START).with_item_id(7))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gone_maps_to_peer_gone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let adapter = GatewayAdapter::new(&GatewayConfig::new(server.uri())).unwrap();
        let err = adapter
            .push(&handle(), &Envelope::new(MessageType::IN_PROGRESS))
            .await
            .unwrap_err();
        assert!(err.is_peer_gone());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_send_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let adapter = GatewayAdapter::new(&GatewayConfig::new(server.uri())).unwrap();
        let err = adapter
            .push(&handle(), &Envelope::new(MessageType::IN_PROGRESS))
            .await
            .unwrap_err();
        match err {
            TransportError::SendFailed(msg) => {
                assert!(msg.contains("500"));
                assert!(msg.contains("internal"));
            }
            other => panic!("Expected SendFailed, got: {other}"),
        }
    }
}
