//! Streamable HTTP transport
//!
//! The credential travels as a default header on the underlying reqwest
//! client, so every request of the session carries it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{
    CapabilityDescriptor, ConnectionError, ConnectionErrorKind, EventSender,
};
use rmcp::service::Peer;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ConnectTarget, Connector, LiveConnection, TransportConfig};
use crate::pool::instance::{McpClient, McpClientHandler};

/// Substrings of an HTTP failure that mean the credential was refused
const AUTH_REJECTED_INDICATORS: &[&str] = &["401", "403", "unauthorized", "forbidden"];

/// Opens Streamable HTTP sessions.
pub struct HttpConnector {
    config: TransportConfig,
    event_sender: Option<EventSender>,
}

impl HttpConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            event_sender: None,
        }
    }

    /// Forward `tools/list_changed` notifications to the event bus
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Default headers for the session: the credential header, if any.
    ///
    /// An empty credential sends no header at all.
    fn build_default_headers(
        &self,
        credential: &str,
    ) -> Result<reqwest::header::HeaderMap, ConnectionError> {
        let mut header_map = reqwest::header::HeaderMap::new();
        if credential.is_empty() {
            return Ok(header_map);
        }

        let name = reqwest::header::HeaderName::from_bytes(self.config.auth_header.as_bytes())
            .map_err(|e| {
                ConnectionError::new(
                    ConnectionErrorKind::InvalidCredential,
                    format!("Invalid auth header name '{}': {}", self.config.auth_header, e),
                )
            })?;
        let mut value = reqwest::header::HeaderValue::from_str(credential).map_err(|_| {
            ConnectionError::new(
                ConnectionErrorKind::InvalidCredential,
                "Credential contains characters not allowed in an HTTP header",
            )
        })?;
        value.set_sensitive(true);
        header_map.insert(name, value);

        Ok(header_map)
    }

    fn build_http_client(
        &self,
        header_map: reqwest::header::HeaderMap,
    ) -> Result<reqwest::Client, ConnectionError> {
        reqwest::Client::builder()
            .default_headers(header_map)
            .connect_timeout(self.config.request_timeout)
            .build()
            .map_err(|e| {
                ConnectionError::new(
                    ConnectionErrorKind::Protocol,
                    format!("Failed to build HTTP client: {}", e),
                )
            })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Arc<dyn LiveConnection>, ConnectionError> {
        let endpoint = self.config.endpoint_url(&target.url);

        if let Err(e) = url::Url::parse(&endpoint) {
            return Err(ConnectionError::invalid_url(format!(
                "Invalid URL '{}': {}",
                target.url, e
            )));
        }

        info!(
            server = %target.server_name,
            url = %endpoint,
            "[HttpConnector] Connecting to remote server"
        );

        debug!(
            credential_len = target.credential.len(),
            header = %self.config.auth_header,
            "[HttpConnector] Attaching credential header"
        );
        let header_map = self.build_default_headers(&target.credential)?;
        let client = self.build_http_client(header_map)?;

        let transport_config = StreamableHttpClientTransportConfig::with_uri(endpoint.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);

        let handler = McpClientHandler::new(
            self.config.client_identity(&target.server_name),
            target.server_id,
            self.event_sender.clone(),
        );

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, handler.serve(transport)).await {
            Ok(Ok(client)) => {
                info!(
                    server = %target.server_name,
                    "[HttpConnector] Handshake completed"
                );
                Ok(Arc::new(HttpConnection::new(client, timeout)))
            }
            Ok(Err(e)) => {
                let err = classify_error(&e, ConnectionErrorKind::Handshake);
                warn!(
                    server = %target.server_name,
                    kind = ?err.kind,
                    "[HttpConnector] Handshake failed: {}",
                    err.message
                );
                Err(err)
            }
            Err(_) => Err(ConnectionError::timeout(format!(
                "Connection timeout ({:?})",
                timeout
            ))),
        }
    }
}

/// An initialized Streamable HTTP session.
pub struct HttpConnection {
    peer: Peer<RoleClient>,
    client: Mutex<Option<McpClient>>,
    request_timeout: Duration,
}

impl HttpConnection {
    fn new(client: McpClient, request_timeout: Duration) -> Self {
        Self {
            peer: client.peer().clone(),
            client: Mutex::new(Some(client)),
            request_timeout,
        }
    }
}

#[async_trait]
impl LiveConnection for HttpConnection {
    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, ConnectionError> {
        let tools = match tokio::time::timeout(self.request_timeout, self.peer.list_all_tools())
            .await
        {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => return Err(classify_error(&e, ConnectionErrorKind::Protocol)),
            Err(_) => {
                return Err(ConnectionError::timeout(format!(
                    "Capability listing timeout ({:?})",
                    self.request_timeout
                )))
            }
        };

        debug!("[HttpConnection] Listed {} tools", tools.len());

        Ok(tools
            .into_iter()
            .map(|tool| {
                CapabilityDescriptor::new(
                    tool.name.to_string(),
                    tool.description.map(|d| d.to_string()),
                )
            })
            .collect())
    }

    async fn close(&self) {
        let client = self.client.lock().await.take();
        if let Some(client) = client {
            match client.cancel().await {
                Ok(reason) => debug!("[HttpConnection] Closed: {:?}", reason),
                Err(e) => warn!("[HttpConnection] Close task failed: {}", e),
            }
        }
    }
}

/// Classify a transport or protocol failure.
///
/// Walks the source chain for reqwest and io errors first, then falls back
/// to message indicators, then to `fallback`.
fn classify_error(
    err: &(dyn std::error::Error + 'static),
    fallback: ConnectionErrorKind,
) -> ConnectionError {
    let mut messages = Vec::new();
    let mut kind = None;
    let mut current = Some(err);

    while let Some(e) = current {
        messages.push(e.to_string());
        if kind.is_none() {
            kind = classify_source(e);
        }
        current = e.source();
    }

    messages.dedup();
    let message = messages.join(": ");
    let lower = message.to_lowercase();

    let kind = kind
        .or_else(|| {
            AUTH_REJECTED_INDICATORS
                .iter()
                .any(|needle| lower.contains(needle))
                .then_some(ConnectionErrorKind::InvalidCredential)
        })
        .or_else(|| ConnectionError::classify_message(&message))
        .unwrap_or(fallback);

    ConnectionError::new(kind, message)
}

fn classify_source(err: &(dyn std::error::Error + 'static)) -> Option<ConnectionErrorKind> {
    if let Some(e) = err.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() {
            return Some(ConnectionErrorKind::Timeout);
        }
        if let Some(status) = e.status() {
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
            {
                return Some(ConnectionErrorKind::InvalidCredential);
            }
        }
        // Connect errors carry a more precise io error further down the chain
        return None;
    }

    if let Some(e) = err.downcast_ref::<std::io::Error>() {
        use std::io::ErrorKind;
        return Some(match e.kind() {
            ErrorKind::ConnectionRefused => ConnectionErrorKind::Refused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => ConnectionErrorKind::Reset,
            ErrorKind::TimedOut => ConnectionErrorKind::Timeout,
            ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof | ErrorKind::NotConnected => {
                ConnectionErrorKind::ChannelClosed
            }
            _ => ConnectionError::classify_message(&e.to_string())
                .unwrap_or(ConnectionErrorKind::Io),
        });
    }

    None
}
