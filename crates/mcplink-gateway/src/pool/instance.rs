//! MCP client handler for supervised and probe connections

use mcplink_core::{DomainEvent, EventSender};
use rmcp::model::{ClientCapabilities, ClientInfo, Implementation};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use tracing::{debug, info};
use uuid::Uuid;

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// Client side of one MCP session.
///
/// Announces `<client name> - <server name>` during the handshake and turns
/// `tools/list_changed` notifications into `CapabilitiesChanged` events.
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_id: Option<Uuid>,
    event_sender: Option<EventSender>,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("client", &self.info.client_info.name)
            .field("server_id", &self.server_id)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(
        client_identity: impl Into<String>,
        server_id: Option<Uuid>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: client_identity.into(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("McpLink".to_string()),
                    icons: None,
                    website_url: None,
                    ..Default::default()
                },
                meta: None,
            },
            server_id,
            event_sender,
        }
    }

    /// Name announced in the handshake
    pub fn client_name(&self) -> &str {
        &self.info.client_info.name
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_id = self.server_id;
        let event_sender = self.event_sender.clone();
        async move {
            // Probe connections have no server id and nobody to tell
            let (Some(server_id), Some(sender)) = (server_id, event_sender) else {
                debug!("[McpClientHandler] Ignoring tools/list_changed on probe connection");
                return;
            };

            info!(
                server_id = %server_id,
                "[McpClientHandler] Remote server sent tools/list_changed notification"
            );
            sender.emit(DomainEvent::CapabilitiesChanged { server_id });
        }
    }
}
