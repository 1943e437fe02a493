use crate::config::{self, Config};
use crate::mcp::tools::catalog;
use crate::mcp::tools::registry::DynamicToolRegistry;
use crate::mcp::transport::{SessionHandle, ToolTable, ToolTransport};
use crate::shared::logging;
use crate::tfe::client::TfeClient;
use crate::tfe::connection::{ConnectionError, ConnectionManager, SessionClients};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TfeMcpError {
    #[error("No Terraform Enterprise token configured. Set TFE_TOKEN or backend.token in the config file.")]
    MissingToken,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Wiring of the tool table, connection store, gated tool registry and
/// connection manager. Owns no global state: every server instance gets
/// handles from here.
pub struct TfeMcp {
    config: Config,
    tools: Arc<ToolTable>,
    registry: DynamicToolRegistry,
    connections: ConnectionManager,
}

impl TfeMcp {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let tools = Arc::new(ToolTable::new());
        let clients = Arc::new(SessionClients::new());
        let registry = DynamicToolRegistry::new(
            tools.clone(),
            clients.clone(),
            catalog::gated_tools(&clients),
        );

        tools
            .register_tool(catalog::connection_status_tool(
                registry.downgrade(),
                clients.clone(),
                config.backend.address.clone(),
            ))
            .await?;

        let connections = ConnectionManager::new(clients, Arc::new(registry.clone()));

        Ok(Self {
            config,
            tools,
            registry,
            connections,
        })
    }

    /// Load configuration (explicit path, else the default location) and
    /// build the server state.
    pub async fn from_config_path(config_path: Option<String>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => {
                let path_buf = PathBuf::from(&path);
                let path_buf = if path_buf.is_absolute() {
                    logging::info(&format!("Using absolute config path: {}", path));
                    path_buf
                } else {
                    // Convert to absolute path
                    let abs_path = std::env::current_dir()?.join(&path);
                    logging::info(&format!(
                        "Converting relative config path to absolute: {}",
                        abs_path.display()
                    ));
                    abs_path
                };
                config::init_from_path(&path_buf)?
            }
            None => {
                logging::info("No config path provided, using default configuration");
                config::init_default()?
            }
        };

        logging::info(&format!(
            "Using Terraform Enterprise address: {}",
            config.backend.address
        ));
        if !config.has_token() {
            logging::warn("TFE_TOKEN is not set; backend tools will stay unavailable");
        }
        Self::new(config).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolTable> {
        &self.tools
    }

    pub fn registry(&self) -> &DynamicToolRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Start a session and try to connect it to the backend.
    ///
    /// Missing or rejected credentials leave the session without backend
    /// capability. A failed gated tool registration is fatal.
    pub async fn open_session(&self) -> anyhow::Result<SessionHandle> {
        let session = SessionHandle::new(format!("session-{}", uuid::Uuid::new_v4()));
        match self
            .connections
            .connect(session.id(), &self.config.backend)
            .await
        {
            Ok(()) => logging::info(&format!(
                "Session {} connected to {}",
                session, self.config.backend.address
            )),
            Err(ConnectionError::Registry(e)) => {
                // connect has already dropped the session's client and entry.
                logging::error(&format!("Failed to register backend tools: {}", e));
                return Err(e.into());
            }
            Err(e) => logging::warn(&format!(
                "Session {} started without backend connection: {}",
                session, e
            )),
        }
        Ok(session)
    }

    pub async fn close_session(&self, session: &SessionHandle) {
        logging::info(&format!("Closing session {}", session));
        self.connections.disconnect(session.id()).await;
    }

    /// Validate the configured credentials without starting a server.
    pub async fn check_credentials(&self) -> Result<Value, TfeMcpError> {
        if !self.config.has_token() {
            return Err(TfeMcpError::MissingToken);
        }
        let client = TfeClient::new(&self.config.backend).map_err(anyhow::Error::from)?;
        let details = client
            .account_details()
            .await
            .map_err(anyhow::Error::from)?;
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    #[tokio::test]
    async fn test_new_registers_only_status_tool() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        assert_eq!(tfemcp.tools().names().await, vec!["get_connection_status"]);
        assert!(!tfemcp.registry().is_registered().await);
    }

    #[tokio::test]
    async fn test_session_without_token_stays_incapable() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        let session = tfemcp.open_session().await.unwrap();

        assert!(!tfemcp.registry().is_capable(session.id()).await);
        assert_eq!(tfemcp.tools().len().await, 1);

        tfemcp.close_session(&session).await;
        assert!(!tfemcp.registry().any_capable().await);
    }

    #[tokio::test]
    async fn test_check_credentials_requires_token() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        let err = tfemcp.check_credentials().await.unwrap_err();
        assert!(matches!(err, TfeMcpError::MissingToken));
    }

    #[tokio::test]
    async fn test_open_session_with_valid_token_registers_backend_tools() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/account/details")
            .with_status(200)
            .with_body(r#"{"data":{"id":"user-1","attributes":{"username":"alice"}}}"#)
            .create_async()
            .await;

        let config = Config {
            backend: BackendConfig {
                address: server.url(),
                token: Some("token".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let tfemcp = TfeMcp::new(config).await.unwrap();
        let session = tfemcp.open_session().await.unwrap();

        assert!(tfemcp.registry().is_capable(session.id()).await);
        assert!(tfemcp.tools().contains("list_workspaces").await);
        assert_eq!(tfemcp.tools().len().await, 11);

        tfemcp.close_session(&session).await;
        assert!(!tfemcp.registry().is_capable(session.id()).await);
        // Tools stay advertised after the session ends.
        assert_eq!(tfemcp.tools().len().await, 11);
    }
}
