//! Per-session backend connections.
//!
//! [`SessionClients`] is the connection store the capability predicate
//! reads. [`ConnectionManager`] validates credentials, fills the store and
//! tells the tool registry through [`CapabilityNotifier`].

use crate::config::BackendConfig;
use crate::mcp::tools::registry::{CapabilityNotifier, CapabilityPredicate, RegistryError};
use crate::tfe::client::{TfeClient, TfeError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("No Terraform Enterprise token configured. Set TFE_TOKEN or backend.token in the config file.")]
    MissingToken,

    #[error("Backend credential validation failed: {0}")]
    Backend(#[from] TfeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Clone)]
pub struct SessionConnection {
    pub client: Arc<TfeClient>,
    pub connected_at: DateTime<Utc>,
    /// Username (or team name) the token belongs to, when the API reported one.
    pub account: Option<String>,
}

/// Store of validated backend clients, keyed by session id.
#[derive(Default)]
pub struct SessionClients {
    connections: RwLock<HashMap<String, SessionConnection>>,
}

impl SessionClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: &str, connection: SessionConnection) {
        let mut connections = self.connections.write().await;
        connections.insert(session_id.to_string(), connection);
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        let mut connections = self.connections.write().await;
        connections.remove(session_id).is_some()
    }

    pub async fn client(&self, session_id: &str) -> Option<Arc<TfeClient>> {
        let connections = self.connections.read().await;
        connections.get(session_id).map(|c| c.client.clone())
    }

    pub async fn connection(&self, session_id: &str) -> Option<SessionConnection> {
        let connections = self.connections.read().await;
        connections.get(session_id).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[async_trait]
impl CapabilityPredicate for SessionClients {
    async fn check_backend_capability(&self, session_id: &str) -> bool {
        self.connections.read().await.contains_key(session_id)
    }
}

pub struct ConnectionManager {
    clients: Arc<SessionClients>,
    notifier: Arc<dyn CapabilityNotifier>,
}

impl ConnectionManager {
    pub fn new(clients: Arc<SessionClients>, notifier: Arc<dyn CapabilityNotifier>) -> Self {
        Self { clients, notifier }
    }

    /// Validate `config` against the backend and, on success, make the
    /// session capable. A failure leaves the session without capability.
    pub async fn connect(
        &self,
        session_id: &str,
        config: &BackendConfig,
    ) -> Result<(), ConnectionError> {
        if config.token.as_deref().map_or(true, str::is_empty) {
            return Err(ConnectionError::MissingToken);
        }

        let client = TfeClient::new(config)?;
        let details = client.account_details().await?;
        let account = details
            .pointer("/data/attributes/username")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        info!(
            session_id,
            address = %client.address(),
            account = account.as_deref().unwrap_or("unknown"),
            "validated backend credentials"
        );

        self.clients
            .insert(
                session_id,
                SessionConnection {
                    client: Arc::new(client),
                    connected_at: Utc::now(),
                    account,
                },
            )
            .await;
        if let Err(e) = self.notifier.mark_capable(session_id).await {
            self.clients.remove(session_id).await;
            self.notifier.unmark_capable(session_id).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop the session's client and its capability entry.
    pub async fn disconnect(&self, session_id: &str) {
        if self.clients.remove(session_id).await {
            info!(session_id, "backend connection closed");
        } else {
            warn!(session_id, "disconnect for session without backend connection");
        }
        self.notifier.unmark_capable(session_id).await;
    }
}
