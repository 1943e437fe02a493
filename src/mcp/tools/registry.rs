//! Session-gated registry for tools that need an authenticated backend.
//!
//! The registry tracks which sessions hold a verified Terraform Enterprise
//! connection and registers the gated tool tier with the transport the
//! first time any session becomes capable. Gated tools are never
//! unregistered; every call is checked by [`CapabilityShim`] instead.

use crate::mcp::tools::shim::CapabilityShim;
use crate::mcp::transport::{ToolDescriptor, ToolTransport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Builds one gated tool. Invoked exactly once, during bulk registration.
pub type ToolConstructor = Box<dyn Fn() -> ToolDescriptor + Send + Sync>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to register gated tool '{tool}': {source}")]
    Registration {
        tool: String,
        #[source]
        source: TransportError,
    },
}

/// Live check of whether a session holds a usable backend connection.
#[async_trait]
pub trait CapabilityPredicate: Send + Sync {
    async fn check_backend_capability(&self, session_id: &str) -> bool;
}

/// Implemented by the registry and handed to connection management.
#[async_trait]
pub trait CapabilityNotifier: Send + Sync {
    async fn mark_capable(&self, session_id: &str) -> Result<(), RegistryError>;
    async fn unmark_capable(&self, session_id: &str);
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, bool>,
    registered: bool,
}

struct RegistryInner {
    state: RwLock<RegistryState>,
    transport: Arc<dyn ToolTransport>,
    predicate: Arc<dyn CapabilityPredicate>,
    gated: Vec<ToolConstructor>,
}

/// Cloneable handle to the registry.
#[derive(Clone)]
pub struct DynamicToolRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning handle held by shims so that registered handlers do not keep
/// the registry (and through it the transport) alive.
#[derive(Clone)]
pub struct WeakRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<DynamicToolRegistry> {
        self.inner
            .upgrade()
            .map(|inner| DynamicToolRegistry { inner })
    }
}

impl DynamicToolRegistry {
    pub fn new(
        transport: Arc<dyn ToolTransport>,
        predicate: Arc<dyn CapabilityPredicate>,
        gated: Vec<ToolConstructor>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                transport,
                predicate,
                gated,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Record that `session_id` has a live backend connection.
    ///
    /// The first call ever flips the registration latch and registers every
    /// gated tool before returning. Map update, latch flip and the whole
    /// registration loop run under one write guard, so concurrent first
    /// calls can neither register twice nor observe a half-registered tier.
    pub async fn mark_capable(&self, session_id: &str) -> Result<(), RegistryError> {
        let mut state = self.inner.state.write().await;
        state.sessions.insert(session_id.to_string(), true);

        if state.registered {
            debug!(session_id, "session marked capable");
            return Ok(());
        }
        // Set before registering: a partially failed pass must never be retried.
        state.registered = true;

        info!(
            session_id,
            tools = self.inner.gated.len(),
            "first capable session, registering gated tools"
        );
        for construct in &self.inner.gated {
            let descriptor = construct();
            let tool = descriptor.name.to_string();
            let shim = CapabilityShim::new(
                tool.clone(),
                self.downgrade(),
                self.inner.predicate.clone(),
                descriptor.handler.clone(),
            );
            let descriptor = descriptor.with_handler(shim.into_handler());

            if let Err(source) = self.inner.transport.register_tool(descriptor).await {
                error!(tool = %tool, error = %source, "gated tool registration failed");
                return Err(RegistryError::Registration { tool, source });
            }
        }
        info!("gated tools registered");
        Ok(())
    }

    /// Forget a session. Registered tools stay registered.
    pub async fn unmark_capable(&self, session_id: &str) {
        let mut state = self.inner.state.write().await;
        if state.sessions.remove(session_id).is_some() {
            debug!(session_id, "session unmarked");
        }
    }

    pub async fn is_capable(&self, session_id: &str) -> bool {
        let state = self.inner.state.read().await;
        state.sessions.get(session_id).copied().unwrap_or(false)
    }

    /// True when any session is marked. Diagnostics only, never gating.
    pub async fn any_capable(&self) -> bool {
        let state = self.inner.state.read().await;
        !state.sessions.is_empty()
    }

    pub async fn is_registered(&self) -> bool {
        self.inner.state.read().await.registered
    }

    pub async fn capable_sessions(&self) -> usize {
        self.inner.state.read().await.sessions.len()
    }
}

#[async_trait]
impl CapabilityNotifier for DynamicToolRegistry {
    async fn mark_capable(&self, session_id: &str) -> Result<(), RegistryError> {
        DynamicToolRegistry::mark_capable(self, session_id).await
    }

    async fn unmark_capable(&self, session_id: &str) {
        DynamicToolRegistry::unmark_capable(self, session_id).await
    }
}
