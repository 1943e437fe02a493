//! Per-call capability gate wrapped around every gated tool handler.

use crate::mcp::tools::registry::{CapabilityPredicate, WeakRegistry};
use crate::mcp::transport::{CallContext, ToolFuture, ToolHandler};
use rmcp::{
    model::{CallToolResult, Content, JsonObject},
    ErrorData as McpError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a gated call was refused. Rendered as the tool error text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("Tool '{tool}' requires an active session with valid backend configuration.")]
    NoSession { tool: String },

    #[error("Tool '{tool}' is unavailable: this session has no valid authenticated Terraform Enterprise connection. Set TFE_TOKEN (and TFE_ADDRESS for self-hosted installations) and reconnect.")]
    NotCapable { tool: String },

    #[error("Capability check for tool '{tool}' was cancelled.")]
    Cancelled { tool: String },
}

pub struct CapabilityShim {
    tool: String,
    registry: WeakRegistry,
    predicate: Arc<dyn CapabilityPredicate>,
    inner: ToolHandler,
}

impl CapabilityShim {
    pub fn new(
        tool: impl Into<String>,
        registry: WeakRegistry,
        predicate: Arc<dyn CapabilityPredicate>,
        inner: ToolHandler,
    ) -> Self {
        Self {
            tool: tool.into(),
            registry,
            predicate,
            inner,
        }
    }

    pub fn into_handler(self) -> ToolHandler {
        let shim = Arc::new(self);
        Arc::new(move |ctx, arguments| -> ToolFuture {
            let shim = shim.clone();
            Box::pin(async move { shim.call(ctx, arguments).await })
        })
    }

    /// Forward to the wrapped handler if the calling session is capable,
    /// otherwise return a tool error result without touching the backend.
    pub async fn call(
        &self,
        ctx: CallContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, McpError> {
        let authorized = self.authorize(&ctx).await;
        match authorized {
            Ok(()) => (self.inner)(ctx, arguments).await,
            Err(denial) => {
                warn!(tool = %self.tool, reason = %denial, "gated tool call denied");
                Ok(CallToolResult::error(vec![Content::text(denial.to_string())]))
            }
        }
    }

    async fn authorize(&self, ctx: &CallContext) -> Result<(), Denial> {
        let Some(session) = ctx.session() else {
            return Err(Denial::NoSession {
                tool: self.tool.clone(),
            });
        };
        let Some(registry) = self.registry.upgrade() else {
            return Err(self.not_capable());
        };

        // The read guard is dropped before anything else is awaited.
        if registry.is_capable(session.id()).await {
            return Ok(());
        }

        debug!(tool = %self.tool, session_id = %session, "capability cache miss, checking live");
        let capable = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                return Err(Denial::Cancelled { tool: self.tool.clone() });
            }
            capable = self.predicate.check_backend_capability(session.id()) => capable,
        };
        if !capable {
            return Err(self.not_capable());
        }

        info!(tool = %self.tool, session_id = %session, "live check found a backend connection, refreshing cache");
        if let Err(e) = registry.mark_capable(session.id()).await {
            warn!(session_id = %session, error = %e, "failed to refresh capability cache");
        }

        // Teardown removes the client before unmarking, so a disconnect that
        // completed between the live check and the refresh shows up here.
        if !self.predicate.check_backend_capability(session.id()).await {
            info!(session_id = %session, "session torn down during capability check");
            registry.unmark_capable(session.id()).await;
            return Err(self.not_capable());
        }
        Ok(())
    }

    fn not_capable(&self) -> Denial {
        Denial::NotCapable {
            tool: self.tool.clone(),
        }
    }
}
