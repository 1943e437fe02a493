//! Tool transport seam: tool descriptors, per-call context and the
//! append-only tool table the MCP server lists and dispatches from.
//!
//! rmcp's `ToolRouter` is built for a server type known at compile time and
//! allows replacing routes; the table here takes type-erased handlers at
//! runtime, rejects duplicate names and hands the session to each call.

use async_trait::async_trait;
use futures::future::BoxFuture;
use rmcp::{
    model::{CallToolResult, JsonObject, Tool},
    ErrorData as McpError,
};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Opaque identity of one client connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    id: Arc<str>,
}

impl SessionHandle {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Context handed to every tool handler invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    session: Option<SessionHandle>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new(session: Option<SessionHandle>, cancellation: CancellationToken) -> Self {
        Self {
            session,
            cancellation,
        }
    }

    pub fn for_session(session: SessionHandle) -> Self {
        Self::new(Some(session), CancellationToken::new())
    }

    /// A call that arrived without any resolvable session.
    pub fn without_session() -> Self {
        Self::new(None, CancellationToken::new())
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

pub type ToolFuture = BoxFuture<'static, Result<CallToolResult, McpError>>;

/// Type-erased tool handler: parsed arguments in, tool result out.
pub type ToolHandler = Arc<dyn Fn(CallContext, JsonObject) -> ToolFuture + Send + Sync>;

/// Build a [`ToolHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(CallContext, JsonObject) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult, McpError>> + Send + 'static,
{
    Arc::new(move |ctx, arguments| -> ToolFuture { Box::pin(f(ctx, arguments)) })
}

/// A tool as advertised to clients together with the code that serves it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub input_schema: Arc<JsonObject>,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
        input_schema: Arc<JsonObject>,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }

    /// Same tool, different handler.
    pub fn with_handler(self, handler: ToolHandler) -> Self {
        Self { handler, ..self }
    }

    pub fn to_tool(&self) -> Tool {
        Tool::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        )
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool registration rejected: {0}")]
    Rejected(String),
}

/// Registration side of the serving runtime. Append-only: there is no
/// unregister or update.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn register_tool(&self, descriptor: ToolDescriptor) -> Result<(), TransportError>;
}

/// In-memory tool table backing the MCP server.
#[derive(Default)]
pub struct ToolTable {
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tools in registration order.
    pub async fn list(&self) -> Vec<Tool> {
        let tools = self.tools.read().await;
        tools.iter().map(ToolDescriptor::to_tool).collect()
    }

    pub async fn names(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        tools.iter().map(|t| t.name.to_string()).collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.handler(name).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    pub async fn handler(&self, name: &str) -> Option<ToolHandler> {
        let tools = self.tools.read().await;
        tools
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.handler.clone())
    }

    /// Dispatch a call. The table lock is released before the handler runs.
    pub async fn call(
        &self,
        name: &str,
        ctx: CallContext,
        arguments: JsonObject,
    ) -> Result<CallToolResult, McpError> {
        let handler = self.handler(name).await.ok_or_else(|| {
            McpError::invalid_params(format!("Unknown tool: {}", name), None)
        })?;
        handler(ctx, arguments).await
    }
}

#[async_trait]
impl ToolTransport for ToolTable {
    async fn register_tool(&self, descriptor: ToolDescriptor) -> Result<(), TransportError> {
        let mut tools = self.tools.write().await;
        if tools.iter().any(|t| t.name == descriptor.name) {
            return Err(TransportError::DuplicateTool(descriptor.name.to_string()));
        }
        debug!(tool = %descriptor.name, "registered tool");
        tools.push(descriptor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;

    fn echo_tool(name: &'static str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "Echo the calling session",
            Arc::new(JsonObject::new()),
            handler_fn(|ctx: CallContext, _args| async move {
                let session = ctx
                    .session()
                    .map(|s| s.id().to_string())
                    .unwrap_or_default();
                Ok::<_, McpError>(CallToolResult::success(vec![Content::text(session)]))
            }),
        )
    }

    #[tokio::test]
    async fn test_register_and_list_keeps_order() {
        let table = ToolTable::new();
        table.register_tool(echo_tool("b_tool")).await.unwrap();
        table.register_tool(echo_tool("a_tool")).await.unwrap();

        assert_eq!(table.names().await, vec!["b_tool", "a_tool"]);
        let tools = table.list().await;
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "b_tool");
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let table = ToolTable::new();
        table.register_tool(echo_tool("echo")).await.unwrap();
        let err = table.register_tool(echo_tool("echo")).await.unwrap_err();
        assert_eq!(err, TransportError::DuplicateTool("echo".to_string()));
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_call_dispatches_with_session() {
        let table = ToolTable::new();
        table.register_tool(echo_tool("echo")).await.unwrap();

        let ctx = CallContext::for_session(SessionHandle::new("session-1"));
        let result = table.call("echo", ctx, JsonObject::new()).await.unwrap();
        assert_ne!(result.is_error, Some(true));
        let text = serde_json::to_string(&result.content).unwrap();
        assert!(text.contains("session-1"));
    }

    #[tokio::test]
    async fn test_call_unknown_tool_is_protocol_error() {
        let table = ToolTable::new();
        let result = table
            .call("missing", CallContext::without_session(), JsonObject::new())
            .await;
        assert!(result.is_err());
    }
}
