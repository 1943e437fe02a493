//! RMCP-based MCP server for tfemcp.

use crate::core::tfemcp::TfeMcp;
use crate::mcp::transport::{CallContext, SessionHandle, ToolTable};
use crate::shared::logging;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Implementation, InitializeResult, JsonObject,
        ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities,
        ToolsCapability,
    },
    service::{RequestContext, RoleServer, ServiceExt},
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// MCP server bound to one client session. Tools are listed from and
/// dispatched through the shared [`ToolTable`].
#[derive(Clone)]
pub struct TfeMcpServer {
    tools: Arc<ToolTable>,
    session: Option<SessionHandle>,
    name: String,
}

impl TfeMcpServer {
    pub fn new(tools: Arc<ToolTable>, session: Option<SessionHandle>, name: String) -> Self {
        Self {
            tools,
            session,
            name,
        }
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Serve the MCP server over stdio.
    ///
    /// The stdio connection is a single session: it is connected before the
    /// first request is served and disconnected once the client goes away.
    pub async fn serve_stdio(tfemcp: TfeMcp) -> anyhow::Result<()> {
        use tokio::io::{stdin, stdout};

        let session = tfemcp.open_session().await?;
        let server = Self::new(
            tfemcp.tools().clone(),
            Some(session.clone()),
            tfemcp.config().server.name.clone(),
        );
        let transport = (stdin(), stdout());

        logging::info(&format!(
            "Starting tfemcp MCP server via stdio (session {})...",
            session
        ));
        let result = match server.serve(transport).await {
            Ok(service) => service.waiting().await.map(|_| ()).map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        tfemcp.close_session(&session).await;
        result
    }

    /// Route one tool call through the table with this server's session.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: JsonObject,
        cancellation: CancellationToken,
    ) -> Result<CallToolResult, McpError> {
        logging::debug(&format!("Executing tool {}", name));
        let ctx = CallContext::new(self.session.clone(), cancellation);
        self.tools.call(name, ctx, arguments).await
    }
}

#[allow(clippy::manual_async_fn)]
impl ServerHandler for TfeMcpServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: self.name.clone(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "tfemcp exposes Terraform Enterprise / HCP Terraform over MCP. Call get_connection_status first; backend tools only work once the session has a validated TFE_TOKEN.".into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            let tools = self.tools.list().await;
            Ok(ListToolsResult {
                tools,
                ..Default::default()
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            self.dispatch(
                &request.name,
                request.arguments.unwrap_or_default(),
                context.ct.clone(),
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn text_of(result: &CallToolResult) -> String {
        serde_json::to_string(&result.content).unwrap()
    }

    #[tokio::test]
    async fn test_get_info_advertises_tools() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        let server = TfeMcpServer::new(tfemcp.tools().clone(), None, "tfemcp".to_string());
        let info = server.get_info();
        assert_eq!(info.server_info.name, "tfemcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_status_tool_reports_session() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        let session = tfemcp.open_session().await.unwrap();
        let server = TfeMcpServer::new(
            tfemcp.tools().clone(),
            Some(session.clone()),
            "tfemcp".to_string(),
        );

        let result = server
            .dispatch(
                "get_connection_status",
                JsonObject::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let text = text_of(&result);
        assert!(text.contains(session.id()));
        assert_ne!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_fails() {
        let tfemcp = TfeMcp::new(Config::default()).await.unwrap();
        let server = TfeMcpServer::new(tfemcp.tools().clone(), None, "tfemcp".to_string());
        let result = server
            .dispatch("list_workspaces", JsonObject::new(), CancellationToken::new())
            .await;
        assert!(result.is_err());
    }
}
