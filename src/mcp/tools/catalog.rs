//! Tool definitions.
//!
//! Gated tools need an authenticated backend client for the calling session
//! and are registered by [`DynamicToolRegistry`](super::registry::DynamicToolRegistry)
//! once the first session connects. `get_connection_status` is always
//! available.

use crate::mcp::error_handling::{input_schema, json_result, parse_arguments, tool_error};
use crate::mcp::tools::registry::{ToolConstructor, WeakRegistry};
use crate::mcp::transport::{handler_fn, CallContext, ToolDescriptor};
use crate::mcp::types::*;
use crate::tfe::client::{Page, TfeClient, TfeError};
use crate::tfe::connection::SessionClients;
use rmcp::{
    model::{CallToolResult, JsonObject},
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Input for tools without parameters
#[derive(Debug, serde::Deserialize, JsonSchema)]
pub struct NoInput {}

/// Every gated tool, in registration order.
pub fn gated_tools(clients: &Arc<SessionClients>) -> Vec<ToolConstructor> {
    let builders: [fn(Arc<SessionClients>) -> ToolDescriptor; 10] = [
        list_terraform_orgs,
        list_workspaces,
        get_workspace_details,
        list_runs,
        get_run_details,
        create_run,
        list_workspace_variables,
        list_private_modules,
        list_policy_sets,
        get_current_state_version,
    ];
    builders
        .into_iter()
        .map(|build| {
            let clients = clients.clone();
            Box::new(move || build(clients.clone())) as ToolConstructor
        })
        .collect()
}

/// Run `action` with the calling session's backend client and render the
/// outcome as a tool result.
async fn with_client<F, Fut>(
    clients: &SessionClients,
    ctx: &CallContext,
    tool: &str,
    action: F,
) -> Result<CallToolResult, McpError>
where
    F: FnOnce(Arc<TfeClient>) -> Fut,
    Fut: Future<Output = Result<Value, TfeError>>,
{
    info!(tool, "executing tool");
    let client = match ctx.session() {
        Some(session) => clients.client(session.id()).await,
        None => None,
    };
    let Some(client) = client else {
        return Ok(tool_error(format!(
            "{} failed: no backend connection for this session",
            tool
        )));
    };
    match action(client).await {
        Ok(value) => Ok(json_result(&value)),
        Err(e) => Ok(tool_error(format!("{} failed: {}", tool, e))),
    }
}

/// Keep the `data` array of a JSON:API list document plus its pagination.
fn list_document(key: &str, document: Value) -> Value {
    let mut result = serde_json::Map::new();
    result.insert(
        key.to_string(),
        document.get("data").cloned().unwrap_or(Value::Null),
    );
    if let Some(pagination) = document.pointer("/meta/pagination") {
        result.insert("pagination".to_string(), pagination.clone());
    }
    Value::Object(result)
}

/// Keep the `data` object of a JSON:API resource document.
fn resource_document(key: &str, document: Value) -> Value {
    json!({ key: document.get("data").cloned().unwrap_or(Value::Null) })
}

fn list_terraform_orgs(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_terraform_orgs",
        "List the Terraform Enterprise organizations the token can access",
        input_schema::<ListOrganizationsInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: ListOrganizationsInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_terraform_orgs", |client| async move {
                    let doc = client.list_organizations(Page::from(&input.page)).await?;
                    Ok::<_, TfeError>(list_document("organizations", doc))
                })
                .await
            }
        }),
    )
}

fn list_workspaces(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_workspaces",
        "Search and list workspaces in a Terraform Enterprise organization",
        input_schema::<ListWorkspacesInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: ListWorkspacesInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_workspaces", |client| async move {
                    let doc = client
                        .list_workspaces(
                            &input.organization,
                            input.search.as_deref(),
                            Page::from(&input.page),
                        )
                        .await?;
                    Ok::<_, TfeError>(list_document("workspaces", doc))
                })
                .await
            }
        }),
    )
}

fn get_workspace_details(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "get_workspace_details",
        "Get details of a workspace by organization and workspace name",
        input_schema::<WorkspaceDetailsInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: WorkspaceDetailsInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "get_workspace_details", |client| async move {
                    let doc = client
                        .get_workspace(&input.organization, &input.workspace)
                        .await?;
                    Ok::<_, TfeError>(resource_document("workspace", doc))
                })
                .await
            }
        }),
    )
}

fn list_runs(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_runs",
        "List runs of a workspace, newest first",
        input_schema::<ListRunsInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: ListRunsInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_runs", |client| async move {
                    let doc = client
                        .list_runs(&input.workspace_id, Page::from(&input.page))
                        .await?;
                    Ok::<_, TfeError>(list_document("runs", doc))
                })
                .await
            }
        }),
    )
}

fn get_run_details(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "get_run_details",
        "Get the status and details of a run",
        input_schema::<RunInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: RunInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "get_run_details", |client| async move {
                    let doc = client.get_run(&input.run_id).await?;
                    Ok::<_, TfeError>(resource_document("run", doc))
                })
                .await
            }
        }),
    )
}

fn create_run(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "create_run",
        "Queue a new plan (or destroy plan) run in a workspace (WARNING: may change infrastructure when auto-apply is enabled)",
        input_schema::<CreateRunInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: CreateRunInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "create_run", |client| async move {
                    let message = input.message.as_deref().unwrap_or("Queued by tfemcp");
                    let doc = client
                        .create_run(&input.workspace_id, message, input.is_destroy, input.auto_apply)
                        .await?;
                    Ok::<_, TfeError>(resource_document("run", doc))
                })
                .await
            }
        }),
    )
}

fn list_workspace_variables(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_workspace_variables",
        "List Terraform and environment variables of a workspace (sensitive values are hidden by the API)",
        input_schema::<WorkspaceIdInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: WorkspaceIdInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_workspace_variables", |client| async move {
                    let doc = client.list_workspace_variables(&input.workspace_id).await?;
                    Ok::<_, TfeError>(list_document("variables", doc))
                })
                .await
            }
        }),
    )
}

fn list_private_modules(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_private_modules",
        "List modules in an organization's private registry",
        input_schema::<OrganizationInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: OrganizationInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_private_modules", |client| async move {
                    let doc = client
                        .list_registry_modules(&input.organization, Page::from(&input.page))
                        .await?;
                    Ok::<_, TfeError>(list_document("modules", doc))
                })
                .await
            }
        }),
    )
}

fn list_policy_sets(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "list_policy_sets",
        "List policy sets configured in an organization",
        input_schema::<OrganizationInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: OrganizationInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "list_policy_sets", |client| async move {
                    let doc = client
                        .list_policy_sets(&input.organization, Page::from(&input.page))
                        .await?;
                    Ok::<_, TfeError>(list_document("policy_sets", doc))
                })
                .await
            }
        }),
    )
}

fn get_current_state_version(clients: Arc<SessionClients>) -> ToolDescriptor {
    ToolDescriptor::new(
        "get_current_state_version",
        "Get metadata of the current state version of a workspace",
        input_schema::<WorkspaceIdInput>(),
        handler_fn(move |ctx: CallContext, args: JsonObject| {
            let clients = clients.clone();
            async move {
                let input: WorkspaceIdInput = parse_arguments(args)?;
                with_client(&clients, &ctx, "get_current_state_version", |client| async move {
                    let doc = client.current_state_version(&input.workspace_id).await?;
                    Ok::<_, TfeError>(resource_document("state_version", doc))
                })
                .await
            }
        }),
    )
}

/// Always-available diagnostics about the calling session's backend
/// connection and the gated tool tier.
pub fn connection_status_tool(
    registry: WeakRegistry,
    clients: Arc<SessionClients>,
    address: String,
) -> ToolDescriptor {
    ToolDescriptor::new(
        "get_connection_status",
        "Report whether this session has an authenticated Terraform Enterprise connection and whether backend tools are available",
        input_schema::<NoInput>(),
        handler_fn(move |ctx: CallContext, _args: JsonObject| {
            let registry = registry.clone();
            let clients = clients.clone();
            let address = address.clone();
            async move {
                info!(tool = "get_connection_status", "executing tool");
                let Some(registry) = registry.upgrade() else {
                    return Ok(tool_error("Tool registry is shutting down"));
                };
                let session_id = ctx.session().map(|s| s.id().to_string());
                let (capable, connection) = match &session_id {
                    Some(id) => (registry.is_capable(id).await, clients.connection(id).await),
                    None => (false, None),
                };
                Ok::<_, McpError>(json_result(&json!({
                    "session_id": session_id,
                    "address": address,
                    "connected": capable,
                    "account": connection.as_ref().and_then(|c| c.account.clone()),
                    "connected_at": connection.as_ref().map(|c| c.connected_at.to_rfc3339()),
                    "backend_tools_registered": registry.is_registered().await,
                    "any_session_connected": registry.any_capable().await,
                })))
            }
        }),
    )
}
