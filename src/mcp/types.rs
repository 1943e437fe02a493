//! Input types for Terraform Enterprise tools with automatic JSON Schema generation.

use crate::tfe::client::Page;
use schemars::JsonSchema;
use serde::Deserialize;

/// Pagination shared by list tools
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct PageInput {
    /// Page number to fetch, starting at 1 (default: 1)
    pub page_number: Option<u32>,
    /// Items per page, 1-100 (default: 20)
    pub page_size: Option<u32>,
}

impl From<&PageInput> for Page {
    fn from(input: &PageInput) -> Self {
        Page::new(input.page_number, input.page_size)
    }
}

/// Input for listing organizations
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListOrganizationsInput {
    #[serde(flatten)]
    pub page: PageInput,
}

/// Input for listing workspaces
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListWorkspacesInput {
    /// Organization name (e.g., "acme")
    pub organization: String,
    /// Optional substring to filter workspace names
    pub search: Option<String>,
    #[serde(flatten)]
    pub page: PageInput,
}

/// Input for workspace details lookup
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceDetailsInput {
    /// Organization name
    pub organization: String,
    /// Workspace name
    pub workspace: String,
}

/// Input for listing runs
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListRunsInput {
    /// Workspace ID (e.g., "ws-abc123")
    pub workspace_id: String,
    #[serde(flatten)]
    pub page: PageInput,
}

/// Input for run details lookup
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunInput {
    /// Run ID (e.g., "run-abc123")
    pub run_id: String,
}

/// Input for queueing a new run
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRunInput {
    /// Workspace ID to queue the run in
    pub workspace_id: String,
    /// Message shown for the run (default: "Queued by tfemcp")
    pub message: Option<String>,
    /// Queue a destroy plan (default: false)
    #[serde(default)]
    pub is_destroy: bool,
    /// Override the workspace auto-apply setting
    pub auto_apply: Option<bool>,
}

/// Input for workspace-scoped lookups
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkspaceIdInput {
    /// Workspace ID (e.g., "ws-abc123")
    pub workspace_id: String,
}

/// Input for organization-scoped list tools
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OrganizationInput {
    /// Organization name
    pub organization: String,
    #[serde(flatten)]
    pub page: PageInput,
}
