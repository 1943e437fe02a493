use crate::config::BackendConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const JSON_API: &str = "application/vnd.api+json";

#[derive(Error, Debug, Clone)]
pub enum TfeError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("JSON parsing failed: {0}")]
    JsonError(String),

    #[error("Authentication failed (HTTP {status}). Check that the token is a valid user or team token for {address}.")]
    Unauthorized { status: u16, address: String },

    #[error("Resource '{path}' not found. It may not exist, or the token may not have access to it.")]
    NotFound { path: String },

    #[error("Rate limit exceeded. Please wait before making additional requests.")]
    RateLimited,

    #[error("Request rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for TfeError {
    fn from(error: reqwest::Error) -> Self {
        TfeError::HttpError(error.to_string())
    }
}

impl From<serde_json::Error> for TfeError {
    fn from(error: serde_json::Error) -> Self {
        TfeError::JsonError(error.to_string())
    }
}

/// JSON:API page selection. Sizes are clamped to what the API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(number: Option<u32>, size: Option<u32>) -> Self {
        Self {
            number: number.unwrap_or(1).max(1),
            size: size.unwrap_or(Self::DEFAULT_SIZE).clamp(1, Self::MAX_SIZE),
        }
    }

    fn query(&self) -> [(&'static str, String); 2] {
        [
            ("page[number]", self.number.to_string()),
            ("page[size]", self.size.to_string()),
        ]
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Authenticated client for the Terraform Enterprise / HCP Terraform API.
pub struct TfeClient {
    client: Client,
    address: String,
    base_url: Url,
}

impl TfeClient {
    pub fn new(config: &BackendConfig) -> Result<Self, TfeError> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TfeError::InvalidConfig("no API token configured".to_string()))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
            TfeError::InvalidConfig("API token contains invalid characters".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_API));

        let client = Client::builder()
            .user_agent(concat!("tfemcp/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .default_headers(headers)
            .build()?;

        let mut base_url = Url::parse(&config.address)
            .map_err(|e| TfeError::InvalidConfig(format!("invalid address: {}", e)))?;
        base_url
            .path_segments_mut()
            .map_err(|_| TfeError::InvalidConfig("address cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["api", "v2"]);

        Ok(Self {
            client,
            address: config.address.clone(),
            base_url,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Build an API URL; each segment is percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, TfeError> {
        let url = self.url(segments);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, url.clone()).query(query);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(&body)?);
        }
        let response = request.send().await?;
        let status = response.status();

        debug!("Response status: {} for URL: {}", status, url);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("Authentication failed for {}", url);
                return Err(TfeError::Unauthorized {
                    status: status.as_u16(),
                    address: self.address.clone(),
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(TfeError::NotFound {
                    path: url.path().to_string(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Rate limit exceeded for {}", url);
                return Err(TfeError::RateLimited);
            }
            _ => {}
        }

        let response_text = response.text().await?;
        if !status.is_success() {
            error!(
                "HTTP error {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            );
            return Err(TfeError::Rejected {
                status: status.as_u16(),
                detail: error_detail(&response_text),
            });
        }

        if response_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&response_text)?)
    }

    async fn get(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value, TfeError> {
        self.request(Method::GET, segments, query, None).await
    }

    /// Details of the account the token belongs to. Used to validate credentials.
    pub async fn account_details(&self) -> Result<Value, TfeError> {
        self.get(&["account", "details"], &[]).await
    }

    pub async fn list_organizations(&self, page: Page) -> Result<Value, TfeError> {
        self.get(&["organizations"], &page.query()).await
    }

    pub async fn list_workspaces(
        &self,
        organization: &str,
        search: Option<&str>,
        page: Page,
    ) -> Result<Value, TfeError> {
        let mut query = page.query().to_vec();
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            query.push(("search[name]", search.to_string()));
        }
        self.get(&["organizations", organization, "workspaces"], &query)
            .await
    }

    pub async fn get_workspace(
        &self,
        organization: &str,
        workspace: &str,
    ) -> Result<Value, TfeError> {
        self.get(&["organizations", organization, "workspaces", workspace], &[])
            .await
    }

    pub async fn list_runs(&self, workspace_id: &str, page: Page) -> Result<Value, TfeError> {
        self.get(&["workspaces", workspace_id, "runs"], &page.query())
            .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Value, TfeError> {
        self.get(&["runs", run_id], &[]).await
    }

    pub async fn create_run(
        &self,
        workspace_id: &str,
        message: &str,
        is_destroy: bool,
        auto_apply: Option<bool>,
    ) -> Result<Value, TfeError> {
        let mut attributes = json!({
            "message": message,
            "is-destroy": is_destroy,
        });
        if let Some(auto_apply) = auto_apply {
            attributes["auto-apply"] = json!(auto_apply);
        }
        let body = json!({
            "data": {
                "type": "runs",
                "attributes": attributes,
                "relationships": {
                    "workspace": {
                        "data": { "type": "workspaces", "id": workspace_id }
                    }
                }
            }
        });
        self.request(Method::POST, &["runs"], &[], Some(body)).await
    }

    pub async fn list_workspace_variables(&self, workspace_id: &str) -> Result<Value, TfeError> {
        self.get(&["workspaces", workspace_id, "vars"], &[]).await
    }

    pub async fn list_registry_modules(
        &self,
        organization: &str,
        page: Page,
    ) -> Result<Value, TfeError> {
        self.get(
            &["organizations", organization, "registry-modules"],
            &page.query(),
        )
        .await
    }

    pub async fn list_policy_sets(&self, organization: &str, page: Page) -> Result<Value, TfeError> {
        self.get(&["organizations", organization, "policy-sets"], &page.query())
            .await
    }

    pub async fn current_state_version(&self, workspace_id: &str) -> Result<Value, TfeError> {
        self.get(&["workspaces", workspace_id, "current-state-version"], &[])
            .await
    }
}

/// Pull a readable message out of a JSON:API error document.
fn error_detail(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let details: Vec<String> = parsed
        .as_ref()
        .and_then(|v| v.get("errors"))
        .and_then(|e| e.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| {
                    e.get("detail")
                        .or_else(|| e.get("title"))
                        .and_then(|d| d.as_str())
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    if details.is_empty() {
        body.chars().take(200).collect()
    } else {
        details.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(address: &str) -> BackendConfig {
        BackendConfig {
            address: address.to_string(),
            token: Some("test-token".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(None, None), Page { number: 1, size: 20 });
        assert_eq!(Page::new(Some(0), Some(500)), Page { number: 1, size: 100 });
        assert_eq!(Page::new(Some(3), Some(0)), Page { number: 3, size: 1 });
    }

    #[test]
    fn test_client_requires_token() {
        let mut cfg = config("https://app.terraform.io");
        cfg.token = None;
        assert!(matches!(TfeClient::new(&cfg), Err(TfeError::InvalidConfig(_))));

        cfg.token = Some(String::new());
        assert!(matches!(TfeClient::new(&cfg), Err(TfeError::InvalidConfig(_))));
    }

    #[test]
    fn test_url_encodes_segments() {
        let client = TfeClient::new(&config("https://tfe.example.com/")).unwrap();
        let url = client.url(&["organizations", "my org", "workspaces"]);
        assert_eq!(
            url.as_str(),
            "https://tfe.example.com/api/v2/organizations/my%20org/workspaces"
        );
    }

    #[test]
    fn test_error_detail() {
        let body = r#"{"errors":[{"status":"422","title":"invalid","detail":"Workspace is locked"}]}"#;
        assert_eq!(error_detail(body), "Workspace is locked");
        assert_eq!(error_detail("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn test_account_details_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/account/details")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", JSON_API)
            .with_body(r#"{"data":{"id":"user-1","attributes":{"username":"alice"}}}"#)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let account = client.account_details().await.unwrap();
        assert_eq!(account["data"]["attributes"]["username"], "alice");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/account/details")
            .with_status(401)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let err = client.account_details().await.unwrap_err();
        assert!(matches!(err, TfeError::Unauthorized { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v2/runs/run-missing")
            .with_status(404)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let err = client.get_run("run-missing").await.unwrap_err();
        assert!(matches!(err, TfeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_workspaces_sends_pagination_and_search() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/organizations/acme/workspaces")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("page[number]".into(), "2".into()),
                mockito::Matcher::UrlEncoded("page[size]".into(), "5".into()),
                mockito::Matcher::UrlEncoded("search[name]".into(), "prod".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[{"id":"ws-1"}],"meta":{"pagination":{"current-page":2}}}"#)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let result = client
            .list_workspaces("acme", Some("prod"), Page::new(Some(2), Some(5)))
            .await
            .unwrap();
        assert_eq!(result["data"][0]["id"], "ws-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_run_posts_json_api_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/runs")
            .match_body(mockito::Matcher::PartialJson(json!({
                "data": {
                    "type": "runs",
                    "attributes": { "message": "nightly", "is-destroy": false },
                    "relationships": {
                        "workspace": { "data": { "type": "workspaces", "id": "ws-1" } }
                    }
                }
            })))
            .with_status(201)
            .with_body(r#"{"data":{"id":"run-1","attributes":{"status":"pending"}}}"#)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let run = client.create_run("ws-1", "nightly", false, None).await.unwrap();
        assert_eq!(run["data"]["id"], "run-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_request_carries_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/runs")
            .with_status(422)
            .with_body(r#"{"errors":[{"detail":"Workspace is locked"}]}"#)
            .create_async()
            .await;

        let client = TfeClient::new(&config(&server.url())).unwrap();
        let err = client.create_run("ws-1", "m", false, Some(true)).await.unwrap_err();
        match err {
            TfeError::Rejected { status, detail } => {
                assert_eq!(status, 422);
                assert_eq!(detail, "Workspace is locked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
