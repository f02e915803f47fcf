//! site_fetch tool implementation.
//!
//! Runs a page request through the worker's fetch interception.

use std::collections::BTreeMap;

use barrio_client::{ResponseSource, ServiceWorker, SiteRequest};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the site_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SiteFetchParams {
    /// Absolute URL or site path, e.g. `/castelar/data/farmacias.json`.
    pub url: String,

    /// HTTP method (default: GET). Anything else passes through.
    #[serde(default = "default_method")]
    pub method: String,

    /// Top-level navigation rather than a subresource.
    #[serde(default)]
    pub navigate: bool,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the site_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteFetchOutput {
    /// False when the request went straight to the network.
    pub intercepted: bool,
    pub url: Option<String>,
    pub status: Option<u16>,
    pub source: Option<ResponseSource>,
    pub headers: BTreeMap<String, String>,
    pub body_bytes: usize,
    /// Body text, for textual content types.
    pub body: Option<String>,
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("javascript")
}

/// Implementation of the site_fetch tool.
pub async fn site_fetch_impl(worker: &ServiceWorker, params: SiteFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let request = SiteRequest { method: params.method, url: params.url, navigate: params.navigate };
    let output = match worker.handle_fetch(&request).await {
        Some(response) => {
            let body = response
                .content_type()
                .filter(|ct| is_textual(ct))
                .map(|_| String::from_utf8_lossy(&response.body).into_owned());
            SiteFetchOutput {
                intercepted: true,
                url: Some(response.url),
                status: Some(response.status),
                source: Some(response.source),
                body_bytes: response.body.len(),
                headers: response.headers,
                body,
            }
        }
        None => {
            tracing::debug!(url = %request.url, "request not intercepted");
            SiteFetchOutput {
                intercepted: false,
                url: None,
                status: None,
                source: None,
                headers: BTreeMap::new(),
                body_bytes: 0,
                body: None,
            }
        }
    };

    json_result(&output)
}
