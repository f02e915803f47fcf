//! Page client tools: client_open, client_close, client_messages.

use barrio_client::{ServiceWorker, WindowClient, WorkerMessage};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the client_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientOpenParams {
    /// Page URL, absolute or a site path.
    pub url: String,

    /// Whether the worker already controls the page (default: true).
    #[serde(default = "default_true")]
    pub controlled: bool,
}

fn default_true() -> bool {
    true
}

/// Parameters for client_close and client_messages.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientIdParams {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCloseOutput {
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessagesOutput {
    pub client: WindowClient,
    /// Messages received since the last call, oldest first.
    pub messages: Vec<WorkerMessage>,
}

/// Implementation of the client_open tool.
pub async fn open_impl(worker: &ServiceWorker, params: ClientOpenParams) -> Result<CallToolResult, McpError> {
    let engine = worker.engine();
    let url = engine
        .resolve(&params.url)
        .map_err(|e| ToolError::InvalidInput(format!("{}: {e}", params.url)))?;
    let client = engine.clients().open_window(url.as_str(), params.controlled).await;
    json_result(&client)
}

/// Implementation of the client_close tool.
pub async fn close_impl(worker: &ServiceWorker, params: ClientIdParams) -> Result<CallToolResult, McpError> {
    let closed = worker.engine().clients().close(&params.id).await;
    json_result(&ClientCloseOutput { closed })
}

/// Implementation of the client_messages tool.
pub async fn messages_impl(worker: &ServiceWorker, params: ClientIdParams) -> Result<CallToolResult, McpError> {
    let clients = worker.engine().clients();
    let unknown = || ToolError::InvalidInput(format!("unknown client: {}", params.id));

    let client = clients.get(&params.id).await.ok_or_else(unknown)?;
    let messages = clients.take_messages(&params.id).await.ok_or_else(unknown)?;
    json_result(&ClientMessagesOutput { client, messages })
}
