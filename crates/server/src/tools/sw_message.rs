//! sw_message tool implementation.
//!
//! Posts a control message to the worker and returns its reply.

use barrio_client::{ServiceWorker, WorkerMessage};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Control message, e.g. `{"type":"REFRESH_CONTENT","localidad":"castelar"}`.
    pub message: serde_json::Value,
}

/// Output from the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwMessageOutput {
    /// Reply on the message port, if the message has one.
    pub reply: Option<WorkerMessage>,
}

/// Implementation of the sw_message tool.
pub async fn sw_message_impl(worker: &ServiceWorker, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    let reply = worker.handle_json(params.message).await?;
    json_result(&SwMessageOutput { reply })
}
