//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker.
use std::sync::Arc;

use barrio_client::ServiceWorker;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl};
use crate::tools::clients::{ClientIdParams, ClientOpenParams, close_impl, messages_impl, open_impl};
use crate::tools::push::{NotificationClickParams, PushParams, click_impl, push_impl};
use crate::tools::site_fetch::{SiteFetchParams, site_fetch_impl};
use crate::tools::sw_message::{SwMessageParams, sw_message_impl};

/// The main MCP server handler for barrio-sw.
#[derive(Clone)]
pub struct BarrioServer {
    worker: Arc<ServiceWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl BarrioServer {
    /// Create a new server handler around a started worker.
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    /// Run a page request through the worker.
    ///
    /// Same-origin GETs are answered by the per-class strategy; anything
    /// else is reported as not intercepted.
    #[tool(
        description = "Fetch a site URL through the offline worker. Returns status, source (network, cache, stale_cache, fallback) and the body for textual responses."
    )]
    async fn site_fetch(&self, params: Parameters<SiteFetchParams>) -> Result<CallToolResult, McpError> {
        site_fetch_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Post a control message to the worker (SKIP_WAITING, CLEAN_CACHE, GET_CONTEXT, REFRESH_CONTENT, CACHE_RESOURCE, REFRESH_BUSINESS_DATA, PAGE_FOCUS, GET_CACHE_STATUS). Returns the reply, if any."
    )]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        sw_message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Open a page client. Broadcast notifications are queued in its inbox.")]
    async fn client_open(&self, params: Parameters<ClientOpenParams>) -> Result<CallToolResult, McpError> {
        open_impl(&self.worker, params.0).await
    }

    #[tool(description = "Close a page client.")]
    async fn client_close(&self, params: Parameters<ClientIdParams>) -> Result<CallToolResult, McpError> {
        close_impl(&self.worker, params.0).await
    }

    #[tool(description = "Drain the messages the worker has posted to a page client.")]
    async fn client_messages(&self, params: Parameters<ClientIdParams>) -> Result<CallToolResult, McpError> {
        messages_impl(&self.worker, params.0).await
    }

    #[tool(description = "Deliver a push payload and return the notification shown.")]
    async fn push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.worker, params.0).await
    }

    #[tool(description = "Click a shown notification, optionally on its open or refresh action.")]
    async fn notification_click(&self, params: Parameters<NotificationClickParams>) -> Result<CallToolResult, McpError> {
        click_impl(&self.worker, params.0).await
    }

    #[tool(description = "Look up a stored response by URL in the current cache partitions.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }

    #[tool(description = "Clear a partition of the current version and/or drop partitions of older versions.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for BarrioServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "barrio-sw".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
