//! push and notification_click tools.

use barrio_client::ServiceWorker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the push tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Raw push payload, JSON `{title, body, image, url, tag}`. Missing or
    /// invalid payloads show the default notification.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Parameters for the notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// Tag of the clicked notification (default: the latest shown).
    #[serde(default)]
    pub tag: Option<String>,

    /// Clicked action button: `open` or `refresh`.
    #[serde(default)]
    pub action: Option<String>,
}

/// Implementation of the push tool.
pub async fn push_impl(worker: &ServiceWorker, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = worker.push(params.payload.as_deref()).await;
    json_result(&notification)
}

/// Implementation of the notification_click tool.
pub async fn click_impl(worker: &ServiceWorker, params: NotificationClickParams) -> Result<CallToolResult, McpError> {
    let outcome = worker
        .notification_click(params.tag.as_deref(), params.action.as_deref())
        .await;
    json_result(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, worker};

    #[tokio::test]
    async fn test_push_then_click_opens_window() {
        let worker = worker().await;

        let shown = push_impl(&worker, PushParams { payload: Some(r#"{"title":"Ofertas","url":"/ituzaingo/"}"#.into()) })
            .await
            .unwrap();
        let shown = output(&shown);
        assert_eq!(shown["title"], "Ofertas");
        assert_eq!(shown["body"], "Nuevas ofertas disponibles en tu barrio");

        let clicked = click_impl(&worker, NotificationClickParams { tag: None, action: None })
            .await
            .unwrap();
        let clicked = output(&clicked);
        assert_eq!(clicked["outcome"], "opened");

        let id = clicked["client_id"].as_str().unwrap();
        let client = worker.engine().clients().get(id).await.unwrap();
        assert_eq!(client.url, "https://www.tubarrioaunclik.com/ituzaingo/");
    }

    #[tokio::test]
    async fn test_default_push_and_ignored_click() {
        let worker = worker().await;

        let shown = push_impl(&worker, PushParams { payload: None }).await.unwrap();
        assert_eq!(output(&shown)["title"], "¡Novedades en tu barrio!");

        let clicked = click_impl(&worker, NotificationClickParams { tag: Some("missing".into()), action: None })
            .await
            .unwrap();
        assert_eq!(output(&clicked)["outcome"], "ignored");
    }
}
