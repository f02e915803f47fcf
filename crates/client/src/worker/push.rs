//! Push notifications and notification clicks.

use serde::{Deserialize, Serialize};

use super::ServiceWorker;
use super::messages::WorkerMessage;

pub const DEFAULT_PUSH_TITLE: &str = "¡Novedades en tu barrio!";
pub const DEFAULT_PUSH_BODY: &str = "Revisa las nuevas ofertas disponibles";

const DEFAULT_TAG: &str = "general-notification";
const ICON: &str = "/shared/img/icon-192x192.png";
const IMAGE: &str = "/shared/img/icon-abeja-sola.png";

/// Payload sent by the push service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub tag: Option<String>,
}

/// Decode a push payload. Missing, malformed or untitled payloads get the
/// default title and body.
pub fn decode_payload(raw: Option<&str>) -> PushPayload {
    let decoded = raw
        .map(serde_json::from_str::<PushPayload>)
        .transpose()
        .map_err(|e| e.to_string())
        .and_then(|p| match p {
            Some(p) if p.title.as_deref().is_some_and(|t| !t.is_empty()) => Ok(p),
            _ => Err("missing title".to_string()),
        });

    match decoded {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "push payload rejected");
            PushPayload {
                title: Some(DEFAULT_PUSH_TITLE.to_string()),
                body: Some(DEFAULT_PUSH_BODY.to_string()),
                ..Default::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    pub url: String,
    pub force_refresh: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub image: String,
    pub data: NotificationData,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    pub tag: String,
    pub renotify: bool,
    pub require_interaction: bool,
}

/// What a notification click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClickOutcome {
    /// `FORCE_REFRESH` posted to an open page.
    Refreshed { client_id: String },
    /// Refresh requested but no matching page is open, or nothing was shown.
    Ignored,
    Focused { client_id: String },
    Opened { client_id: String },
}

impl ServiceWorker {
    /// Build and show a notification for a push payload.
    pub async fn push(&self, raw: Option<&str>) -> Notification {
        let config = self.engine.config();
        let payload = decode_payload(raw);
        let place = self.context.locality().unwrap_or("tu barrio");

        let notification = Notification {
            title: payload.title.unwrap_or_else(|| DEFAULT_PUSH_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| format!("Nuevas ofertas disponibles en {place}")),
            icon: config.full_path(ICON),
            badge: config.full_path(ICON),
            image: payload.image.unwrap_or_else(|| config.full_path(IMAGE)),
            data: NotificationData {
                url: payload.url.unwrap_or_else(|| config.full_path("/")),
                force_refresh: true,
                timestamp: self.engine.now_ms(),
            },
            vibrate: vec![200, 100, 200],
            actions: vec![
                NotificationAction { action: "open".into(), title: "Abrir App".into() },
                NotificationAction { action: "refresh".into(), title: "Actualizar".into() },
            ],
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            renotify: true,
            require_interaction: true,
        };

        tracing::info!(title = %notification.title, tag = %notification.tag, "notification shown");
        let mut shown = self.notifications.write().await;
        // Same tag replaces the previous notification.
        shown.retain(|n| n.tag != notification.tag);
        shown.push(notification.clone());
        notification
    }

    /// Notifications currently shown.
    pub async fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }

    /// Close a notification (by tag, else the latest) and react to the click.
    pub async fn notification_click(&self, tag: Option<&str>, action: Option<&str>) -> ClickOutcome {
        let notification = {
            let mut shown = self.notifications.write().await;
            let index = match tag {
                Some(tag) => shown.iter().position(|n| n.tag == tag),
                None => shown.len().checked_sub(1),
            };
            index.map(|i| shown.remove(i))
        };

        let Some(notification) = notification else {
            tracing::warn!(?tag, "click on unknown notification");
            return ClickOutcome::Ignored;
        };

        let clients = self.engine.clients();
        let target = notification.data.url;
        let existing = clients.find_by_url(&target).await;

        if action == Some("refresh") {
            return match existing {
                Some(client) => {
                    clients.post(&client.id, WorkerMessage::ForceRefresh).await;
                    ClickOutcome::Refreshed { client_id: client.id }
                }
                None => ClickOutcome::Ignored,
            };
        }

        match existing {
            Some(client) => {
                clients.focus(&client.id).await;
                clients
                    .post(
                        &client.id,
                        WorkerMessage::NotificationClicked {
                            url: Some(target),
                            force_refresh: notification.data.force_refresh,
                        },
                    )
                    .await;
                ClickOutcome::Focused { client_id: client.id }
            }
            None => {
                let url = self
                    .engine
                    .resolve(&target)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| target.clone());
                let client = clients.open_window(&url, true).await;
                clients.focus(&client.id).await;
                clients
                    .post(&client.id, WorkerMessage::NotificationClicked { url: None, force_refresh: true })
                    .await;
                tracing::info!(id = %client.id, url = %url, "window opened from notification");
                ClickOutcome::Opened { client_id: client.id }
            }
        }
    }
}
