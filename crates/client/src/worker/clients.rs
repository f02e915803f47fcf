//! Open page clients and their message inboxes.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::messages::WorkerMessage;

/// A window the worker can message, focus or control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    pub focused: bool,
    /// Fetches from this page go through the worker.
    pub controlled: bool,
}

/// Inbox capacity of a registry built with `Default`.
const DEFAULT_INBOX_LIMIT: usize = 200;

struct Slot {
    client: WindowClient,
    inbox: VecDeque<WorkerMessage>,
}

impl Slot {
    /// Append, dropping the oldest messages beyond `limit`.
    fn push(&mut self, message: WorkerMessage, limit: usize) {
        if self.inbox.len() >= limit {
            let excess = self.inbox.len() + 1 - limit;
            self.inbox.drain(..excess);
            tracing::debug!(id = %self.client.id, dropped = excess, "inbox full, oldest messages dropped");
        }
        self.inbox.push_back(message);
    }
}

struct Registry {
    next_id: u64,
    inbox_limit: usize,
    slots: Vec<Slot>,
}

impl Registry {
    fn slot_mut(&mut self, id: &str) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.client.id == id)
    }
}

/// Shared registry of open windows.
#[derive(Clone)]
pub struct ClientRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_LIMIT)
    }
}

impl ClientRegistry {
    /// Registry whose inboxes keep at most `inbox_limit` messages (minimum one).
    pub fn new(inbox_limit: usize) -> Self {
        let registry = Registry { next_id: 0, inbox_limit: inbox_limit.max(1), slots: Vec::new() };
        Self { inner: Arc::new(RwLock::new(registry)) }
    }

    /// Register a newly opened window.
    pub async fn open_window(&self, url: &str, controlled: bool) -> WindowClient {
        let mut registry = self.inner.write().await;
        registry.next_id += 1;
        let client = WindowClient { id: format!("client-{}", registry.next_id), url: url.to_string(), focused: false, controlled };
        registry.slots.push(Slot { client: client.clone(), inbox: VecDeque::new() });
        tracing::debug!(id = %client.id, url, "client opened");
        client
    }

    pub async fn close(&self, id: &str) -> bool {
        let mut registry = self.inner.write().await;
        let before = registry.slots.len();
        registry.slots.retain(|s| s.client.id != id);
        registry.slots.len() != before
    }

    pub async fn get(&self, id: &str) -> Option<WindowClient> {
        let registry = self.inner.read().await;
        registry.slots.iter().find(|s| s.client.id == id).map(|s| s.client.clone())
    }

    /// Every open window, in opening order.
    pub async fn match_all(&self) -> Vec<WindowClient> {
        let registry = self.inner.read().await;
        registry.slots.iter().map(|s| s.client.clone()).collect()
    }

    /// First window whose URL contains `fragment`.
    pub async fn find_by_url(&self, fragment: &str) -> Option<WindowClient> {
        let registry = self.inner.read().await;
        registry
            .slots
            .iter()
            .find(|s| s.client.url.contains(fragment))
            .map(|s| s.client.clone())
    }

    /// Take control of every open window. Returns how many were newly claimed.
    pub async fn claim(&self) -> usize {
        let mut registry = self.inner.write().await;
        let mut claimed = 0;
        for slot in registry.slots.iter_mut().filter(|s| !s.client.controlled) {
            slot.client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Give focus to one window and take it from the rest.
    pub async fn focus(&self, id: &str) -> bool {
        let mut registry = self.inner.write().await;
        if registry.slot_mut(id).is_none() {
            return false;
        }
        for slot in registry.slots.iter_mut() {
            slot.client.focused = slot.client.id == id;
        }
        true
    }

    /// Queue a message for one window. False if the window is gone.
    pub async fn post(&self, id: &str, message: WorkerMessage) -> bool {
        let mut registry = self.inner.write().await;
        let limit = registry.inbox_limit;
        match registry.slot_mut(id) {
            Some(slot) => {
                slot.push(message, limit);
                true
            }
            None => false,
        }
    }

    /// Queue a message for every window. Returns the number reached.
    pub async fn notify_all(&self, message: WorkerMessage) -> usize {
        let mut registry = self.inner.write().await;
        let limit = registry.inbox_limit;
        for slot in registry.slots.iter_mut() {
            slot.push(message.clone(), limit);
        }
        registry.slots.len()
    }

    /// Drain a window's inbox. None if the window is unknown.
    pub async fn take_messages(&self, id: &str) -> Option<Vec<WorkerMessage>> {
        let mut registry = self.inner.write().await;
        registry.slot_mut(id).map(|slot| slot.inbox.drain(..).collect())
    }
}
