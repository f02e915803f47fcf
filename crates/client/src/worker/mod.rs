//! The offline worker: lifecycle, fetch interception, control channel,
//! client pages and push notifications around one [`CacheEngine`].

mod clients;
mod control;
mod lifecycle;
mod messages;
mod push;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::RwLock;

use barrio_core::{AppContext, Error};

pub use clients::{ClientRegistry, WindowClient};
pub use lifecycle::{ActivateReport, InstallReport, PrecacheFailure, PrecacheOutcome, WorkerState};
pub use messages::{CacheStatus, ControlMessage, WorkerMessage, WorkerStatus};
pub use push::{
    ClickOutcome, DEFAULT_PUSH_BODY, DEFAULT_PUSH_TITLE, Notification, NotificationAction, NotificationData, PushPayload,
};

use crate::engine::{CacheEngine, SiteRequest, SiteResponse};
use crate::fetch::same_origin;

/// One worker instance. Freshness and lifecycle state live only as long as it does.
pub struct ServiceWorker {
    engine: CacheEngine,
    context: AppContext,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    precache_complete: AtomicBool,
    last_update: AtomicI64,
    started_at: i64,
    notifications: RwLock<Vec<Notification>>,
}

impl ServiceWorker {
    pub fn new(engine: CacheEngine) -> Self {
        let config = engine.config();
        let context = engine.classifier().app_context(&config.full_path(&config.scope));
        let skip_waiting = config.skip_waiting_on_install;
        let now = engine.now_ms();

        tracing::info!(
            version = %config.cache_version,
            %context,
            environment = config.environment(),
            base_path = %config.base_path,
            "worker loaded"
        );

        Self {
            engine,
            context,
            state: RwLock::new(WorkerState::Installing),
            skip_waiting: AtomicBool::new(skip_waiting),
            precache_complete: AtomicBool::new(false),
            last_update: AtomicI64::new(now),
            started_at: now,
            notifications: RwLock::new(Vec::new()),
        }
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    /// Locality the worker was registered for, or the selector.
    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn precache_complete(&self) -> bool {
        self.precache_complete.load(Ordering::SeqCst)
    }

    /// Install, then activate right away when skip-waiting is set.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        let report = self.install().await?;
        tracing::info!(successful = report.successful(), failed = report.failed(), "install finished");
        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Intercept a page request.
    ///
    /// Returns `None` when the request passes straight through to the
    /// network: non-GET, cross-origin, unparsable, or the worker is not
    /// active yet.
    pub async fn handle_fetch(&self, request: &SiteRequest) -> Option<SiteResponse> {
        if !request.method.eq_ignore_ascii_case("GET") {
            return None;
        }

        let url = match self.engine.resolve(&request.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "not intercepted");
                return None;
            }
        };

        if !same_origin(&url, self.engine.origin()) {
            return None;
        }

        if self.state().await != WorkerState::Active {
            return None;
        }

        Some(self.engine.respond(&url, request.navigate).await)
    }

    /// Move `from → to`, failing if the worker is elsewhere.
    async fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(Error::InvalidState(format!("expected {from}, worker is {}", *state)));
        }
        *state = to;
        tracing::debug!(%from, %to, "lifecycle transition");
        Ok(())
    }

    async fn set_state(&self, to: WorkerState) {
        *self.state.write().await = to;
    }
}
