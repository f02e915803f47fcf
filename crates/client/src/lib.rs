//! Offline cache engine for the barrio directory sites.
//!
//! This crate provides the network seam, the per-class fetch strategies and
//! the worker that drives them, shared by the server and CLI.

pub mod engine;
pub mod fetch;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use engine::{CacheEngine, ResponseSource, SiteRequest, SiteResponse};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, Fetcher};
pub use strategy::{FallbackKind, Strategy};
pub use worker::{
    ClickOutcome, ClientRegistry, ControlMessage, Notification, ServiceWorker, WindowClient, WorkerMessage, WorkerState,
};
