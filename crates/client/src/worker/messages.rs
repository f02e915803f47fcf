//! Control channel message types.
//!
//! Both directions are JSON objects tagged by `type`, e.g.
//! `{"type":"REFRESH_CONTENT","localidad":"castelar"}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use barrio_core::Error;

/// Page → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting worker now.
    SkipWaiting,
    /// Wipe the api, business and dynamic partitions.
    CleanCache,
    GetContext,
    RefreshContent {
        #[serde(default)]
        localidad: Option<String>,
    },
    CacheResource {
        url: String,
        /// Accepted for compatibility; storage follows classification.
        #[serde(default)]
        strategy: Option<String>,
    },
    RefreshBusinessData {
        #[serde(default)]
        localidad: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Refresh whatever pages are open.
    PageFocus,
    GetCacheStatus,
}

impl ControlMessage {
    /// Decode a raw message. Unknown or malformed types are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        serde_json::from_value(value).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Lifecycle and cache counters reported by `GET_CACHE_STATUS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub lifecycle: String,
    pub context: String,
    pub precache_complete: bool,
    pub last_update: i64,
    pub start_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Entry count per current partition.
    pub sizes: BTreeMap<String, u64>,
    /// Freshness records, partition → url → last fetch (ms).
    pub timestamps: BTreeMap<String, BTreeMap<String, i64>>,
    pub state: WorkerStatus,
    pub total_items: u64,
}

/// Worker → page: replies and broadcast notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    SwInstalled {
        version: String,
        context: String,
        precache_complete: bool,
    },
    SwActivated {
        version: String,
        context: String,
        message: String,
    },
    CacheCleared,
    CacheHit {
        strategy: String,
        url: String,
    },
    CacheMiss {
        strategy: String,
        url: String,
    },
    ContentRefreshed,
    ForceRefresh,
    CleanLocalStorage,
    NotificationClicked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        force_refresh: bool,
    },
    CacheCleaned,
    AppContext {
        context: String,
        version: String,
        environment: String,
        base_path: String,
        precache_complete: bool,
    },
    CacheResult {
        success: bool,
    },
    BusinessDataRefreshed,
    CacheStatus {
        status: CacheStatus,
        context: String,
    },
}
