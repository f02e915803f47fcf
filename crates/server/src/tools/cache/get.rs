//! cache_get tool implementation.
//!
//! Looks up a stored response by URL in the current partitions.

use std::collections::BTreeMap;

use barrio_client::ServiceWorker;
use barrio_core::Partition;
use chrono::DateTime;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Stored URL, absolute or a site path.
    pub url: String,

    /// Only look in this partition (default: all current partitions).
    #[serde(default)]
    pub partition: Option<Partition>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub partition: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body_bytes: usize,
    /// ISO8601 insertion time.
    pub inserted_at: Option<String>,
    /// Whether the freshness record is still within its TTL.
    pub fresh: bool,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let engine = worker.engine();
    let url = engine
        .resolve(&params.url)
        .map_err(|e| ToolError::InvalidInput(format!("{}: {e}", params.url)))?;

    let partitions = match params.partition {
        Some(p) => vec![p],
        None => Partition::ALL.to_vec(),
    };

    for partition in partitions {
        let name = engine.partition_name(partition);
        if let Some(entry) = engine.db().match_in(&name, url.as_str()).await? {
            let output = CacheGetOutput {
                partition: name,
                url: entry.url,
                status: entry.status,
                headers: entry.headers,
                body_bytes: entry.body.len(),
                inserted_at: DateTime::from_timestamp_millis(entry.inserted_at).map(|t| t.to_rfc3339()),
                fresh: engine.tracker().is_fresh(url.as_str(), partition).await,
            };
            return json_result(&output);
        }
    }

    Err(ToolError::CacheMiss(url.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{output, worker};
    use barrio_core::CacheEntry;

    #[tokio::test]
    async fn test_get_missing() {
        let worker = worker().await;
        let params = CacheGetParams { url: "/nothing-here".into(), partition: None };
        assert!(get_impl(&worker, params).await.is_err());
    }

    #[tokio::test]
    async fn test_get_found() {
        let worker = worker().await;
        let entry = CacheEntry {
            url: "https://www.tubarrioaunclik.com/castelar/data/farmacias.json".into(),
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: b"[]".to_vec(),
            inserted_at: 1_700_000_000_000,
        };
        worker.engine().db().put("business-v60-multi", &entry).await.unwrap();

        let params = CacheGetParams { url: "/castelar/data/farmacias.json".into(), partition: None };
        let out = output(&get_impl(&worker, params).await.unwrap());

        assert_eq!(out["partition"], "business-v60-multi");
        assert_eq!(out["body_bytes"], 2);
        assert_eq!(out["fresh"], false);
        assert_eq!(out["inserted_at"], "2023-11-14T22:13:20+00:00");

        let params = CacheGetParams { url: "/castelar/data/farmacias.json".into(), partition: Some(Partition::Api) };
        assert!(get_impl(&worker, params).await.is_err());
    }
}
