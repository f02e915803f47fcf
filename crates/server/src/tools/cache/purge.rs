//! cache_purge tool implementation.
//!
//! Clears a current partition, drops partitions of other versions, or both.

use barrio_client::ServiceWorker;
use barrio_core::Partition;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Empty this partition of the current version.
    #[serde(default)]
    pub partition: Option<Partition>,

    /// Delete every partition that does not belong to the current version.
    #[serde(default)]
    pub stale_versions: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Entries removed from the cleared partition.
    pub deleted_entries: u64,
    /// Storage names of the dropped partitions.
    pub deleted_partitions: Vec<String>,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(worker: &ServiceWorker, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.partition.is_none() && !params.stale_versions {
        return Err(ToolError::InvalidInput("one of partition or stale_versions must be specified".into()).into());
    }

    let engine = worker.engine();
    let mut output = CachePurgeOutput { deleted_entries: 0, deleted_partitions: Vec::new() };

    if let Some(partition) = params.partition {
        let name = engine.partition_name(partition);
        output.deleted_entries = engine.db().clear_partition(&name).await?;
        engine.tracker().clear(partition).await;
        tracing::info!(partition = %name, deleted = output.deleted_entries, "partition purged");
    }

    if params.stale_versions {
        let current = engine.config().current_partition_names();
        for name in engine.db().partition_names().await? {
            if !current.contains(&name) && engine.db().delete_partition(&name).await? {
                tracing::info!(partition = %name, "stale partition dropped");
                output.deleted_partitions.push(name);
            }
        }
    }

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::tools::testing::{output, worker};
    use barrio_core::CacheEntry;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry { url: url.into(), status: 200, headers: BTreeMap::new(), body: b"x".to_vec(), inserted_at: 1 }
    }

    #[tokio::test]
    async fn test_purge_partition_and_stale_versions() {
        let worker = worker().await;
        let db = worker.engine().db();
        db.put("dynamic-v60-multi", &entry("https://www.tubarrioaunclik.com/a")).await.unwrap();
        db.put("dynamic-v60-multi", &entry("https://www.tubarrioaunclik.com/b")).await.unwrap();
        db.put("dynamic-v58", &entry("https://www.tubarrioaunclik.com/a")).await.unwrap();

        let params = CachePurgeParams { partition: Some(Partition::Dynamic), stale_versions: true };
        let out = output(&purge_impl(&worker, params).await.unwrap());

        assert_eq!(out["deleted_entries"], 2);
        assert_eq!(out["deleted_partitions"], serde_json::json!(["dynamic-v58"]));
        assert_eq!(db.entry_count("dynamic-v60-multi").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_no_params() {
        let worker = worker().await;
        let params = CachePurgeParams { partition: None, stale_versions: false };
        assert!(purge_impl(&worker, params).await.is_err());
    }
}
