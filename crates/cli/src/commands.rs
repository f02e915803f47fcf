use std::fmt::Write;

use anyhow::Result;
use barrio_core::{AppConfig, CacheDb, Partition};
use chrono::NaiveDate;

pub fn sitemap(config: &AppConfig, base_url: &str, date: NaiveDate) -> String {
    barrio_core::sitemap::generate(base_url, &config.localities, &config.sitemap_pages, date)
}

/// One line per stored partition, current version first.
pub async fn status(config: &AppConfig, db: &CacheDb) -> Result<String> {
    let current = config.current_partition_names();
    let mut out = String::new();
    let mut total = 0;

    for name in &current {
        let count = db.entry_count(name).await?;
        total += count;
        writeln!(out, "{name:<24} {count:>6}")?;
    }

    for name in db.partition_names().await? {
        if current.contains(&name) {
            continue;
        }
        let count = db.entry_count(&name).await?;
        let note = if Partition::from_storage_name(&name).is_some() { "stale" } else { "unknown" };
        writeln!(out, "{name:<24} {count:>6}  ({note})")?;
    }

    writeln!(out, "{:<24} {total:>6}", format!("total ({})", config.cache_version))?;
    Ok(out)
}

/// Partitions from other versions, deleted unless `dry_run`.
pub async fn purge(config: &AppConfig, db: &CacheDb, dry_run: bool) -> Result<Vec<String>> {
    let current = config.current_partition_names();
    let mut stale = Vec::new();

    for name in db.partition_names().await? {
        if current.contains(&name) {
            continue;
        }
        if !dry_run {
            db.delete_partition(&name).await?;
            tracing::info!(partition = %name, "partition deleted");
        }
        stale.push(name);
    }

    Ok(stale)
}
