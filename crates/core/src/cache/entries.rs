//! Partition and entry operations.
//!
//! Mirrors the browser Cache Storage surface: open a named partition, put a
//! response under a request URL, match it back, list keys, delete.

use std::collections::BTreeMap;

use super::connection::CacheDb;
use super::hash::compute_entry_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response.
///
/// Owned by exactly one partition; overwritten on re-fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub inserted_at: i64,
}

impl CacheEntry {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// Request URL plus insertion time, used for eviction ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAge {
    pub url: String,
    pub inserted_at: i64,
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, i64, String, Vec<u8>, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_entry(raw: (String, i64, String, Vec<u8>, i64)) -> Result<CacheEntry, Error> {
    let (url, status, headers_json, body, inserted_at) = raw;
    let headers: BTreeMap<String, String> =
        serde_json::from_str(&headers_json).map_err(|e| Error::CorruptEntry(format!("{url}: {e}")))?;
    let status = u16::try_from(status).map_err(|_| Error::CorruptEntry(format!("{url}: status {status}")))?;
    Ok(CacheEntry { url, status, headers, body, inserted_at })
}

fn decode_count(partition: &str, count: i64) -> Result<u64, Error> {
    u64::try_from(count).map_err(|_| Error::CorruptEntry(format!("{partition}: count {count}")))
}

fn query_entry(conn: &rusqlite::Connection, partition: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
    let mut stmt = conn.prepare(
        "SELECT url, status, headers_json, body, inserted_at FROM entries WHERE key_hash = ?1",
    )?;
    match stmt.query_row(params![compute_entry_key(partition, url)], row_to_entry) {
        Ok(raw) => decode_entry(raw).map(Some),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl CacheDb {
    /// Create a partition if it doesn't exist yet.
    pub async fn open_partition(&self, name: &str, now_ms: i64) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![name, now_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List every partition in storage, oldest first.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition and all of its entries.
    ///
    /// Returns false if the partition didn't exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                conn.execute("DELETE FROM entries WHERE partition = ?1", params![&name])?;
                let count = conn.execute("DELETE FROM partitions WHERE name = ?1", params![&name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Store an entry, replacing any previous entry for the same URL.
    ///
    /// Opens the partition lazily.
    pub async fn put(&self, partition: &str, entry: &CacheEntry) -> Result<(), Error> {
        let partition = partition.to_string();
        let entry = entry.clone();
        let headers_json =
            serde_json::to_string(&entry.headers).map_err(|e| Error::InvalidInput(format!("headers: {e}")))?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![&partition, entry.inserted_at],
                )?;
                conn.execute(
                    "INSERT INTO entries (key_hash, partition, url, status, headers_json, body, inserted_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(key_hash) DO UPDATE SET
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        inserted_at = excluded.inserted_at",
                    params![
                        compute_entry_key(&partition, &entry.url),
                        &partition,
                        &entry.url,
                        entry.status as i64,
                        headers_json,
                        &entry.body,
                        entry.inserted_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a URL in one partition.
    pub async fn match_in(&self, partition: &str, url: &str) -> Result<Option<CacheEntry>, Error> {
        let partition = partition.to_string();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> { query_entry(conn, &partition, &url) })
            .await
            .map_err(Error::from)
    }

    /// Look up a URL across several partitions, first match wins.
    pub async fn match_any(&self, partitions: &[String], url: &str) -> Result<Option<CacheEntry>, Error> {
        let partitions = partitions.to_vec();
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                for partition in &partitions {
                    if let Some(entry) = query_entry(conn, partition, &url)? {
                        return Ok(Some(entry));
                    }
                }
                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Request URLs stored in a partition, oldest first.
    pub async fn keys(&self, partition: &str) -> Result<Vec<String>, Error> {
        Ok(self.keys_with_age(partition).await?.into_iter().map(|k| k.url).collect())
    }

    /// Request URLs with their insertion time, oldest first.
    pub async fn keys_with_age(&self, partition: &str) -> Result<Vec<EntryAge>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryAge>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, inserted_at FROM entries WHERE partition = ?1 ORDER BY inserted_at ASC, url ASC",
                )?;
                let keys = stmt
                    .query_map(params![partition], |row| Ok(EntryAge { url: row.get(0)?, inserted_at: row.get(1)? }))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one entry. Returns false if it wasn't there.
    pub async fn delete(&self, partition: &str, url: &str) -> Result<bool, Error> {
        let key = compute_entry_key(partition, url);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM entries WHERE key_hash = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a partition.
    pub async fn entry_count(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![partition], |row| {
                        row.get(0)
                    })?;
                decode_count(&partition, count)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove every entry in a partition, keeping the partition itself.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_partition(&self, partition: &str) -> Result<u64, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM entries WHERE partition = ?1", params![partition])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(url: &str, body: &[u8], inserted_at: i64) -> CacheEntry {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        CacheEntry { url: url.to_string(), status: 200, headers, body: body.to_vec(), inserted_at }
    }

    #[test]
    fn test_decode_count_rejects_negative() {
        assert_eq!(decode_count("api-v60-multi", 7).unwrap(), 7);
        assert!(matches!(decode_count("api-v60-multi", -1), Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_put_and_match_byte_identical() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let body: Vec<u8> = (0u8..=255).collect();
        let entry = make_entry("https://example.com/castelar/data/farmacias.json", &body, 1_000);

        db.put("business-v60-multi", &entry).await.unwrap();

        let matched = db
            .match_in("business-v60-multi", &entry.url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(matched, entry);
        assert_eq!(matched.body, body);
        assert_eq!(matched.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.match_in("api-v60-multi", "https://example.com/nope").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &make_entry("https://e.com/api/a", b"old", 1)).await.unwrap();
        db.put("api-v1", &make_entry("https://e.com/api/a", b"new", 2)).await.unwrap();

        let matched = db.match_in("api-v1", "https://e.com/api/a").await.unwrap().unwrap();
        assert_eq!(matched.body, b"new");
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("static-v59", &make_entry("https://e.com/index.html", b"v59", 1)).await.unwrap();
        db.put("static-v60", &make_entry("https://e.com/index.html", b"v60", 2)).await.unwrap();

        assert_eq!(db.match_in("static-v59", "https://e.com/index.html").await.unwrap().unwrap().body, b"v59");
        assert_eq!(db.match_in("static-v60", "https://e.com/index.html").await.unwrap().unwrap().body, b"v60");
    }

    #[tokio::test]
    async fn test_match_any_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("assets-v1", &make_entry("https://e.com/x.png", b"assets", 1)).await.unwrap();
        db.put("static-v1", &make_entry("https://e.com/x.png", b"static", 1)).await.unwrap();

        let order = vec!["static-v1".to_string(), "assets-v1".to_string()];
        let hit = db.match_any(&order, "https://e.com/x.png").await.unwrap().unwrap();
        assert_eq!(hit.body, b"static");

        let only_dynamic = vec!["dynamic-v1".to_string()];
        assert!(db.match_any(&only_dynamic, "https://e.com/x.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_ordered_by_age_and_delete() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("dynamic-v1", &make_entry("https://e.com/b", b"", 20)).await.unwrap();
        db.put("dynamic-v1", &make_entry("https://e.com/a", b"", 10)).await.unwrap();

        assert_eq!(db.keys("dynamic-v1").await.unwrap(), vec!["https://e.com/a", "https://e.com/b"]);

        assert!(db.delete("dynamic-v1", "https://e.com/a").await.unwrap());
        assert!(!db.delete("dynamic-v1", "https://e.com/a").await.unwrap());
        assert_eq!(db.keys("dynamic-v1").await.unwrap(), vec!["https://e.com/b"]);
    }

    #[tokio::test]
    async fn test_partition_lifecycle() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_partition("static-v59", 1).await.unwrap();
        db.open_partition("static-v60-multi", 2).await.unwrap();
        db.open_partition("static-v60-multi", 3).await.unwrap();
        db.put("static-v59", &make_entry("https://e.com/", b"", 1)).await.unwrap();

        assert_eq!(db.partition_names().await.unwrap(), vec!["static-v59", "static-v60-multi"]);

        assert!(db.delete_partition("static-v59").await.unwrap());
        assert!(!db.delete_partition("static-v59").await.unwrap());
        assert_eq!(db.partition_names().await.unwrap(), vec!["static-v60-multi"]);
        assert_eq!(db.entry_count("static-v59").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_partition_keeps_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &make_entry("https://e.com/api/1", b"", 1)).await.unwrap();
        db.put("api-v1", &make_entry("https://e.com/api/2", b"", 2)).await.unwrap();

        assert_eq!(db.clear_partition("api-v1").await.unwrap(), 2);
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 0);
        assert_eq!(db.partition_names().await.unwrap(), vec!["api-v1"]);
    }
}
