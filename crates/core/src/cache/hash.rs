//! Entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key for a URL inside a partition.
///
/// The same URL in two partitions (e.g. two cache versions) yields two keys.
pub fn compute_entry_key(partition: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(partition.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_entry_key("business-v60-multi", "https://example.com/castelar/data/farmacias.json");
        let hash2 = compute_entry_key("business-v60-multi", "https://example.com/castelar/data/farmacias.json");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_partition() {
        let old = compute_entry_key("static-v59", "https://example.com/index.html");
        let new = compute_entry_key("static-v60-multi", "https://example.com/index.html");
        assert_ne!(old, new);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_entry_key("api-v60-multi", "https://example.com/api/x");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
