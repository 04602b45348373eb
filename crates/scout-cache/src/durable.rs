//! Durable tier abstraction.
//!
//! The memory tier is authoritative; the durable tier is a write-behind
//! mirror consulted on a memory miss and on cold start.

use crate::error::CacheError;

/// One persisted cache row. `value` holds serde_json text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableEntry {
    pub key: String,
    pub value: String,
    /// Epoch milliseconds. `None` never expires.
    pub expire_at: Option<i64>,
}

impl DurableEntry {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at.is_some_and(|at| now_millis >= at)
    }
}

/// Backing store for the durable cache tier.
pub trait DurableStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<DurableEntry>, CacheError>;

    /// Insert or replace the row for `entry.key`.
    fn store(&self, entry: &DurableEntry) -> Result<(), CacheError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    fn clear(&self) -> Result<(), CacheError>;

    /// Keys starting with `prefix` that are still live at `now_millis`.
    fn keys_with_prefix(&self, prefix: &str, now_millis: i64)
        -> Result<Vec<String>, CacheError>;

    /// Delete every row expired at `now_millis`, returning how many were removed.
    fn purge_expired(&self, now_millis: i64) -> Result<usize, CacheError>;

    fn count(&self) -> Result<usize, CacheError>;

    /// Human-readable location, reported by cache stats.
    fn location(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry() {
        let entry = DurableEntry {
            key: "k".to_string(),
            value: "1".to_string(),
            expire_at: Some(100_500),
        };
        assert!(!entry.is_expired(100_499));
        assert!(entry.is_expired(100_500));

        let forever = DurableEntry {
            expire_at: None,
            ..entry
        };
        assert!(!forever.is_expired(i64::MAX));
    }
}
