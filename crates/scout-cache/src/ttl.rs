//! Two-tier TTL cache.
//!
//! Memory tier: a fixed number of `Mutex<HashMap>` shards, a key always
//! maps to the same shard, so operations on one key are serialized while
//! different shards proceed independently. Durable tier: optional
//! `DurableStore`, written while the shard lock is held so both tiers see
//! writes to a key in the same order.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use scout_core::config::CacheConfig;
use scout_core::Timestamp;

use crate::clock::{Clock, SystemClock};
use crate::durable::{DurableEntry, DurableStore};
use crate::error::CacheError;

/// A single memory-tier entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    /// Epoch milliseconds. `None` never expires.
    pub expire_at: Option<i64>,
}

impl CacheEntry {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expire_at.is_some_and(|at| now_millis >= at)
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    /// `None` when no durable tier is configured or it could not be read.
    pub durable_entries: Option<usize>,
    pub durable_location: Option<String>,
}

type Shard = HashMap<String, CacheEntry>;

pub struct TtlCache {
    shards: Vec<Mutex<Shard>>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    /// Applied when `set` is called without a TTL. `None` never expires.
    default_ttl: Option<Duration>,
}

impl TtlCache {
    /// Memory-only cache with the system clock and no default expiry.
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            durable: None,
            clock: Arc::new(SystemClock),
            default_ttl: None,
        }
    }

    /// Build a cache from the `[cache]` config section.
    pub fn from_config(config: &CacheConfig, durable: Option<Arc<dyn DurableStore>>) -> Self {
        let mut cache = Self::new(config.shards).with_default_ttl(config.default_ttl_secs);
        if let Some(store) = durable {
            cache = cache.with_durable(store);
        }
        cache
    }

    pub fn with_durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        info!(location = %store.location(), "Durable cache tier attached");
        self.durable = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Default TTL in seconds. 0 means entries never expire.
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Store `value` under `key`, replacing any previous entry.
    ///
    /// `ttl` of `None` uses the cache default; a zero TTL never expires.
    /// A durable-tier failure is logged and the memory write still stands.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut shard = self.lock_shard(key)?;
        let entry = CacheEntry {
            value,
            expire_at: self.expiry_for(ttl),
        };
        self.mirror(key, &entry);
        shard.insert(key.to_string(), entry);
        Ok(())
    }

    /// Look up `key`. Expired entries are removed from both tiers and read
    /// as a miss. A durable hit is promoted into memory.
    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut shard = self.lock_shard(key)?;
        Ok(self.live_entry(&mut shard, key).map(|entry| entry.value.clone()))
    }

    /// `get` with a fallback for a miss.
    pub fn get_or(&self, key: &str, default: Value) -> Result<Value, CacheError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.set(key, serde_json::to_value(value)?, ttl)
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write of one key under its shard lock.
    ///
    /// `f` sees the live value (after expiry and promotion) and returns the
    /// value to store, or `None` to leave the key untouched, plus a result
    /// handed back to the caller.
    pub fn update<F, R>(&self, key: &str, ttl: Option<Duration>, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(Option<&Value>) -> (Option<Value>, R),
    {
        let mut shard = self.lock_shard(key)?;
        let current = self.live_entry(&mut shard, key).map(|entry| entry.value.clone());
        let (next, result) = f(current.as_ref());
        if let Some(value) = next {
            let entry = CacheEntry {
                value,
                expire_at: self.expiry_for(ttl),
            };
            self.mirror(key, &entry);
            shard.insert(key.to_string(), entry);
        }
        Ok(result)
    }

    /// Remove `key` from both tiers. Absent keys are fine.
    pub fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut shard = self.lock_shard(key)?;
        shard.remove(key);
        self.durable_remove(key);
        debug!(key, "Cache entry deleted");
        Ok(())
    }

    /// Remove every key from both tiers.
    pub fn clear(&self) -> Result<(), CacheError> {
        // Hold every shard so no write lands between the memory and durable clear.
        let mut guards = Vec::with_capacity(self.shards.len());
        for (index, shard) in self.shards.iter().enumerate() {
            guards.push(
                shard
                    .lock()
                    .map_err(|e| CacheError::LockPoisoned(format!("shard {}: {}", index, e)))?,
            );
        }
        for guard in guards.iter_mut() {
            guard.clear();
        }
        if let Some(store) = &self.durable {
            if let Err(e) = store.clear() {
                warn!(error = %e, "Failed to clear durable cache tier");
            }
        }
        info!("Cache cleared");
        Ok(())
    }

    /// Live keys with the given prefix across both tiers, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = self.clock.now_millis();
        let mut keys = BTreeSet::new();
        for (index, shard) in self.shards.iter().enumerate() {
            let shard = shard
                .lock()
                .map_err(|e| CacheError::LockPoisoned(format!("shard {}: {}", index, e)))?;
            keys.extend(
                shard
                    .iter()
                    .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
                    .map(|(key, _)| key.clone()),
            );
        }
        if let Some(store) = &self.durable {
            match store.keys_with_prefix(prefix, now) {
                Ok(durable_keys) => keys.extend(durable_keys),
                Err(e) => warn!(prefix, error = %e, "Durable key scan failed"),
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Drop expired entries from both tiers, returning the memory-tier count removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            let mut shard = shard
                .lock()
                .map_err(|e| CacheError::LockPoisoned(format!("shard {}: {}", index, e)))?;
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired(now));
            removed += before - shard.len();
        }
        if let Some(store) = &self.durable {
            match store.purge_expired(now) {
                Ok(count) => debug!(count, "Purged expired durable entries"),
                Err(e) => warn!(error = %e, "Failed to purge durable cache tier"),
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut memory_entries = 0;
        for (index, shard) in self.shards.iter().enumerate() {
            let shard = shard
                .lock()
                .map_err(|e| CacheError::LockPoisoned(format!("shard {}: {}", index, e)))?;
            memory_entries += shard.len();
        }
        let (durable_entries, durable_location) = match &self.durable {
            Some(store) => {
                let count = store
                    .count()
                    .map_err(|e| warn!(error = %e, "Failed to count durable entries"))
                    .ok();
                (count, Some(store.location()))
            }
            None => (None, None),
        };
        Ok(CacheStats {
            memory_entries,
            durable_entries,
            durable_location,
        })
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn lock_shard(&self, key: &str) -> Result<MutexGuard<'_, Shard>, CacheError> {
        let index = self.shard_index(key);
        self.shards[index]
            .lock()
            .map_err(|e| CacheError::LockPoisoned(format!("shard {}: {}", index, e)))
    }

    fn expiry_for(&self, ttl: Option<Duration>) -> Option<i64> {
        let ttl = match ttl {
            Some(ttl) if ttl.is_zero() => return None,
            Some(ttl) => ttl,
            None => self.default_ttl?,
        };
        // Sub-millisecond remainders round up so an entry never expires early.
        let millis = i64::try_from(ttl.as_nanos().div_ceil(1_000_000)).unwrap_or(i64::MAX);
        Some(self.clock.now_millis().saturating_add(millis))
    }

    /// Resolve `key` inside an already locked shard.
    fn live_entry<'a>(&self, shard: &'a mut Shard, key: &str) -> Option<&'a CacheEntry> {
        let now = self.clock.now_millis();

        if let Some(entry) = shard.get(key) {
            if entry.is_expired(now) {
                debug!(key, "Cache entry expired");
                shard.remove(key);
                self.durable_remove(key);
                return None;
            }
            debug!(key, tier = "memory", "Cache hit");
            return shard.get(key);
        }

        let promoted = self.durable_load(key, now)?;
        debug!(key, tier = "durable", "Cache hit, promoting to memory");
        shard.insert(key.to_string(), promoted);
        shard.get(key)
    }

    fn durable_load(&self, key: &str, now: i64) -> Option<CacheEntry> {
        let store = self.durable.as_ref()?;
        let row = match store.load(key) {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Durable cache read failed, treating as miss");
                return None;
            }
        };
        if row.is_expired(now) {
            debug!(key, "Durable cache entry expired");
            self.durable_remove(key);
            return None;
        }
        match serde_json::from_str(&row.value) {
            Ok(value) => Some(CacheEntry {
                value,
                expire_at: row.expire_at,
            }),
            Err(e) => {
                warn!(key, error = %e, "Corrupt durable cache row, discarding");
                self.durable_remove(key);
                None
            }
        }
    }

    fn mirror(&self, key: &str, entry: &CacheEntry) {
        let Some(store) = &self.durable else {
            return;
        };
        let row = match serde_json::to_string(&entry.value) {
            Ok(value) => DurableEntry {
                key: key.to_string(),
                value,
                expire_at: entry.expire_at,
            },
            Err(e) => {
                warn!(key, error = %e, "Cache value not serializable, memory tier only");
                return;
            }
        };
        if let Err(e) = store.store(&row) {
            warn!(key, error = %e, "Durable cache write failed, memory tier only");
        }
    }

    fn durable_remove(&self, key: &str) {
        if let Some(store) = &self.durable {
            if let Err(e) = store.remove(key) {
                warn!(key, error = %e, "Durable cache delete failed");
            }
        }
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("shards", &self.shards.len())
            .field("durable", &self.durable.as_ref().map(|s| s.location()))
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
