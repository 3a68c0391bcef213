//! TTL cache for memoized delay, timing and offset results.
//!
//! Expiry is checked lazily on every read, so an expired entry is never
//! returned even if it has not been swept yet. `purge_expired` physically
//! removes expired entries and is driven by the synchronizer's maintenance
//! pass rather than one timer per entry.
//!
//! The cache owns no clock. Every call takes `now` from the caller's
//! `TimeSource`, the same clock that ages sync status records.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// Which memoized result family a cache holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Pairwise propagation delays
    Delay,
    /// Consensus timing per validator set
    Timing,
    /// Per-node clock offsets
    Offset,
}

impl CacheKind {
    pub fn label(&self) -> &'static str {
        match self {
            CacheKind::Delay => "delay",
            CacheKind::Timing => "timing",
            CacheKind::Offset => "offset",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Outcome of a cache lookup that distinguishes expired from absent.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheLookup<V> {
    /// Entry present and within its TTL
    Fresh(V),
    /// Entry present but past its TTL; `age` is time since insertion
    Expired { value: V, age: Duration },
    /// No entry for the key
    Missing,
}

/// Key/value store whose entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a fresh value. Expired entries read as a miss.
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<V> {
        match self.lookup(key, now) {
            CacheLookup::Fresh(value) => Some(value),
            CacheLookup::Expired { .. } | CacheLookup::Missing => None,
        }
    }

    /// Look up a key, reporting whether a present entry has expired.
    pub fn lookup(&self, key: &K, now: DateTime<Utc>) -> CacheLookup<V> {
        let entries = self.entries.read();
        match entries.get(key) {
            None => CacheLookup::Missing,
            Some(entry) if now < entry.expires_at => CacheLookup::Fresh(entry.value.clone()),
            Some(entry) => CacheLookup::Expired {
                value: entry.value.clone(),
                age: now
                    .signed_duration_since(entry.inserted_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO),
            },
        }
    }

    /// Insert with the cache's default TTL, replacing any previous entry.
    pub fn insert(&self, key: K, value: V, now: DateTime<Utc>) {
        self.insert_with_ttl(key, value, self.ttl, now);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration, now: DateTime<Utc>) {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.write().insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at,
            },
        );
    }

    /// Physically remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Snapshot of all fresh entries.
    pub fn fresh_entries(&self, now: DateTime<Utc>) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| now < entry.expires_at)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
