//! Last-known-good payloads, served while fetches are failing.
//!
//! Entries are written only after a fetch fully succeeds. Reads never mutate:
//! expiry is a pure function of the read-time clock and the stored timestamp,
//! so an expired entry stays in place until overwritten or cleared.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::models::FetchKey;

/// Default maximum age of a usable fallback entry.
pub const DEFAULT_FALLBACK_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct Entry<T> {
    data: T,
    stored_at: Instant,
    fetched_at: DateTime<Utc>,
}

/// A cached payload returned by [`FallbackCache::get_cached_data`].
#[derive(Clone, Debug, PartialEq)]
pub struct CachedData<T> {
    pub data: T,
    /// Age at read time, on the monotonic clock.
    pub age: Duration,
    /// Wall-clock time the payload was fetched, for display.
    pub fetched_at: DateTime<Utc>,
}

/// Snapshot of the cache contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub keys: Vec<String>,
    pub oldest_age_secs: Option<u64>,
}

/// Per-key store of the last successful payload.
pub struct FallbackCache<T> {
    entries: Mutex<HashMap<FetchKey, Entry<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T: Clone> FallbackCache<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<FetchKey, Entry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Fallback cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Store `data` for `key`, replacing any previous entry.
    pub fn cache_data(&self, key: &FetchKey, data: T) {
        let entry = Entry {
            data,
            stored_at: self.clock.now(),
            fetched_at: Utc::now(),
        };
        self.lock_entries().insert(key.clone(), entry);
        debug!("Cached fallback data for '{}'", key);
    }

    /// Return the entry for `key` if it exists and is no older than `max_age`.
    pub fn get_cached_data(&self, key: &FetchKey, max_age: Duration) -> Option<CachedData<T>> {
        let now = self.clock.now();
        let entries = self.lock_entries();
        let entry = entries.get(key)?;

        let age = now.duration_since(entry.stored_at);
        if age > max_age {
            debug!(
                "Fallback data for '{}' is too old ({:.0}s > {:.0}s)",
                key,
                age.as_secs_f64(),
                max_age.as_secs_f64()
            );
            return None;
        }

        Some(CachedData {
            data: entry.data.clone(),
            age,
            fetched_at: entry.fetched_at,
        })
    }

    /// Remove the entry for `key`, or every entry when `key` is `None`.
    pub fn clear_cache(&self, key: Option<&FetchKey>) {
        let mut entries = self.lock_entries();
        match key {
            Some(key) => {
                if entries.remove(key).is_some() {
                    info!("Cleared fallback cache for '{}'", key);
                }
            }
            None => {
                entries.clear();
                info!("Cleared all fallback cache entries");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.lock_entries();

        let mut keys: Vec<String> = entries.keys().map(|k| k.to_string()).collect();
        keys.sort();

        CacheStats {
            entries: entries.len(),
            keys,
            oldest_age_secs: entries
                .values()
                .map(|entry| now.duration_since(entry.stored_at).as_secs())
                .max(),
        }
    }
}

impl<T: Clone> Default for FallbackCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
