//! Concurrent map whose entries carry their own expiry.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Expiring key/value store shared across requests.
///
/// Expired entries are never returned. They are dropped lazily on read and in
/// bulk by [`purge_expired`](Self::purge_expired).
#[derive(Debug)]
pub struct ExpiringCache<V: Clone> {
    entries: DashMap<String, Slot<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Stores `value` for `ttl`. A zero TTL stores nothing.
    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key.into(),
            Slot {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be released before removing.
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    /// Returns the live value for `key`, computing and storing it with `ttl`
    /// when absent. `compute` runs at most once per key while an entry is live.
    ///
    /// # Errors
    ///
    /// Propagates the error of `compute`; nothing is stored in that case.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(occupied.get().value.clone());
                }
                let value = compute()?;
                occupied.insert(Slot {
                    value: value.clone(),
                    expires_at: now + ttl,
                });
                Ok(value)
            }
            Entry::Vacant(vacant) => {
                let value = compute()?;
                if !ttl.is_zero() {
                    vacant.insert(Slot {
                        value: value.clone(),
                        expires_at: now + ttl,
                    });
                }
                Ok(value)
            }
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
