//! LRU cache with lazy TTL expiry
//!
//! Recency is a monotonically increasing touch counter; a `BTreeMap` keyed by
//! that counter gives the least-recently-touched key in O(log n). Expiry is
//! checked on read and by an explicit purge, never by a background thread.

use crate::clock::Clock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: i64,
    expires_at: i64,
    touch: u64,
}

/// What happened to a key on lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Expired,
    Absent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub evictions: u64,
    pub expirations: u64,
}

pub struct TtlLruCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    recency: BTreeMap<u64, String>,
    next_touch: u64,
    max_size: usize,
    ttl_ms: u64,
    clock: Clock,
    counters: CacheCounters,
}

impl<V: Clone> TtlLruCache<V> {
    pub fn new(max_size: usize, ttl_ms: u64, clock: Clock) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_touch: 0,
            max_size: max_size.max(1),
            ttl_ms,
            clock,
            counters: CacheCounters::default(),
        }
    }

    fn bump(&mut self) -> u64 {
        self.next_touch += 1;
        self.next_touch
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.touch);
        Some(entry)
    }

    /// Insert or replace. Returns the keys evicted to make room.
    pub fn insert(&mut self, key: &str, value: V) -> Vec<String> {
        let now = self.now();
        let touch = self.bump();
        let expires_at = now.saturating_add(self.ttl_ms as i64);

        if let Some(old) = self.entries.get_mut(key) {
            self.recency.remove(&old.touch);
            old.value = value;
            old.stored_at = now;
            old.expires_at = expires_at;
            old.touch = touch;
            self.recency.insert(touch, key.to_string());
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while self.entries.len() >= self.max_size {
            let Some((_, lru_key)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&lru_key);
            evicted.push(lru_key);
        }
        self.counters.evictions += evicted.len() as u64;

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                expires_at,
                touch,
            },
        );
        self.recency.insert(touch, key.to_string());
        evicted
    }

    /// Look up and refresh recency. Expired entries are dropped here.
    pub fn get(&mut self, key: &str) -> Lookup<V> {
        let now = self.now();
        let expired = match self.entries.get(key) {
            None => return Lookup::Absent,
            Some(entry) => now >= entry.expires_at,
        };

        if expired {
            self.remove_entry(key);
            self.counters.expirations += 1;
            return Lookup::Expired;
        }

        let touch = self.bump();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.recency.remove(&entry.touch);
                entry.touch = touch;
                self.recency.insert(touch, key.to_string());
                Lookup::Hit(entry.value.clone())
            }
            None => Lookup::Absent,
        }
    }

    /// Live (unexpired) presence without touching recency.
    pub fn contains_live(&self, key: &str) -> bool {
        let now = self.now();
        self.entries
            .get(key)
            .is_some_and(|entry| now < entry.expires_at)
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        self.counters.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.remove_entry(key).map(|e| e.value)
    }

    /// Age of an entry in milliseconds, if present.
    pub fn age_ms(&self, key: &str) -> Option<i64> {
        let now = self.now();
        self.entries.get(key).map(|e| now - e.stored_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }
}
