// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Time-to-live cache shared by the plan cache and the result cache.
//!
//! Entries expire after a fixed TTL and the cache is bounded by an entry
//! count. On overflow, entries are evicted by insertion (or last touch)
//! time, either one at a time or by pruning the oldest half.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Remove the single oldest entry until the cache fits again.
    OldestEntry,
    /// Remove the oldest half of the entries in one sweep.
    OldestHalf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub capacity: usize,
    /// Refresh an entry's timestamp whenever it is read.
    pub touch_on_read: bool,
    pub eviction: EvictionPolicy,
}

impl CacheConfig {
    /// Ten minute TTL, refreshed on read, bounded to 1000 entries.
    pub fn plan_cache() -> Self {
        Self {
            ttl_ms: 600_000,
            capacity: 1000,
            touch_on_read: true,
            eviction: EvictionPolicy::OldestEntry,
        }
    }

    /// One minute TTL, bounded to 100 entries, pruned by halves.
    pub fn result_cache() -> Self {
        Self {
            ttl_ms: 60_000,
            capacity: 100,
            touch_on_read: false,
            eviction: EvictionPolicy::OldestHalf,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::plan_cache()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stamped_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self { value, stamped_at: Instant::now() }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.stamped_at.elapsed() >= ttl
    }

    fn touch(&mut self) {
        self.stamped_at = Instant::now();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    stats: CacheStats,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    config: CacheConfig,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a clone of the live value under `key`. Expired entries are
    /// dropped on access and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let ttl = self.config.ttl();
        let mut state = self.state.lock();
        let state = &mut *state;

        let expired = match state.entries.get_mut(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) if entry.is_expired(ttl) => true,
            Some(entry) => {
                if self.config.touch_on_read {
                    entry.touch();
                }
                state.stats.hits += 1;
                return Some(entry.value.clone());
            }
        };

        if expired {
            state.entries.remove(key);
            state.stats.expirations += 1;
            state.stats.entries = state.entries.len();
        }
        state.stats.misses += 1;
        None
    }

    /// Stores `value`, replacing any previous entry, and evicts by age if
    /// the cache grew past its capacity.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut state = self.state.lock();
        let previous = state.entries.insert(key, CacheEntry::new(value)).map(|entry| entry.value);

        if state.entries.len() > self.config.capacity {
            let evicted = Self::evict(&mut state.entries, self.config.capacity, self.config.eviction);
            state.stats.evictions += evicted as u64;
        }
        state.stats.entries = state.entries.len();
        previous
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let removed = state.entries.remove(key).map(|entry| entry.value);
        state.stats.entries = state.entries.len();
        removed
    }

    pub fn contains_key(&self, key: &K) -> bool {
        let ttl = self.config.ttl();
        self.state.lock().entries.get(key).is_some_and(|entry| !entry.is_expired(ttl))
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.stats.entries = 0;
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(ttl));
        let purged = before - state.entries.len();
        state.stats.expirations += purged as u64;
        state.stats.entries = state.entries.len();
        purged
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    fn evict(entries: &mut HashMap<K, CacheEntry<V>>, capacity: usize, policy: EvictionPolicy) -> usize {
        let mut by_age: Vec<(K, Instant)> = entries.iter().map(|(key, entry)| (key.clone(), entry.stamped_at)).collect();
        by_age.sort_by_key(|(_, stamped_at)| *stamped_at);

        let overflow = entries.len().saturating_sub(capacity);
        let count = match policy {
            EvictionPolicy::OldestEntry => overflow,
            EvictionPolicy::OldestHalf => (entries.len() / 2).max(overflow),
        };

        for (key, _) in by_age.into_iter().take(count) {
            entries.remove(&key);
        }
        count
    }
}
