//! One cache tier: a size-bounded LRU map with TTL expiry behind its own lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use jmcp_core::{CacheTier, TierPolicy};
use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

/// A stored value. Never mutated; a refresh replaces the whole entry.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at: Instant,
    pub tier: CacheTier,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > ttl
    }
}

/// Counters and occupancy of one tier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TierStats {
    pub tier: CacheTier,
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    /// Key into `TierState::recency`.
    last_used: u64,
}

struct TierState<V> {
    entries: HashMap<String, Slot<V>>,
    /// Use tick -> key, oldest first.
    recency: BTreeMap<u64, String>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> TierState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            tick: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(slot) = self.entries.get_mut(key) {
            self.recency.remove(&slot.last_used);
            slot.last_used = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.last_used);
        Some(slot)
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }

    fn remove_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&CacheEntry<V>) -> bool,
    {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| predicate(&slot.entry))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }
}

pub(crate) struct TierStore<V> {
    tier: CacheTier,
    policy: TierPolicy,
    state: Mutex<TierState<V>>,
}

impl<V: Clone> TierStore<V> {
    pub(crate) fn new(tier: CacheTier, policy: TierPolicy) -> Self {
        Self {
            tier,
            policy,
            state: Mutex::new(TierState::new()),
        }
    }

    pub(crate) fn policy(&self) -> TierPolicy {
        self.policy
    }

    // Every mutation leaves the state consistent before any call that could
    // panic, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, TierState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;
        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(slot) => slot.entry.is_expired(self.policy.ttl, now),
        };
        if expired {
            state.remove(key);
            state.expirations += 1;
            state.misses += 1;
            trace!(tier = %self.tier, key, "cache entry expired");
            return None;
        }
        state.hits += 1;
        state.touch(key);
        state.entries.get(key).map(|slot| slot.entry.clone())
    }

    pub(crate) fn put(&self, key: String, value: V) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
            tier: self.tier,
        };
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.remove(&key).is_none() {
            while state.entries.len() >= self.policy.max_entries {
                match state.evict_lru() {
                    Some(evicted) => trace!(tier = %self.tier, key = %evicted, "evicted LRU entry"),
                    None => break,
                }
            }
        }
        let tick = state.next_tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            Slot {
                entry,
                last_used: tick,
            },
        );
    }

    pub(crate) fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub(crate) fn invalidate_all(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.recency.clear();
        removed
    }

    pub(crate) fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&CacheEntry<V>) -> bool,
    {
        self.lock().remove_where(predicate)
    }

    pub(crate) fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.policy.ttl;
        let mut guard = self.lock();
        let state = &mut *guard;
        let purged = state.remove_where(|entry| entry.is_expired(ttl, now));
        state.expirations += purged as u64;
        purged
    }

    pub(crate) fn stats(&self) -> TierStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        TierStats {
            tier: self.tier,
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            capacity: self.policy.max_entries,
            ttl_seconds: self.policy.ttl.as_secs(),
            evictions: state.evictions,
            expirations: state.expirations,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}
