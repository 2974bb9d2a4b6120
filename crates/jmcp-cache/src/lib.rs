//! Multi-tier response cache.
//!
//! Each [`CacheTier`] is an independent namespace with its own TTL, capacity
//! and lock. Expiry is lazy (checked on lookup) with an optional sweep via
//! [`TieredCache::purge_expired`]; inserting into a full tier evicts its least
//! recently used entry.

mod key;
mod tier;

use std::collections::BTreeMap;

use jmcp_core::{AppError, CacheTier, TierPolicy};
use serde::Serialize;
use tracing::debug;

pub use key::{GLOBAL_SCOPE, cache_key, job_key_prefix, key_job_name};
pub use tier::{CacheEntry, TierStats};

use tier::TierStore;

/// Statistics for every tier, in tier order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub tiers: Vec<TierStats>,
    pub total_entries: usize,
    pub total_hits: u64,
    pub total_misses: u64,
}

pub struct TieredCache<V> {
    tiers: BTreeMap<CacheTier, TierStore<V>>,
}

impl<V: Clone> TieredCache<V> {
    /// Build the cache from per-tier policies.
    ///
    /// Every tier must be configured with a non-zero TTL and capacity.
    pub fn new(policies: &BTreeMap<CacheTier, TierPolicy>) -> Result<Self, AppError> {
        let mut tiers = BTreeMap::new();
        for tier in CacheTier::ALL {
            let policy = policies.get(&tier).copied().ok_or_else(|| {
                AppError::CacheMisconfiguration(format!("tier '{tier}' is not configured"))
            })?;
            if policy.max_entries == 0 || policy.ttl.is_zero() {
                return Err(AppError::CacheMisconfiguration(format!(
                    "tier '{tier}' needs a non-zero ttl and max_entries"
                )));
            }
            tiers.insert(tier, TierStore::new(tier, policy));
        }
        Ok(Self { tiers })
    }

    /// Cache using the built-in policy of every tier.
    pub fn with_default_policies() -> Self {
        let tiers = CacheTier::ALL
            .into_iter()
            .map(|tier| (tier, TierStore::new(tier, TierPolicy::default_for(tier))))
            .collect();
        Self { tiers }
    }

    fn store(&self, tier: CacheTier) -> &TierStore<V> {
        // `new` and `with_default_policies` populate every variant.
        &self.tiers[&tier]
    }

    pub fn policy(&self, tier: CacheTier) -> TierPolicy {
        self.store(tier).policy()
    }

    /// Value stored under `key`, or `None` on a miss or expired entry.
    pub fn get(&self, tier: CacheTier, key: &str) -> Option<V> {
        self.get_entry(tier, key).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get) but returns the whole entry, including when it
    /// was stored.
    pub fn get_entry(&self, tier: CacheTier, key: &str) -> Option<CacheEntry<V>> {
        self.store(tier).get(key)
    }

    pub fn put(&self, tier: CacheTier, key: impl Into<String>, value: V) {
        self.store(tier).put(key.into(), value);
    }

    /// Returns whether an entry was removed.
    pub fn invalidate(&self, tier: CacheTier, key: &str) -> bool {
        self.store(tier).invalidate(key)
    }

    pub fn invalidate_all(&self, tier: CacheTier) -> usize {
        let removed = self.store(tier).invalidate_all();
        debug!(%tier, removed, "cleared cache tier");
        removed
    }

    pub fn invalidate_by_prefix(&self, tier: CacheTier, prefix: &str) -> usize {
        self.store(tier)
            .invalidate_where(|entry| entry.key.starts_with(prefix))
    }

    /// Remove every entry belonging to `job_name` from every tier.
    pub fn invalidate_job(&self, job_name: &str) -> usize {
        let removed: usize = self
            .tiers
            .values()
            .map(|store| {
                store.invalidate_where(|entry| key_job_name(&entry.key) == Some(job_name))
            })
            .sum();
        debug!(job = job_name, removed, "invalidated job cache entries");
        removed
    }

    /// Remove entries of `job_name` from a single tier.
    pub fn invalidate_job_in(&self, tier: CacheTier, job_name: &str) -> usize {
        self.store(tier)
            .invalidate_where(|entry| key_job_name(&entry.key) == Some(job_name))
    }

    pub fn clear(&self) -> usize {
        CacheTier::ALL
            .into_iter()
            .map(|tier| self.invalidate_all(tier))
            .sum()
    }

    /// Drop expired entries from every tier. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.tiers.values().map(TierStore::purge_expired).sum()
    }

    pub fn tier_stats(&self, tier: CacheTier) -> TierStats {
        self.store(tier).stats()
    }

    pub fn stats(&self) -> CacheStats {
        let tiers: Vec<TierStats> = self.tiers.values().map(TierStore::stats).collect();
        CacheStats {
            total_entries: tiers.iter().map(|t| t.size).sum(),
            total_hits: tiers.iter().map(|t| t.hits).sum(),
            total_misses: tiers.iter().map(|t| t.misses).sum(),
            tiers,
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
