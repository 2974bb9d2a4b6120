//! Composition root: owns the cache, client, retry executor and orchestrator
//! and hands them to the tool layer by reference.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jmcp_batch::{BatchLimits, BatchOrchestrator, spawn_reaper};
use jmcp_cache::TieredCache;
use jmcp_client::{JenkinsClient, JenkinsCredentials, JobClient};
use jmcp_config::AppConfig;
use jmcp_core::{AppError, CacheTier, UpstreamError};
use jmcp_executor::RetryExecutor;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Values are stored as the JSON the tools return.
pub(crate) type ResponseCache = TieredCache<Value>;

pub(crate) struct App {
    pub config: AppConfig,
    pub cache: Arc<ResponseCache>,
    pub client: Arc<dyn JobClient>,
    pub executor: RetryExecutor,
    pub batch: Arc<BatchOrchestrator>,
}

impl App {
    /// Wire the Jenkins client described by `config`.
    pub(crate) fn from_config(config: AppConfig) -> Result<Self> {
        let credentials = match (&config.jenkins.user, &config.jenkins.api_token) {
            (Some(user), Some(api_token)) => Some(JenkinsCredentials {
                user: user.clone(),
                api_token: api_token.clone(),
            }),
            _ => None,
        };
        let client = JenkinsClient::new(&config.jenkins.url, credentials, config.jenkins.timeout())
            .context("Failed to create Jenkins client")?;
        Self::with_client(config, Arc::new(client))
    }

    pub(crate) fn with_client(config: AppConfig, client: Arc<dyn JobClient>) -> Result<Self> {
        let policies = config
            .cache
            .tier_policies()
            .context("Invalid cache configuration")?;
        let cache = Arc::new(TieredCache::new(&policies).context("Failed to build cache")?);
        let executor = RetryExecutor::new(config.retry.to_policy());
        // A queued build makes the job's cached build and console state stale.
        let triggered_cache = cache.clone();
        let batch = Arc::new(
            BatchOrchestrator::new(
                client.clone(),
                executor.clone(),
                BatchLimits {
                    max_concurrent_limit: config.batch.max_concurrent_limit,
                    retention: config.batch.retention(),
                },
            )
            .with_trigger_hook(Arc::new(move |job_name: &str| {
                triggered_cache.invalidate_job_in(CacheTier::Dynamic, job_name);
            })),
        );
        Ok(Self {
            config,
            cache,
            client,
            executor,
            batch,
        })
    }

    /// Start the cache sweep and the batch reaper. Both stop when `shutdown`
    /// is cancelled.
    pub(crate) fn spawn_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let sweep_every = Duration::from_secs(self.config.cache.sweep_interval_seconds.max(1));
        let reap_every = (self.config.batch.retention() / 4).max(Duration::from_secs(1));
        vec![
            spawn_cache_sweeper(self.cache.clone(), sweep_every, shutdown.clone()),
            spawn_reaper(self.batch.clone(), reap_every, shutdown.clone()),
        ]
    }

    /// Cache-first read. On a miss `fetch` runs through the retry executor
    /// and its value is stored in the tier chosen by `tier_for`.
    ///
    /// `lookup` lists the tiers the key may live in, checked in order.
    pub(crate) async fn cached_read<T, F, Fut>(
        &self,
        lookup: &[CacheTier],
        key: &str,
        fetch: F,
        tier_for: impl FnOnce(&T) -> CacheTier,
    ) -> Result<Value, AppError>
    where
        T: Serialize,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        for tier in lookup {
            if let Some(value) = self.cache.get(*tier, key) {
                trace!(%tier, key, "cache hit");
                return Ok(value);
            }
        }
        let outcome = self.executor.read(key, fetch).await?;
        let tier = tier_for(&outcome.value);
        let value = serde_json::to_value(&outcome.value).map_err(|e| {
            AppError::validation(format!("failed to encode response for '{key}': {e}"))
        })?;
        self.cache.put(tier, key, value.clone());
        debug!(%tier, key, attempts = outcome.attempts, "cache miss, stored");
        Ok(value)
    }
}

fn spawn_cache_sweeper(
    cache: Arc<ResponseCache>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticks.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, "swept expired cache entries");
                    }
                }
            }
        }
    })
}
