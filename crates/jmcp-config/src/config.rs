//! Server configuration (`~/.config/jenkins-mcp/config.toml`).
//!
//! Every section is optional; omitted values fall back to built-in defaults.
//! Jenkins credentials may also come from `JENKINS_URL`, `JENKINS_USER` and
//! `JENKINS_API_TOKEN`, which take precedence over the file.

use anyhow::{Context, Result};
use jmcp_core::{AppError, CacheTier, RetryPolicy, TierPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "JENKINS_MCP_CONFIG";

const DEFAULT_JENKINS_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MAX_CONCURRENT: usize = 5;
const DEFAULT_MAX_CONCURRENT_LIMIT: usize = 20;
const DEFAULT_RETENTION_SECONDS: u64 = 3600;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub jenkins: JenkinsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct JenkinsConfig {
    #[serde(default = "default_jenkins_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: default_jenkins_url(),
            user: None,
            api_token: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl JenkinsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// `[cache]` section. Tier tables are keyed by tier name
/// (`static`, `semi_static`, `dynamic`, `permanent`, `short`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub tiers: BTreeMap<String, TierConfig>,
    /// Interval of the background sweep removing expired entries.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tiers: BTreeMap::new(),
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl CacheConfig {
    /// Resolve the policy of every tier, filling omitted tiers with defaults.
    ///
    /// Unknown tier names are rejected rather than ignored.
    pub fn tier_policies(&self) -> Result<BTreeMap<CacheTier, TierPolicy>, AppError> {
        let mut policies: BTreeMap<CacheTier, TierPolicy> = CacheTier::ALL
            .into_iter()
            .map(|tier| (tier, TierPolicy::default_for(tier)))
            .collect();
        for (name, tier_config) in &self.tiers {
            let tier: CacheTier = name.parse()?;
            policies.insert(
                tier,
                TierPolicy::new(
                    Duration::from_secs(tier_config.ttl_seconds),
                    tier_config.max_entries,
                ),
            );
        }
        Ok(policies)
    }
}

/// `[retry]` section. Delays are in (fractional) seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_seconds")]
    pub base_delay_seconds: f64,
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: f64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_seconds: default_base_delay_seconds(),
            max_delay_seconds: default_max_delay_seconds(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Convert to a policy. Call only on validated configuration: negative or
    /// non-finite delays are clamped to zero.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: seconds(self.base_delay_seconds),
            max_delay: seconds(self.max_delay_seconds),
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// `[batch]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// `max_concurrent` used when a batch request omits it.
    #[serde(default = "default_max_concurrent")]
    pub default_max_concurrent: usize,
    /// Upper bound accepted for a request's `max_concurrent`.
    #[serde(default = "default_max_concurrent_limit")]
    pub max_concurrent_limit: usize,
    /// Finished operations older than this are dropped from memory.
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_concurrent_limit: DEFAULT_MAX_CONCURRENT_LIMIT,
            retention_seconds: DEFAULT_RETENTION_SECONDS,
        }
    }
}

impl BatchConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }
}

fn default_jenkins_url() -> String {
    DEFAULT_JENKINS_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_sweep_interval_seconds() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECONDS
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_seconds() -> f64 {
    1.0
}

fn default_max_delay_seconds() -> f64 {
    60.0
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_max_concurrent_limit() -> usize {
    DEFAULT_MAX_CONCURRENT_LIMIT
}

fn default_retention_seconds() -> u64 {
    DEFAULT_RETENTION_SECONDS
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Lookup order: explicit path -> `$JENKINS_MCP_CONFIG` -> the platform
    /// config dir. A missing file at the default location yields defaults; a
    /// missing explicit file is an error. Environment overrides are applied
    /// last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_path(&path)?,
            None => match Self::config_path() {
                Ok(path) if path.exists() => Self::load_from_path(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `JENKINS_URL`, `JENKINS_USER` and `JENKINS_API_TOKEN`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = non_empty("JENKINS_URL") {
            self.jenkins.url = url;
        }
        if let Some(user) = non_empty("JENKINS_USER") {
            self.jenkins.user = Some(user);
        }
        if let Some(token) = non_empty("JENKINS_API_TOKEN") {
            self.jenkins.api_token = Some(token);
        }
    }

    /// Path to the default config file: `~/.config/jenkins-mcp/config.toml`.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "jenkins-mcp")
            .context("Failed to determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Default config TOML with comments, as printed by `jenkins-mcp config-template`.
    pub fn default_template() -> String {
        r#"# Jenkins MCP server configuration
# Location: ~/.config/jenkins-mcp/config.toml (or $JENKINS_MCP_CONFIG)

[jenkins]
url = "http://localhost:8080"   # overridden by JENKINS_URL
# user = "automation"           # or JENKINS_USER
# api_token = "..."             # or JENKINS_API_TOKEN
timeout_seconds = 30

[cache]
sweep_interval_seconds = 60

[cache.tiers.static]       # server metadata
ttl_seconds = 3600
max_entries = 100

[cache.tiers.semi_static]  # job definitions and listings
ttl_seconds = 300
max_entries = 500

[cache.tiers.dynamic]      # running build state
ttl_seconds = 30
max_entries = 1000

[cache.tiers.permanent]    # finished builds and artifacts
ttl_seconds = 86400
max_entries = 2000

[cache.tiers.short]        # queue and live console output
ttl_seconds = 10
max_entries = 200

[retry]
max_retries = 3
base_delay_seconds = 1.0
max_delay_seconds = 60.0
backoff_multiplier = 2.0
jitter = false

[batch]
default_max_concurrent = 5
max_concurrent_limit = 20
retention_seconds = 3600
"#
        .to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
