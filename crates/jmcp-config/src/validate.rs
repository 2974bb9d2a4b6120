use anyhow::{Result, bail};

use crate::config::AppConfig;

const MAX_RETRIES_LIMIT: u32 = 10;

/// Validate a loaded configuration.
/// Returns Ok(()) if valid, or Err with a descriptive message.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_jenkins(config)?;
    validate_cache(config)?;
    validate_retry(config)?;
    validate_batch(config)?;
    Ok(())
}

fn validate_jenkins(config: &AppConfig) -> Result<()> {
    let url = config.jenkins.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("jenkins.url must start with http:// or https:// (got '{url}')");
    }
    if config.jenkins.timeout_seconds == 0 {
        bail!("jenkins.timeout_seconds must be > 0 (got 0)");
    }
    if config.jenkins.user.is_some() != config.jenkins.api_token.is_some() {
        tracing::warn!("only one of jenkins.user / jenkins.api_token is set; requests will be anonymous");
    }
    Ok(())
}

fn validate_cache(config: &AppConfig) -> Result<()> {
    let policies = config.cache.tier_policies()?;
    for (tier, policy) in &policies {
        if policy.ttl.is_zero() {
            bail!("cache.tiers.{tier}.ttl_seconds must be > 0 (got 0)");
        }
        if policy.max_entries == 0 {
            bail!("cache.tiers.{tier}.max_entries must be > 0 (got 0)");
        }
    }
    if config.cache.sweep_interval_seconds == 0 {
        bail!("cache.sweep_interval_seconds must be > 0 (got 0)");
    }
    Ok(())
}

fn validate_retry(config: &AppConfig) -> Result<()> {
    let retry = &config.retry;
    if retry.max_retries > MAX_RETRIES_LIMIT {
        bail!(
            "retry.max_retries ({}) seems too high (max: {MAX_RETRIES_LIMIT})",
            retry.max_retries
        );
    }
    for (name, value) in [
        ("base_delay_seconds", retry.base_delay_seconds),
        ("max_delay_seconds", retry.max_delay_seconds),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("retry.{name} must be a non-negative number (got {value})");
        }
    }
    if retry.base_delay_seconds > retry.max_delay_seconds {
        bail!(
            "retry.base_delay_seconds ({}) must not exceed retry.max_delay_seconds ({})",
            retry.base_delay_seconds,
            retry.max_delay_seconds
        );
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        bail!(
            "retry.backoff_multiplier must be >= 1.0 (got {})",
            retry.backoff_multiplier
        );
    }
    Ok(())
}

fn validate_batch(config: &AppConfig) -> Result<()> {
    let batch = &config.batch;
    if batch.max_concurrent_limit == 0 {
        bail!("batch.max_concurrent_limit must be > 0 (got 0)");
    }
    if batch.default_max_concurrent == 0 || batch.default_max_concurrent > batch.max_concurrent_limit
    {
        bail!(
            "batch.default_max_concurrent must be between 1 and batch.max_concurrent_limit ({}) (got {})",
            batch.max_concurrent_limit,
            batch.default_max_concurrent
        );
    }
    if batch.retention_seconds == 0 {
        bail!("batch.retention_seconds must be > 0 (got 0)");
    }
    Ok(())
}
