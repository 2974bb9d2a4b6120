//! Configuration loading and validation for the Jenkins MCP server.

pub mod config;
pub mod validate;

pub use config::{AppConfig, BatchConfig, CacheConfig, JenkinsConfig, RetryConfig, TierConfig};
pub use validate::validate_config;
