//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an http(s) URL without a path
    /// - `base_path` is not empty or `/segment` without a trailing slash
    /// - `cache_version`, `localities` or `user_agent` are empty
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `retry.base_delay_ms` exceeds `retry.max_delay_ms`
    /// - `inbox_limit` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = url::Url::parse(&self.origin).map_err(|e| invalid("origin", &e.to_string()))?;
        if origin.scheme() != "http" && origin.scheme() != "https" {
            return Err(invalid("origin", "scheme must be http or https"));
        }
        if origin.path() != "/" || origin.query().is_some() {
            return Err(invalid("origin", "must not carry a path or query; use base_path"));
        }

        if !self.base_path.is_empty() && (!self.base_path.starts_with('/') || self.base_path.ends_with('/')) {
            return Err(invalid("base_path", "must be empty or start with '/' and not end with '/'"));
        }

        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }

        if self.localities.is_empty() {
            return Err(invalid("localities", "at least one locality is required"));
        }
        if self.localities.iter().any(|l| l.is_empty() || l.contains('/')) {
            return Err(invalid("localities", "entries must be non-empty path segments"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms", "must not exceed retry.max_delay_ms"));
        }

        if self.inbox_limit == 0 {
            return Err(invalid("inbox_limit", "must be greater than 0"));
        }

        if self.ttl.business_ms == 0 || self.ttl.api_ms == 0 || self.ttl.dynamic_ms == 0 {
            tracing::warn!(
                business_ms = self.ttl.business_ms,
                api_ms = self.ttl.api_ms,
                dynamic_ms = self.ttl.dynamic_ms,
                "a zero TTL makes every cached read stale; network-first partitions will always refetch"
            );
        }

        Ok(())
    }
}
