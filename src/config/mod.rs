/// Configuration management for the approval engine
///
/// Handles approver-resolution retry/transport settings and graph walker limits.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dynamic approver resolution settings
    pub resolver: ResolverConfig,
    /// Graph walker settings
    pub engine: EngineConfig,
}

/// HTTP settings used when fetching approvers from external endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Total attempts per resolution, including the first (default: 3)
    pub max_attempts: u32,
    /// Base back-off between attempts in milliseconds, doubled each retry (default: 100)
    pub backoff_base_ms: u64,
    /// Per-request timeout applied by the bundled reqwest client (default: 10)
    pub request_timeout_secs: u64,
}

/// Graph walker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum automatic node activations within a single operation.
    /// Guards against runaway walks through misconfigured condition chains.
    pub max_walk_steps: usize,
}

impl Default for Config {
    /// Default configuration with ENV_VAR overrides for container deployment
    fn default() -> Self {
        Self {
            resolver: ResolverConfig {
                max_attempts: env_or("APPROVALFLOW_HTTP_MAX_ATTEMPTS", 3),
                backoff_base_ms: env_or("APPROVALFLOW_HTTP_BACKOFF_MS", 100),
                request_timeout_secs: env_or("APPROVALFLOW_HTTP_TIMEOUT_SECS", 10),
            },
            engine: EngineConfig {
                max_walk_steps: env_or("APPROVALFLOW_MAX_WALK_STEPS", 256),
            },
        }
    }
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Retry schedule for dynamic approver HTTP calls
///
/// Attempt `n` (1-based) that fails is followed by a sleep of
/// `base_delay * 2^(n-1)` unless it was the last attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Back-off to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl From<&ResolverConfig> for RetryPolicy {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn policy_from_resolver_config_never_drops_below_one_attempt() {
        let config = ResolverConfig {
            max_attempts: 0,
            backoff_base_ms: 5,
            request_timeout_secs: 1,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(5));
    }
}
