//! Fetch strategy and performance configuration.
//!
//! These types describe *how* tickets get fetched: which path to prefer
//! (agent-mediated vs direct API), which platform integrations the connected
//! AI backend exposes, and the retry/timeout budget for direct API calls.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::backend::BackendPlatform;
use crate::config::ConfigError;

// ============================================================================
// FETCH STRATEGY
// ============================================================================

/// Ticket fetching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Use agent-mediated fetch; fail if the backend does not support it.
    Agent,
    /// Use the direct platform API; requires fallback credentials.
    Direct,
    /// Try agent first, fall back to direct.
    #[default]
    Auto,
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "agent" => Ok(FetchStrategy::Agent),
            "direct" => Ok(FetchStrategy::Direct),
            "auto" => Ok(FetchStrategy::Auto),
            _ => Err(ConfigError::Validation {
                messages: vec![format!(
                    "invalid fetch strategy '{s}' (expected agent, direct, or auto)"
                )],
            }),
        }
    }
}

/// Per-platform fetch strategy with a default.
#[derive(Debug, Clone, Default)]
pub struct FetchStrategyConfig {
    pub default: FetchStrategy,
    /// Lowercase platform name → strategy override.
    pub per_platform: BTreeMap<String, FetchStrategy>,
}

impl FetchStrategyConfig {
    pub fn strategy_for(&self, platform: &str) -> FetchStrategy {
        self.per_platform.get(&platform.to_ascii_lowercase()).copied().unwrap_or(self.default)
    }
}

// ============================================================================
// AGENT CONFIG
// ============================================================================

/// Configuration for the connected AI backend.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub platform: BackendPlatform,
    /// Lowercase platform name → integration availability. When empty, the
    /// backend is assumed to support its built-in platforms.
    pub integrations: BTreeMap<String, bool>,
    pub integrations_configured: bool,
}

impl AgentConfig {
    /// Check whether the backend advertises an integration for a platform.
    ///
    /// When no `AGENT_INTEGRATION_*` keys were configured at all, this
    /// defaults to true and the fetcher's built-in platform set decides.
    pub fn supports_platform(&self, platform: &str) -> bool {
        if !self.integrations_configured {
            return true;
        }
        self.integrations.get(&platform.to_ascii_lowercase()).copied().unwrap_or(false)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            platform: BackendPlatform::Auggie,
            integrations: BTreeMap::new(),
            integrations_configured: false,
        }
    }
}

// ============================================================================
// PERFORMANCE
// ============================================================================

/// Upper bounds applied to user-supplied performance values.
const MAX_CACHE_DURATION_HOURS: u64 = 168;
const MAX_TIMEOUT_SECONDS: u64 = 300;
const MAX_RETRIES_CAP: u32 = 10;
const MAX_RETRY_DELAY_SECONDS: f64 = 60.0;

/// Performance settings for ticket fetching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchPerformanceConfig {
    pub cache_duration_hours: u64,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: f64,
}

impl Default for FetchPerformanceConfig {
    fn default() -> Self {
        Self {
            cache_duration_hours: 24,
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 1.0,
        }
    }
}

impl FetchPerformanceConfig {
    /// Clamp every field into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.cache_duration_hours = self.cache_duration_hours.min(MAX_CACHE_DURATION_HOURS);
        self.timeout_seconds = self.timeout_seconds.clamp(1, MAX_TIMEOUT_SECONDS);
        self.max_retries = self.max_retries.min(MAX_RETRIES_CAP);
        self.retry_delay_seconds = self.retry_delay_seconds.clamp(0.0, MAX_RETRY_DELAY_SECONDS);
        self
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_duration_hours as i64)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_strategy_parse() {
        assert_eq!("agent".parse::<FetchStrategy>().unwrap(), FetchStrategy::Agent);
        assert_eq!("DIRECT".parse::<FetchStrategy>().unwrap(), FetchStrategy::Direct);
        assert_eq!(" auto ".parse::<FetchStrategy>().unwrap(), FetchStrategy::Auto);
        assert!("hybrid".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn test_strategy_for_falls_back_to_default() {
        let mut config = FetchStrategyConfig { default: FetchStrategy::Auto, ..Default::default() };
        config.per_platform.insert("jira".into(), FetchStrategy::Direct);
        assert_eq!(config.strategy_for("jira"), FetchStrategy::Direct);
        assert_eq!(config.strategy_for("JIRA"), FetchStrategy::Direct);
        assert_eq!(config.strategy_for("linear"), FetchStrategy::Auto);
    }

    #[test]
    fn test_agent_config_defaults_to_supported_without_keys() {
        let config = AgentConfig::default();
        assert!(config.supports_platform("jira"));
    }

    #[test]
    fn test_agent_config_explicit_integrations() {
        let mut config = AgentConfig::default();
        config.integrations_configured = true;
        config.integrations.insert("jira".into(), true);
        assert!(config.supports_platform("jira"));
        assert!(!config.supports_platform("linear"));
    }

    #[test]
    fn test_performance_clamping() {
        let config = FetchPerformanceConfig {
            cache_duration_hours: 9999,
            timeout_seconds: 0,
            max_retries: 99,
            retry_delay_seconds: 500.0,
        }
        .clamped();
        assert_eq!(config.cache_duration_hours, MAX_CACHE_DURATION_HOURS);
        assert_eq!(config.timeout_seconds, 1);
        assert_eq!(config.max_retries, MAX_RETRIES_CAP);
        assert_eq!(config.retry_delay_seconds, MAX_RETRY_DELAY_SECONDS);
    }
}
