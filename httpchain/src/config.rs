//! Declarative pipeline configuration.
//!
//! Durations are given in milliseconds so the config reads cleanly as JSON:
//!
//! ```json
//! {
//!   "secret": "s3cret",
//!   "logger": { "log_headers": true, "skip_headers": ["Authorization"] },
//!   "classify_errors": true,
//!   "circuit_breaker": { "trip_on": [429], "open_timeout_ms": 20000, "abort_on_open": false },
//!   "retry": { "max_retries": 3, "backoff": { "kind": "exponential", "base_ms": 500, "max_ms": 60000 } }
//! }
//! ```

use httpchain_breaker::BreakerConfig;
use httpchain_core::ChainError;
use httpchain_interceptors::LoggerOptions;
use httpchain_retries::{RetryConfig, WaitStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::Level;

/// Errors raised while turning a config into a pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config could not be parsed.
    #[error("Invalid pipeline config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Unknown log level name.
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// A component rejected its settings.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Configuration for a whole [`Pipeline`](crate::Pipeline).
///
/// Every section is optional; a missing section leaves that interceptor out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bearer secret. Adds an authenticator when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Logger settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerSettings>,
    /// Turn status >= 400 into errors.
    pub classify_errors: bool,
    /// Circuit breaker settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSettings>,
    /// Retry settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySettings>,
}

impl PipelineConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a config from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize the config to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Logger section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerSettings {
    /// Log method, URL and status.
    pub log_basic_info: bool,
    /// Log headers.
    pub log_headers: bool,
    /// Log bodies.
    pub log_body: bool,
    /// Body bytes logged before truncation.
    pub max_body_log_size: usize,
    /// Header names left out of the log.
    pub skip_headers: Vec<String>,
    /// Path prefixes that are not logged.
    pub skip_paths: Vec<String>,
    /// Level name (`trace` to `error`).
    pub level: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            log_basic_info: true,
            log_headers: false,
            log_body: false,
            max_body_log_size: httpchain_interceptors::DEFAULT_MAX_BODY_LOG_SIZE,
            skip_headers: Vec::new(),
            skip_paths: Vec::new(),
            level: "info".into(),
        }
    }
}

impl LoggerSettings {
    /// Build logger options.
    pub fn to_options(&self) -> Result<LoggerOptions, ConfigError> {
        let level: Level = self
            .level
            .parse()
            .map_err(|_| ConfigError::InvalidLevel(self.level.clone()))?;

        let mut opts = LoggerOptions::new()
            .basic_info(self.log_basic_info)
            .headers(self.log_headers)
            .body(self.log_body)
            .max_body_log_size(self.max_body_log_size)
            .level(level);
        for name in &self.skip_headers {
            opts = opts.skip_header(name);
        }
        for prefix in &self.skip_paths {
            opts = opts.skip_path(prefix.clone());
        }
        Ok(opts)
    }
}

/// Circuit breaker section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerSettings {
    /// Name used in log events.
    pub name: String,
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Open period in milliseconds.
    pub open_timeout_ms: u64,
    /// Closed-state counting interval in milliseconds. Zero never clears.
    pub interval_ms: u64,
    /// Statuses counted as failures.
    pub trip_on: Vec<u16>,
    /// Fail refused calls immediately instead of leaving them to a retrier.
    pub abort_on_open: bool,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "default".into(),
            failure_threshold: 1,
            open_timeout_ms: 20_000,
            interval_ms: 10_000,
            trip_on: vec![429],
            abort_on_open: true,
        }
    }
}

impl BreakerSettings {
    /// Build the breaker config.
    pub fn to_config(&self) -> BreakerConfig {
        BreakerConfig::new()
            .name(self.name.clone())
            .failure_threshold(self.failure_threshold)
            .open_timeout(Duration::from_millis(self.open_timeout_ms))
            .interval(Duration::from_millis(self.interval_ms))
            .trip_on_statuses(self.trip_on.clone())
    }
}

/// Retry section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Maximum number of retries.
    pub max_retries: u32,
    /// Wait between attempts.
    pub backoff: BackoffSettings,
    /// Idle lifetime of attempt counters in milliseconds.
    pub idle_ttl_ms: u64,
    /// Sweep interval of attempt counters in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_retries: defaults.max_retries,
            backoff: BackoffSettings::default(),
            idle_ttl_ms: defaults.idle_ttl.as_millis() as u64,
            sweep_interval_ms: defaults.sweep_interval.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    /// Build the retry config.
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.max_retries)
            .wait(self.backoff.to_strategy())
            .idle_ttl(Duration::from_millis(self.idle_ttl_ms))
            .sweep_interval(Duration::from_millis(self.sweep_interval_ms))
    }
}

/// Backoff section, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffSettings {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Linear {
        /// Delay in milliseconds.
        delay_ms: u64,
    },
    /// Exponential backoff with jitter.
    Exponential {
        /// Base delay in milliseconds.
        base_ms: u64,
        /// Maximum delay in milliseconds.
        max_ms: u64,
    },
}

impl Default for BackoffSettings {
    fn default() -> Self {
        BackoffSettings::Exponential {
            base_ms: 500,
            max_ms: 60_000,
        }
    }
}

impl BackoffSettings {
    fn to_strategy(&self) -> WaitStrategy {
        match *self {
            BackoffSettings::None => WaitStrategy::None,
            BackoffSettings::Linear { delay_ms } => {
                WaitStrategy::Linear(Duration::from_millis(delay_ms))
            }
            BackoffSettings::Exponential { base_ms, max_ms } => WaitStrategy::Exponential {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = PipelineConfig::from_json(
            r#"{
                "secret": "s3cret",
                "logger": { "log_headers": true, "skip_headers": ["Authorization"], "level": "debug" },
                "classify_errors": true,
                "circuit_breaker": { "trip_on": [429, 503], "open_timeout_ms": 5000, "abort_on_open": false },
                "retry": { "max_retries": 2, "backoff": { "kind": "linear", "delay_ms": 250 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.secret.as_deref(), Some("s3cret"));
        assert!(config.classify_errors);

        let opts = config.logger.as_ref().unwrap().to_options().unwrap();
        assert!(opts.log_headers);
        assert_eq!(opts.skip_headers, vec!["authorization".to_string()]);
        assert_eq!(opts.level, Level::DEBUG);

        let breaker = config.circuit_breaker.as_ref().unwrap();
        assert!(!breaker.abort_on_open);
        assert_eq!(breaker.failure_threshold, 1);
        assert_eq!(breaker.to_config().open_timeout, Duration::from_secs(5));

        let retry = config.retry.as_ref().unwrap().to_config();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.wait, WaitStrategy::Linear(Duration::from_millis(250)));
        assert_eq!(retry.idle_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_defaults_mirror_components() {
        let retry = RetrySettings::default().to_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(
            retry.wait,
            WaitStrategy::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(60),
            }
        );

        let breaker = BreakerSettings::default().to_config();
        assert_eq!(breaker.open_timeout, Duration::from_secs(20));
        assert_eq!(breaker.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = PipelineConfig::from_json(r#"{ "retries": 3 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_bad_level() {
        let settings = LoggerSettings {
            level: "loud".into(),
            ..LoggerSettings::default()
        };
        assert!(matches!(
            settings.to_options(),
            Err(ConfigError::InvalidLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_backoff_tag() {
        let config = PipelineConfig {
            retry: Some(RetrySettings {
                backoff: BackoffSettings::None,
                ..RetrySettings::default()
            }),
            ..PipelineConfig::default()
        };
        let json = config.to_json().unwrap();
        assert!(json.contains(r#""kind": "none""#));
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }
}
