//! Configuration types for the pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model_type::CompatibilityMatrix;
use crate::error::{PipelineError, Result};

/// Thresholds of the routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingThresholds {
    /// A lone detector must reach this to route `single`.
    ///
    /// Default: 0.85.
    pub high_threshold: f64,

    /// Minimum lead of the top detector over the runner-up for `single`.
    ///
    /// Default: 0.15.
    pub separation_margin: f64,

    /// Bar every member of a hybrid must clear.
    ///
    /// Default: 0.60.
    pub hybrid_threshold: f64,
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        Self {
            high_threshold: 0.85,
            separation_margin: 0.15,
            hybrid_threshold: 0.60,
        }
    }
}

/// Per-call timeout and bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. Default: 3.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after that. Default: 250ms.
    pub initial_backoff_ms: u64,

    /// Upper bound on a single backoff delay. Default: 8s.
    pub max_backoff_ms: u64,

    /// Timeout of a single call. Default: 60s.
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 8_000,
            call_timeout_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts. Handy in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub routing: RoutingThresholds,

    /// Which model types may be combined into a hybrid.
    #[serde(default)]
    pub compatibility: CompatibilityMatrix,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Schema re-generation passes before a segment is declared incomplete.
    ///
    /// Default: 3.
    pub max_repair_attempts: u32,

    /// Wall-clock budget for one document. Default: 600s.
    pub document_deadline_secs: u64,

    /// How long cached call results stay valid. Default: 24h.
    pub cache_ttl_secs: u64,

    /// Segments processed concurrently. Default: 4.
    pub max_concurrent_segments: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            routing: RoutingThresholds::default(),
            compatibility: CompatibilityMatrix::default(),
            retry: RetryPolicy::default(),
            max_repair_attempts: 3,
            document_deadline_secs: 600,
            cache_ttl_secs: 24 * 60 * 60,
            max_concurrent_segments: 4,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML config.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Set routing thresholds.
    pub fn with_routing(mut self, routing: RoutingThresholds) -> Self {
        self.routing = routing;
        self
    }

    /// Set the compatibility matrix.
    pub fn with_compatibility(mut self, compatibility: CompatibilityMatrix) -> Self {
        self.compatibility = compatibility;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set max repair attempts.
    pub fn with_max_repair_attempts(mut self, attempts: u32) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// Set the document deadline.
    pub fn with_document_deadline(mut self, deadline: Duration) -> Self {
        self.document_deadline_secs = deadline.as_secs().max(1);
        self
    }

    /// Set cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set segment concurrency.
    pub fn with_max_concurrent_segments(mut self, n: usize) -> Self {
        self.max_concurrent_segments = n;
        self
    }

    pub fn document_deadline(&self) -> Duration {
        Duration::from_secs(self.document_deadline_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Reject configurations the routing rule cannot work with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.routing;
        for (name, value) in [
            ("high_threshold", r.high_threshold),
            ("separation_margin", r.separation_margin),
            ("hybrid_threshold", r.hybrid_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if r.hybrid_threshold > r.high_threshold {
            return Err(PipelineError::Config(format!(
                "hybrid_threshold ({}) must not exceed high_threshold ({})",
                r.hybrid_threshold, r.high_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("retry.max_attempts must be > 0".into()));
        }
        if self.max_concurrent_segments == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_segments must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
            call_timeout_ms: 1_000,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = PipelineConfig::new().with_routing(RoutingThresholds {
            high_threshold: 0.5,
            separation_margin: 0.1,
            hybrid_threshold: 0.7,
        });
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_from_yaml_with_partial_fields() {
        let yaml = r#"
max_repair_attempts: 5
document_deadline_secs: 30
cache_ttl_secs: 60
max_concurrent_segments: 2
routing:
  high_threshold: 0.9
  separation_margin: 0.2
  hybrid_threshold: 0.55
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.max_repair_attempts, 5);
        assert_eq!(config.routing.hybrid_threshold, 0.55);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
