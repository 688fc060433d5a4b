use crate::error::{ResilienceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Circuit breaker configuration, one table entry per operation name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Duration to wait after the last failure before allowing a probe
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,

    /// Observation window reported alongside stats
    #[serde(default = "default_monitoring_period_secs")]
    pub monitoring_period_secs: u64,

    /// Number of successful probe calls required to close a half-open circuit
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

fn default_monitoring_period_secs() -> u64 {
    60
}

fn default_half_open_max_calls() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            monitoring_period_secs: default_monitoring_period_secs(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_secs(self.monitoring_period_secs)
    }
}

/// Retry policy shared by one or more operation names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Backoff multiplier applied per attempt when greater than 1
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap on the computed backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Policy tables for the engine, read-only after initialization.
///
/// Breaker configs are keyed directly by operation name; retry policies are
/// keyed by policy name with an operation-to-policy mapping so several
/// operations can share one curve. Unknown names fall back to the defaults.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    breakers: HashMap<String, CircuitBreakerConfig>,
    default_breaker: CircuitBreakerConfig,
    retry_policies: HashMap<String, RetryPolicy>,
    operation_policies: HashMap<String, String>,
    default_retry: RetryPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            breakers: HashMap::new(),
            default_breaker: CircuitBreakerConfig::default(),
            retry_policies: HashMap::new(),
            operation_policies: HashMap::new(),
            default_retry: RetryPolicy::default(),
        }
    }
}

impl PolicyTable {
    /// Static policy table for the platform's protected operations
    pub fn builtin() -> Self {
        let mut table = Self::default();

        table.breakers.insert(
            "storage_upload".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
                ..Default::default()
            },
        );
        table.breakers.insert(
            "database_query".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 10,
                recovery_timeout_secs: 30,
                ..Default::default()
            },
        );
        table.breakers.insert(
            "job_analysis".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout_secs: 120,
                ..Default::default()
            },
        );
        table.breakers.insert(
            "video_transcode".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout_secs: 180,
                half_open_max_calls: 1,
                ..Default::default()
            },
        );
        table.breakers.insert(
            "resource_allocation".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 45,
                ..Default::default()
            },
        );

        table.retry_policies.insert(
            "fast".to_string(),
            RetryPolicy {
                max_retries: 2,
                backoff_ms: 50,
                backoff_multiplier: 2.0,
                max_backoff_ms: 1_000,
            },
        );
        table.retry_policies.insert(
            "standard".to_string(),
            RetryPolicy {
                max_retries: 3,
                backoff_ms: 100,
                backoff_multiplier: 2.0,
                max_backoff_ms: 10_000,
            },
        );
        table.retry_policies.insert(
            "patient".to_string(),
            RetryPolicy {
                max_retries: 3,
                backoff_ms: 1_000,
                backoff_multiplier: 2.0,
                max_backoff_ms: 30_000,
            },
        );

        for (operation, policy) in [
            ("database_query", "fast"),
            ("storage_upload", "standard"),
            ("resource_allocation", "standard"),
            ("job_analysis", "patient"),
            ("video_transcode", "patient"),
        ] {
            table
                .operation_policies
                .insert(operation.to_string(), policy.to_string());
        }

        table
    }

    /// Breaker configuration for an operation name
    pub fn breaker_config(&self, operation: &str) -> &CircuitBreakerConfig {
        self.breakers.get(operation).unwrap_or(&self.default_breaker)
    }

    /// Retry policy for an operation name, resolved through the policy mapping
    pub fn retry_policy(&self, operation: &str) -> &RetryPolicy {
        self.operation_policies
            .get(operation)
            .and_then(|policy| self.retry_policies.get(policy))
            .unwrap_or(&self.default_retry)
    }

    /// Register or replace a breaker configuration
    pub fn set_breaker_config(&mut self, operation: &str, config: CircuitBreakerConfig) {
        self.breakers.insert(operation.to_string(), config);
    }

    /// Merge startup overrides into the table
    pub fn apply_overrides(&mut self, overrides: PolicyOverrides) {
        for (operation, config) in overrides.circuit_breakers {
            debug!(operation = %operation, "applying breaker config override");
            self.breakers.insert(operation, config);
        }
        for (name, policy) in overrides.retry_policies {
            debug!(policy = %name, "applying retry policy override");
            self.retry_policies.insert(name, policy);
        }
        for (operation, policy) in overrides.operation_policies {
            self.operation_policies.insert(operation, policy);
        }
        if let Some(default_breaker) = overrides.default_circuit_breaker {
            self.default_breaker = default_breaker;
        }
        if let Some(default_retry) = overrides.default_retry_policy {
            self.default_retry = default_retry;
        }
    }

    /// Validate table-wide invariants
    pub fn validate(&self) -> Result<()> {
        let default_name = "default".to_string();
        for (operation, config) in self
            .breakers
            .iter()
            .chain(std::iter::once((&default_name, &self.default_breaker)))
        {
            if config.failure_threshold == 0 {
                return Err(ResilienceError::Config(format!(
                    "breaker {} has zero failure_threshold",
                    operation
                )));
            }
            if config.half_open_max_calls == 0 {
                return Err(ResilienceError::Config(format!(
                    "breaker {} has zero half_open_max_calls",
                    operation
                )));
            }
        }

        for (operation, policy) in &self.operation_policies {
            if !self.retry_policies.contains_key(policy) {
                return Err(ResilienceError::Config(format!(
                    "operation {} maps to unknown retry policy {}",
                    operation, policy
                )));
            }
        }

        Ok(())
    }
}

/// Startup policy overrides supplied by the configuration collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub circuit_breakers: HashMap<String, CircuitBreakerConfig>,
    #[serde(default)]
    pub retry_policies: HashMap<String, RetryPolicy>,
    #[serde(default)]
    pub operation_policies: HashMap<String, String>,
    #[serde(default)]
    pub default_circuit_breaker: Option<CircuitBreakerConfig>,
    #[serde(default)]
    pub default_retry_policy: Option<RetryPolicy>,
}

/// Source of startup policy overrides, read once at initialization
pub trait ConfigSource {
    fn load(&self) -> Result<PolicyOverrides>;
}

/// Configuration source backed by a YAML file
#[derive(Debug, Clone)]
pub struct YamlFileSource {
    path: PathBuf,
}

impl YamlFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for YamlFileSource {
    fn load(&self) -> Result<PolicyOverrides> {
        let contents = std::fs::read_to_string(&self.path)?;
        serde_yaml::from_str(&contents).map_err(|e| {
            ResilienceError::Config(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_breaker_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout_secs, 60);
        assert_eq!(config.monitoring_period_secs, 60);
        assert_eq!(config.half_open_max_calls, 3);
        assert_eq!(config.recovery_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff_ms, 100);
        assert_eq!(policy.backoff_multiplier, 2.0);
        assert_eq!(policy.max_backoff_ms, 10_000);
    }

    #[test]
    fn test_builtin_table_lookups() {
        let table = PolicyTable::builtin();

        assert_eq!(table.breaker_config("job_analysis").failure_threshold, 3);
        assert_eq!(
            table.breaker_config("database_query").recovery_timeout_secs,
            30
        );

        // Shared policy resolution
        assert_eq!(table.retry_policy("job_analysis").backoff_ms, 1_000);
        assert_eq!(table.retry_policy("video_transcode").backoff_ms, 1_000);
        assert_eq!(table.retry_policy("database_query").max_retries, 2);
    }

    #[test]
    fn test_unknown_operation_falls_back_to_defaults() {
        let table = PolicyTable::builtin();
        assert_eq!(table.breaker_config("unknown_op").failure_threshold, 5);
        assert_eq!(table.retry_policy("unknown_op").max_retries, 3);
    }

    #[test]
    fn test_builtin_table_validates() {
        assert!(PolicyTable::builtin().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_dangling_policy_mapping() {
        let mut table = PolicyTable::default();
        table
            .operation_policies
            .insert("storage_upload".to_string(), "missing".to_string());
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut table = PolicyTable::default();
        table.set_breaker_config(
            "storage_upload",
            CircuitBreakerConfig {
                failure_threshold: 0,
                ..Default::default()
            },
        );
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut table = PolicyTable::builtin();
        let mut overrides = PolicyOverrides::default();
        overrides.circuit_breakers.insert(
            "job_analysis".to_string(),
            CircuitBreakerConfig {
                failure_threshold: 7,
                ..Default::default()
            },
        );
        overrides.default_retry_policy = Some(RetryPolicy {
            max_retries: 1,
            ..Default::default()
        });

        table.apply_overrides(overrides);

        assert_eq!(table.breaker_config("job_analysis").failure_threshold, 7);
        assert_eq!(table.retry_policy("unmapped").max_retries, 1);
    }

    #[test]
    fn test_yaml_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
circuit_breakers:
  storage_upload:
    failure_threshold: 2
retry_policies:
  standard:
    max_retries: 5
operation_policies:
  storage_upload: standard
"#
        )
        .unwrap();

        let overrides = YamlFileSource::new(file.path()).load().unwrap();
        assert_eq!(
            overrides
                .circuit_breakers
                .get("storage_upload")
                .unwrap()
                .failure_threshold,
            2
        );
        assert_eq!(
            overrides.retry_policies.get("standard").unwrap().max_retries,
            5
        );

        let mut table = PolicyTable::builtin();
        table.apply_overrides(overrides);
        assert_eq!(table.breaker_config("storage_upload").failure_threshold, 2);
        assert_eq!(table.retry_policy("storage_upload").max_retries, 5);
    }

    #[test]
    fn test_yaml_file_source_missing_file() {
        let source = YamlFileSource::new("/nonexistent/resilience.yaml");
        assert!(matches!(source.load(), Err(ResilienceError::Io(_))));
    }
}
