//! Bounded retry with exponential backoff and fallback hand-off.
//!
//! The orchestrator re-drives a failed operation up to the caller's retry
//! budget, sleeping a jittered backoff delay between attempts, and resolves
//! the fallback path once attempts are exhausted. Breaker-gating rejections
//! are never retried: the circuit is known to be refusing traffic, so they
//! route straight to fallback resolution.

pub mod backoff;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::PolicyTable;
use crate::error::{ResilienceError, Result};
use crate::fallback::FallbackDispatcher;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives retries for a failed operation and resolves fallbacks
#[derive(Debug, Clone)]
pub struct RetryOrchestrator {
    policies: Arc<PolicyTable>,
    fallbacks: Arc<FallbackDispatcher>,
}

impl RetryOrchestrator {
    pub fn new(policies: Arc<PolicyTable>, fallbacks: Arc<FallbackDispatcher>) -> Self {
        Self {
            policies,
            fallbacks,
        }
    }

    /// Handle a failed first invocation.
    ///
    /// Re-invokes `operation` under `timeout` up to `retries` times, with the
    /// backoff curve from the operation's retry policy. Each retry settles
    /// against `breaker` when one is supplied, and a breaker gate rejection
    /// during the loop ends it early. On exhaustion the fallback is served
    /// when enabled, otherwise the last failure surfaces.
    #[allow(clippy::too_many_arguments)]
    pub async fn run<T, F, Fut, E>(
        &self,
        operation_name: &str,
        operation: F,
        timeout: Duration,
        retries: u32,
        fallback_enabled: bool,
        breaker: Option<Arc<CircuitBreaker>>,
        first_error: ResilienceError,
    ) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let policy = self.policies.retry_policy(operation_name);
        let mut last_error = first_error;
        let mut remaining = retries;

        while remaining > 0 {
            if !last_error.is_retryable() {
                break;
            }

            let attempt = policy.max_retries.saturating_sub(remaining) + 1;
            let delay = backoff::jittered_delay(policy, attempt);
            debug!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Retrying after backoff"
            );
            tokio::time::sleep(delay).await;

            // The breaker may have opened while we were backing off
            if let Some(breaker) = &breaker {
                if let Err(gate) = breaker.try_acquire().await {
                    last_error = gate;
                    break;
                }
            }

            match attempt_detached(operation_name, &operation, timeout).await {
                Ok(result) => {
                    debug!(operation = operation_name, attempt, "Retry succeeded");
                    if let Some(breaker) = &breaker {
                        breaker.record_success().await;
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure().await;
                    }
                    last_error = e;
                }
            }

            remaining -= 1;
        }

        warn!(
            operation = operation_name,
            retries,
            error = %last_error,
            "Retries exhausted"
        );
        self.resolve_exhausted(operation_name, last_error, fallback_enabled)
    }

    /// Serve the registered fallback or surface the final error
    pub fn resolve_exhausted<T>(
        &self,
        operation_name: &str,
        error: ResilienceError,
        fallback_enabled: bool,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if !fallback_enabled {
            return Err(error);
        }

        let value = self.fallbacks.dispatch(operation_name, error)?;
        serde_json::from_value(value).map_err(|e| {
            // A fallback whose shape the caller cannot consume is as good as
            // no fallback at all
            ResilienceError::NoFallback {
                operation: operation_name.to_string(),
                source: Box::new(ResilienceError::Serialization(e)),
            }
        })
    }
}

/// Run one invocation of the operation on its own task, raced against the
/// timeout.
///
/// On expiry only the wait is abandoned: the spawned task keeps running to
/// completion in the background, which is why operations must be idempotent.
pub(crate) async fn attempt_detached<T, F, Fut, E>(
    operation_name: &str,
    operation: &F,
    timeout: Duration,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::spawn(operation())).await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Err(ResilienceError::Operation(e.to_string())),
        Ok(Err(join_error)) => Err(ResilienceError::Operation(format!(
            "operation task failed: {}",
            join_error
        ))),
        Err(_) => Err(ResilienceError::OperationTimeout {
            operation: operation_name.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
