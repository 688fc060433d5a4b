use crate::circuit_breaker::{BreakerRegistry, OperationStats};
use crate::config::PolicyTable;
use crate::error::{ResilienceError, Result};
use crate::events::NotificationSink;
use crate::fallback::FallbackDispatcher;
use crate::monitor::{DegradationMonitor, DegradationMonitorConfig, FailoverHealth};
use crate::retry::{self, RetryOrchestrator};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Per-call execution options
#[derive(Debug, Clone)]
pub struct ResilienceOptions {
    /// Timeout raced against each invocation of the operation
    pub timeout: Duration,
    /// Retry attempts after the initial call
    pub retries: u32,
    /// Gate and record against the operation's circuit breaker
    pub circuit_breaker_enabled: bool,
    /// Serve the registered degraded response once retries are exhausted
    pub fallback_enabled: bool,
}

impl Default for ResilienceOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            circuit_breaker_enabled: true,
            fallback_enabled: true,
        }
    }
}

/// Entry point tying named operations to circuit breakers, timeouts,
/// bounded retry, and fallback.
///
/// Constructed from explicit policy tables and collaborators; `initialize`
/// must complete before the first call and `shutdown` discards all breaker
/// state.
pub struct ResilienceEngine {
    policies: Arc<PolicyTable>,
    registry: BreakerRegistry,
    orchestrator: RetryOrchestrator,
    monitor: DegradationMonitor,
    failover: Arc<dyn FailoverHealth>,
    sink: Arc<dyn NotificationSink>,
    initialized: AtomicBool,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResilienceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceEngine")
            .field("registry", &self.registry)
            .field("initialized", &self.initialized.load(Ordering::SeqCst))
            .finish()
    }
}

impl ResilienceEngine {
    /// Create an engine from explicit policy tables and collaborators
    pub fn new(
        policies: PolicyTable,
        fallbacks: FallbackDispatcher,
        monitor_config: DegradationMonitorConfig,
        sink: Arc<dyn NotificationSink>,
        failover: Arc<dyn FailoverHealth>,
    ) -> Self {
        let policies = Arc::new(policies);
        let fallbacks = Arc::new(fallbacks);

        Self {
            registry: BreakerRegistry::new(policies.clone(), sink.clone()),
            orchestrator: RetryOrchestrator::new(policies.clone(), fallbacks),
            policies,
            monitor: DegradationMonitor::new(monitor_config),
            failover,
            sink,
            initialized: AtomicBool::new(false),
            monitor_handle: Mutex::new(None),
        }
    }

    /// Validate configuration and start the degradation monitor.
    ///
    /// Must complete before any `execute_with_resilience` call. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        self.policies.validate()?;

        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Resilience engine already initialized");
            return Ok(());
        }

        let handle = self.monitor.start(
            self.registry.clone(),
            self.failover.clone(),
            self.sink.clone(),
        );
        *self
            .monitor_handle
            .lock()
            .expect("monitor handle lock poisoned") = handle;

        info!("Resilience engine initialized");
        Ok(())
    }

    /// Stop the degradation monitor and discard all breaker state
    pub fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);

        if let Some(handle) = self
            .monitor_handle
            .lock()
            .expect("monitor handle lock poisoned")
            .take()
        {
            handle.abort();
        }

        self.registry.clear();
        info!("Resilience engine shut down");
    }

    /// Execute a named operation under the engine's protections.
    ///
    /// The operation races a timer of `options.timeout`; a timed-out
    /// operation is abandoned but not cancelled and may run to completion in
    /// the background, so operations must be idempotent. On failure the call
    /// is retried with backoff up to `options.retries` times and finally
    /// resolved against the fallback table.
    pub async fn execute_with_resilience<T, F, Fut, E>(
        &self,
        operation_name: &str,
        operation: F,
        options: ResilienceOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ResilienceError::NotInitialized);
        }

        let breaker = if options.circuit_breaker_enabled {
            Some(self.registry.get_or_create(operation_name))
        } else {
            None
        };

        // An open or probe-saturated circuit rejects the call before any
        // timeout wrapper; the rejection goes straight to the fallback path
        // without consuming retries.
        if let Some(breaker) = &breaker {
            if let Err(gate) = breaker.try_acquire().await {
                return self.orchestrator.resolve_exhausted(
                    operation_name,
                    gate,
                    options.fallback_enabled,
                );
            }
        }

        let first_error =
            match retry::attempt_detached(operation_name, &operation, options.timeout).await {
                Ok(result) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success().await;
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_failure().await;
                    }
                    e
                }
            };

        self.orchestrator
            .run(
                operation_name,
                operation,
                options.timeout,
                options.retries,
                options.fallback_enabled,
                breaker,
                first_error,
            )
            .await
    }

    /// Per-operation breaker snapshots, keyed by operation name
    pub async fn get_stats(&self) -> HashMap<String, OperationStats> {
        self.registry.all_stats().await
    }

    /// Force an operation's breaker back to closed
    pub async fn reset_circuit_breaker(&self, operation_name: &str) {
        self.registry.reset(operation_name).await;
    }
}
