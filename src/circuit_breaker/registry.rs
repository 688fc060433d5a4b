use super::breaker::CircuitBreaker;
use super::types::{CircuitState, OperationStats};
use crate::config::PolicyTable;
use crate::events::NotificationSink;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Registry of circuit breakers, one per operation name.
///
/// Breakers are created lazily on first use with the configuration resolved
/// from the policy table and live until the registry is cleared at shutdown.
#[derive(Clone)]
pub struct BreakerRegistry {
    breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    policies: Arc<PolicyTable>,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

impl BreakerRegistry {
    pub fn new(policies: Arc<PolicyTable>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            policies,
            sink,
        }
    }

    /// Get or lazily create the breaker for an operation name
    pub fn get_or_create(&self, operation: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                debug!(operation = operation, "Creating new circuit breaker");
                Arc::new(CircuitBreaker::new(
                    operation.to_string(),
                    self.policies.breaker_config(operation).clone(),
                    self.sink.clone(),
                ))
            })
            .clone()
    }

    /// Existing breaker for an operation name, if any
    pub fn get(&self, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(operation).map(|entry| entry.value().clone())
    }

    /// Current state for an operation; closed when no breaker exists yet
    pub async fn state(&self, operation: &str) -> CircuitState {
        match self.get(operation) {
            Some(breaker) => breaker.state().await,
            None => CircuitState::Closed,
        }
    }

    /// Force an operation's breaker back to closed; unknown names are a no-op
    pub async fn reset(&self, operation: &str) {
        match self.get(operation) {
            Some(breaker) => breaker.reset().await,
            None => debug!(operation = operation, "Reset requested for unknown breaker"),
        }
    }

    /// Snapshot of every breaker, keyed by operation name
    pub async fn all_stats(&self) -> HashMap<String, OperationStats> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();

        let mut stats = HashMap::with_capacity(breakers.len());
        for breaker in breakers {
            stats.insert(breaker.operation().to_string(), breaker.stats().await);
        }
        stats
    }

    /// Count of open breakers and total breakers
    pub async fn open_fraction(&self) -> (usize, usize) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.value().clone()).collect();

        let total = breakers.len();
        let mut open = 0;
        for breaker in breakers {
            if breaker.state().await == CircuitState::Open {
                open += 1;
            }
        }
        (open, total)
    }

    /// Discard all breaker state
    pub fn clear(&self) {
        self.breakers.clear();
    }
}
