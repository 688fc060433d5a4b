use super::types::{CircuitState, OperationStats};
use crate::config::CircuitBreakerConfig;
use crate::error::{ResilienceError, Result};
use crate::events::{NotificationSink, ResilienceEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Circuit breaker for a single named operation.
///
/// State transitions follow the gate-and-record protocol: `try_acquire`
/// admits or rejects a call, `record_success`/`record_failure` apply the
/// outcome once the call settles. Under concurrency outcomes are applied in
/// settlement order, which may differ from call-initiation order.
pub struct CircuitBreaker {
    /// Operation name this breaker guards
    operation: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// Current state
    state: RwLock<State>,
    /// Sink for state-change notifications
    sink: Arc<dyn NotificationSink>,
}

struct State {
    /// Current circuit state
    circuit_state: CircuitState,
    /// Failures recorded since the circuit last closed
    failure_count: u64,
    /// Successes recorded since the circuit last closed
    success_count: u64,
    /// Time of the most recent recorded failure
    last_failure: Option<Instant>,
    /// Probe calls admitted in the current half-open window
    half_open_admitted: u32,
    /// Probe calls that succeeded in the current half-open window
    half_open_successes: u32,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the closed state
    pub fn new(
        operation: String,
        config: CircuitBreakerConfig,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        info!(
            operation = %operation,
            failure_threshold = config.failure_threshold,
            recovery_timeout_secs = config.recovery_timeout_secs,
            half_open_max_calls = config.half_open_max_calls,
            "Creating circuit breaker"
        );

        Self {
            operation,
            config,
            state: RwLock::new(State {
                circuit_state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                half_open_admitted: 0,
                half_open_successes: 0,
            }),
            sink,
        }
    }

    /// Gate a call against the current state.
    ///
    /// Performs the lazy open-to-half-open transition once the recovery
    /// timeout has elapsed since the last failure. Rejections do not count
    /// as breaker failures.
    pub async fn try_acquire(&self) -> Result<()> {
        let mut state = self.state.write().await;

        match state.circuit_state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = state.last_failure.map(|at| at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed >= self.config.recovery_timeout() => {
                        self.transition_to_half_open(&mut state);
                        state.half_open_admitted += 1;
                        Ok(())
                    }
                    Some(elapsed) => {
                        debug!(
                            operation = %self.operation,
                            remaining = ?self.config.recovery_timeout() - elapsed,
                            "Circuit open, rejecting call"
                        );
                        Err(ResilienceError::CircuitOpen {
                            operation: self.operation.clone(),
                        })
                    }
                    None => {
                        warn!(operation = %self.operation, "Circuit open without failure timestamp");
                        Err(ResilienceError::CircuitOpen {
                            operation: self.operation.clone(),
                        })
                    }
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_admitted < self.config.half_open_max_calls {
                    state.half_open_admitted += 1;
                    debug!(
                        operation = %self.operation,
                        half_open_admitted = state.half_open_admitted,
                        max = self.config.half_open_max_calls,
                        "Allowing half-open probe call"
                    );
                    Ok(())
                } else {
                    debug!(
                        operation = %self.operation,
                        "Half-open probe budget exhausted, rejecting call"
                    );
                    Err(ResilienceError::HalfOpenLimitExceeded {
                        operation: self.operation.clone(),
                    })
                }
            }
        }
    }

    /// Gate, run, and record a single operation under this breaker
    pub async fn execute<T, F, Fut, E>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        self.try_acquire().await?;

        match operation().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(e) => {
                self.record_failure().await;
                Err(ResilienceError::Operation(e.to_string()))
            }
        }
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.success_count += 1;

        match state.circuit_state {
            CircuitState::Closed => {
                // Threshold counts consecutive failures only
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                debug!(
                    operation = %self.operation,
                    half_open_successes = state.half_open_successes,
                    required = self.config.half_open_max_calls,
                    "Half-open probe call succeeded"
                );

                if state.half_open_successes >= self.config.half_open_max_calls {
                    self.transition_to_closed(&mut state);
                }
            }
            CircuitState::Open => {
                // A call admitted earlier settling after the circuit opened
                debug!(operation = %self.operation, "Recording success while open");
            }
        }
    }

    /// Record a failed call
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        match state.circuit_state {
            CircuitState::Closed => {
                debug!(
                    operation = %self.operation,
                    failure_count = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "Call failed in closed state"
                );

                if state.failure_count >= u64::from(self.config.failure_threshold) {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    operation = %self.operation,
                    "Half-open probe call failed, reopening circuit"
                );
                // Any failure while half-open reopens the circuit
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {
                debug!(operation = %self.operation, "Recording failure while open");
            }
        }
    }

    /// Force the breaker back to closed with all counters zeroed
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        info!(operation = %self.operation, "Resetting circuit breaker");
        self.transition_to_closed(&mut state);
    }

    /// Current circuit state
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.circuit_state
    }

    /// Operation name this breaker guards
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Observability snapshot
    pub async fn stats(&self) -> OperationStats {
        let state = self.state.read().await;
        OperationStats {
            operation: self.operation.clone(),
            state: state.circuit_state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_ms_ago: state.last_failure.map(|at| at.elapsed().as_millis() as u64),
            monitoring_period_secs: self.config.monitoring_period_secs,
        }
    }

    fn transition_to_open(&self, state: &mut State) {
        info!(
            operation = %self.operation,
            failure_count = state.failure_count,
            "Circuit breaker opening"
        );

        state.half_open_admitted = 0;
        state.half_open_successes = 0;
        self.enter(state, CircuitState::Open);
    }

    fn transition_to_half_open(&self, state: &mut State) {
        info!(
            operation = %self.operation,
            recovery_timeout = ?self.config.recovery_timeout(),
            "Circuit breaker transitioning to half-open"
        );

        state.half_open_admitted = 0;
        state.half_open_successes = 0;
        self.enter(state, CircuitState::HalfOpen);
    }

    fn transition_to_closed(&self, state: &mut State) {
        info!(
            operation = %self.operation,
            half_open_successes = state.half_open_successes,
            "Circuit breaker closing"
        );

        state.failure_count = 0;
        state.success_count = 0;
        state.last_failure = None;
        state.half_open_admitted = 0;
        state.half_open_successes = 0;
        self.enter(state, CircuitState::Closed);
    }

    /// Apply the new state and notify only on an actual change
    fn enter(&self, state: &mut State, next: CircuitState) {
        if state.circuit_state == next {
            return;
        }
        state.circuit_state = next;
        self.sink.notify(ResilienceEvent::CircuitBreakerStateChanged {
            operation: self.operation.clone(),
            state: next,
        });
    }
}
