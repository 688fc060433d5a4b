use serde::{Deserialize, Serialize};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, allowing probe calls
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Observability snapshot of one operation's breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    /// Operation name the breaker guards
    pub operation: String,
    /// Current circuit state
    pub state: CircuitState,
    /// Failures recorded since the circuit last closed
    pub failure_count: u64,
    /// Successes recorded since the circuit last closed
    pub success_count: u64,
    /// Milliseconds since the most recent recorded failure, if any
    pub last_failure_ms_ago: Option<u64>,
    /// Observation window from the breaker's configuration, in seconds
    pub monitoring_period_secs: u64,
}
