use thiserror::Error;

/// Result type for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Resilience engine error types
#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("resilience engine not initialized")]
    NotInitialized,

    #[error("circuit open for operation: {operation}")]
    CircuitOpen { operation: String },

    #[error("half-open call limit reached for operation: {operation}")]
    HalfOpenLimitExceeded { operation: String },

    #[error("operation {operation} timed out after {timeout_ms}ms")]
    OperationTimeout { operation: String, timeout_ms: u64 },

    #[error("operation failed: {0}")]
    Operation(String),

    #[error("no fallback registered for operation: {operation}")]
    NoFallback {
        operation: String,
        #[source]
        source: Box<ResilienceError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResilienceError {
    /// Whether the retry loop should attempt this failure again.
    ///
    /// Breaker-gating rejections are never retried: the circuit is known to
    /// be open, so they route directly to the fallback path. Initialization
    /// and configuration errors are fatal to the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResilienceError::Operation(_) | ResilienceError::OperationTimeout { .. }
        )
    }
}
