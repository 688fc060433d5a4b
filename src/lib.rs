//! Per-operation fault isolation for unreliable calls.
//!
//! Wraps arbitrary operations (storage, databases, external services,
//! compute jobs) with circuit breaking, bounded retry with backoff and
//! jitter, timeout enforcement, and deterministic degraded fallbacks.
//! State is in-memory and per-process; breakers are created lazily per
//! operation name and discarded at shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use resilience::{
//!     DegradationMonitorConfig, FallbackDispatcher, PolicyTable,
//!     ResilienceEngine, ResilienceOptions, TracingSink,
//! };
//! use resilience::monitor::AlwaysHealthy;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ResilienceEngine::new(
//!         PolicyTable::builtin(),
//!         FallbackDispatcher::builtin(),
//!         DegradationMonitorConfig::default(),
//!         Arc::new(TracingSink),
//!         Arc::new(AlwaysHealthy),
//!     );
//!     engine.initialize().unwrap();
//!
//!     let result: Result<serde_json::Value, _> = engine
//!         .execute_with_resilience(
//!             "job_analysis",
//!             || async { Ok::<_, String>(serde_json::json!({"labels": ["cat"]})) },
//!             ResilienceOptions::default(),
//!         )
//!         .await;
//!     println!("{:?}", result);
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fallback;
pub mod monitor;
pub mod retry;

// Re-export commonly used types
pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitState, OperationStats};
pub use config::{
    CircuitBreakerConfig, ConfigSource, PolicyOverrides, PolicyTable, RetryPolicy, YamlFileSource,
};
pub use engine::{ResilienceEngine, ResilienceOptions};
pub use error::{ResilienceError, Result};
pub use events::{NotificationSink, RecordingSink, ResilienceEvent, TracingSink};
pub use fallback::FallbackDispatcher;
pub use monitor::{
    DegradationMonitor, DegradationMonitorConfig, FailoverHealth, FailoverStatus,
};
pub use retry::RetryOrchestrator;

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resilience=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
