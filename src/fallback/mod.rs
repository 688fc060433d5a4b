use crate::error::{ResilienceError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::warn;

/// Maps operation names to static degraded responses.
///
/// Values are deterministic constants, served when retries are exhausted and
/// no live result is available. They are deliberately minimal and clearly
/// degraded rather than a guess at the real answer.
#[derive(Debug, Clone)]
pub struct FallbackDispatcher {
    table: HashMap<String, Value>,
}

impl Default for FallbackDispatcher {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FallbackDispatcher {
    /// Empty dispatcher with no registered fallbacks
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Static fallback table for the platform's protected operations.
    ///
    /// Operations without an entry (storage uploads in particular) have no
    /// meaningful degraded answer and surface `NoFallback` instead.
    pub fn builtin() -> Self {
        let mut dispatcher = Self::empty();

        // Neutral analysis result: no labels, zero confidence
        dispatcher.register(
            "job_analysis",
            json!({
                "status": "degraded",
                "labels": [],
                "confidence": 0.0,
            }),
        );

        // Minimal resource allocation
        dispatcher.register(
            "resource_allocation",
            json!({
                "tier": "minimal",
                "gpu": false,
                "concurrent_jobs": 1,
            }),
        );

        // Empty result set, flagged as degraded
        dispatcher.register(
            "database_query",
            json!({
                "rows": [],
                "degraded": true,
            }),
        );

        dispatcher
    }

    /// Register or replace a fallback value for an operation name
    pub fn register(&mut self, operation: &str, value: Value) {
        self.table.insert(operation.to_string(), value);
    }

    /// Degraded value for an operation, or `NoFallback` wrapping the error
    /// that exhausted the retries.
    pub fn dispatch(&self, operation: &str, error: ResilienceError) -> Result<Value> {
        match self.table.get(operation) {
            Some(value) => {
                warn!(
                    operation = operation,
                    error = %error,
                    "Serving degraded fallback response"
                );
                Ok(value.clone())
            }
            None => Err(ResilienceError::NoFallback {
                operation: operation.to_string(),
                source: Box::new(error),
            }),
        }
    }

    /// Whether an operation has a registered fallback
    pub fn has_fallback(&self, operation: &str) -> bool {
        self.table.contains_key(operation)
    }
}
