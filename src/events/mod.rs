use crate::circuit_breaker::CircuitState;
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// Events emitted by the resilience engine.
///
/// Delivery is fire-and-forget; consumers must not rely on ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResilienceEvent {
    CircuitBreakerStateChanged {
        operation: String,
        state: CircuitState,
    },
    ResilienceDegraded {
        open_count: usize,
        total_count: usize,
    },
    FailoverUnhealthy {
        detail: String,
    },
}

/// One-way notification sink consumed by the engine.
///
/// Implementations receive state-change and degradation events; no
/// acknowledgment is expected and errors must be handled internally.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: ResilienceEvent);
}

/// Sink that emits events as structured log lines
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: ResilienceEvent) {
        match &event {
            ResilienceEvent::CircuitBreakerStateChanged { operation, state } => {
                info!(operation = %operation, state = %state, "circuit_breaker_state_changed");
            }
            ResilienceEvent::ResilienceDegraded {
                open_count,
                total_count,
            } => {
                info!(open_count, total_count, "resilience_degraded");
            }
            ResilienceEvent::FailoverUnhealthy { detail } => {
                info!(detail = %detail, "failover_unhealthy");
            }
        }
    }
}

/// Sink that buffers events in memory, mainly for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ResilienceEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events received so far
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.lock().expect("recording sink poisoned").clone()
    }

    /// Drain and return buffered events
    pub fn take(&self) -> Vec<ResilienceEvent> {
        std::mem::take(&mut *self.events.lock().expect("recording sink poisoned"))
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: ResilienceEvent) {
        self.events
            .lock()
            .expect("recording sink poisoned")
            .push(event);
    }
}
