use crate::circuit_breaker::BreakerRegistry;
use crate::events::{NotificationSink, ResilienceEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Degradation monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationMonitorConfig {
    /// Enable the periodic sweep
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interval between sweeps in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Open-breaker fraction above which the engine is considered degraded
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_interval() -> u64 {
    30
}

fn default_degraded_threshold() -> f64 {
    0.5
}

impl Default for DegradationMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
            degraded_threshold: default_degraded_threshold(),
        }
    }
}

/// Health of the external failover path, probed on every sweep
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverStatus {
    pub healthy: bool,
    pub detail: String,
}

impl FailoverStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            detail: String::new(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// External failover-health collaborator
#[async_trait]
pub trait FailoverHealth: Send + Sync {
    async fn status(&self) -> FailoverStatus;
}

/// Failover collaborator that always reports healthy, for deployments
/// without a failover path
#[derive(Debug, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl FailoverHealth for AlwaysHealthy {
    async fn status(&self) -> FailoverStatus {
        FailoverStatus::healthy()
    }
}

/// Periodic sweep over all circuit breakers producing aggregate health
/// signals. Sweep failures are logged and never propagate.
pub struct DegradationMonitor {
    config: DegradationMonitorConfig,
}

impl std::fmt::Debug for DegradationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradationMonitor")
            .field("config", &self.config)
            .finish()
    }
}

impl DegradationMonitor {
    pub fn new(config: DegradationMonitorConfig) -> Self {
        Self { config }
    }

    /// Spawn the sweep task; returns `None` when the monitor is disabled
    pub fn start(
        &self,
        registry: BreakerRegistry,
        failover: Arc<dyn FailoverHealth>,
        sink: Arc<dyn NotificationSink>,
    ) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Degradation monitor disabled");
            return None;
        }

        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut sweep_interval = interval(Duration::from_secs(config.interval_secs));

            info!(
                interval_secs = config.interval_secs,
                degraded_threshold = config.degraded_threshold,
                "Started degradation monitor"
            );

            loop {
                sweep_interval.tick().await;
                Self::sweep(&config, &registry, failover.as_ref(), sink.as_ref()).await;
            }
        });

        Some(handle)
    }

    /// One monitor iteration: open-fraction check plus failover probe
    async fn sweep(
        config: &DegradationMonitorConfig,
        registry: &BreakerRegistry,
        failover: &dyn FailoverHealth,
        sink: &dyn NotificationSink,
    ) {
        let (open_count, total_count) = registry.open_fraction().await;

        if total_count > 0 {
            let fraction = open_count as f64 / total_count as f64;
            debug!(open_count, total_count, fraction, "Degradation sweep");

            if fraction > config.degraded_threshold {
                warn!(
                    open_count,
                    total_count, "Resilience degraded: majority of circuits open"
                );
                sink.notify(ResilienceEvent::ResilienceDegraded {
                    open_count,
                    total_count,
                });
            }
        }

        let status = failover.status().await;
        if !status.healthy {
            warn!(detail = %status.detail, "Failover path unhealthy");
            sink.notify(ResilienceEvent::FailoverUnhealthy {
                detail: status.detail,
            });
        }
    }
}
