//! Periodic offline sweep
//!
//! Runs `check_offline` on a fixed cadence and optionally reclassifies
//! every active host, reporting its own state to the service registry.

use super::engine::{AlertEngine, OfflineScan};
use crate::error::Result;
use crate::health::{components, HealthService, ServiceHealth};
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the offline sweep
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between sweeps (default: 150 seconds)
    pub interval: Duration,
    /// Re-run host classification after each sweep
    pub reclassify: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::for_timeout(300)
    }
}

impl SweepConfig {
    /// Sweep twice per offline timeout
    pub fn for_timeout(offline_timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs((offline_timeout_secs / 2).max(1)),
            reclassify: true,
        }
    }
}

/// Outcome of one sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub hosts_checked: usize,
    pub hosts_offline: usize,
    pub alerts_created: usize,
    pub hosts_classified: usize,
}

pub struct OfflineSweep {
    engine: Arc<AlertEngine>,
    health: Option<HealthService>,
    registry: Option<ServiceHealth>,
    config: SweepConfig,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl OfflineSweep {
    pub fn new(engine: Arc<AlertEngine>, config: SweepConfig) -> Self {
        Self {
            engine,
            health: None,
            registry: None,
            config,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("offline-sweep"),
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            reclassify = self.config.reclassify,
            "Starting offline sweep"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Offline sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down offline sweep");
                    break;
                }
            }
        }
    }

    /// Execute a single sweep
    pub async fn run_once(&self) -> Result<SweepReport> {
        let start = Instant::now();

        let scan = match self.engine.scan_offline(Utc::now()).await {
            Ok(scan) => scan,
            Err(e) => {
                self.report_degraded(format!("offline check failed: {}", e))
                    .await;
                return Err(e);
            }
        };
        let OfflineScan {
            hosts_checked,
            hosts_offline,
            alerts,
        } = scan;

        let mut report = SweepReport {
            hosts_checked,
            hosts_offline,
            alerts_created: alerts.len(),
            hosts_classified: 0,
        };

        let mut classification_error = None;
        if self.config.reclassify {
            if let Some(health) = &self.health {
                match health.evaluate_all().await {
                    Ok(states) => report.hosts_classified = states.len(),
                    Err(e) => classification_error = Some(e),
                }
            }
        }

        self.metrics
            .observe_sweep_latency(start.elapsed().as_secs_f64());
        self.logger
            .log_sweep(report.hosts_checked, report.hosts_offline, report.alerts_created);

        match classification_error {
            Some(e) => {
                self.report_degraded(format!("reclassification failed: {}", e))
                    .await;
                Err(e)
            }
            None => {
                if let Some(registry) = &self.registry {
                    registry.set_healthy(components::SWEEPER).await;
                }
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Offline sweep complete"
                );
                Ok(report)
            }
        }
    }

    async fn report_degraded(&self, message: String) {
        if let Some(registry) = &self.registry {
            registry.set_degraded(components::SWEEPER, message).await;
        }
    }
}

/// Builder for the offline sweep
pub struct OfflineSweepBuilder {
    engine: Option<Arc<AlertEngine>>,
    health: Option<HealthService>,
    registry: Option<ServiceHealth>,
    config: SweepConfig,
}

impl OfflineSweepBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            health: None,
            registry: None,
            config: SweepConfig::default(),
        }
    }

    pub fn engine(mut self, engine: Arc<AlertEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Reclassify hosts through this service after each sweep
    pub fn health_service(mut self, health: HealthService) -> Self {
        self.health = Some(health);
        self
    }

    /// Report sweep status to the service registry
    pub fn registry(mut self, registry: ServiceHealth) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn reclassify(mut self, reclassify: bool) -> Self {
        self.config.reclassify = reclassify;
        self
    }

    pub fn build(self) -> anyhow::Result<OfflineSweep> {
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("Alert engine is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Sweep interval must be greater than zero");
        }
        if let Some(health) = self.health.as_ref().filter(|_| self.config.reclassify) {
            let alert_timeout = engine.thresholds().offline_timeout_secs;
            let health_timeout = health.thresholds().offline_timeout_secs;
            if alert_timeout != health_timeout {
                anyhow::bail!(
                    "Offline timeout differs between alerting ({}s) and classification ({}s)",
                    alert_timeout,
                    health_timeout
                );
            }
        }

        let mut sweep = OfflineSweep::new(engine, self.config);
        sweep.health = self.health;
        sweep.registry = self.registry;
        Ok(sweep)
    }
}

impl Default for OfflineSweepBuilder {
    fn default() -> Self {
        Self::new()
    }
}
