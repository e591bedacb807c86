//! Threshold evaluation and alert lifecycle
//!
//! Handles:
//! - Creating alerts for CPU and per-filesystem disk threshold crossings
//! - Raising `offline` alerts for hosts that stopped reporting
//! - Deduplication against open alerts keyed on (host, type, discriminator)
//! - Explicit resolution
//! - Logging and notification dispatch for every new alert

use crate::error::{EngineError, Result, StoreError};
use crate::models::{
    Alert, AlertKey, AlertSeverity, AlertType, HealthUpdate, HostRecord, MetricSample, NewAlert,
};
use crate::notify::Notifier;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::HealthStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Alerting thresholds, in percent except for the timeout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// CPU usage strictly above this raises a `cpu` alert
    pub cpu_threshold: f64,
    /// CPU alerts at or above this are critical
    pub cpu_critical: f64,
    /// Filesystem usage strictly above this raises a `disk` alert
    pub disk_threshold: f64,
    /// Disk alerts at or above this are critical
    pub disk_critical: f64,
    /// Seconds without a sample before an `offline` alert is raised
    pub offline_timeout_secs: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_threshold: 90.0,
            cpu_critical: 95.0,
            disk_threshold: 80.0,
            disk_critical: 90.0,
            offline_timeout_secs: 300,
        }
    }
}

impl AlertThresholds {
    pub fn offline_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.offline_timeout_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        let pairs = [
            ("cpu", self.cpu_threshold, self.cpu_critical),
            ("disk", self.disk_threshold, self.disk_critical),
        ];

        for (name, threshold, critical) in pairs {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(EngineError::InvalidConfig(format!(
                    "{} alert threshold must be within 0-100, got {}",
                    name, threshold
                )));
            }
            if critical < threshold {
                return Err(EngineError::InvalidConfig(format!(
                    "{} critical cutoff ({}) is below the alert threshold ({})",
                    name, critical, threshold
                )));
            }
        }

        if self.offline_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "offline timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn severity(value: f64, critical: f64) -> AlertSeverity {
        if value >= critical {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        }
    }
}

/// Snapshot of the engine configuration and open alert counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub thresholds: AlertThresholds,
    pub webhook_sinks: usize,
    pub open_alerts: usize,
    pub open_by_type: BTreeMap<String, usize>,
}

/// Result of one pass over all active hosts
#[derive(Debug, Default)]
pub(crate) struct OfflineScan {
    pub hosts_checked: usize,
    pub hosts_offline: usize,
    pub alerts: Vec<Alert>,
}

/// Alert coordinator over a [`HealthStore`]
///
/// The state held here is a lock per host, which serialises the
/// "read open alerts, then create" sequence so that two concurrent
/// evaluations of the same host cannot both raise the same condition,
/// and the set of notification deliveries still in flight.
pub struct AlertEngine {
    store: Arc<dyn HealthStore>,
    thresholds: AlertThresholds,
    notifier: Option<Arc<dyn Notifier>>,
    host_locks: DashMap<String, Arc<Mutex<()>>>,
    notifications: std::sync::Mutex<JoinSet<()>>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn HealthStore>, thresholds: AlertThresholds) -> Self {
        Self {
            store,
            thresholds,
            notifier: None,
            host_locks: DashMap::new(),
            notifications: std::sync::Mutex::new(JoinSet::new()),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("alert-engine"),
        }
    }

    /// Deliver new alerts through `notifier` in addition to logging them
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    fn host_lock(&self, host_id: &str) -> Arc<Mutex<()>> {
        self.host_locks
            .entry(host_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop locks of hosts that are no longer active and that no caller
    /// currently holds
    fn prune_host_locks(&self, active: &HashSet<String>) {
        self.host_locks
            .retain(|host, lock| active.contains(host) || Arc::strong_count(lock) > 1);
    }

    /// Threshold crossings present in a sample, before deduplication
    fn crossings(&self, sample: &MetricSample) -> Vec<NewAlert> {
        let t = &self.thresholds;
        let mut crossings = Vec::new();

        if sample.cpu_usage > t.cpu_threshold {
            crossings.push(NewAlert {
                host_id: sample.host_id.clone(),
                alert_type: AlertType::Cpu,
                discriminator: None,
                severity: AlertThresholds::severity(sample.cpu_usage, t.cpu_critical),
                message: format!(
                    "High CPU usage on {}: {:.1}%",
                    sample.host_id, sample.cpu_usage
                ),
                threshold_value: Some(t.cpu_threshold),
                actual_value: Some(sample.cpu_usage),
            });
        }

        for disk in &sample.disk_usage {
            if disk.percentage > t.disk_threshold {
                crossings.push(NewAlert {
                    host_id: sample.host_id.clone(),
                    alert_type: AlertType::Disk,
                    discriminator: Some(disk.mountpoint.clone()),
                    severity: AlertThresholds::severity(disk.percentage, t.disk_critical),
                    message: format!(
                        "High disk usage on {}: {:.1}% ({})",
                        sample.host_id, disk.percentage, disk.mountpoint
                    ),
                    threshold_value: Some(t.disk_threshold),
                    actual_value: Some(disk.percentage),
                });
            }
        }

        crossings
    }

    /// Insert an alert, treating a uniqueness conflict as "already open"
    async fn insert(&self, new_alert: NewAlert) -> std::result::Result<Option<Alert>, StoreError> {
        match self.store.create_alert(new_alert).await {
            Ok(alert) => Ok(Some(alert)),
            Err(e) if e.is_conflict() => {
                self.metrics.inc_duplicates_skipped();
                debug!(error = %e, "Alert already open, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create every crossing that has no open alert yet.
    ///
    /// Returns what was created even when a later insert fails, so the
    /// caller can still dispatch the alerts that did become durable.
    async fn create_missing(
        &self,
        host_id: &str,
        crossings: Vec<NewAlert>,
    ) -> (Vec<Alert>, Option<StoreError>) {
        let lock = self.host_lock(host_id);
        let _guard = lock.lock().await;

        let open: HashSet<AlertKey> = match self.store.get_open_alerts(Some(host_id)).await {
            Ok(open) => open.iter().map(Alert::key).collect(),
            Err(e) => return (Vec::new(), Some(e)),
        };

        let mut created = Vec::new();
        for crossing in crossings {
            if open.contains(&crossing.key()) {
                self.metrics.inc_duplicates_skipped();
                debug!(
                    host = %host_id,
                    alert_type = %crossing.alert_type,
                    discriminator = ?crossing.discriminator,
                    "Open alert exists, not raising again"
                );
                continue;
            }

            match self.insert(crossing).await {
                Ok(Some(alert)) => created.push(alert),
                Ok(None) => {}
                Err(e) => return (created, Some(e)),
            }
        }

        (created, None)
    }

    /// Log a new alert and hand it to the notifier.
    ///
    /// Delivery runs on its own task so alert creation never waits on a
    /// sink; problems are recorded by the notifier and the alert itself is
    /// already durable.
    fn dispatch(&self, alert: &Alert) {
        self.logger.log_alert(alert);
        self.metrics.inc_alerts_created(alert);

        let Some(notifier) = self.notifier.as_ref().filter(|n| n.sink_count() > 0) else {
            return;
        };

        let notifier = notifier.clone();
        let alert = alert.clone();
        let mut pending = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Reap finished deliveries so the set only holds live tasks
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            let results = notifier.notify(&alert).await;
            let delivered = results.iter().filter(|r| r.delivered).count();
            debug!(
                alert_id = alert.id,
                delivered = delivered,
                sinks = results.len(),
                "Alert notification dispatched"
            );
        });
    }

    /// Wait for every notification handed out so far to finish
    pub async fn flush_notifications(&self) {
        let mut pending = {
            let mut guard = self
                .notifications
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };

        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Notification task ended abnormally");
            }
        }
    }

    /// Evaluate a freshly accepted sample.
    ///
    /// Returns only alerts created by this call; crossings that already
    /// have an open alert are skipped.
    pub async fn evaluate(&self, sample: &MetricSample) -> Result<Vec<Alert>> {
        let crossings = self.crossings(sample);
        if crossings.is_empty() {
            return Ok(Vec::new());
        }

        let (created, failure) = self.create_missing(&sample.host_id, crossings).await;

        for alert in &created {
            self.dispatch(alert);
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(created),
        }
    }

    /// Raise `offline` alerts for every stale active host
    pub async fn check_offline(&self) -> Result<Vec<Alert>> {
        self.check_offline_at(Utc::now()).await
    }

    /// [`check_offline`](Self::check_offline) with an explicit clock
    pub async fn check_offline_at(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        Ok(self.scan_offline(now).await?.alerts)
    }

    pub(crate) async fn scan_offline(&self, now: DateTime<Utc>) -> Result<OfflineScan> {
        let hosts = self.store.get_active_hosts().await?;
        let active: HashSet<String> = hosts.iter().map(|h| h.host_id.clone()).collect();
        let timeout = self.thresholds.offline_timeout();
        let mut scan = OfflineScan {
            hosts_checked: hosts.len(),
            ..Default::default()
        };

        for host in hosts {
            let stale = match host.last_seen {
                Some(seen) => now - seen > timeout,
                None => true,
            };
            if !stale {
                continue;
            }
            scan.hosts_offline += 1;

            match self.raise_offline(&host, now).await {
                Ok(Some(alert)) => scan.alerts.push(alert),
                Ok(None) => {}
                Err(e) => {
                    self.metrics.inc_evaluation_errors();
                    warn!(
                        host = %host.host_id,
                        error = %e,
                        "Failed to evaluate offline host"
                    );
                }
            }
        }

        self.prune_host_locks(&active);
        self.metrics.set_hosts_offline(scan.hosts_offline as i64);
        Ok(scan)
    }

    async fn raise_offline(
        &self,
        host: &HostRecord,
        now: DateTime<Utc>,
    ) -> std::result::Result<Option<Alert>, StoreError> {
        let alert = {
            let lock = self.host_lock(&host.host_id);
            let _guard = lock.lock().await;

            let open = self.store.get_open_alerts(Some(&host.host_id)).await?;
            if open.iter().any(|a| a.alert_type == AlertType::Offline) {
                return Ok(None);
            }

            let offline_secs = host
                .seconds_since_seen(now)
                .unwrap_or_else(|| (now - host.registered_at).num_seconds() as f64);
            let message = match host.last_seen {
                Some(_) => format!(
                    "Host {} has been offline for {} minutes",
                    host.host_id,
                    (offline_secs / 60.0) as i64
                ),
                None => format!("Host {} has never reported metrics", host.host_id),
            };

            let created = self
                .insert(NewAlert {
                    host_id: host.host_id.clone(),
                    alert_type: AlertType::Offline,
                    discriminator: None,
                    severity: AlertSeverity::Critical,
                    message,
                    threshold_value: Some(self.thresholds.offline_timeout_secs as f64),
                    actual_value: Some(offline_secs),
                })
                .await?;
            let Some(alert) = created else {
                return Ok(None);
            };

            if let Err(e) = self
                .store
                .upsert_health(HealthUpdate::offline(host.host_id.clone()))
                .await
            {
                warn!(
                    host = %host.host_id,
                    error = %e,
                    "Offline alert raised but health classification not updated"
                );
            }
            alert
        };

        self.dispatch(&alert);
        Ok(Some(alert))
    }

    /// Resolve open alerts for a host, all of them or only the given types.
    ///
    /// Returns the number of alerts resolved.
    pub async fn resolve_for_host(
        &self,
        host_id: &str,
        types: Option<&[AlertType]>,
    ) -> Result<usize> {
        let lock = self.host_lock(host_id);
        let _guard = lock.lock().await;

        let open = self.store.get_open_alerts(Some(host_id)).await?;
        let mut resolved = 0;

        for alert in open
            .iter()
            .filter(|a| types.map(|t| t.contains(&a.alert_type)).unwrap_or(true))
        {
            if self.store.resolve_alert(alert.id).await? {
                resolved += 1;
                self.logger.log_alert_resolved(alert);
            }
        }

        if resolved > 0 {
            self.metrics.inc_alerts_resolved(resolved as u64);
        }
        Ok(resolved)
    }

    pub async fn statistics(&self) -> Result<AlertStatistics> {
        let open = self.store.get_open_alerts(None).await?;
        let mut open_by_type = BTreeMap::new();
        for alert in &open {
            *open_by_type
                .entry(alert.alert_type.to_string())
                .or_insert(0usize) += 1;
        }

        Ok(AlertStatistics {
            thresholds: self.thresholds.clone(),
            webhook_sinks: self.notifier.as_ref().map(|n| n.sink_count()).unwrap_or(0),
            open_alerts: open.len(),
            open_by_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::sample;

    #[tokio::test]
    async fn test_offline_scan_prunes_locks_of_inactive_hosts() {
        let store = MemoryStore::new();
        store.register_host("web-1").await;
        store.register_host("retired").await;
        let engine = AlertEngine::new(Arc::new(store.clone()), AlertThresholds::default());

        engine.evaluate(&sample("web-1", 95.0, &[])).await.unwrap();
        engine.evaluate(&sample("retired", 95.0, &[])).await.unwrap();
        assert_eq!(engine.host_locks.len(), 2);

        store.deactivate_host("retired").await.unwrap();
        engine.check_offline().await.unwrap();

        assert!(engine.host_locks.contains_key("web-1"));
        assert!(!engine.host_locks.contains_key("retired"));
    }

    #[tokio::test]
    async fn test_offline_scan_keeps_lock_held_by_caller() {
        let engine = AlertEngine::new(Arc::new(MemoryStore::new()), AlertThresholds::default());
        let held = engine.host_lock("gone");

        engine.check_offline().await.unwrap();
        assert!(engine.host_locks.contains_key("gone"));

        drop(held);
        engine.check_offline().await.unwrap();
        assert!(engine.host_locks.is_empty());
    }
}
