//! Shared fixtures for unit tests

use crate::error::StoreError;
use crate::models::{
    Alert, DiskUsage, FailedService, HealthClassification, HealthUpdate, HostRecord, LoadAverage, MemoryInfo,
    MetricSample, NewAlert,
};
use crate::store::{HealthStore, MemoryStore, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Sample with the given CPU and `(mountpoint, percentage)` filesystems
pub fn sample(host: &str, cpu: f64, disks: &[(&str, f64)]) -> MetricSample {
    sample_with_memory(host, cpu, 25.0, disks)
}

/// Same as [`sample`] with an explicit memory percentage
pub fn sample_with_memory(
    host: &str,
    cpu: f64,
    memory: f64,
    disks: &[(&str, f64)],
) -> MetricSample {
    let total = 16 * 1024 * 1024 * 1024u64;
    MetricSample {
        host_id: host.to_string(),
        timestamp: Utc::now(),
        cpu_usage: cpu,
        memory: MemoryInfo {
            total,
            used: (total as f64 * memory / 100.0) as u64,
            percentage: memory,
        },
        disk_usage: disks
            .iter()
            .map(|(mount, pct)| DiskUsage {
                mountpoint: mount.to_string(),
                total: 500 * 1024 * 1024 * 1024,
                used: (5.0 * 1024.0 * 1024.0 * 1024.0 * pct) as u64,
                percentage: *pct,
            })
            .collect(),
        load_average: LoadAverage {
            one_min: 0.8,
            five_min: 0.6,
            fifteen_min: 0.5,
        },
        uptime: 86_400,
        failed_services: vec![],
    }
}

/// A unit in the `failed` state
pub fn failed_service(name: &str) -> FailedService {
    FailedService {
        name: name.to_string(),
        status: "failed".to_string(),
        since: None,
    }
}

/// Wraps a [`MemoryStore`], recording deliveries and injecting failures
#[derive(Clone, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    deliveries: Arc<Mutex<Vec<(i64, u16)>>>,
    failing_hosts: Arc<Mutex<HashSet<String>>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn deliveries(&self) -> Vec<(i64, u16)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Every host-scoped call for `host_id` fails from now on
    pub fn fail_host(&self, host_id: &str) {
        self.failing_hosts
            .lock()
            .unwrap()
            .insert(host_id.to_string());
    }

    fn check(&self, host_id: &str) -> StoreResult<()> {
        if self.failing_hosts.lock().unwrap().contains(host_id) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {}",
                host_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HealthStore for RecordingStore {
    async fn get_latest_sample(&self, host_id: &str) -> StoreResult<Option<MetricSample>> {
        self.check(host_id)?;
        self.inner.get_latest_sample(host_id).await
    }

    async fn get_host(&self, host_id: &str) -> StoreResult<Option<HostRecord>> {
        self.check(host_id)?;
        self.inner.get_host(host_id).await
    }

    async fn get_active_hosts(&self) -> StoreResult<Vec<HostRecord>> {
        self.inner.get_active_hosts().await
    }

    async fn get_open_alerts(&self, host_id: Option<&str>) -> StoreResult<Vec<Alert>> {
        if let Some(host) = host_id {
            self.check(host)?;
        }
        self.inner.get_open_alerts(host_id).await
    }

    async fn create_alert(&self, alert: NewAlert) -> StoreResult<Alert> {
        self.check(&alert.host_id)?;
        self.inner.create_alert(alert).await
    }

    async fn resolve_alert(&self, alert_id: i64) -> StoreResult<bool> {
        self.inner.resolve_alert(alert_id).await
    }

    async fn record_delivery(&self, alert_id: i64, response_code: u16) -> StoreResult<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((alert_id, response_code));
        self.inner.record_delivery(alert_id, response_code).await
    }

    async fn upsert_health(&self, update: HealthUpdate) -> StoreResult<()> {
        self.check(&update.host_id)?;
        self.inner.upsert_health(update).await
    }

    async fn get_health(&self, host_id: &str) -> StoreResult<Option<HealthClassification>> {
        self.inner.get_health(host_id).await
    }
}
