//! In-memory persistence port
//!
//! Keeps every table behind a single lock so that the open-alert uniqueness
//! check and the insert happen atomically, mirroring a unique index on
//! `(host_id, alert_type, discriminator) WHERE NOT is_resolved`.

use super::{HealthStore, StoreResult};
use crate::error::StoreError;
use crate::models::{
    Alert, AlertKey, HealthClassification, HealthUpdate, HostRecord, MetricSample, NewAlert,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    hosts: HashMap<String, HostRecord>,
    latest_samples: HashMap<String, MetricSample>,
    alerts: Vec<Alert>,
    open_index: HashMap<AlertKey, i64>,
    health: HashMap<String, HealthClassification>,
    next_alert_id: i64,
}

impl Tables {
    fn alert_mut(&mut self, alert_id: i64) -> Option<&mut Alert> {
        self.alerts.iter_mut().find(|a| a.id == alert_id)
    }
}

/// Thread-safe in-memory store, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host, or return the existing record unchanged
    pub async fn register_host(&self, host_id: &str) -> HostRecord {
        let mut tables = self.tables.write().await;
        tables
            .hosts
            .entry(host_id.to_string())
            .or_insert_with(|| HostRecord::new(host_id, Utc::now()))
            .clone()
    }

    /// Accept a sample: store it as the host's latest and bump liveness
    pub async fn record_sample(&self, sample: MetricSample) {
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        let host = tables
            .hosts
            .entry(sample.host_id.clone())
            .or_insert_with(|| HostRecord::new(sample.host_id.clone(), now));
        host.last_seen = Some(now);

        let replace = tables
            .latest_samples
            .get(&sample.host_id)
            .map(|current| current.timestamp <= sample.timestamp)
            .unwrap_or(true);
        if replace {
            tables.latest_samples.insert(sample.host_id.clone(), sample);
        }
    }

    /// Overwrite the liveness timestamp of a host
    pub async fn set_last_seen(
        &self,
        host_id: &str,
        last_seen: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let host = tables
            .hosts
            .get_mut(host_id)
            .ok_or_else(|| StoreError::NotFound(format!("host {}", host_id)))?;
        host.last_seen = last_seen;
        Ok(())
    }

    /// Soft-delete a host; its history stays in place
    pub async fn deactivate_host(&self, host_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let host = tables
            .hosts
            .get_mut(host_id)
            .ok_or_else(|| StoreError::NotFound(format!("host {}", host_id)))?;
        host.is_active = false;
        Ok(())
    }

    pub async fn get_alert(&self, alert_id: i64) -> Option<Alert> {
        let tables = self.tables.read().await;
        tables.alerts.iter().find(|a| a.id == alert_id).cloned()
    }

    /// Every alert ever created, oldest first
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.tables.read().await.alerts.clone()
    }
}

#[async_trait]
impl HealthStore for MemoryStore {
    async fn get_latest_sample(&self, host_id: &str) -> StoreResult<Option<MetricSample>> {
        Ok(self.tables.read().await.latest_samples.get(host_id).cloned())
    }

    async fn get_host(&self, host_id: &str) -> StoreResult<Option<HostRecord>> {
        Ok(self.tables.read().await.hosts.get(host_id).cloned())
    }

    async fn get_active_hosts(&self) -> StoreResult<Vec<HostRecord>> {
        let tables = self.tables.read().await;
        let mut hosts: Vec<HostRecord> = tables
            .hosts
            .values()
            .filter(|h| h.is_active)
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.host_id.cmp(&b.host_id));
        Ok(hosts)
    }

    async fn get_open_alerts(&self, host_id: Option<&str>) -> StoreResult<Vec<Alert>> {
        let tables = self.tables.read().await;
        let mut open: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| a.is_open())
            .filter(|a| host_id.map(|h| a.host_id == h).unwrap_or(true))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at).then(b.id.cmp(&a.id)));
        Ok(open)
    }

    async fn create_alert(&self, new_alert: NewAlert) -> StoreResult<Alert> {
        let key = new_alert.key();
        let mut tables = self.tables.write().await;

        if tables.open_index.contains_key(&key) {
            return Err(StoreError::conflict(&key));
        }

        tables.next_alert_id += 1;
        let alert = Alert {
            id: tables.next_alert_id,
            host_id: new_alert.host_id,
            alert_type: new_alert.alert_type,
            discriminator: new_alert.discriminator,
            severity: new_alert.severity,
            message: new_alert.message,
            threshold_value: new_alert.threshold_value,
            actual_value: new_alert.actual_value,
            triggered_at: Utc::now(),
            resolved_at: None,
            is_resolved: false,
            webhook_sent: false,
            webhook_sent_at: None,
            webhook_response_code: None,
        };

        tables.open_index.insert(key, alert.id);
        tables.alerts.push(alert.clone());
        debug!(alert_id = alert.id, host = %alert.host_id, "Alert stored");
        Ok(alert)
    }

    async fn resolve_alert(&self, alert_id: i64) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let key = match tables.alert_mut(alert_id) {
            Some(alert) => {
                if !alert.is_resolved {
                    alert.is_resolved = true;
                    alert.resolved_at = Some(Utc::now());
                }
                alert.key()
            }
            None => return Ok(false),
        };

        if tables.open_index.get(&key) == Some(&alert_id) {
            tables.open_index.remove(&key);
        }
        Ok(true)
    }

    async fn record_delivery(&self, alert_id: i64, response_code: u16) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let alert = tables
            .alert_mut(alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
        alert.webhook_sent = true;
        alert.webhook_sent_at = Some(Utc::now());
        alert.webhook_response_code = Some(response_code);
        Ok(())
    }

    async fn upsert_health(&self, update: HealthUpdate) -> StoreResult<()> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        let status_since = match tables.health.get(&update.host_id) {
            Some(previous) if previous.overall == update.overall => previous.status_since,
            _ => now,
        };

        tables.health.insert(
            update.host_id.clone(),
            HealthClassification {
                host_id: update.host_id,
                overall: update.overall,
                components: update.components,
                connectivity: update.connectivity,
                last_values: update.last_values,
                last_check: now,
                status_since,
            },
        );
        Ok(())
    }

    async fn get_health(&self, host_id: &str) -> StoreResult<Option<HealthClassification>> {
        Ok(self.tables.read().await.health.get(host_id).cloned())
    }
}
