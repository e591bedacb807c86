//! Health evaluation against the persistence port

use super::classifier::{classify, Assessment, HealthThresholds};
use crate::error::Result;
use crate::models::{HealthClassification, HealthState};
use crate::observability::MonitorMetrics;
use crate::store::HealthStore;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fetches what the classifier needs, runs it and stores the result
#[derive(Clone)]
pub struct HealthService {
    store: Arc<dyn HealthStore>,
    thresholds: HealthThresholds,
    metrics: MonitorMetrics,
}

impl HealthService {
    pub fn new(store: Arc<dyn HealthStore>, thresholds: HealthThresholds) -> Self {
        Self {
            store,
            thresholds,
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    /// Classify one host and upsert the result
    pub async fn evaluate_host(&self, host_id: &str) -> Result<Assessment> {
        self.evaluate_host_at(host_id, Utc::now()).await
    }

    /// Same as [`evaluate_host`](Self::evaluate_host) with an explicit clock.
    ///
    /// An unknown host classifies as Down and nothing is persisted for it.
    pub async fn evaluate_host_at(&self, host_id: &str, now: DateTime<Utc>) -> Result<Assessment> {
        let Some(host) = self.store.get_host(host_id).await? else {
            warn!(host = %host_id, "Host not found, classifying as down");
            return Ok(classify(None, None, now, &self.thresholds));
        };

        let sample = self.store.get_latest_sample(host_id).await?;
        let assessment = classify(sample.as_ref(), host.last_seen, now, &self.thresholds);

        let previous = self
            .store
            .get_health(host_id)
            .await?
            .map(|h| h.overall);

        self.store
            .upsert_health(assessment.clone().into_update(host_id))
            .await?;
        self.metrics.inc_classification(assessment.overall);

        if previous != Some(assessment.overall) {
            info!(
                event = "health_changed",
                host = %host_id,
                previous = ?previous,
                current = %assessment.overall,
                connectivity = %assessment.connectivity,
                "Host health state changed"
            );
        } else {
            debug!(host = %host_id, state = %assessment.overall, "Host health evaluated");
        }

        Ok(assessment)
    }

    /// Classify every active host.
    ///
    /// A storage failure on one host is logged and that host is left out of
    /// the result; it does not stop the others.
    pub async fn evaluate_all(&self) -> Result<BTreeMap<String, HealthState>> {
        let now = Utc::now();
        let hosts = self.store.get_active_hosts().await?;
        let mut results = BTreeMap::new();

        for host in hosts {
            match self.evaluate_host_at(&host.host_id, now).await {
                Ok(assessment) => {
                    results.insert(host.host_id, assessment.overall);
                }
                Err(e) => {
                    self.metrics.inc_evaluation_errors();
                    warn!(host = %host.host_id, error = %e, "Failed to evaluate host health");
                }
            }
        }

        Ok(results)
    }

    /// Stored classification for a host, if it has ever been evaluated
    pub async fn summary(&self, host_id: &str) -> Result<Option<HealthClassification>> {
        Ok(self.store.get_health(host_id).await?)
    }
}
