//! Liveness and readiness of the monitor process itself
//!
//! Distinct from host classification: this tracks whether the sweeper,
//! store and notifier of this daemon are working, for `/healthz` and
//! `/readyz`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Status of one internal component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    /// Working, but the last run reported a problem
    Degraded,
    Unhealthy,
}

impl ServiceStatus {
    pub fn is_operational(&self) -> bool {
        !matches!(self, ServiceStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new(status: ServiceStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessReport {
    pub status: ServiceStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl LivenessReport {
    /// Worst component status wins
    pub fn aggregate(components: &HashMap<String, ComponentHealth>) -> ServiceStatus {
        components
            .values()
            .map(|p| p.status)
            .fold(ServiceStatus::Healthy, |worst, status| match (worst, status) {
                (ServiceStatus::Unhealthy, _) | (_, ServiceStatus::Unhealthy) => {
                    ServiceStatus::Unhealthy
                }
                (ServiceStatus::Degraded, _) | (_, ServiceStatus::Degraded) => {
                    ServiceStatus::Degraded
                }
                _ => ServiceStatus::Healthy,
            })
    }
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const STORE: &str = "store";
    pub const SWEEPER: &str = "sweeper";
    pub const NOTIFIER: &str = "notifier";
}

/// Shared registry of components
#[derive(Debug, Clone, Default)]
pub struct ServiceHealth {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    started: Arc<RwLock<bool>>,
}

impl ServiceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str) {
        self.set(name, ServiceStatus::Healthy, None).await;
    }

    async fn set(&self, name: &str, status: ServiceStatus, message: Option<String>) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::new(status, message));
    }

    pub async fn set_healthy(&self, name: &str) {
        self.set(name, ServiceStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.set(name, ServiceStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.set(name, ServiceStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn mark_started(&self, started: bool) {
        *self.started.write().await = started;
    }

    pub async fn liveness(&self) -> LivenessReport {
        let components = self.components.read().await.clone();
        let status = LivenessReport::aggregate(&components);
        LivenessReport { status, components }
    }

    pub async fn readiness(&self) -> ReadinessReport {
        if !*self.started.read().await {
            return ReadinessReport {
                ready: false,
                reason: Some("Monitor still starting".to_string()),
            };
        }

        if !self.liveness().await.status.is_operational() {
            return ReadinessReport {
                ready: false,
                reason: Some("A monitor component is unhealthy".to_string()),
            };
        }

        ReadinessReport {
            ready: true,
            reason: None,
        }
    }
}
