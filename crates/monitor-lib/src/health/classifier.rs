//! Pure host health classification
//!
//! Turns the latest sample and the liveness timestamp of a host into a
//! three-state classification. No I/O happens here; [`super::HealthService`]
//! does the fetching and persisting.

use crate::error::{EngineError, Result};
use crate::models::{
    ComponentState, ComponentStates, Connectivity, HealthState, HealthUpdate, LastValues,
    MetricSample,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage thresholds used to grade each component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub cpu_warning: f64,
    pub cpu_critical: f64,
    pub memory_warning: f64,
    pub memory_critical: f64,
    pub disk_warning: f64,
    pub disk_critical: f64,
    /// Seconds without a sample before a host is considered offline
    pub offline_timeout_secs: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_warning: 80.0,
            cpu_critical: 90.0,
            memory_warning: 80.0,
            memory_critical: 90.0,
            disk_warning: 70.0,
            disk_critical: 80.0,
            offline_timeout_secs: 300,
        }
    }
}

impl HealthThresholds {
    pub fn offline_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.offline_timeout_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        let pairs = [
            ("cpu", self.cpu_warning, self.cpu_critical),
            ("memory", self.memory_warning, self.memory_critical),
            ("disk", self.disk_warning, self.disk_critical),
        ];

        for (name, warning, critical) in pairs {
            if warning < 0.0 || critical < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{} thresholds must not be negative",
                    name
                )));
            }
            if warning > critical {
                return Err(EngineError::InvalidConfig(format!(
                    "{} warning threshold ({}) exceeds critical threshold ({})",
                    name, warning, critical
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
}

/// Outcome of classifying one host
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub overall: HealthState,
    pub components: ComponentStates,
    pub connectivity: Connectivity,
    pub last_values: LastValues,
}

impl Assessment {
    fn offline() -> Self {
        Self {
            overall: HealthState::Down,
            components: ComponentStates::default(),
            connectivity: Connectivity::Offline,
            last_values: LastValues::default(),
        }
    }

    pub fn into_update(self, host_id: impl Into<String>) -> HealthUpdate {
        HealthUpdate {
            host_id: host_id.into(),
            overall: self.overall,
            components: self.components,
            connectivity: self.connectivity,
            last_values: self.last_values,
        }
    }
}

/// Whether a host last seen at `last_seen` is still reachable at `now`
pub fn connectivity(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> Connectivity {
    match last_seen {
        Some(seen) if now - seen <= thresholds.offline_timeout() => Connectivity::Online,
        _ => Connectivity::Offline,
    }
}

/// Grade a value against a warning/critical pair
pub fn grade(value: f64, warning: f64, critical: f64) -> ComponentState {
    if value >= critical {
        ComponentState::Critical
    } else if value >= warning {
        ComponentState::Warning
    } else {
        ComponentState::Normal
    }
}

/// Classify a host.
///
/// Down is reserved for connectivity loss: a reachable host with every
/// component critical is still only `Warning`.
pub fn classify(
    sample: Option<&MetricSample>,
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> Assessment {
    if connectivity(last_seen, now, thresholds) == Connectivity::Offline {
        return Assessment::offline();
    }

    let Some(sample) = sample else {
        return Assessment {
            overall: HealthState::Warning,
            components: ComponentStates::default(),
            connectivity: Connectivity::Online,
            last_values: LastValues::default(),
        };
    };

    let max_disk = sample.max_disk_percentage();
    let components = ComponentStates {
        cpu: grade(sample.cpu_usage, thresholds.cpu_warning, thresholds.cpu_critical),
        memory: grade(
            sample.memory.percentage,
            thresholds.memory_warning,
            thresholds.memory_critical,
        ),
        disk: match max_disk {
            Some(pct) => grade(pct, thresholds.disk_warning, thresholds.disk_critical),
            None => ComponentState::Normal,
        },
    };

    let overall = if components.any_degraded() || sample.has_failed_services() {
        HealthState::Warning
    } else {
        HealthState::Healthy
    };

    Assessment {
        overall,
        components,
        connectivity: Connectivity::Online,
        last_values: LastValues {
            cpu_usage: Some(sample.cpu_usage),
            memory_percentage: Some(sample.memory.percentage),
            disk_usage_max: Some(max_disk.unwrap_or(0.0)),
        },
    }
}
