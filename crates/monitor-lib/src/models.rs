//! Core data models for the health monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory usage reported by a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub percentage: f64,
}

/// Usage of a single mounted filesystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mountpoint: String,
    pub total: u64,
    pub used: u64,
    pub percentage: f64,
}

/// 1/5/15 minute load averages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// A systemd unit (or equivalent) reported as failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedService {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// One point-in-time metrics submission from a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub host_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory: MemoryInfo,
    pub disk_usage: Vec<DiskUsage>,
    pub load_average: LoadAverage,
    pub uptime: u64,
    #[serde(default)]
    pub failed_services: Vec<FailedService>,
}

impl MetricSample {
    /// Highest usage percentage across all reported filesystems
    pub fn max_disk_percentage(&self) -> Option<f64> {
        self.disk_usage
            .iter()
            .map(|d| d.percentage)
            .fold(None, |max, p| match max {
                Some(m) if m >= p => Some(m),
                _ => Some(p),
            })
    }

    pub fn has_failed_services(&self) -> bool {
        !self.failed_services.is_empty()
    }
}

/// Identity and liveness of a monitored host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub registered_at: DateTime<Utc>,
    /// `None` until the first sample is accepted
    pub last_seen: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl HostRecord {
    pub fn new(host_id: impl Into<String>, registered_at: DateTime<Utc>) -> Self {
        Self {
            host_id: host_id.into(),
            hostname: None,
            registered_at,
            last_seen: None,
            is_active: true,
        }
    }

    /// Seconds elapsed since the host was last seen, if ever
    pub fn seconds_since_seen(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_seen
            .map(|seen| (now - seen).num_milliseconds() as f64 / 1000.0)
    }
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert type classification
///
/// The built-in kinds cover everything the engine raises itself. `Custom`
/// is the extension point for types raised by other producers; it is
/// compared by name like any other type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertType {
    Cpu,
    Memory,
    Disk,
    Offline,
    Custom(String),
}

impl AlertType {
    pub fn as_str(&self) -> &str {
        match self {
            AlertType::Cpu => "cpu",
            AlertType::Memory => "memory",
            AlertType::Disk => "disk",
            AlertType::Offline => "offline",
            AlertType::Custom(name) => name,
        }
    }
}

impl From<String> for AlertType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "cpu" => AlertType::Cpu,
            "memory" => AlertType::Memory,
            "disk" => AlertType::Disk,
            "offline" => AlertType::Offline,
            _ => AlertType::Custom(value),
        }
    }
}

impl From<&str> for AlertType {
    fn from(value: &str) -> Self {
        AlertType::from(value.to_string())
    }
}

impl From<AlertType> for String {
    fn from(value: AlertType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an open condition: at most one open alert may exist per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub host_id: String,
    pub alert_type: AlertType,
    /// Mountpoint for disk alerts, absent otherwise
    pub discriminator: Option<String>,
}

impl AlertKey {
    pub fn new(
        host_id: impl Into<String>,
        alert_type: AlertType,
        discriminator: Option<String>,
    ) -> Self {
        Self {
            host_id: host_id.into(),
            alert_type,
            discriminator,
        }
    }
}

/// An alert as persisted: one per open-or-resolved condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub host_id: String,
    pub alert_type: AlertType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub is_resolved: bool,
    pub webhook_sent: bool,
    pub webhook_sent_at: Option<DateTime<Utc>>,
    pub webhook_response_code: Option<u16>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            self.host_id.clone(),
            self.alert_type.clone(),
            self.discriminator.clone(),
        )
    }

    pub fn is_open(&self) -> bool {
        !self.is_resolved
    }
}

/// Request to create an alert through the persistence port
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub host_id: String,
    pub alert_type: AlertType,
    pub discriminator: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold_value: Option<f64>,
    pub actual_value: Option<f64>,
}

impl NewAlert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            self.host_id.clone(),
            self.alert_type.clone(),
            self.discriminator.clone(),
        )
    }
}

/// Overall health of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Down,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Warning => write!(f, "warning"),
            HealthState::Down => write!(f, "down"),
        }
    }
}

/// Severity of a single resource component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Normal,
    Warning,
    Critical,
}

impl ComponentState {
    /// Anything other than `Normal` degrades the host
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ComponentState::Normal)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentState::Normal => write!(f, "normal"),
            ComponentState::Warning => write!(f, "warning"),
            ComponentState::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Per-component severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStates {
    pub cpu: ComponentState,
    pub memory: ComponentState,
    pub disk: ComponentState,
}

impl Default for ComponentStates {
    fn default() -> Self {
        Self {
            cpu: ComponentState::Normal,
            memory: ComponentState::Normal,
            disk: ComponentState::Normal,
        }
    }
}

impl ComponentStates {
    pub fn any_degraded(&self) -> bool {
        self.cpu.is_degraded() || self.memory.is_degraded() || self.disk.is_degraded()
    }
}

/// Last numeric values seen for each component
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LastValues {
    pub cpu_usage: Option<f64>,
    pub memory_percentage: Option<f64>,
    pub disk_usage_max: Option<f64>,
}

/// Classification result handed to the persistence port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub host_id: String,
    pub overall: HealthState,
    pub components: ComponentStates,
    pub connectivity: Connectivity,
    pub last_values: LastValues,
}

impl HealthUpdate {
    /// Classification pushed when a host stops reporting
    pub fn offline(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            overall: HealthState::Down,
            components: ComponentStates::default(),
            connectivity: Connectivity::Offline,
            last_values: LastValues::default(),
        }
    }
}

/// Stored per-host classification, overwritten in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthClassification {
    pub host_id: String,
    pub overall: HealthState,
    pub components: ComponentStates,
    pub connectivity: Connectivity,
    pub last_values: LastValues,
    pub last_check: DateTime<Utc>,
    /// When the current overall state was first observed
    pub status_since: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_type_string_round_trip() {
        assert_eq!(AlertType::from("disk"), AlertType::Disk);
        assert_eq!(
            AlertType::from("raid_degraded"),
            AlertType::Custom("raid_degraded".to_string())
        );

        let json = serde_json::to_string(&AlertType::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
        let parsed: AlertType = serde_json::from_str("\"cpu\"").unwrap();
        assert_eq!(parsed, AlertType::Cpu);
    }

    #[test]
    fn test_max_disk_percentage() {
        let disk = |mount: &str, pct: f64| DiskUsage {
            mountpoint: mount.to_string(),
            total: 100,
            used: pct as u64,
            percentage: pct,
        };
        let mut sample = MetricSample {
            host_id: "web-1".to_string(),
            timestamp: Utc::now(),
            cpu_usage: 10.0,
            memory: MemoryInfo {
                total: 100,
                used: 10,
                percentage: 10.0,
            },
            disk_usage: vec![disk("/", 42.0), disk("/data", 87.5), disk("/boot", 12.0)],
            load_average: LoadAverage {
                one_min: 0.1,
                five_min: 0.1,
                fifteen_min: 0.1,
            },
            uptime: 60,
            failed_services: vec![],
        };

        assert_eq!(sample.max_disk_percentage(), Some(87.5));

        sample.disk_usage.clear();
        assert_eq!(sample.max_disk_percentage(), None);
    }

    #[test]
    fn test_overall_state_serializes_lowercase() {
        let json = serde_json::to_string(&HealthState::Down).unwrap();
        assert_eq!(json, "\"down\"");
        assert!(ComponentState::Critical > ComponentState::Warning);
    }
}
