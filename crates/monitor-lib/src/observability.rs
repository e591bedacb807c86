//! Observability infrastructure for the health monitor
//!
//! Provides:
//! - Prometheus metrics (alerts, webhook deliveries, sweep latency, classifications)
//! - Structured JSON logging of alert lifecycle events with tracing

use crate::models::{Alert, AlertSeverity, HealthState};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Buckets for webhook round trips and sweeps (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    alerts_created: IntCounterVec,
    alerts_resolved: IntCounter,
    duplicate_alerts_skipped: IntCounter,
    webhook_deliveries: IntCounterVec,
    webhook_attempts: IntCounter,
    webhook_latency_seconds: Histogram,
    sweep_latency_seconds: Histogram,
    hosts_offline: IntGauge,
    classifications: IntCounterVec,
    evaluation_errors: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            alerts_created: register_int_counter_vec!(
                "health_monitor_alerts_created_total",
                "Alerts created, by type and severity",
                &["alert_type", "severity"]
            )
            .expect("Failed to register alerts_created"),

            alerts_resolved: register_int_counter!(
                "health_monitor_alerts_resolved_total",
                "Alerts resolved"
            )
            .expect("Failed to register alerts_resolved"),

            duplicate_alerts_skipped: register_int_counter!(
                "health_monitor_duplicate_alerts_skipped_total",
                "Threshold crossings skipped because an alert was already open"
            )
            .expect("Failed to register duplicate_alerts_skipped"),

            webhook_deliveries: register_int_counter_vec!(
                "health_monitor_webhook_deliveries_total",
                "Webhook deliveries per sink call, by outcome",
                &["outcome"]
            )
            .expect("Failed to register webhook_deliveries"),

            webhook_attempts: register_int_counter!(
                "health_monitor_webhook_attempts_total",
                "Individual webhook POST attempts including retries"
            )
            .expect("Failed to register webhook_attempts"),

            webhook_latency_seconds: register_histogram!(
                "health_monitor_webhook_latency_seconds",
                "Time spent delivering one alert to one sink, retries included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register webhook_latency_seconds"),

            sweep_latency_seconds: register_histogram!(
                "health_monitor_sweep_latency_seconds",
                "Time spent in one offline sweep",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sweep_latency_seconds"),

            hosts_offline: register_int_gauge!(
                "health_monitor_hosts_offline",
                "Active hosts found offline by the last sweep"
            )
            .expect("Failed to register hosts_offline"),

            classifications: register_int_counter_vec!(
                "health_monitor_classifications_total",
                "Host classifications written, by overall state",
                &["state"]
            )
            .expect("Failed to register classifications"),

            evaluation_errors: register_int_counter!(
                "health_monitor_evaluation_errors_total",
                "Host evaluations that failed on storage errors"
            )
            .expect("Failed to register evaluation_errors"),
        }
    }
}

/// Lightweight handle to the process-wide metrics; clones share them
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn inc_alerts_created(&self, alert: &Alert) {
        self.inner()
            .alerts_created
            .with_label_values(&[alert.alert_type.as_str(), &alert.severity.to_string()])
            .inc();
    }

    pub fn inc_alerts_resolved(&self, count: u64) {
        self.inner().alerts_resolved.inc_by(count);
    }

    pub fn inc_duplicates_skipped(&self) {
        self.inner().duplicate_alerts_skipped.inc();
    }

    pub fn record_webhook_delivery(&self, delivered: bool, attempts: u32, elapsed_secs: f64) {
        let outcome = if delivered { "delivered" } else { "failed" };
        self.inner()
            .webhook_deliveries
            .with_label_values(&[outcome])
            .inc();
        self.inner().webhook_attempts.inc_by(u64::from(attempts));
        self.inner().webhook_latency_seconds.observe(elapsed_secs);
    }

    pub fn observe_sweep_latency(&self, duration_secs: f64) {
        self.inner().sweep_latency_seconds.observe(duration_secs);
    }

    pub fn set_hosts_offline(&self, count: i64) {
        self.inner().hosts_offline.set(count);
    }

    pub fn inc_classification(&self, state: HealthState) {
        self.inner()
            .classifications
            .with_label_values(&[&state.to_string()])
            .inc();
    }

    pub fn inc_evaluation_errors(&self) {
        self.inner().evaluation_errors.inc();
    }
}

/// Structured logger for alert lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Console emission of a newly created alert, tagged by severity
    pub fn log_alert(&self, alert: &Alert) {
        let tag = format!(
            "ALERT [{}] {}: {}",
            alert.severity.to_string().to_uppercase(),
            alert.alert_type.as_str().to_uppercase(),
            alert.message
        );

        match alert.severity {
            AlertSeverity::Critical => {
                error!(
                    event = "alert_triggered",
                    instance = %self.instance,
                    alert_id = alert.id,
                    host = %alert.host_id,
                    alert_type = %alert.alert_type,
                    discriminator = ?alert.discriminator,
                    severity = %alert.severity,
                    threshold = ?alert.threshold_value,
                    actual = ?alert.actual_value,
                    "{}", tag
                );
            }
            AlertSeverity::Warning => {
                warn!(
                    event = "alert_triggered",
                    instance = %self.instance,
                    alert_id = alert.id,
                    host = %alert.host_id,
                    alert_type = %alert.alert_type,
                    discriminator = ?alert.discriminator,
                    severity = %alert.severity,
                    threshold = ?alert.threshold_value,
                    actual = ?alert.actual_value,
                    "{}", tag
                );
            }
        }
    }

    pub fn log_alert_resolved(&self, alert: &Alert) {
        info!(
            event = "alert_resolved",
            instance = %self.instance,
            alert_id = alert.id,
            host = %alert.host_id,
            alert_type = %alert.alert_type,
            discriminator = ?alert.discriminator,
            "Resolved {} alert for host {}",
            alert.alert_type,
            alert.host_id
        );
    }

    pub fn log_delivery(
        &self,
        alert_id: i64,
        sink: &str,
        delivered: bool,
        response_code: u16,
        attempts: u32,
    ) {
        if delivered {
            info!(
                event = "webhook_delivered",
                instance = %self.instance,
                alert_id = alert_id,
                sink = %sink,
                response_code = response_code,
                attempts = attempts,
                "Webhook notification sent"
            );
        } else {
            error!(
                event = "webhook_failed",
                instance = %self.instance,
                alert_id = alert_id,
                sink = %sink,
                attempts = attempts,
                "Failed to send webhook notification"
            );
        }
    }

    pub fn log_sweep(&self, hosts_checked: usize, hosts_offline: usize, alerts_created: usize) {
        info!(
            event = "offline_sweep",
            instance = %self.instance,
            hosts_checked = hosts_checked,
            hosts_offline = hosts_offline,
            alerts_created = alerts_created,
            "Offline sweep complete"
        );
    }

    pub fn log_startup(&self, version: &str, sinks: usize) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            webhook_sinks = sinks,
            "Health monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Health monitor shutting down"
        );
    }
}
