//! Monitor configuration

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use monitor_lib::{alerts::SweepConfig, AlertThresholds, HealthThresholds, WebhookConfig};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "MONITOR_CONFIG_FILE";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Name this instance reports in logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Offline timeout shared by alerting and classification; overrides
    /// both `alerts.offline_timeout_secs` and `health.offline_timeout_secs`
    #[serde(default)]
    pub offline_timeout_secs: Option<u64>,

    #[serde(default)]
    pub alerts: AlertThresholds,

    #[serde(default)]
    pub health: HealthThresholds,

    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Offline sweep cadence; half the offline timeout when unset
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// Reclassify every host after each sweep
    #[serde(default = "default_reclassify")]
    pub reclassify: bool,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "health-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_reclassify() -> bool {
    true
}

impl MonitorConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        Self::from_builder(builder.add_source(Self::environment()))
    }

    /// `MONITOR_*` variables, `__` separating nested keys
    pub fn environment() -> Environment {
        Environment::with_prefix("MONITOR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("webhook.sinks")
    }

    /// Deserialize and validate whatever sources the builder holds
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let mut config: MonitorConfig = builder
            .build()
            .context("Failed to read monitor configuration")?
            .try_deserialize()
            .context("Invalid monitor configuration")?;

        if let Some(secs) = config.offline_timeout_secs {
            config.alerts.offline_timeout_secs = secs;
            config.health.offline_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.alerts.validate().context("Invalid alert thresholds")?;
        self.health.validate().context("Invalid health thresholds")?;

        // An open offline alert must agree with the host's classification
        if self.alerts.offline_timeout_secs != self.health.offline_timeout_secs {
            bail!(
                "alerts.offline_timeout_secs ({}) and health.offline_timeout_secs ({}) must match; set offline_timeout_secs to configure both",
                self.alerts.offline_timeout_secs,
                self.health.offline_timeout_secs
            );
        }

        if self.sweep_interval_secs == Some(0) {
            bail!("sweep_interval_secs must be greater than zero");
        }
        if self.webhook.timeout_secs == 0 {
            bail!("webhook.timeout_secs must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.webhook.jitter_factor) {
            bail!(
                "webhook.jitter_factor must be within 0.0-1.0, got {}",
                self.webhook.jitter_factor
            );
        }

        Ok(())
    }

    pub fn sweep_config(&self) -> SweepConfig {
        let mut sweep = SweepConfig::for_timeout(self.alerts.offline_timeout_secs);
        if let Some(secs) = self.sweep_interval_secs {
            sweep.interval = Duration::from_secs(secs);
        }
        sweep.reclassify = self.reclassify;
        sweep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::environment().source(Some(source))
    }

    #[test]
    fn test_defaults_without_sources() {
        let config =
            MonitorConfig::from_builder(config::Config::builder().add_source(env(&[]))).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.alerts, AlertThresholds::default());
        assert_eq!(config.health, HealthThresholds::default());
        assert!(config.webhook.sinks.is_empty());
        assert_eq!(config.sweep_config().interval, Duration::from_secs(150));
        assert!(config.reclassify);
    }

    #[test]
    fn test_environment_overrides() {
        let builder = config::Config::builder().add_source(env(&[
            ("MONITOR_API_PORT", "9100"),
            ("MONITOR_ALERTS__CPU_THRESHOLD", "85"),
            ("MONITOR_OFFLINE_TIMEOUT_SECS", "120"),
            (
                "MONITOR_WEBHOOK__SINKS",
                "http://a.test/hook,http://b.test/hook",
            ),
        ]));

        let config = MonitorConfig::from_builder(builder).unwrap();

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.alerts.cpu_threshold, 85.0);
        assert_eq!(config.alerts.cpu_critical, 95.0);
        assert_eq!(config.webhook.sinks.len(), 2);
        assert_eq!(config.alerts.offline_timeout_secs, 120);
        assert_eq!(config.health.offline_timeout_secs, 120);
        assert_eq!(config.sweep_config().interval, Duration::from_secs(60));
    }

    #[test]
    fn test_mismatched_offline_timeouts_rejected() {
        let builder = config::Config::builder().add_source(env(&[
            ("MONITOR_ALERTS__OFFLINE_TIMEOUT_SECS", "120"),
            ("MONITOR_HEALTH__OFFLINE_TIMEOUT_SECS", "300"),
        ]));

        let err = MonitorConfig::from_builder(builder).unwrap_err();
        assert!(err.to_string().contains("must match"));
    }

    #[test]
    fn test_matching_section_timeouts_accepted() {
        let file = r#"
            [alerts]
            offline_timeout_secs = 600

            [health]
            offline_timeout_secs = 600
        "#;

        let builder = config::Config::builder()
            .add_source(File::from_str(file, FileFormat::Toml))
            .add_source(env(&[]));

        let config = MonitorConfig::from_builder(builder).unwrap();
        assert_eq!(config.sweep_config().interval, Duration::from_secs(300));
    }

    #[test]
    fn test_shared_timeout_overrides_sections() {
        let builder = config::Config::builder().add_source(env(&[
            ("MONITOR_ALERTS__OFFLINE_TIMEOUT_SECS", "120"),
            ("MONITOR_OFFLINE_TIMEOUT_SECS", "240"),
        ]));

        let config = MonitorConfig::from_builder(builder).unwrap();
        assert_eq!(config.alerts.offline_timeout_secs, 240);
        assert_eq!(config.health.offline_timeout_secs, 240);
    }

    #[test]
    fn test_file_then_environment() {
        let file = r#"
            instance_name = "monitor-a"
            sweep_interval_secs = 30

            [health]
            cpu_warning = 70.0
            cpu_critical = 85.0

            [webhook]
            retry_attempts = 5
        "#;

        let builder = config::Config::builder()
            .add_source(File::from_str(file, FileFormat::Toml))
            .add_source(env(&[("MONITOR_INSTANCE_NAME", "monitor-b")]));

        let config = MonitorConfig::from_builder(builder).unwrap();

        assert_eq!(config.instance_name, "monitor-b");
        assert_eq!(config.health.cpu_warning, 70.0);
        assert_eq!(config.webhook.retry_attempts, 5);
        assert_eq!(config.webhook.timeout_secs, 10);
        assert_eq!(config.sweep_config().interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let builder = config::Config::builder().add_source(env(&[
            ("MONITOR_ALERTS__CPU_THRESHOLD", "96"),
            ("MONITOR_ALERTS__CPU_CRITICAL", "90"),
        ]));

        assert!(MonitorConfig::from_builder(builder).is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let builder =
            config::Config::builder().add_source(env(&[("MONITOR_SWEEP_INTERVAL_SECS", "0")]));

        assert!(MonitorConfig::from_builder(builder).is_err());
    }
}
