//! Health Monitor - host health classification and alerting daemon
//!
//! Runs the offline sweep over the monitored fleet and serves the
//! monitor's own health and Prometheus metrics.
//!
//! The binary wires an in-memory store that starts empty. Sample ingestion
//! is not part of this process: hosts enter the store only through
//! `MemoryStore::register_host` and `MemoryStore::record_sample`, which an
//! embedding service calls. Until then the sweep checks zero hosts.

use anyhow::Result;
use health_monitor::{api, config::MonitorConfig};
use monitor_lib::{
    alerts::{AlertEngine, OfflineSweepBuilder},
    health::{components, HealthService, ServiceHealth},
    notify::WebhookNotifier,
    observability::{MonitorMetrics, StructuredLogger},
    store::{HealthStore, MemoryStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on waiting for in-flight alert notifications at shutdown
const NOTIFY_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting health-monitor");

    let config = MonitorConfig::load()?;
    info!(
        instance = %config.instance_name,
        api_port = config.api_port,
        webhook_sinks = config.webhook.sinks.len(),
        "Monitor configured"
    );

    let service_health = ServiceHealth::new();
    service_health.register(components::STORE).await;
    service_health.register(components::SWEEPER).await;
    service_health.register(components::NOTIFIER).await;

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let store: Arc<dyn HealthStore> = Arc::new(MemoryStore::new());
    let health = HealthService::new(store.clone(), config.health.clone());

    let mut engine = AlertEngine::new(store.clone(), config.alerts.clone());
    if config.webhook.sinks.is_empty() {
        info!("No webhook sinks configured, alerts are logged only");
    } else {
        match WebhookNotifier::new(&config.webhook, store.clone()) {
            Ok(notifier) => engine = engine.with_notifier(Arc::new(notifier)),
            Err(e) => {
                service_health
                    .set_unhealthy(components::NOTIFIER, e.to_string())
                    .await;
                return Err(e.into());
            }
        }
    }
    let engine = Arc::new(engine);

    logger.log_startup(MONITOR_VERSION, config.webhook.sinks.len());

    let (shutdown_tx, _) = broadcast::channel(1);

    let sweep_config = config.sweep_config();
    let sweep = OfflineSweepBuilder::new()
        .engine(engine.clone())
        .health_service(health)
        .registry(service_health.clone())
        .interval(sweep_config.interval)
        .reclassify(sweep_config.reclassify)
        .build()?;
    let sweep_handle = tokio::spawn(sweep.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(service_health.clone(), metrics));
    service_health.mark_started(true).await;

    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(());
    if let Err(e) = sweep_handle.await {
        warn!(error = %e, "Offline sweep task ended abnormally");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    if tokio::time::timeout(NOTIFY_DRAIN_TIMEOUT, engine.flush_notifications())
        .await
        .is_err()
    {
        warn!("Timed out waiting for alert notifications to finish");
    }

    info!("Shutting down");
    Ok(())
}
