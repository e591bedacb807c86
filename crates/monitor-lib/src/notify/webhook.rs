//! Webhook delivery for triggered alerts

use super::{Notifier, NotifyError, RetryPolicy};
use crate::models::{Alert, AlertSeverity};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::HealthStore;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use url::Url;

/// Response code recorded when no sink answered successfully
const NO_RESPONSE: u16 = 0;

const AGENT: &str = concat!("health-monitor/", env!("CARGO_PKG_VERSION"));

/// Webhook sinks and delivery tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Sink URLs; empty means alerts are only logged
    pub sinks: Vec<String>,
    /// Per-attempt request timeout
    pub timeout_secs: u64,
    /// Attempts per sink, including the first
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub jitter_factor: f64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            timeout_secs: 10,
            retry_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 5_000,
            jitter_factor: 0.25,
        }
    }
}

impl WebhookConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            jitter_factor: self.jitter_factor,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// JSON body posted to every sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub alert_id: i64,
    pub host: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold: Option<f64>,
    pub actual: Option<f64>,
    pub triggered_at: String,
    pub emitted_at: String,
}

impl WebhookPayload {
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id,
            host: alert.host_id.clone(),
            alert_type: alert.alert_type.to_string(),
            severity: alert.severity,
            message: alert.message.clone(),
            threshold: alert.threshold_value,
            actual: alert.actual_value,
            triggered_at: alert.triggered_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            emitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Result of delivering one alert to one sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDelivery {
    pub sink: String,
    pub delivered: bool,
    /// Status of the successful attempt, or 0 if every attempt failed
    pub response_code: u16,
    pub attempts: u32,
}

/// Posts alerts to configured sinks and records the outcome per sink
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    sinks: Arc<Vec<Url>>,
    timeout: Duration,
    policy: RetryPolicy,
    store: Arc<dyn HealthStore>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, store: Arc<dyn HealthStore>) -> Result<Self, NotifyError> {
        let sinks = config
            .sinks
            .iter()
            .map(|sink| {
                Url::parse(sink).map_err(|e| NotifyError::InvalidSink {
                    sink: sink.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            sinks: Arc::new(sinks),
            timeout: config.timeout(),
            policy: config.retry_policy(),
            store,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("webhook"),
        })
    }

    /// Replace the retry policy derived from the config
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One POST; returns the status code or the transport error
    async fn post_once(&self, sink: &Url, payload: &WebhookPayload) -> Result<u16, NotifyError> {
        let response = self
            .client
            .post(sink.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, AGENT)
            .json(payload)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    /// Deliver to a single sink with retries, then record the outcome once
    async fn deliver(&self, sink: &Url, payload: &WebhookPayload) -> SinkDelivery {
        let started = Instant::now();
        let mut attempts = 0;
        let mut success = None;

        while attempts < self.policy.max_attempts {
            if attempts > 0 {
                let delay = self.policy.delay_for(attempts);
                debug!(
                    sink = %sink,
                    alert_id = payload.alert_id,
                    retry = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying webhook delivery"
                );
                tokio::time::sleep(delay).await;
            }
            attempts += 1;

            match self.post_once(sink, payload).await {
                Ok(status) if status < 400 => {
                    success = Some(status);
                    break;
                }
                Ok(status) => {
                    warn!(
                        sink = %sink,
                        alert_id = payload.alert_id,
                        attempt = attempts,
                        status = status,
                        "Webhook returned error status"
                    );
                }
                Err(e) => {
                    warn!(
                        sink = %sink,
                        alert_id = payload.alert_id,
                        attempt = attempts,
                        error = %e,
                        "Webhook attempt failed"
                    );
                }
            }
        }

        let response_code = success.unwrap_or(NO_RESPONSE);
        if let Err(e) = self
            .store
            .record_delivery(payload.alert_id, response_code)
            .await
        {
            warn!(
                alert_id = payload.alert_id,
                error = %e,
                "Failed to record webhook delivery status"
            );
        }

        let delivered = success.is_some();
        self.metrics
            .record_webhook_delivery(delivered, attempts, started.elapsed().as_secs_f64());
        self.logger
            .log_delivery(payload.alert_id, sink.as_str(), delivered, response_code, attempts);

        SinkDelivery {
            sink: sink.to_string(),
            delivered,
            response_code,
            attempts,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Vec<SinkDelivery> {
        let payload = Arc::new(WebhookPayload::from_alert(alert));
        let mut tasks = JoinSet::new();

        for (index, sink) in self.sinks.iter().enumerate() {
            let notifier = self.clone();
            let sink = sink.clone();
            let payload = payload.clone();
            tasks.spawn(async move { (index, notifier.deliver(&sink, &payload).await) });
        }

        let mut results: Vec<SinkDelivery> = self
            .sinks
            .iter()
            .map(|sink| SinkDelivery {
                sink: sink.to_string(),
                delivered: false,
                response_code: NO_RESPONSE,
                attempts: 0,
            })
            .collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, delivery)) => results[index] = delivery,
                Err(e) => warn!(alert_id = alert.id, error = %e, "Webhook delivery task failed"),
            }
        }

        results
    }

    fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, NewAlert};
    use crate::test_support::RecordingStore;

    async fn stored_alert(store: &RecordingStore) -> Alert {
        store
            .create_alert(NewAlert {
                host_id: "web-1".to_string(),
                alert_type: AlertType::Cpu,
                discriminator: None,
                severity: AlertSeverity::Critical,
                message: "High CPU usage on web-1: 97.0%".to_string(),
                threshold_value: Some(90.0),
                actual_value: Some(97.0),
            })
            .await
            .unwrap()
    }

    fn notifier(sinks: Vec<String>, store: &RecordingStore) -> WebhookNotifier {
        let config = WebhookConfig {
            sinks,
            timeout_secs: 2,
            ..Default::default()
        };
        WebhookNotifier::new(&config, Arc::new(store.clone()))
            .unwrap()
            .with_retry_policy(RetryPolicy::immediate(3))
    }

    #[test]
    fn test_payload_fields() {
        let alert = Alert {
            id: 12,
            host_id: "db-1".to_string(),
            alert_type: AlertType::Disk,
            discriminator: Some("/var".to_string()),
            severity: AlertSeverity::Warning,
            message: "High disk usage on db-1: 85.0% (/var)".to_string(),
            threshold_value: Some(80.0),
            actual_value: Some(85.0),
            triggered_at: Utc::now(),
            resolved_at: None,
            is_resolved: false,
            webhook_sent: false,
            webhook_sent_at: None,
            webhook_response_code: None,
        };

        let value = serde_json::to_value(WebhookPayload::from_alert(&alert)).unwrap();
        assert_eq!(value["alert_id"], 12);
        assert_eq!(value["host"], "db-1");
        assert_eq!(value["type"], "disk");
        assert_eq!(value["severity"], "warning");
        assert_eq!(value["threshold"], 80.0);
        assert_eq!(value["actual"], 85.0);
        assert!(value["triggered_at"].as_str().unwrap().ends_with('Z'));
        assert!(value.get("emitted_at").is_some());
    }

    #[test]
    fn test_invalid_sink_rejected() {
        let store = RecordingStore::new();
        let config = WebhookConfig {
            sinks: vec!["not a url".to_string()],
            ..Default::default()
        };
        let result = WebhookNotifier::new(&config, Arc::new(store));
        assert!(matches!(result, Err(NotifyError::InvalidSink { .. })));
    }

    #[tokio::test]
    async fn test_successful_delivery_records_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"host":"web-1","type":"cpu","severity":"critical"}"#.to_string(),
            ))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;

        let store = RecordingStore::new();
        let alert = stored_alert(&store).await;
        let notifier = notifier(vec![format!("{}/hook", server.url())], &store);

        let results = notifier.notify(&alert).await;
        mock.assert_async().await;

        assert_eq!(results.len(), 1);
        assert!(results[0].delivered);
        assert_eq!(results[0].response_code, 201);
        assert_eq!(results[0].attempts, 1);
        assert_eq!(store.deliveries(), vec![(alert.id, 201)]);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_retries_and_record_zero() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let store = RecordingStore::new();
        let alert = stored_alert(&store).await;
        let notifier = notifier(vec![format!("{}/hook", server.url())], &store);

        let results = notifier.notify(&alert).await;
        mock.assert_async().await;

        assert!(!results[0].delivered);
        assert_eq!(results[0].response_code, 0);
        assert_eq!(results[0].attempts, 3);
        // Recorded once per sink call, not per attempt
        assert_eq!(store.deliveries(), vec![(alert.id, 0)]);

        let stored = store.inner().get_alert(alert.id).await.unwrap();
        assert!(stored.webhook_sent);
        assert_eq!(stored.webhook_response_code, Some(0));
    }

    #[tokio::test]
    async fn test_unreachable_sink_counts_as_failure() {
        let store = RecordingStore::new();
        let alert = stored_alert(&store).await;
        let notifier = notifier(vec!["http://127.0.0.1:1/hook".to_string()], &store);

        let results = notifier.notify(&alert).await;
        assert!(!results[0].delivered);
        assert_eq!(results[0].attempts, 3);
        assert_eq!(store.deliveries(), vec![(alert.id, 0)]);
    }

    #[tokio::test]
    async fn test_sinks_are_independent() {
        let mut failing = mockito::Server::new_async().await;
        let failing_mock = failing
            .mock("POST", "/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;
        let mut healthy = mockito::Server::new_async().await;
        let healthy_mock = healthy
            .mock("POST", "/")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let store = RecordingStore::new();
        let alert = stored_alert(&store).await;
        let notifier = notifier(
            vec![format!("{}/", failing.url()), format!("{}/", healthy.url())],
            &store,
        );

        let results = notifier.notify(&alert).await;
        failing_mock.assert_async().await;
        healthy_mock.assert_async().await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].delivered);
        assert!(results[1].delivered);
        assert_eq!(results[1].response_code, 200);

        let mut deliveries = store.deliveries();
        deliveries.sort();
        assert_eq!(deliveries, vec![(alert.id, 0), (alert.id, 200)]);
    }

    /// Read one HTTP request, headers and body
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Sink that answers 503 once, then 202
    async fn flaky_sink() -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                read_request(&mut socket).await;
                let status = match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => "503 Service Unavailable",
                    _ => "202 Accepted",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/hook", addr), hits)
    }

    #[tokio::test]
    async fn test_success_on_retry_records_real_status_once() {
        let (url, hits) = flaky_sink().await;

        let store = RecordingStore::new();
        let alert = stored_alert(&store).await;
        let notifier = notifier(vec![url], &store);

        let results = notifier.notify(&alert).await;

        assert!(results[0].delivered);
        assert_eq!(results[0].response_code, 202);
        assert_eq!(results[0].attempts, 2);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.deliveries(), vec![(alert.id, 202)]);
    }

    #[test]
    fn test_config_policy_never_drops_below_one_attempt() {
        let config = WebhookConfig {
            retry_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }
}
