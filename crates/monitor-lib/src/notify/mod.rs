//! Outbound alert notifications
//!
//! This module provides:
//! - The `Notifier` seam the alert engine dispatches through
//! - Webhook delivery with bounded, backed-off retries
//! - The shared `RetryPolicy`

mod backoff;
mod webhook;

pub use backoff::RetryPolicy;
pub use webhook::{SinkDelivery, WebhookConfig, WebhookNotifier, WebhookPayload};

use crate::models::Alert;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid webhook sink {sink}: {reason}")]
    InvalidSink { sink: String, reason: String },
}

/// Delivers a freshly created alert to external sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver to every sink; one result per sink, in configuration order
    async fn notify(&self, alert: &Alert) -> Vec<SinkDelivery>;

    /// Number of configured sinks; zero means console-only
    fn sink_count(&self) -> usize;
}
