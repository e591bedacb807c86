//! Host health and alert evaluation engine
//!
//! This crate provides the core functionality for:
//! - Classifying hosts as Healthy / Warning / Down from their latest sample
//! - Raising deduplicated CPU, disk and offline alerts
//! - Webhook delivery with retries
//! - The persistence port and an in-memory implementation
//! - Self-health and observability of the monitor process

pub mod alerts;
pub mod error;
pub mod health;
pub mod models;
pub mod notify;
pub mod observability;
pub mod store;

#[cfg(test)]
mod test_support;

pub use alerts::{AlertEngine, AlertThresholds, OfflineSweep, OfflineSweepBuilder};
pub use error::{EngineError, StoreError};
pub use health::{HealthService, HealthThresholds, ServiceHealth, ServiceStatus};
pub use models::*;
pub use notify::{Notifier, WebhookConfig, WebhookNotifier};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use store::{HealthStore, MemoryStore};
