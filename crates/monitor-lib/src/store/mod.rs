//! Persistence port used by the evaluation engine
//!
//! The engine never touches storage directly. Everything it needs goes
//! through [`HealthStore`], which a relational backend (or the bundled
//! [`MemoryStore`]) implements.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::models::{Alert, HealthClassification, HealthUpdate, HostRecord, MetricSample, NewAlert};
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Narrow storage interface consumed by the classifier, alert engine and notifier
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Most recent sample reported by a host
    async fn get_latest_sample(&self, host_id: &str) -> StoreResult<Option<MetricSample>>;

    async fn get_host(&self, host_id: &str) -> StoreResult<Option<HostRecord>>;

    /// All hosts that have not been deregistered
    async fn get_active_hosts(&self) -> StoreResult<Vec<HostRecord>>;

    /// Unresolved alerts, newest first, optionally restricted to one host
    async fn get_open_alerts(&self, host_id: Option<&str>) -> StoreResult<Vec<Alert>>;

    /// Persist a new alert.
    ///
    /// Implementations must reject a second open alert with the same
    /// (host, type, discriminator) with [`StoreError::Conflict`].
    async fn create_alert(&self, alert: NewAlert) -> StoreResult<Alert>;

    /// Mark an alert resolved. Returns false if no such alert exists.
    async fn resolve_alert(&self, alert_id: i64) -> StoreResult<bool>;

    /// Record the outcome of a webhook delivery; `0` means no response
    async fn record_delivery(&self, alert_id: i64, response_code: u16) -> StoreResult<()>;

    /// Overwrite the stored classification for a host
    async fn upsert_health(&self, update: HealthUpdate) -> StoreResult<()>;

    async fn get_health(&self, host_id: &str) -> StoreResult<Option<HealthClassification>>;
}
