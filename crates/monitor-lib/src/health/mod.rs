//! Host health classification and monitor self-health
//!
//! - `classifier`: pure Healthy/Warning/Down classification of a host
//! - `service`: runs the classifier against the persistence port
//! - `registry`: liveness/readiness of this process

mod classifier;
mod registry;
mod service;

pub use classifier::{classify, connectivity, grade, Assessment, HealthThresholds};
pub use registry::{
    components, ComponentHealth, LivenessReport, ReadinessReport, ServiceHealth, ServiceStatus,
};
pub use service::HealthService;
