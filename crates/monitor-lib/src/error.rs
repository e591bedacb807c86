//! Error types for the evaluation engine

use thiserror::Error;

use crate::models::AlertKey;

/// Errors surfaced by a persistence port implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing storage could not serve the request
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An open alert already exists for the same (host, type, discriminator)
    #[error("Open alert already exists for {host_id}/{alert_type}{}", discriminator_suffix(.discriminator))]
    Conflict {
        host_id: String,
        alert_type: String,
        discriminator: Option<String>,
    },
}

impl StoreError {
    pub fn conflict(key: &AlertKey) -> Self {
        StoreError::Conflict {
            host_id: key.host_id.clone(),
            alert_type: key.alert_type.to_string(),
            discriminator: key.discriminator.clone(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

fn discriminator_suffix(discriminator: &Option<String>) -> String {
    discriminator
        .as_ref()
        .map(|d| format!(" ({})", d))
        .unwrap_or_default()
}

/// Errors returned by the classifier, alert engine and sweep
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
