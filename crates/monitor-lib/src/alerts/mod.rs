//! Alert evaluation and the offline sweep
//!
//! This module provides the `AlertEngine`, which turns accepted samples
//! and missing heartbeats into deduplicated alerts, and the periodic
//! `OfflineSweep` that drives offline detection.

mod engine;
mod sweep;


pub use engine::{AlertEngine, AlertStatistics, AlertThresholds};
pub use sweep::{OfflineSweep, OfflineSweepBuilder, SweepConfig, SweepReport};
