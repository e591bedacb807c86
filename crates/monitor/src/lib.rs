//! Daemon wiring for the health monitor: configuration and HTTP surface

pub mod api;
pub mod config;
