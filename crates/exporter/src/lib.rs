//! Capacity exporter: scheduler plus health and metrics endpoints

pub mod api;
pub mod config;
