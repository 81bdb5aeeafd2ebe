//! Chain capacity estimation
//!
//! This crate provides the core functionality for:
//! - Dependency-chain resolution and headroom projection (the engine)
//! - Cluster inventory and request-rate collection
//! - Periodic scheduling and per-service gauge publication
//! - Health checks and observability

pub mod config;
pub mod engine;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod scheduler;

pub use config::{CapacityConfig, ConfigError};
pub use engine::{run_cycle, EngineError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CapacityGauges, ExporterMetrics, StructuredLogger};
pub use scheduler::{CapacityScheduler, CapacitySchedulerBuilder, CycleSummary};
