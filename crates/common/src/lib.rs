//! Shared building blocks for the GHGP crates.
//!
//! - **Configuration**: layered, validated application settings (`config`).
//! - **Telemetry**: `tracing` bootstrap with JSON log files (`telemetry`).
//! - **Models**: request bodies and the response envelope (`models`).
pub mod config;
pub mod models;
pub mod telemetry;
