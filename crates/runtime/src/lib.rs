//! GHGP Runtime: the analytics core behind the HTTP API.
//!
//! Requests become typed [`Operation`](compiler::Operation)s, which compile to
//! [`RelationalPlan`](plan::RelationalPlan)s and run over Parquet snapshots
//! that are pulled from object storage on first use.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ AnalyticsService │
//! └────────┬─────────┘
//!          │
//!   ┌──────┴───────┬──────────────┬─────────────┐
//!   │ QueryCompiler│ SnapshotCache│ PlanExecutor│ ──> shaper
//!   └──────────────┴──────┬───────┴─────────────┘
//!                         │
//!                   ┌─────┴──────┐
//!                   │ RemoteStore│ (S3)
//!                   └────────────┘
//! ```

pub mod catalog;
pub mod compiler;
pub mod engine;
pub mod geo;
pub mod plan;
pub mod remote;
pub mod service;
pub mod shaper;
pub mod snapshot;
pub mod value;

pub use compiler::{Operation, QueryCompiler};
pub use engine::{DataFusionExecutor, PlanExecutor};
pub use remote::{ObjectStoreRemote, RemoteStore};
pub use service::{AnalyticsService, ExportFile, PieLevel, ServiceSettings};
pub use snapshot::SnapshotCache;
