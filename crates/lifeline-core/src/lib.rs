//! Lifeline Core - Telemetry domain types and configuration
//!
//! This crate contains the data model shared by the telemetry runtime
//! and the analytics store:
//! - **Domain records** - `EventRecord`, `LogEntry`, `ErrorReport`, `PerformanceMetric`, `Breadcrumb`
//! - **Typed metadata** - `EventMetadata`, one variant per tracked interaction
//! - **Identifiers** - `SessionId`, `EventId`, `UserId`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! Nothing in this crate performs I/O except configuration loading.

pub mod config;
pub mod domain;
