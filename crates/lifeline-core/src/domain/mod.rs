//! Domain records and identifiers
//!
//! This module contains the core telemetry types:
//! - Newtypes for identifiers (session, event, user)
//! - Analytics event records with typed metadata
//! - Client context snapshots attached by enrichment
//! - Breadcrumbs and error reports
//! - Performance metrics
//! - Log entries
//! - Domain-specific error types

pub mod breadcrumb;
pub mod context;
pub mod error_report;
pub mod errors;
pub mod event;
pub mod log_entry;
pub mod metric;
pub mod newtypes;

// Re-export commonly used types
pub use breadcrumb::{Breadcrumb, BreadcrumbKind};
pub use context::{BrowserFamily, ClientContext, Viewport};
pub use error_report::{CaptureSource, ErrorReport, Severity};
pub use errors::DomainError;
pub use event::{EventMetadata, EventRecord};
pub use log_entry::{LogEntry, LogLevel};
pub use metric::{MetricUnit, PerformanceMetric};
pub use newtypes::*;
