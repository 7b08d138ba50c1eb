//! Lifeline Telemetry - Buffered client telemetry
//!
//! Four producers share one pipeline: enrich, sample or rate-limit,
//! buffer, then deliver batches over HTTP with retry.
//!
//! - **Logger** - leveled logs, echoed through `tracing`, optionally kept locally
//! - **Analytics** - page views, clicks, booking funnel steps, searches
//! - **ErrorTracker** - error reports with breadcrumbs, ignore list, and rate limit
//! - **PerformanceMonitor** - web vitals and custom timings against thresholds
//!
//! [`Telemetry`] wires them together and owns the periodic flush task.
//! The pipeline's own health is exposed as Prometheus metrics.

pub mod analytics;
pub mod buffer;
pub mod context;
pub mod error;
pub mod error_tracker;
pub mod local_log;
pub mod logger;
pub mod logging;
pub mod metrics;
pub mod performance;
pub mod rate_limit;
pub mod sampler;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use analytics::{Analytics, TrackEvent, TrackOutcome};
pub use buffer::{BufferLimits, EventBuffer, FlushOutcome, Flushable};
pub use context::ContextEnricher;
pub use error::{StorageError, TransportError};
pub use error_tracker::{CaptureOutcome, CapturedError, ErrorTracker};
pub use local_log::LocalLogStore;
pub use logger::Logger;
pub use logging::init_tracing;
pub use metrics::TelemetryMetrics;
pub use performance::{PerformanceMonitor, Timer};
pub use rate_limit::SlidingWindowLimiter;
pub use sampler::Sampler;
pub use scheduler::FlushScheduler;
pub use session::SessionManager;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use telemetry::Telemetry;
pub use transport::{HttpTransport, MemoryTransport, Transport};
