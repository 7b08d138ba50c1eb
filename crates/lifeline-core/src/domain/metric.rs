//! Performance metrics
//!
//! A [`PerformanceMetric`] is ephemeral: it exists from measurement until
//! it is flushed. When a threshold is known, `passed` records whether the
//! value stayed within it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::SessionId;

/// Unit of a performance measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    Milliseconds,
    Bytes,
    /// Unitless score such as cumulative layout shift
    Score,
    Count,
}

/// A single measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_path: Option<String>,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, value: f64, unit: MetricUnit, session_id: SessionId) -> Self {
        Self {
            name: name.into(),
            value,
            unit,
            threshold: None,
            passed: None,
            page_path: None,
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// Attach a threshold; `passed` becomes `value <= threshold`.
    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self.passed = threshold.map(|t| self.value <= t);
        self
    }

    pub fn with_page_path(mut self, page_path: Option<String>) -> Self {
        self.page_path = page_path;
        self
    }

    /// True when a threshold exists and was exceeded.
    pub fn exceeded(&self) -> bool {
        self.passed == Some(false)
    }
}
