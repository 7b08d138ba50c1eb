//! Breadcrumb trail entries
//!
//! Breadcrumbs record what the user did just before an error. They are
//! kept in a bounded ring on the error tracker and copied into each
//! report at capture time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of activity a breadcrumb records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbKind {
    Navigation,
    Click,
    Console,
    Network,
    Custom,
}

/// A single trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub kind: BreadcrumbKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Breadcrumb {
    pub fn new(kind: BreadcrumbKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}
