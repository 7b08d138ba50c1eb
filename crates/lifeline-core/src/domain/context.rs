//! Client context snapshots
//!
//! A [`ClientContext`] is the ambient metadata attached to every record
//! before it is buffered: browser family, viewport, memory, connection,
//! environment, and any custom key/value pairs set by the application.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Browser family detected from a user-agent string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserFamily {
    Chrome,
    Edge,
    Firefox,
    Opera,
    Safari,
    #[default]
    Other,
}

impl BrowserFamily {
    /// Parse the browser family out of a user-agent string.
    ///
    /// Order matters: Edge and Opera advertise `Chrome/` as well, and
    /// Chrome advertises `Safari/`.
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Edg/") || user_agent.contains("Edge/") {
            BrowserFamily::Edge
        } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
            BrowserFamily::Opera
        } else if user_agent.contains("Firefox/") || user_agent.contains("FxiOS/") {
            BrowserFamily::Firefox
        } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
            BrowserFamily::Chrome
        } else if user_agent.contains("Safari/") {
            BrowserFamily::Safari
        } else {
            BrowserFamily::Other
        }
    }

    /// Lowercase name used in stored rows
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "chrome",
            BrowserFamily::Edge => "edge",
            BrowserFamily::Firefox => "firefox",
            BrowserFamily::Opera => "opera",
            BrowserFamily::Safari => "safari",
            BrowserFamily::Other => "other",
        }
    }
}

impl std::fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Viewport size in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Coarse device class derived from the viewport width.
    pub fn device_type(&self) -> &'static str {
        match self.width {
            0..=767 => "mobile",
            768..=1023 => "tablet",
            _ => "desktop",
        }
    }
}

/// Ambient metadata captured at the moment a record is created
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContext {
    pub browser: BrowserFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// Used JS heap in MiB, when the host reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    pub environment: String,
    pub app_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl ClientContext {
    /// Device class, falling back to `"unknown"` without a viewport.
    pub fn device_type(&self) -> &'static str {
        self.viewport.map(|v| v.device_type()).unwrap_or("unknown")
    }
}
