//! Error report records
//!
//! An [`ErrorReport`] is the structured form of an uncaught exception,
//! rejected promise, component boundary failure, panic, or manually
//! reported error, together with its breadcrumb trail.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::breadcrumb::Breadcrumb;
use super::context::ClientContext;
use super::errors::DomainError;
use super::newtypes::{EventId, SessionId, UserId};

/// How the error reached the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    /// Global `error` listener
    Uncaught,
    /// Global `unhandledrejection` listener
    UnhandledRejection,
    /// A component error boundary
    ComponentBoundary,
    /// A Rust panic intercepted by the panic hook
    Panic,
    /// Reported explicitly by application code
    Manual,
}

/// Heuristic severity of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(DomainError::InvalidSeverity(other.to_string())),
        }
    }
}

/// A structured error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub message: String,
    pub source: CaptureSource,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub context: ClientContext,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

impl ErrorReport {
    /// Create a new error report with no trail or context attached.
    pub fn new(
        error_type: &str,
        message: &str,
        source: CaptureSource,
        severity: Severity,
        session_id: SessionId,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            source,
            severity,
            stack: None,
            component: None,
            breadcrumbs: Vec::new(),
            context: ClientContext::default(),
            session_id,
            user_id: None,
        }
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack;
        self
    }

    pub fn with_component(mut self, component: Option<String>) -> Self {
        self.component = component;
        self
    }

    pub fn with_breadcrumbs(mut self, breadcrumbs: Vec<Breadcrumb>) -> Self {
        self.breadcrumbs = breadcrumbs;
        self
    }

    pub fn with_context(mut self, context: ClientContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_user_id(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }
}
