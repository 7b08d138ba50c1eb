//! Analytics event records
//!
//! An [`EventRecord`] is created for every tracked interaction. It is
//! immutable once built: fields are private and the builder methods
//! consume `self`. Metadata is a typed union per interaction kind, with
//! [`EventMetadata::Custom`] as the opaque fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::context::ClientContext;
use super::errors::DomainError;
use super::newtypes::{EventId, SessionId, UserId};

/// Typed metadata attached to an analytics event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventMetadata {
    /// No metadata
    #[default]
    None,
    /// A page or route was viewed
    PageView {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        referrer: Option<String>,
    },
    /// An element was clicked
    Click {
        element: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A form was submitted
    FormSubmit { form: String, success: bool },
    /// A step of the course booking funnel was reached
    Booking { course_id: String, step: String },
    /// A course or location search was performed
    Search { query: String, results: u32 },
    /// A user-visible timing
    Timing { metric: String, duration_ms: f64 },
    /// Arbitrary key/value pairs
    Custom(Map<String, Value>),
}

impl EventMetadata {
    /// Stored `event_type` for this kind of metadata
    pub fn event_type(&self) -> &'static str {
        match self {
            EventMetadata::None => "event",
            EventMetadata::PageView { .. } => "page_view",
            EventMetadata::Click { .. } => "click",
            EventMetadata::FormSubmit { .. } => "form_submit",
            EventMetadata::Booking { .. } => "booking",
            EventMetadata::Search { .. } => "search",
            EventMetadata::Timing { .. } => "timing",
            EventMetadata::Custom(_) => "custom",
        }
    }
}

/// A single analytics observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    id: EventId,
    name: String,
    category: String,
    action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    metadata: EventMetadata,
    context: ClientContext,
    timestamp: DateTime<Utc>,
    session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<UserId>,
}

impl EventRecord {
    /// Creates a new event with the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidEventName` if `name` is blank.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        action: impl Into<String>,
        session_id: SessionId,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::InvalidEventName(name));
        }

        Ok(Self {
            id: EventId::new(),
            name,
            category: category.into(),
            action: action.into(),
            label: None,
            value: None,
            metadata: EventMetadata::None,
            context: ClientContext::default(),
            timestamp: Utc::now(),
            session_id,
            user_id: None,
        })
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
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

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    // --- accessors ---

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    /// Stored event type, derived from the metadata variant
    pub fn event_type(&self) -> &'static str {
        self.metadata.event_type()
    }

    /// Page the event happened on: the viewed path for page views,
    /// otherwise the page recorded in the context.
    pub fn page_url(&self) -> Option<&str> {
        match &self.metadata {
            EventMetadata::PageView { path, .. } => Some(path.as_str()),
            _ => self.context.page_path.as_deref(),
        }
    }

    /// Referrer for page views, falling back to the context referrer.
    pub fn referrer_url(&self) -> Option<&str> {
        match &self.metadata {
            EventMetadata::PageView {
                referrer: Some(referrer),
                ..
            } => Some(referrer.as_str()),
            _ => self.context.referrer.as_deref(),
        }
    }
}
