//! Context enrichment
//!
//! The [`ContextEnricher`] holds what the host has reported about the
//! client (user agent, viewport, memory, connection, current page) plus
//! application-defined key/value context, and stamps a [`ClientContext`]
//! snapshot onto every record.
//!
//! Custom context is stored as a JSON object under [`CONTEXT_KEY`] in the
//! session-scoped storage, so it survives for as long as that storage does.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lifeline_core::config::SessionConfig;
use lifeline_core::domain::{BrowserFamily, ClientContext, Viewport};
use tracing::warn;

use crate::storage::Storage;

/// Storage key for custom context
pub const CONTEXT_KEY: &str = "lifeline.context";

#[derive(Debug, Default, Clone)]
struct HostState {
    user_agent: Option<String>,
    browser: BrowserFamily,
    viewport: Option<Viewport>,
    memory_used_mb: Option<f64>,
    connection_type: Option<String>,
    page_path: Option<String>,
    referrer: Option<String>,
}

/// Builds context snapshots for outgoing records
pub struct ContextEnricher {
    environment: String,
    app_version: String,
    host: Mutex<HostState>,
    storage: Arc<dyn Storage>,
}

impl ContextEnricher {
    pub fn new(
        environment: impl Into<String>,
        app_version: impl Into<String>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            environment: environment.into(),
            app_version: app_version.into(),
            host: Mutex::new(HostState::default()),
            storage,
        }
    }

    pub fn from_config(config: &SessionConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(config.environment.clone(), config.app_version.clone(), storage)
    }

    // ========================================================================
    // Host-reported state
    // ========================================================================

    /// Record the user agent; the browser family is parsed once here.
    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        let user_agent = user_agent.into();
        let mut host = self.lock_host();
        host.browser = BrowserFamily::from_user_agent(&user_agent);
        host.user_agent = Some(user_agent);
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        self.lock_host().viewport = Some(Viewport { width, height });
    }

    pub fn set_memory_used_mb(&self, memory_used_mb: Option<f64>) {
        self.lock_host().memory_used_mb = memory_used_mb;
    }

    pub fn set_connection_type(&self, connection_type: Option<String>) {
        self.lock_host().connection_type = connection_type;
    }

    /// Record a navigation to `path`.
    pub fn set_page(&self, path: impl Into<String>, referrer: Option<String>) {
        let mut host = self.lock_host();
        host.page_path = Some(path.into());
        host.referrer = referrer;
    }

    pub fn page_path(&self) -> Option<String> {
        self.lock_host().page_path.clone()
    }

    fn lock_host(&self) -> MutexGuard<'_, HostState> {
        self.host.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Panic on another thread while holding the host lock.
    #[cfg(test)]
    pub(crate) fn poison(self: &Arc<Self>) {
        let enricher = self.clone();
        let _ = std::thread::spawn(move || {
            let _held = enricher.host.lock();
            panic!("host reporter died");
        })
        .join();
        assert!(self.host.is_poisoned());
    }

    // ========================================================================
    // Custom context
    // ========================================================================

    /// Set a custom context value carried by every subsequent record.
    pub fn set_context(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut custom = self.custom_context();
        custom.insert(key.into(), value.into());
        self.store_custom(&custom);
    }

    pub fn remove_context(&self, key: &str) {
        let mut custom = self.custom_context();
        if custom.remove(key).is_some() {
            self.store_custom(&custom);
        }
    }

    pub fn clear_context(&self) {
        if let Err(e) = self.storage.remove(CONTEXT_KEY) {
            warn!(error = %e, "Failed to clear custom context");
        }
    }

    /// Custom context as currently stored. Unreadable storage yields an
    /// empty map.
    pub fn custom_context(&self) -> BTreeMap<String, String> {
        let raw = match self.storage.get(CONTEXT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read custom context");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unparseable custom context");
            BTreeMap::new()
        })
    }

    fn store_custom(&self, custom: &BTreeMap<String, String>) {
        let result = serde_json::to_string(custom)
            .map_err(crate::error::StorageError::from)
            .and_then(|raw| self.storage.set(CONTEXT_KEY, &raw));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist custom context");
        }
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    /// Snapshot of everything known about the client right now.
    pub fn snapshot(&self) -> ClientContext {
        let host = self.lock_host().clone();
        ClientContext {
            browser: host.browser,
            user_agent: host.user_agent,
            viewport: host.viewport,
            memory_used_mb: host.memory_used_mb,
            connection_type: host.connection_type,
            environment: self.environment.clone(),
            app_version: self.app_version.clone(),
            page_path: host.page_path,
            referrer: host.referrer,
            custom: self.custom_context(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn enricher() -> (ContextEnricher, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let enricher = ContextEnricher::new("staging", "2.4.1", storage.clone());
        (enricher, storage)
    }

    #[test]
    fn test_snapshot_reflects_host_state() {
        let (enricher, _) = enricher();
        enricher.set_user_agent(
            "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        );
        enricher.set_viewport(390, 844);
        enricher.set_memory_used_mb(Some(48.5));
        enricher.set_connection_type(Some("4g".to_string()));
        enricher.set_page("/courses/emergency-first-aid", Some("/".to_string()));

        let ctx = enricher.snapshot();
        assert_eq!(ctx.browser, BrowserFamily::Firefox);
        assert_eq!(ctx.device_type(), "mobile");
        assert_eq!(ctx.memory_used_mb, Some(48.5));
        assert_eq!(ctx.connection_type.as_deref(), Some("4g"));
        assert_eq!(ctx.environment, "staging");
        assert_eq!(ctx.app_version, "2.4.1");
        assert_eq!(ctx.page_path.as_deref(), Some("/courses/emergency-first-aid"));
        assert_eq!(ctx.referrer.as_deref(), Some("/"));
    }

    #[test]
    fn test_custom_context_persists_in_storage() {
        let (enricher, storage) = enricher();
        enricher.set_context("cohort", "spring");
        enricher.set_context("venue", "leeds");
        enricher.remove_context("venue");

        let raw = storage.get(CONTEXT_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"{"cohort":"spring"}"#);

        // A second enricher over the same storage sees the same context
        let other = ContextEnricher::new("staging", "2.4.1", storage);
        assert_eq!(other.snapshot().custom.get("cohort").map(String::as_str), Some("spring"));
    }

    #[test]
    fn test_corrupt_context_is_ignored() {
        let (enricher, storage) = enricher();
        storage.set(CONTEXT_KEY, "not json").unwrap();
        assert!(enricher.snapshot().custom.is_empty());

        enricher.set_context("cohort", "autumn");
        assert_eq!(enricher.custom_context().len(), 1);
    }

    #[test]
    fn test_clear_context() {
        let (enricher, storage) = enricher();
        enricher.set_context("cohort", "spring");
        enricher.clear_context();
        assert!(storage.get(CONTEXT_KEY).unwrap().is_none());
        assert!(enricher.custom_context().is_empty());
    }
}
