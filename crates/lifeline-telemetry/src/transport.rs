//! Batch delivery to the backend
//!
//! A [`Transport`] delivers one JSON array per call. [`HttpTransport`] posts
//! it to `{base_url}{path}`; [`MemoryTransport`] keeps batches in memory for
//! tests and offline embedding, and can be told to fail.
//!
//! There are no idempotency keys: a batch that reached the backend but
//! whose response was lost is sent again on retry.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lifeline_core::config::EndpointConfig;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;

/// Maximum number of response body bytes kept in a status error
const MAX_ERROR_BODY: usize = 512;

/// Delivers serialized batches to a backend endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `batch` (a JSON array) to the endpoint at `path`.
    async fn send_batch(&self, path: &str, batch: &Value) -> Result<(), TransportError>;
}

// ============================================================================
// HttpTransport
// ============================================================================

/// HTTP transport posting JSON arrays with `reqwest`
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Creates a transport from the `endpoint` configuration section.
    pub fn from_config(config: &EndpointConfig) -> Result<Self, TransportError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_batch(&self, path: &str, batch: &Value) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(batch).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Batch delivered");
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// In-memory transport that records every delivered batch
///
/// Failures can be scripted with [`fail_next`](MemoryTransport::fail_next);
/// a failed send records nothing.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    delivered: Mutex<Vec<(String, Value)>>,
    scripted_failures: Mutex<VecDeque<u16>>,
    delay: Mutex<Option<Duration>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` sends fail with HTTP 503.
    pub fn fail_next(&self, n: usize) {
        let mut failures = self.scripted_failures.lock().unwrap();
        failures.extend(std::iter::repeat(503).take(n));
    }

    /// Delay every send by `delay` before it completes.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// All delivered batches as `(path, batch)` pairs, in delivery order.
    pub fn batches(&self) -> Vec<(String, Value)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Delivered records for `path`, flattened across batches.
    pub fn records(&self, path: &str) -> Vec<Value> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .flat_map(|(_, batch)| batch.as_array().cloned().unwrap_or_default())
            .collect()
    }

    /// Number of successful sends so far.
    pub fn send_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_batch(&self, path: &str, batch: &Value) -> Result<(), TransportError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.scripted_failures.lock().unwrap().pop_front();
        if let Some(status) = failure {
            return Err(TransportError::Status {
                status,
                body: "scripted failure".to_string(),
            });
        }

        self.delivered
            .lock()
            .unwrap()
            .push((path.to_string(), batch.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_trims_trailing_slash() {
        let transport = HttpTransport::new("https://api.lifeline.test/", Duration::from_secs(1))
            .expect("build transport");
        assert_eq!(transport.base_url(), "https://api.lifeline.test");
    }

    #[test]
    fn test_http_transport_from_config() {
        let transport = HttpTransport::from_config(&EndpointConfig::default()).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_memory_transport_records_batches() {
        let transport = MemoryTransport::new();
        transport
            .send_batch("/api/logs", &serde_json::json!([1, 2]))
            .await
            .unwrap();
        transport
            .send_batch("/api/logs", &serde_json::json!([3]))
            .await
            .unwrap();

        assert_eq!(transport.send_count(), 2);
        assert_eq!(
            transport.records("/api/logs"),
            vec![
                serde_json::json!(1),
                serde_json::json!(2),
                serde_json::json!(3)
            ]
        );
        assert!(transport.records("/api/errors").is_empty());
    }

    #[tokio::test]
    async fn test_memory_transport_scripted_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next(1);

        let first = transport.send_batch("/api/logs", &serde_json::json!([1])).await;
        assert!(matches!(first, Err(TransportError::Status { status: 503, .. })));

        let second = transport.send_batch("/api/logs", &serde_json::json!([1])).await;
        assert!(second.is_ok());
        assert_eq!(transport.send_count(), 1);
    }
}
