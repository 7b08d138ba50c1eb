//! Shared helpers for backend-backed integration tests

use std::sync::Arc;
use std::time::Duration;

use lifeline_core::config::{Config, ConfigBuilder};
use lifeline_telemetry::HttpTransport;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Ingestion paths the backend exposes
pub const INGEST_PATHS: [&str; 4] = [
    "/api/logs",
    "/api/analytics",
    "/api/errors",
    "/api/performance",
];

/// Starts a backend that accepts every batch on every ingestion path.
pub async fn setup_backend() -> MockServer {
    let server = MockServer::start().await;
    for ingest in INGEST_PATHS {
        Mock::given(method("POST"))
            .and(path(ingest))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
    }
    server
}

/// Starts a backend whose `ingest` path fails `failures` times with 503
/// before accepting.
pub async fn setup_flaky_backend(ingest: &str, failures: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ingest))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .up_to_n_times(failures)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ingest))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;
    server
}

pub fn transport_for(server: &MockServer) -> Arc<HttpTransport> {
    Arc::new(
        HttpTransport::new(server.uri(), Duration::from_secs(5)).expect("build transport"),
    )
}

pub fn config_for(server: &MockServer) -> Config {
    ConfigBuilder::new()
        .base_url(server.uri())
        .build_validated()
        .expect("valid config")
}

/// Bodies of accepted and rejected requests to `ingest`, in arrival order.
pub async fn bodies(server: &MockServer, ingest: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == ingest)
        .map(|r| r.body_json::<Value>().expect("JSON body"))
        .collect()
}

/// Flatten batches into their `field` values.
pub fn field_values(batches: &[Value], field: &str) -> Vec<String> {
    batches
        .iter()
        .flat_map(|b| b.as_array().cloned().unwrap_or_default())
        .filter_map(|r| r[field].as_str().map(str::to_string))
        .collect()
}
