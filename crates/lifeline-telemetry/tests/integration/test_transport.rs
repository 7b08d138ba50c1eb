//! HttpTransport against a live mock backend

use lifeline_telemetry::{Transport, TransportError};
use serde_json::json;

use crate::common;

#[tokio::test]
async fn test_batch_is_posted_as_json_array() {
    let server = common::setup_backend().await;
    let transport = common::transport_for(&server);

    transport
        .send_batch("/api/logs", &json!([{ "message": "a" }, { "message": "b" }]))
        .await
        .expect("delivered");

    let bodies = common::bodies(&server, "/api/logs").await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(common::field_values(&bodies, "message"), vec!["a", "b"]);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = common::setup_flaky_backend("/api/errors", 1).await;
    let transport = common::transport_for(&server);

    let err = transport
        .send_batch("/api/errors", &json!([]))
        .await
        .expect_err("503 must fail");
    match err {
        TransportError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(transport.send_batch("/api/errors", &json!([])).await.is_ok());
}
