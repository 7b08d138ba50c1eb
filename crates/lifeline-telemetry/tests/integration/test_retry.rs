//! Failed batches are retried in their original order

use std::sync::Arc;

use lifeline_telemetry::{BufferLimits, EventBuffer, FlushOutcome};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct Item {
    name: &'static str,
}

#[tokio::test]
async fn test_retry_preserves_order_after_failure() {
    let server = common::setup_flaky_backend("/api/analytics", 1).await;
    let buffer = EventBuffer::new(
        "analytics",
        "/api/analytics",
        BufferLimits {
            batch_size: 10,
            max_queue_size: 100,
        },
        common::transport_for(&server),
    );

    for name in ["A", "B", "C"] {
        buffer.record(Item { name }).await;
    }
    assert_eq!(buffer.flush().await, FlushOutcome::Requeued(3));
    assert_eq!(buffer.flush().await, FlushOutcome::Sent(3));

    let bodies = common::bodies(&server, "/api/analytics").await;
    assert_eq!(bodies.len(), 2);
    // The rejected attempt and the accepted retry carry the same batch
    assert_eq!(common::field_values(&bodies[..1], "name"), vec!["A", "B", "C"]);
    assert_eq!(common::field_values(&bodies[1..], "name"), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_threshold_flush_failure_keeps_records() {
    let server = common::setup_flaky_backend("/api/logs", 1).await;
    let buffer = Arc::new(EventBuffer::new(
        "logs",
        "/api/logs",
        BufferLimits {
            batch_size: 2,
            max_queue_size: 10,
        },
        common::transport_for(&server),
    ));

    buffer.record(Item { name: "first" }).await;
    let outcome = buffer.record(Item { name: "second" }).await;
    assert_eq!(outcome, Some(FlushOutcome::Requeued(2)));
    assert_eq!(buffer.len(), 2);

    buffer.record(Item { name: "third" }).await;
    // The append that crossed the threshold again delivered everything
    assert!(buffer.is_empty());

    let bodies = common::bodies(&server, "/api/logs").await;
    assert_eq!(
        common::field_values(&bodies[1..], "name"),
        vec!["first", "second", "third"]
    );
}
