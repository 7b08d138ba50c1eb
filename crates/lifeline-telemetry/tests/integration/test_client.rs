//! Full client lifecycle against a mock backend

use lifeline_core::domain::{CaptureSource, UserId};
use lifeline_telemetry::{CapturedError, Telemetry};
use serde_json::json;

use crate::common;

#[tokio::test]
async fn test_client_delivers_every_channel() {
    let server = common::setup_backend().await;
    let telemetry =
        Telemetry::new(common::config_for(&server), common::transport_for(&server)).unwrap();
    telemetry.start();

    telemetry.context().set_user_agent(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    );
    telemetry.context().set_viewport(1440, 900);
    telemetry.analytics().identify(UserId::new("learner-1").unwrap());

    telemetry.analytics().page_view("/courses", None, None).await;
    telemetry
        .analytics()
        .booking_step("efaw-1", "checkout")
        .await;
    telemetry
        .logger()
        .info("checkout opened", Some(json!({ "seats": 2 })))
        .await;
    telemetry.performance().record_web_vital("FCP", 900.0).await;
    telemetry
        .errors()
        .capture(CapturedError::new(
            "TypeError",
            "cannot read properties of undefined",
            CaptureSource::Uncaught,
        ))
        .await;

    telemetry.shutdown().await;

    let analytics = common::bodies(&server, "/api/analytics").await;
    assert_eq!(common::field_values(&analytics, "name"), vec!["page_view", "booking_step"]);
    let first = &analytics[0][0];
    assert_eq!(first["userId"], "learner-1");
    assert_eq!(first["context"]["browser"], "chrome");
    assert_eq!(first["context"]["viewport"]["width"], 1440);

    let logs = common::bodies(&server, "/api/logs").await;
    assert_eq!(common::field_values(&logs, "message"), vec!["checkout opened"]);

    let errors = common::bodies(&server, "/api/errors").await;
    assert_eq!(common::field_values(&errors, "severity"), vec!["high"]);
    // Navigation breadcrumb left by the page view
    assert_eq!(errors[0][0]["breadcrumbs"][0]["kind"], "navigation");

    let performance = common::bodies(&server, "/api/performance").await;
    assert_eq!(common::field_values(&performance, "name"), vec!["FCP"]);
}

#[tokio::test]
async fn test_benign_errors_never_reach_backend() {
    let server = common::setup_backend().await;
    let telemetry =
        Telemetry::new(common::config_for(&server), common::transport_for(&server)).unwrap();

    telemetry
        .errors()
        .capture(CapturedError::new(
            "Error",
            "ResizeObserver loop completed with undelivered notifications",
            CaptureSource::Uncaught,
        ))
        .await;
    telemetry.shutdown().await;

    assert!(common::bodies(&server, "/api/errors").await.is_empty());
}
