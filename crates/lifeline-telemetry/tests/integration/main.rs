//! Integration tests for lifeline-telemetry
//!
//! Uses wiremock to stand in for the telemetry backend and verifies
//! batch delivery, retry ordering, and the client lifecycle over real HTTP.

mod common;

mod test_client;
mod test_retry;
mod test_transport;
