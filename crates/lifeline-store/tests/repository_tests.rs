//! Integration tests for AnalyticsEventRepository
//!
//! Each test gets a fresh in-memory database, except the file-backed
//! pool test which uses a temporary directory.

use chrono::{Duration, TimeZone, Utc};

use lifeline_core::domain::{
    BrowserFamily, ClientContext, EventMetadata, EventRecord, SessionId, UserId, Viewport,
};
use lifeline_store::{AnalyticsEventRepository, ClientInfo, DatabasePool};

// ============================================================================
// Test helpers
// ============================================================================

/// Create a fresh in-memory repository for each test
async fn setup() -> AnalyticsEventRepository {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    AnalyticsEventRepository::new(pool.pool().clone())
}

fn context() -> ClientContext {
    ClientContext {
        browser: BrowserFamily::Firefox,
        user_agent: Some("Mozilla/5.0 Firefox/121.0".to_string()),
        viewport: Some(Viewport {
            width: 390,
            height: 844,
        }),
        environment: "production".to_string(),
        app_version: "2.4.0".to_string(),
        page_path: Some("/courses".to_string()),
        ..ClientContext::default()
    }
}

fn page_view(session: SessionId, path: &str) -> EventRecord {
    EventRecord::new("page_view", "navigation", "view", session)
        .unwrap()
        .with_metadata(EventMetadata::PageView {
            path: path.to_string(),
            title: Some("First Aid at Work".to_string()),
            referrer: Some("https://www.google.com/".to_string()),
        })
        .with_context(context())
}

fn booking(session: SessionId, step: &str) -> EventRecord {
    EventRecord::new("booking_step", "booking", step, session)
        .unwrap()
        .with_metadata(EventMetadata::Booking {
            course_id: "faw-3day".to_string(),
            step: step.to_string(),
        })
        .with_context(context())
}

fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: None,
    }
}

// ============================================================================
// Ingest
// ============================================================================

#[tokio::test]
async fn test_insert_batch_maps_columns() {
    let repo = setup().await;
    let session = SessionId::new();
    let user = UserId::new("learner-42").unwrap();
    let event = page_view(session, "/courses/first-aid-at-work").with_user_id(Some(user));

    let inserted = repo.insert_batch(&[event.clone()], &client()).await.unwrap();
    assert_eq!(inserted, 1);

    let stored = repo.list_by_session(session).await.unwrap();
    assert_eq!(stored.len(), 1);
    let row = &stored[0];
    assert_eq!(row.event_id, event.id().to_string());
    assert_eq!(row.event_type, "page_view");
    assert_eq!(row.event_name, "page_view");
    assert_eq!(row.user_id.as_deref(), Some("learner-42"));
    assert_eq!(row.session_id, session.to_string());
    assert_eq!(row.page_url.as_deref(), Some("/courses/first-aid-at-work"));
    assert_eq!(row.referrer_url.as_deref(), Some("https://www.google.com/"));
    assert_eq!(row.ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(row.user_agent.as_deref(), Some("Mozilla/5.0 Firefox/121.0"));
    assert_eq!(row.device_type.as_deref(), Some("mobile"));
    assert_eq!(row.browser.as_deref(), Some("firefox"));
    assert_eq!(
        row.created_at.timestamp_micros(),
        event.timestamp().timestamp_micros()
    );

    let decoded: EventRecord = serde_json::from_value(row.event_data.clone()).unwrap();
    assert_eq!(decoded, event);
}

#[tokio::test]
async fn test_request_user_agent_wins_over_context() {
    let repo = setup().await;
    let session = SessionId::new();
    let info = ClientInfo {
        ip_address: None,
        user_agent: Some("Mozilla/5.0 Chrome/120.0".to_string()),
    };

    repo.insert_batch(&[booking(session, "select_date")], &info)
        .await
        .unwrap();

    let stored = repo.list_by_session(session).await.unwrap();
    assert_eq!(stored[0].user_agent.as_deref(), Some("Mozilla/5.0 Chrome/120.0"));
    assert_eq!(stored[0].ip_address, None);
    // Non page-view events take the page from the context
    assert_eq!(stored[0].page_url.as_deref(), Some("/courses"));
}

#[tokio::test]
async fn test_resent_batch_is_ignored() {
    let repo = setup().await;
    let session = SessionId::new();
    let batch = vec![
        page_view(session, "/"),
        booking(session, "select_course"),
        booking(session, "payment"),
    ];

    assert_eq!(repo.insert_batch(&batch, &client()).await.unwrap(), 3);
    assert_eq!(repo.insert_batch(&batch, &client()).await.unwrap(), 0);

    // A batch mixing old and new events only stores the new ones
    let mut retry = batch.clone();
    retry.push(booking(session, "confirmation"));
    assert_eq!(repo.insert_batch(&retry, &client()).await.unwrap(), 1);

    assert_eq!(repo.list_by_session(session).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_empty_batch_inserts_nothing() {
    let repo = setup().await;
    assert_eq!(repo.insert_batch(&[], &client()).await.unwrap(), 0);
    assert!(repo.count_by_type().await.unwrap().is_empty());
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_count_by_type() {
    let repo = setup().await;
    let session = SessionId::new();
    let batch = vec![
        page_view(session, "/"),
        page_view(session, "/courses"),
        booking(session, "select_course"),
        EventRecord::new("newsletter", "engagement", "signup", session).unwrap(),
    ];
    repo.insert_batch(&batch, &client()).await.unwrap();

    let counts = repo.count_by_type().await.unwrap();
    assert_eq!(
        counts,
        vec![
            ("booking".to_string(), 1),
            ("event".to_string(), 1),
            ("page_view".to_string(), 2),
        ]
    );
}

#[tokio::test]
async fn test_list_by_session_orders_by_time_and_filters() {
    let repo = setup().await;
    let session = SessionId::new();
    let other = SessionId::new();
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let batch = vec![
        booking(session, "payment").with_timestamp(base + Duration::minutes(5)),
        page_view(session, "/").with_timestamp(base),
        booking(session, "select_course").with_timestamp(base + Duration::minutes(2)),
        page_view(other, "/contact").with_timestamp(base + Duration::minutes(1)),
    ];
    repo.insert_batch(&batch, &client()).await.unwrap();

    let actions: Vec<String> = repo
        .list_by_session(session)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_data["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, vec!["view", "select_course", "payment"]);

    assert_eq!(repo.list_by_session(other).await.unwrap().len(), 1);
    assert!(repo.list_by_session(SessionId::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_recent_newest_first_with_limit() {
    let repo = setup().await;
    let session = SessionId::new();
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let batch: Vec<EventRecord> = (0..5)
        .map(|i| page_view(session, &format!("/page/{i}")).with_timestamp(base + Duration::hours(i)))
        .collect();
    repo.insert_batch(&batch, &client()).await.unwrap();

    let recent = repo.list_recent(2).await.unwrap();
    let pages: Vec<_> = recent.iter().map(|e| e.page_url.clone().unwrap()).collect();
    assert_eq!(pages, vec!["/page/4", "/page/3"]);
}

#[tokio::test]
async fn test_delete_older_than() {
    let repo = setup().await;
    let session = SessionId::new();
    let now = Utc::now();

    let batch = vec![
        page_view(session, "/old").with_timestamp(now - Duration::days(400)),
        page_view(session, "/stale").with_timestamp(now - Duration::days(91)),
        page_view(session, "/fresh").with_timestamp(now - Duration::days(1)),
    ];
    repo.insert_batch(&batch, &client()).await.unwrap();

    let removed = repo
        .delete_older_than(now - Duration::days(90))
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let remaining = repo.list_by_session(session).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].page_url.as_deref(), Some("/fresh"));
}

// ============================================================================
// Pool
// ============================================================================

#[tokio::test]
async fn test_file_pool_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("analytics.db");
    let session = SessionId::new();

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let repo = AnalyticsEventRepository::new(pool.pool().clone());
        repo.insert_batch(&[page_view(session, "/")], &client())
            .await
            .unwrap();
        pool.close().await;
    }

    // Reopening applies the schema again without touching existing rows
    let pool = DatabasePool::new(&path).await.unwrap();
    let repo = AnalyticsEventRepository::new(pool.pool().clone());
    assert_eq!(repo.list_by_session(session).await.unwrap().len(), 1);
}
