//! End-to-end tests for analytics ingestion and the session lifecycle
//!
//! Covers idempotent session start, the no-op semantics of stale session
//! ends, the running-average fold, and the admin wipe.

mod common;

use common::{TestClient, TestServer, FREE_BOOK_ID, TEST_EMAIL};
use reqwest::StatusCode;
use serde_json::json;
use storynest_server::user::UserAccountStore;

fn story_event(time_on_page: f64) -> serde_json::Value {
    json!({
        "book_id": FREE_BOOK_ID,
        "page_number": 3,
        "page_type": "story",
        "navigation_source": "spread_nav",
        "time_on_page": time_on_page,
        "actual_engagement_time": time_on_page / 2.0,
        "interactions": ["tap", "tap"],
    })
}

#[tokio::test]
async fn test_session_start_is_idempotent() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.start_session(FREE_BOOK_ID).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    let first_id = body["session_id"].as_str().unwrap().to_string();

    // Starting again without ending returns the same session id
    let response = client.start_session(FREE_BOOK_ID).await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["session_id"].as_str().unwrap(), first_id);
}

#[tokio::test]
async fn test_session_end_folds_into_profile() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.start_session(FREE_BOOK_ID).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();

    let response = client
        .end_session(
            &session_id,
            json!({ "total_duration": 300, "interactions_count": 12, "final_progress": 40.0 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ended"], true);

    let response = client.get_analytics_summary().await;
    let body: serde_json::Value = response.json().await.unwrap();
    let analytics = &body["analytics"];
    assert_eq!(analytics["total_sessions"], 1);
    assert_eq!(analytics["total_reading_time"], 300.0);
    assert_eq!(analytics["average_session_duration"], 300.0);
    assert_eq!(analytics["completion_rate"], 40.0);
}

#[tokio::test]
async fn test_ending_foreign_or_stale_session_is_noop() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client
        .end_session("no-such-session", json!({ "total_duration": 10 }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ended"], false);

    // Ending twice: the second call is a no-op as well
    let response = client.start_session(FREE_BOOK_ID).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let session_id = body["session_id"].as_str().unwrap().to_string();

    client
        .end_session(&session_id, json!({ "total_duration": 100 }))
        .await;
    let response = client
        .end_session(&session_id, json!({ "total_duration": 100 }))
        .await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ended"], false);

    let response = client.get_analytics_summary().await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["analytics"]["total_sessions"], 1);
}

#[tokio::test]
async fn test_track_enhanced_running_average() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    client.track_enhanced(story_event(10.0)).await;
    client.track_enhanced(story_event(20.0)).await;
    let response = client.track_enhanced(story_event(30.0)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let story = &body["analytics_summary"]["page_type_analytics"]["story"];
    assert_eq!(story["pages_visited"], 3);
    assert_eq!(story["avg_time_on_page"], 20.0);
    assert_eq!(body["analytics_summary"]["pages_read"], 3);
}

#[tokio::test]
async fn test_track_enhanced_cue_engagement() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let mut event = story_event(15.0);
    event["page_type"] = json!("cue");
    event["cue_interactions"] = json!([
        { "cue_name": "owl-hoot", "time_before_click": 12.0, "completed": true },
        { "cue_name": "frog-croak", "time_before_click": 24.0, "completed": false },
    ]);
    let response = client.track_enhanced(event).await;
    let body: serde_json::Value = response.json().await.unwrap();

    let cues = &body["analytics_summary"]["cue_engagement"];
    assert_eq!(cues["encountered"], 2);
    assert_eq!(cues["completed"], 1);
    assert_eq!(cues["completion_rate"], 50.0);
    assert_eq!(cues["avg_time_before_click"], 18.0);
    assert_eq!(body["analytics_summary"]["engagement_score"], 80.0);
}

#[tokio::test]
async fn test_track_enhanced_user_mismatch_forbidden() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let mut event = story_event(10.0);
    event["user_id"] = json!(99999);
    let response = client.track_enhanced(event).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_track_enhanced_requires_session() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.track_enhanced(story_event(10.0)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_summary_is_null_before_first_touch() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.get_analytics_summary().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["analytics"].is_null());
}

#[tokio::test]
async fn test_generate_token_initializes_profile() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    let response = client.generate_token(FREE_BOOK_ID).await;
    assert_eq!(response.status(), StatusCode::OK);

    // First-touch initialization: an empty profile now exists
    let response = client.get_analytics_summary().await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["analytics"]["total_sessions"], 0);
    assert_eq!(body["analytics"]["pages_read"], 0);
}

#[tokio::test]
async fn test_admin_wipe() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    client.track_enhanced(story_event(10.0)).await;

    let user = server
        .user_store
        .get_user_by_email(TEST_EMAIL)
        .unwrap()
        .unwrap();

    // A regular user cannot wipe analytics, not even their own
    let response = client.admin_reset_analytics(user.id).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = TestClient::authenticated_admin(server.base_url.clone()).await;
    let response = admin.admin_reset_analytics(user.id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["deleted"], true);

    let response = client.get_analytics_summary().await;
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["analytics"].is_null());
}

#[tokio::test]
async fn test_progress_sync_updates_active_session_in_place() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone()).await;

    // Open a session, then sync progress through the reader endpoints
    let response = client.start_session(FREE_BOOK_ID).await;
    let session_body: serde_json::Value = response.json().await.unwrap();
    let session_id = session_body["session_id"].as_str().unwrap().to_string();

    let response = client.generate_token(FREE_BOOK_ID).await;
    let body: serde_json::Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();

    let reader = TestClient::new(server.base_url.clone());
    for (time, page) in [(30u64, 4u32), (45, 5)] {
        reader
            .update_progress(json!({
                "token": token,
                "book_id": FREE_BOOK_ID,
                "progress": 20.0,
                "current_page": page,
                "current_chapter": 1,
                "time_spent": time,
            }))
            .await;
    }

    use storynest_server::analytics::AnalyticsStore;
    let session = server
        .analytics_store
        .get_session(&session_id)
        .unwrap()
        .unwrap();
    assert_eq!(session.total_duration, 75);
    assert_eq!(session.pages_visited, vec![4, 5]);
    assert!(session.is_active());
}
