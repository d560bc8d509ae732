//! Integration tests for the Google Calendar client using wiremock
//!
//! Verify OAuth and Calendar API behavior against a mock HTTP server,
//! including error classification for the statuses Google actually returns.

use application::ports::{NewRemoteEvent, ProviderError, ProviderPort};
use chrono::{Duration, Utc};
use integration_google::{GoogleCalendarClient, GoogleConfig};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Create a test client routed entirely at the mock server
///
/// # Panics
///
/// Panics if the client cannot be created (should not happen in tests).
fn create_test_client(mock_server: &MockServer) -> GoogleCalendarClient {
    let config: GoogleConfig = serde_json::from_value(serde_json::json!({
        "client_id": "test-client",
        "client_secret": "test-secret",
        "redirect_uri": "https://app.example.com/oauth/google",
        "token_url": format!("{}/token", mock_server.uri()),
        "api_base_url": mock_server.uri(),
        "userinfo_url": format!("{}/userinfo", mock_server.uri()),
        "timeout_secs": 5,
    }))
    .expect("config should deserialize");
    #[allow(clippy::expect_used)]
    GoogleCalendarClient::new(config).expect("Failed to create client")
}

fn sample_event(id: &str, summary: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "status": "confirmed",
        "summary": summary,
        "description": "bring ID",
        "location": "Title office",
        "start": { "dateTime": "2026-09-01T15:00:00Z" },
        "end": { "dateTime": "2026-09-01T16:00:00Z" }
    })
}

// ============================================================================
// OAuth flows
// ============================================================================

#[tokio::test]
async fn exchange_code_returns_grant() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let grant = client.exchange_code("auth-code-1").await.unwrap();

    assert_eq!(grant.access_token, "at-1");
    assert_eq!(grant.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(grant.expires_in_secs, 3599);
}

#[tokio::test]
async fn refresh_without_rotation_omits_refresh_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-2",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let grant = client.refresh_token("rt-1").await.unwrap();

    assert_eq!(grant.access_token, "at-2");
    assert!(grant.refresh_token.is_none());
}

#[tokio::test]
async fn revoked_grant_is_credential_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client.refresh_token("rt-revoked").await.unwrap_err();

    assert!(err.is_credential(), "expected credential error, got {err:?}");
}

#[tokio::test]
async fn token_endpoint_outage_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let err = client.exchange_code("code").await.unwrap_err();

    assert!(err.is_transient());
}

// ============================================================================
// Event listing
// ============================================================================

#[tokio::test]
async fn list_events_maps_fields_and_skips_cancelled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                sample_event("ext-1", "Closing"),
                {
                    "id": "ext-2",
                    "status": "cancelled"
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let now = Utc::now();
    let events = client
        .list_events("at-1", now - Duration::days(7), now + Duration::days(7))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].external_id, "ext-1");
    assert_eq!(events[0].title, "Closing");
    assert_eq!(events[0].location.as_deref(), Some("Title office"));
    assert_eq!(events[0].start_time.to_rfc3339(), "2026-09-01T15:00:00+00:00");
}

#[tokio::test]
async fn list_events_follows_pagination() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [sample_event("ext-2", "Inspection")]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [sample_event("ext-1", "Closing")],
            "nextPageToken": "page-2"
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let now = Utc::now();
    let events = client
        .list_events("at-1", now, now + Duration::days(30))
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].external_id, "ext-1");
    assert_eq!(events[1].external_id, "ext-2");
}

#[tokio::test]
async fn expired_token_on_list_is_credential_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let now = Utc::now();
    let err = client
        .list_events("stale", now, now + Duration::days(1))
        .await
        .unwrap_err();

    assert!(err.is_credential());
}

#[tokio::test]
async fn throttled_list_is_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let now = Utc::now();
    let err = client
        .list_events("at-1", now, now + Duration::days(1))
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited));
}

// ============================================================================
// Event writes
// ============================================================================

#[tokio::test]
async fn create_event_returns_provider_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(header("authorization", "Bearer at-1"))
        .and(body_string_contains("\"summary\":\"Closing\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "id": "ext-new", "status": "confirmed" })),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let start = Utc::now() + Duration::days(7);
    let payload = NewRemoteEvent {
        title: "Closing".to_string(),
        description: None,
        start_time: start,
        end_time: start + Duration::hours(1),
        location: None,
    };

    let id = client.create_event("at-1", &payload).await.unwrap();
    assert_eq!(id, "ext-new");
}

#[tokio::test]
async fn update_of_vanished_event_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/calendars/primary/events/ext-gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let start = Utc::now();
    let payload = NewRemoteEvent {
        title: "Moved".to_string(),
        description: None,
        start_time: start,
        end_time: start + Duration::hours(1),
        location: None,
    };

    let err = client
        .update_event("at-1", "ext-gone", &payload)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::EventNotFound(_)));
}

#[tokio::test]
async fn delete_of_vanished_event_succeeds() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/ext-gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    assert!(client.delete_event("at-1", "ext-gone").await.is_ok());
}

#[tokio::test]
async fn delete_success_is_ok() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/ext-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    assert!(client.delete_event("at-1", "ext-1").await.is_ok());
}

// ============================================================================
// Account identity
// ============================================================================

#[tokio::test]
async fn account_identity_reads_userinfo() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "email": "agent@example.com",
            "name": "Agent Example"
        })))
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server);
    let identity = client.account_identity("at-1").await.unwrap();

    assert_eq!(identity.account_id, "agent@example.com");
    assert_eq!(identity.display_name.as_deref(), Some("Agent Example"));
}
