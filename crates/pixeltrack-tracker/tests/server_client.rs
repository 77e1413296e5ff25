//! Integration tests for `ServerClient` using wiremock HTTP mocks.

use pixeltrack_core::{EventId, EventName, Payload, UserData};
use pixeltrack_tracker::{ServerClient, ServerEvent, TrackerError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> ServerClient {
    ServerClient::new(
        &format!("{base_url}/api/conversions"),
        5,
        "pixeltrack-test/0.1",
    )
    .expect("client construction should not fail")
}

fn purchase() -> ServerEvent {
    let custom_data: Payload = serde_json::json!({ "value": 2500, "currency": "BDT" })
        .as_object()
        .cloned()
        .expect("object literal");
    ServerEvent {
        event_name: EventName::Purchase,
        event_id: EventId::new("1700000000000-abc123def-sess0001"),
        test_event_code: Some("TEST42".to_owned()),
        user_data: UserData {
            email: Some("buyer@example.com".to_owned()),
            external_id: Some("ext_0001".to_owned()),
            ..UserData::default()
        },
        custom_data,
    }
}

#[tokio::test]
async fn send_posts_event_and_parses_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/conversions"))
        .and(header("user-agent", "pixeltrack-test/0.1"))
        .and(body_partial_json(serde_json::json!({
            "event_name": "Purchase",
            "event_id": "1700000000000-abc123def-sess0001",
            "test_event_code": "TEST42",
            "user_data": { "email": "buyer@example.com", "external_id": "ext_0001" },
            "custom_data": { "value": 2500, "currency": "BDT" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "deduplication_key": "Purchase_ext_0001",
            "tracking_data": { "match_quality_score": 7.5, "event_validation_score": 10 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = test_client(&server.uri())
        .send(&purchase())
        .await
        .expect("send should succeed");

    assert!(response.success);
    assert_eq!(
        response.deduplication_key.as_deref(),
        Some("Purchase_ext_0001")
    );
    let tracking = response.tracking_data.expect("tracking data");
    assert_eq!(tracking.match_quality_score, Some(7.5));
    assert_eq!(tracking.event_validation_score, Some(10.0));
}

#[tokio::test]
async fn send_returns_unexpected_status_on_500() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .send(&purchase())
        .await
        .expect_err("500 should fail");

    assert!(
        matches!(err, TrackerError::UnexpectedStatus { status: 500, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn send_returns_rejected_when_success_is_false() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "message": "invalid access token"
        })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .send(&purchase())
        .await
        .expect_err("success=false should fail");

    match err {
        TrackerError::Rejected { event_id, reason } => {
            assert_eq!(event_id, "1700000000000-abc123def-sess0001");
            assert_eq!(reason, "invalid access token");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn send_returns_deserialize_error_on_bad_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .send(&purchase())
        .await
        .expect_err("html body should fail");

    assert!(
        matches!(err, TrackerError::Deserialize { .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn send_returns_http_error_when_endpoint_unreachable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = test_client(&uri)
        .send(&purchase())
        .await
        .expect_err("closed port should fail");

    assert!(matches!(err, TrackerError::Http(_)), "got {err:?}");
}
