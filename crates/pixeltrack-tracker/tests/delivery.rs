//! End-to-end delivery tests: a `Tracker` wired to a recording script and a
//! wiremock conversions endpoint.

use std::sync::Arc;

use pixeltrack_core::{EventName, ManualClock, Payload};
use pixeltrack_tracker::{
    BootstrapOptions, ClientDelivery, MemoryStore, RecordingScript, ServerClient, ServerDelivery,
    TrackOptions, Tracker,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload(v: Value) -> Payload {
    v.as_object().cloned().expect("object literal")
}

fn add_to_cart() -> Payload {
    add_to_cart_for("sku-77")
}

fn add_to_cart_for(product: &str) -> Payload {
    payload(json!({
        "content_ids": [product],
        "content_type": "product",
        "value": 1450,
        "currency": "BDT",
        "num_items": 1
    }))
}

fn ok_body() -> Value {
    json!({ "success": true, "tracking_data": { "match_quality_score": 6.0 } })
}

struct Setup {
    tracker: Tracker,
    script: Arc<RecordingScript>,
    clock: ManualClock,
}

fn setup(server: &MockServer, test_event_code: Option<&str>) -> Setup {
    let script = Arc::new(RecordingScript::new());
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let client = ServerClient::new(
        &format!("{}/api/conversions", server.uri()),
        5,
        "pixeltrack-test/0.1",
    )
    .expect("client construction should not fail");
    let tracker = Tracker::builder(script.clone(), Arc::new(MemoryStore::new()))
        .server(client)
        .clock(clock.clone())
        .test_event_code(test_event_code.map(ToOwned::to_owned))
        .build();
    tracker.bootstrap(&BootstrapOptions {
        account_id: "1234567890".to_owned(),
        test_event_code: None,
    });
    Setup {
        tracker,
        script,
        clock,
    }
}

async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .map(|r| serde_json::from_slice(&r.body).expect("json body"))
        .collect()
}

#[tokio::test]
async fn both_channels_share_one_event_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server, Some("TEST42"));
    s.tracker.set_page_url("https://shop.example/products/sku-77?utm_source=fb");

    let outcome = s
        .tracker
        .track(EventName::AddToCart, add_to_cart(), TrackOptions::default())
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.client, ClientDelivery::Sent);
    assert!(matches!(outcome.server, ServerDelivery::Delivered { .. }));

    let event_id = outcome.event_id.expect("event id");
    assert_eq!(s.script.tracked_ids(), vec![event_id.clone()]);

    let bodies = received_bodies(&server).await;
    let body = &bodies[0];
    assert_eq!(body["event_name"], "AddToCart");
    assert_eq!(body["event_id"], event_id.as_str());
    assert_eq!(body["test_event_code"], "TEST42");
    assert!(body["user_data"]["external_id"]
        .as_str()
        .is_some_and(|id| id.starts_with("ext_")));
    assert_eq!(
        body["custom_data"]["contents"],
        json!([{ "id": "sku-77", "quantity": 1, "item_price": 1450 }])
    );
    assert_eq!(
        body["custom_data"]["event_source_url"],
        "https://shop.example/products/sku-77?utm_source=fb"
    );
}

#[tokio::test]
async fn duplicate_retries_server_until_confirmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let s = setup(&server, None);

    let first = s
        .tracker
        .track(EventName::AddToCart, add_to_cart(), TrackOptions::default())
        .await;
    assert_eq!(first.client, ClientDelivery::Sent);
    assert!(matches!(first.server, ServerDelivery::Failed { .. }));
    assert!(first.success(), "client channel alone counts as success");

    s.clock.advance_ms(1_000);
    let second = s
        .tracker
        .track(EventName::AddToCart, add_to_cart(), TrackOptions::default())
        .await;
    assert!(second.duplicate);
    assert_eq!(second.client, ClientDelivery::Skipped);
    assert!(matches!(second.server, ServerDelivery::Delivered { .. }));
    assert_eq!(second.event_id, first.event_id);

    s.clock.advance_ms(1_000);
    let third = s
        .tracker
        .track(EventName::AddToCart, add_to_cart(), TrackOptions::default())
        .await;
    assert!(third.duplicate);
    assert_eq!(third.server, ServerDelivery::Skipped);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["event_id"], bodies[1]["event_id"]);
    assert_eq!(s.script.tracked_ids().len(), 1);
}

#[tokio::test]
async fn guard_suppressed_add_to_cart_sends_no_server_copy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server, None);

    let first = s
        .tracker
        .track(EventName::AddToCart, add_to_cart_for("sku-1"), TrackOptions::default())
        .await;
    assert!(matches!(first.server, ServerDelivery::Delivered { .. }));

    s.clock.advance_ms(3_000);
    let other = s
        .tracker
        .track(EventName::AddToCart, add_to_cart_for("sku-2"), TrackOptions::default())
        .await;
    assert!(other.duplicate);
    assert_eq!(other.client, ClientDelivery::Skipped);
    assert_eq!(other.server, ServerDelivery::Skipped);
    assert_ne!(other.event_id, first.event_id);

    assert_eq!(received_bodies(&server).await.len(), 1);
    assert_eq!(s.script.tracked_ids().len(), 1);
}

#[tokio::test]
async fn failed_server_does_not_block_client_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "pixel disabled"
        })))
        .mount(&server)
        .await;

    let s = setup(&server, None);
    let outcome = s
        .tracker
        .track(EventName::from("QuizCompleted"), Payload::new(), TrackOptions::default())
        .await;

    assert_eq!(outcome.client, ClientDelivery::Sent);
    match &outcome.server {
        ServerDelivery::Failed { reason } => assert!(reason.contains("pixel disabled"), "{reason}"),
        other => panic!("expected failed server delivery, got {other:?}"),
    }
    assert!(outcome.success());
}

#[tokio::test]
async fn server_only_call_leaves_script_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let s = setup(&server, None);
    let outcome = s
        .tracker
        .track(
            EventName::Purchase,
            payload(json!({ "value": 2500, "currency": "BDT", "order_id": "ord-1" })),
            TrackOptions::server_only(),
        )
        .await;

    assert_eq!(outcome.client, ClientDelivery::Disabled);
    assert!(matches!(outcome.server, ServerDelivery::Delivered { .. }));
    assert!(s.script.tracked_ids().is_empty());
}

#[tokio::test]
async fn invalid_event_never_reaches_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .expect(0)
        .mount(&server)
        .await;

    let s = setup(&server, None);
    let outcome = s
        .tracker
        .track(
            EventName::Purchase,
            payload(json!({ "value": 2500 })),
            TrackOptions::default(),
        )
        .await;

    assert!(!outcome.validation.valid);
    assert!(outcome.validation.score < 10.0);
    assert_eq!(outcome.server, ServerDelivery::Disabled);
}
