use std::time::Duration;

use pixeltrack_core::{ContactInfo, ManualClock};
use serde_json::json;

use super::*;
use crate::identity::BrowserIds;
use crate::script::{RecordingScript, ScriptCall};
use crate::storage::{MemoryStore, CLICK_ID_KEY};

const ACCOUNT: &str = "1234567890";

fn payload(v: serde_json::Value) -> Payload {
    v.as_object().cloned().unwrap()
}

fn add_to_cart(product: &str) -> Payload {
    payload(json!({
        "content_ids": [product],
        "content_type": "product",
        "value": 1200,
        "currency": "BDT"
    }))
}

struct Harness {
    tracker: Tracker,
    script: Arc<RecordingScript>,
    store: Arc<MemoryStore>,
    clock: ManualClock,
}

fn harness_with(script: RecordingScript) -> Harness {
    let script = Arc::new(script);
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let tracker = Tracker::builder(script.clone(), store.clone())
        .clock(clock.clone())
        .build();
    Harness {
        tracker,
        script,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(RecordingScript::new())
}

fn bootstrap_options() -> BootstrapOptions {
    BootstrapOptions {
        account_id: ACCOUNT.to_owned(),
        test_event_code: None,
    }
}

#[tokio::test]
async fn invalid_event_is_not_delivered() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());
    let outcome = h
        .tracker
        .track(EventName::Purchase, payload(json!({ "value": 10 })), TrackOptions::default())
        .await;

    assert!(!outcome.validation.valid);
    assert_eq!(outcome.validation.missing, vec!["currency".to_owned()]);
    assert!(outcome.event_id.is_none());
    assert!(!outcome.success());
    assert!(h.script.tracked_ids().is_empty());
    assert_eq!(h.tracker.ledger_len(), 0);
}

#[tokio::test]
async fn custom_event_is_always_valid() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());
    let outcome = h
        .tracker
        .track(EventName::from("SpinTheWheel"), Payload::new(), TrackOptions::default())
        .await;
    assert!(outcome.validation.valid);
    assert_eq!(outcome.client, ClientDelivery::Sent);
    assert!(outcome.success());
}

#[tokio::test]
async fn duplicate_reuses_event_id_and_skips_client() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());

    let first = h
        .tracker
        .track(EventName::AddToCart, add_to_cart("p-1"), TrackOptions::default())
        .await;
    h.clock.advance_ms(2_000);
    let second = h
        .tracker
        .track(EventName::AddToCart, add_to_cart("p-1"), TrackOptions::default())
        .await;

    assert_eq!(first.client, ClientDelivery::Sent);
    assert!(second.duplicate);
    assert_eq!(second.client, ClientDelivery::Skipped);
    assert_eq!(first.event_id, second.event_id);
    assert_eq!(first.dedup_key, second.dedup_key);
    assert_eq!(h.script.tracked_ids().len(), 1);
}

#[tokio::test]
async fn no_server_configured_reports_server_disabled() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());
    let outcome = h
        .tracker
        .track(EventName::PageView, Payload::new(), TrackOptions::default())
        .await;
    assert_eq!(outcome.server, ServerDelivery::Disabled);
}

#[tokio::test]
async fn events_before_bootstrap_are_queued_and_flushed_in_order() {
    let h = harness();
    let mut ids = Vec::new();
    for product in ["p-1", "p-2", "p-3"] {
        h.clock.advance_ms(30_000);
        let outcome = h
            .tracker
            .track(EventName::AddToCart, add_to_cart(product), TrackOptions::client_only())
            .await;
        assert!(matches!(outcome.client, ClientDelivery::Queued { .. }));
        assert!(outcome.success());
        ids.push(outcome.event_id.unwrap());
    }
    assert_eq!(h.tracker.pending_events().len(), 3);

    let status = h.tracker.bootstrap(&bootstrap_options());

    assert_eq!(status, BootstrapStatus::Initialized { flushed: 3 });
    assert_eq!(h.script.tracked_ids(), ids);
    assert!(h.tracker.pending_events().is_empty());
    assert_eq!(h.tracker.queue_stats().delivered, 3);
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let h = harness();
    let first = h.tracker.bootstrap(&bootstrap_options());
    let second = h.tracker.bootstrap(&bootstrap_options());

    assert_eq!(first, BootstrapStatus::Initialized { flushed: 0 });
    assert_eq!(second, BootstrapStatus::AlreadyInitialized);
    assert_eq!(h.script.injections(), 1);
    let inits = h
        .script
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ScriptCall::Init { .. }))
        .count();
    assert_eq!(inits, 1);
}

#[tokio::test]
async fn bootstrap_sets_test_event_code_and_matching() {
    let h = harness();
    h.tracker.set_browser_ids(BrowserIds {
        fbp: Some("fb.1.1.abc".to_owned()),
        fbc: None,
    });
    h.tracker.bootstrap(&BootstrapOptions {
        account_id: ACCOUNT.to_owned(),
        test_event_code: Some("TEST123".to_owned()),
    });

    let calls = h.script.calls();
    let ScriptCall::Init {
        account_id,
        matching,
    } = &calls[0]
    else {
        panic!("expected init first, got {calls:?}");
    };
    assert_eq!(account_id, ACCOUNT);
    assert_eq!(matching.fbp.as_deref(), Some("fb.1.1.abc"));
    assert!(matching.external_id.as_deref().unwrap().starts_with("ext_"));
    assert_eq!(
        calls[1],
        ScriptCall::Set {
            key: "test_event_code".to_owned(),
            value: "TEST123".to_owned()
        }
    );
}

#[tokio::test]
async fn refresh_user_matching_reinitializes_without_injecting() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());

    let matching = h.tracker.refresh_user_matching(&ContactInfo {
        email: Some(" Buyer@Example.com ".to_owned()),
        phone: Some("+880 1712-345678".to_owned()),
        ..ContactInfo::default()
    });

    assert_eq!(matching.email.as_deref(), Some("buyer@example.com"));
    assert_eq!(matching.phone.as_deref(), Some("8801712345678"));
    assert_eq!(h.script.injections(), 1);
    let last = h.script.calls().pop().unwrap();
    assert!(matches!(last, ScriptCall::Init { matching: m, .. } if m == matching));
    assert_eq!(
        h.tracker.user_data().email.as_deref(),
        Some("buyer@example.com")
    );
}

#[tokio::test]
async fn refresh_before_bootstrap_only_persists() {
    let h = harness();
    h.tracker.refresh_user_matching(&ContactInfo {
        first_name: Some("Karim".to_owned()),
        ..ContactInfo::default()
    });
    assert!(h.script.calls().is_empty());

    h.tracker.bootstrap(&bootstrap_options());
    let calls = h.script.calls();
    let ScriptCall::Init { matching, .. } = &calls[0] else {
        panic!("expected init");
    };
    assert_eq!(matching.first_name.as_deref(), Some("karim"));
}

#[tokio::test]
async fn forced_page_view_honours_durable_lock() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());

    let first = h.tracker.force_page_view("/checkout", Payload::new()).await;
    assert!(first.is_some_and(|o| o.client == ClientDelivery::Sent));

    h.clock.advance_ms(10_000);
    assert!(h.tracker.force_page_view("/checkout", Payload::new()).await.is_none());
    // Different path is not locked, and the in-memory any-page window is bypassed.
    assert!(h.tracker.force_page_view("/thank-you", Payload::new()).await.is_some());

    h.clock.advance_ms(21_000);
    assert!(h.tracker.force_page_view("/checkout", Payload::new()).await.is_some());
    assert_eq!(h.script.tracked_ids().len(), 3);
}

#[tokio::test]
async fn forced_page_view_lock_survives_a_new_tracker() {
    let h = harness();
    h.tracker.bootstrap(&bootstrap_options());
    h.tracker.force_page_view("/", Payload::new()).await;

    let reloaded = Tracker::builder(Arc::new(RecordingScript::new()), h.store.clone())
        .clock(h.clock.clone())
        .build();
    assert!(reloaded.force_page_view("/", Payload::new()).await.is_none());
}

#[test]
fn seed_from_url_persists_contact_and_click_id() {
    let h = harness();
    let seed = h.tracker.seed_from_url(
        "https://shop.example/landing?email=Buyer%40Example.com&phone=01712-345678&fbclid=IwAR0xyz",
    );

    assert_eq!(seed.email.as_deref(), Some("buyer@example.com"));
    assert_eq!(seed.phone.as_deref(), Some("01712345678"));
    assert_eq!(
        seed.click_id.as_deref(),
        Some("fb.1.1700000000000.IwAR0xyz")
    );
    let data = h.tracker.user_data();
    assert_eq!(data.email.as_deref(), Some("buyer@example.com"));
    assert_eq!(data.fbc.as_deref(), Some("fb.1.1700000000000.IwAR0xyz"));
}

#[test]
fn seed_from_url_keeps_existing_click_id() {
    let h = harness();
    h.store.set(CLICK_ID_KEY, "fb.1.1.first").unwrap();
    let seed = h.tracker.seed_from_url("https://shop.example/?fbclid=second");
    assert!(seed.click_id.is_none());
    assert_eq!(h.store.get(CLICK_ID_KEY).as_deref(), Some("fb.1.1.first"));
}

#[test]
fn seed_from_bad_url_is_ignored() {
    let h = harness();
    assert!(h.tracker.seed_from_url("not a url").is_empty());
}

#[test]
fn browser_click_cookie_wins_over_stored_click_id() {
    let h = harness();
    h.store.set(CLICK_ID_KEY, "fb.1.1.stored").unwrap();
    assert_eq!(h.tracker.user_data().fbc.as_deref(), Some("fb.1.1.stored"));
    h.tracker.set_browser_ids(BrowserIds {
        fbp: None,
        fbc: Some("fb.1.2.cookie".to_owned()),
    });
    assert_eq!(h.tracker.user_data().fbc.as_deref(), Some("fb.1.2.cookie"));
}

#[tokio::test(start_paused = true)]
async fn queued_event_is_delivered_once_script_becomes_ready() {
    let h = harness_with(RecordingScript::slow_loading());
    assert_eq!(
        h.tracker.bootstrap(&bootstrap_options()),
        BootstrapStatus::Initialized { flushed: 0 }
    );

    let outcome = h
        .tracker
        .track(EventName::ViewContent, payload(json!({ "content_ids": ["p-1"], "content_type": "product" })), TrackOptions::client_only())
        .await;
    assert!(matches!(outcome.client, ClientDelivery::Queued { .. }));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(h.script.tracked_ids().is_empty());

    h.script.set_ready(true);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(h.script.tracked_ids(), vec![outcome.event_id.unwrap()]);
    assert!(h.tracker.pending_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queued_event_is_exhausted_when_script_never_loads() {
    let h = harness_with(RecordingScript::slow_loading());
    h.tracker.bootstrap(&bootstrap_options());

    h.tracker
        .track(EventName::PageView, Payload::new(), TrackOptions::client_only())
        .await;
    tokio::time::sleep(RetrySchedule::default().total() + Duration::from_millis(50)).await;

    assert!(h.tracker.pending_events().is_empty());
    let stats = h.tracker.queue_stats();
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.delivered, 0);
    assert!(h.script.tracked_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_ticks_are_counted_per_event() {
    let h = harness_with(RecordingScript::slow_loading());
    h.tracker.bootstrap(&bootstrap_options());
    h.tracker
        .track(EventName::PageView, Payload::new(), TrackOptions::client_only())
        .await;

    // 100 + 250 + 500 ms have elapsed after 900 ms: three ticks.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(h.tracker.pending_events()[0].attempts, 3);
}
