// Integration tests for the hub + rules engine pipeline
//
// Modules are simulated with closure listeners; everything goes through the
// public API only.

use pulse::event::{event_source, Event, EventSource, EventType};
use pulse::hub::{EventHub, HubConfig, ResponseOutcome};
use pulse::rules::{RulesConfig, RulesEngine};
use pulse::variant::{Variant, VariantMap};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn map(value: serde_json::Value) -> VariantMap {
    Variant::from(value).get_map().unwrap().clone()
}

fn collect(hub: &EventHub, event_type: &str, source: &str) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hub.register_listener(
        EventType::get(event_type).unwrap(),
        EventSource::get(source).unwrap(),
        move |e: &Event| sink.lock().unwrap().push(e.clone()),
    );
    seen
}

async fn wait_for(seen: &Arc<Mutex<Vec<Event>>>, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("expected events did not arrive");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rule_consequence_reaches_subscribed_module() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let engine = RulesEngine::register(hub.clone(), RulesConfig::default());
    engine
        .load_rules(&Variant::from(json!({
            "version": 3,
            "rules": [{
                "scope": {"type": "com.example.lifecycle", "source": "com.example.requestcontent"},
                "condition": {"type": "group", "definition": {"logic": "or", "conditions": [
                    {"type": "matcher", "definition": {"key": "action", "matcher": "eq", "values": ["start"]}},
                    {"type": "matcher", "definition": {"key": "action", "matcher": "eq", "values": ["resume"]}}
                ]}},
                "consequences": [{
                    "id": "track-launch",
                    "type": "dispatch",
                    "name": "Launch Tracked",
                    "eventType": "com.example.analytics",
                    "detail": {"event": "launch", "via": "%action%", "at": "%~timestampms%"}
                }]
            }]
        })))
        .unwrap();

    let analytics = collect(&hub, "com.example.analytics", event_source::RULES_RESPONSE);

    for action in ["pause", "resume", "start"] {
        hub.dispatch(
            Event::builder("Lifecycle", "com.example.lifecycle", "com.example.requestcontent")
                .insert("action", action)
                .timestamp_ms(1_000)
                .build()
                .unwrap(),
        )
        .unwrap();
    }

    wait_for(&analytics, 2).await;
    let seen = analytics.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].name(), "Launch Tracked");
    assert_eq!(
        seen[0].data(),
        &map(json!({"event": "launch", "via": "resume", "at": "1000"}))
    );
    assert_eq!(seen[1].data().get("via"), Some(&Variant::from("start")));
    assert_eq!(engine.status().document_version, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rules_gate_on_shared_state() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let engine = RulesEngine::register(hub.clone(), RulesConfig::default());
    engine
        .load_rules(&Variant::from(json!([{
            "scope": {"type": "com.example.analytics"},
            "condition": {"type": "matcher", "definition": {
                "key": "~state.consent/collect", "matcher": "eq", "values": [true]
            }},
            "consequences": [{"name": "Forward", "detail": {"page": "%page%"}}]
        }])))
        .unwrap();

    let forwarded = collect(&hub, "pulse.eventtype.rulesengine", event_source::RULES_RESPONSE);
    let page = |name: &str| {
        Event::builder("Page View", "com.example.analytics", "com.example.requestcontent")
            .insert("page", name)
            .build()
            .unwrap()
    };

    hub.dispatch(page("before")).unwrap();
    // let the engine evaluate "before" while consent is still unset
    tokio::time::sleep(Duration::from_millis(100)).await;
    hub.set_shared_state("consent", map(json!({"collect": true})))
        .unwrap();
    hub.dispatch(page("after")).unwrap();

    wait_for(&forwarded, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = forwarded.lock().unwrap();
    let pages: Vec<&Variant> = seen.iter().filter_map(|e| e.data().get("page")).collect();
    assert_eq!(pages, vec![&Variant::from("after")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_answered_by_another_module() {
    let hub = EventHub::start(HubConfig::default()).unwrap();

    // Identity module answers identity requests
    let responder = hub.clone();
    hub.register_listener(
        EventType::get("com.example.identity").unwrap(),
        EventSource::get(event_source::REQUEST_CONTENT).unwrap(),
        move |request: &Event| {
            let response = Event::builder(
                "Identity Response",
                "com.example.identity",
                event_source::RESPONSE_CONTENT,
            )
            .insert("mid", "m-42")
            .in_response_to(request)
            .build()
            .unwrap();
            responder.dispatch(response).unwrap();
        },
    );

    let request = Event::builder("Get Ids", "com.example.identity", event_source::REQUEST_CONTENT)
        .build()
        .unwrap();
    let response = hub
        .request(request, Duration::from_secs(2))
        .await
        .unwrap()
        .expect("identity module should answer");

    assert!(response.is_response());
    assert_eq!(response.data().get("mid"), Some(&Variant::from("m-42")));
    assert_eq!(hub.metrics().paired_responses, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unanswered_paired_dispatch_times_out_once() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);

    let request = Event::builder("Get Config", "com.example.configuration", "com.example.requestcontent")
        .build()
        .unwrap();
    let late = Event::builder("Late", "com.example.configuration", "com.example.responsecontent")
        .in_response_to(&request)
        .build()
        .unwrap();

    hub.dispatch_paired(request, Duration::from_millis(50), move |outcome| {
        sink.lock()
            .unwrap()
            .push(matches!(outcome, ResponseOutcome::TimedOut));
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    hub.dispatch(late).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*outcomes.lock().unwrap(), vec![true]);
    assert_eq!(hub.metrics().paired_timeouts, 1);
}
