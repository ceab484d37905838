use super::*;
use crate::variant::Variant;
use std::sync::atomic::AtomicUsize;
use std::sync::{Condvar, Mutex};

fn et(name: &str) -> EventType {
    EventType::get(name).unwrap()
}

fn es(name: &str) -> EventSource {
    EventSource::get(name).unwrap()
}

fn event(name: &str, event_type: &str, source: &str) -> Event {
    Event::builder(name, event_type, source).build().unwrap()
}

/// Listener that records event names
fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Listener) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = move |e: &Event| sink.lock().unwrap().push(e.name().to_string());
    (seen, listener)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_producer_order_is_preserved() {
    for n in [0usize, 1, 250] {
        let hub = EventHub::start(HubConfig::default()).unwrap();
        let (seen, listener) = recorder();
        hub.register_listener(et("order.test"), es("producer"), listener);

        for i in 0..n {
            hub.dispatch(event(&format!("e{}", i), "order.test", "producer"))
                .unwrap();
        }
        // Marker on another route: once the hub has processed it, all prior events were handed off
        let (marker_seen, marker) = recorder();
        hub.register_listener(et("order.marker"), es("producer"), marker);
        hub.dispatch(event("done", "order.marker", "producer")).unwrap();
        wait_until(|| marker_seen.lock().unwrap().len() == 1).await;
        wait_until(|| seen.lock().unwrap().len() == n).await;

        let expected: Vec<String> = (0..n).map(|i| format!("e{}", i)).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
        hub.shutdown();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_routing_by_type_and_source() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (exact, exact_listener) = recorder();
    let (any_source, any_source_listener) = recorder();
    let (everything, everything_listener) = recorder();

    hub.register_listener(et("routing"), es("alpha"), exact_listener);
    hub.register_listener(et("routing"), EventSource::wildcard(), any_source_listener);
    hub.register_listener(EventType::wildcard(), EventSource::wildcard(), everything_listener);

    hub.dispatch(event("a", "routing", "alpha")).unwrap();
    hub.dispatch(event("b", "routing", "beta")).unwrap();
    hub.dispatch(event("c", "other", "alpha")).unwrap();

    wait_until(|| everything.lock().unwrap().len() == 3).await;
    wait_until(|| any_source.lock().unwrap().len() == 2).await;

    assert_eq!(*exact.lock().unwrap(), vec!["a"]);
    assert_eq!(*any_source.lock().unwrap(), vec!["a", "b"]);
    assert_eq!(*everything.lock().unwrap(), vec!["a", "b", "c"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_route_names_are_case_insensitive() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (seen, listener) = recorder();
    hub.register_listener(et("Identity"), es("Request.Content"), listener);

    hub.dispatch(event("id", "IDENTITY", "request.content")).unwrap();
    wait_until(|| seen.lock().unwrap().len() == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_share_one_order() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (first, first_listener) = recorder();
    let (second, second_listener) = recorder();
    hub.register_listener(et("concurrent"), EventSource::wildcard(), first_listener);
    hub.register_listener(et("concurrent"), EventSource::wildcard(), second_listener);

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let hub = hub.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    let name = format!("p{}-{}", p, i);
                    hub.dispatch(event(&name, "concurrent", &format!("producer{}", p)))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    wait_until(|| first.lock().unwrap().len() == 400).await;
    wait_until(|| second.lock().unwrap().len() == 400).await;

    let first = first.lock().unwrap().clone();
    assert_eq!(first, *second.lock().unwrap());

    // Each producer's events keep their relative order
    for p in 0..4 {
        let prefix = format!("p{}-", p);
        let mine: Vec<usize> = first
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(mine, (0..100).collect::<Vec<_>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unregistered_listener_stops_receiving() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (seen, listener) = recorder();
    let (all, all_listener) = recorder();
    let id = hub.register_listener(et("unreg"), es("s"), listener);
    hub.register_listener(et("unreg"), es("s"), all_listener);
    assert_eq!(hub.listener_count(), 2);

    hub.dispatch(event("before", "unreg", "s")).unwrap();
    wait_until(|| seen.lock().unwrap().len() == 1).await;

    assert!(hub.unregister_listener(id));
    assert!(!hub.unregister_listener(id));
    assert_eq!(hub.listener_count(), 1);

    hub.dispatch(event("after", "unreg", "s")).unwrap();
    wait_until(|| all.lock().unwrap().len() == 2).await;
    assert_eq!(*seen.lock().unwrap(), vec!["before"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listener_can_publish_from_callback() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (follow_ups, follow_up_listener) = recorder();

    let republisher = hub.clone();
    hub.register_listener(et("reentrant"), es("first"), move |e: &Event| {
        let next = Event::builder(format!("{}-echo", e.name()), "reentrant", "second")
            .build()
            .unwrap();
        republisher.dispatch(next).unwrap();
    });
    hub.register_listener(et("reentrant"), es("second"), follow_up_listener);

    hub.dispatch(event("ping", "reentrant", "first")).unwrap();
    wait_until(|| follow_ups.lock().unwrap().len() == 1).await;
    assert_eq!(*follow_ups.lock().unwrap(), vec!["ping-echo"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paired_request_receives_response() {
    let hub = EventHub::start(HubConfig::default()).unwrap();

    let responder = hub.clone();
    hub.register_listener(et("identity"), es("request.content"), move |request: &Event| {
        let response = Event::builder("identity response", "identity", "response.content")
            .insert("id", "abc-123")
            .in_response_to(request)
            .build()
            .unwrap();
        responder.dispatch(response).unwrap();
    });

    let request = event("get identity", "identity", "request.content");
    let response = hub
        .request(request, Duration::from_secs(2))
        .await
        .unwrap()
        .expect("response expected");

    assert_eq!(response.data()["id"], Variant::from("abc-123"));
    assert_eq!(hub.metrics().paired_responses, 1);
    assert_eq!(hub.metrics().pending_responses, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paired_timeout_fires_once_and_ignores_late_response() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let timed_out = Arc::new(AtomicUsize::new(0));

    let request = event("no responder", "paired.test", "request.content");
    let late_response = Event::builder("late", "paired.test", "response.content")
        .in_response_to(&request)
        .build()
        .unwrap();

    let (calls_cb, timed_out_cb) = (Arc::clone(&calls), Arc::clone(&timed_out));
    hub.dispatch_paired(request, Duration::from_millis(50), move |outcome| {
        calls_cb.fetch_add(1, Ordering::SeqCst);
        if matches!(outcome, ResponseOutcome::TimedOut) {
            timed_out_cb.fetch_add(1, Ordering::SeqCst);
        }
    })
    .unwrap();

    wait_until(|| calls.load(Ordering::SeqCst) == 1).await;
    assert_eq!(hub.metrics().pending_responses, 0);

    // A response arriving after the timeout must not re-trigger the callback
    let (seen, listener) = recorder();
    hub.register_listener(et("paired.test"), es("response.content"), listener);
    hub.dispatch(late_response).unwrap();
    wait_until(|| seen.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
    assert_eq!(hub.metrics().paired_timeouts, 1);
}

#[test]
fn test_hub_handle_is_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<EventHub>();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_copied_request_cannot_replace_pending_dispatch() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let request = event("get config", "paired.copy", "request.content");
    let response_id = request.response_id();

    let sink = Arc::clone(&outcomes);
    hub.dispatch_paired(request.clone(), Duration::from_millis(100), move |outcome| {
        sink.lock()
            .unwrap()
            .push(format!("first:{}", matches!(outcome, ResponseOutcome::TimedOut)));
    })
    .unwrap();

    let sink = Arc::clone(&outcomes);
    let duplicate = hub.dispatch_paired(request.clone(), Duration::from_secs(2), move |_| {
        sink.lock().unwrap().push("second".to_string());
    });
    assert_eq!(duplicate, Err(HubError::DuplicatePairedDispatch(response_id)));

    wait_until(|| outcomes.lock().unwrap().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(*outcomes.lock().unwrap(), vec!["first:true".to_string()]);
    assert_eq!(hub.metrics().paired_timeouts, 1);

    // Once resolved, the same request may be paired again
    let result = hub.request(request, Duration::from_millis(20)).await;
    assert_eq!(result.map(|r| r.is_none()), Ok(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_runs_pending_callbacks_off_the_dispatch_loop() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let arrived = Arc::new((Mutex::new(0usize), Condvar::new()));
    let met = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    // Each callback blocks until the other one has started
    for name in ["a", "b"] {
        let (arrived, met, done) = (Arc::clone(&arrived), Arc::clone(&met), Arc::clone(&done));
        hub.dispatch_paired(
            event(name, "shutdown.slow", "request.content"),
            Duration::from_secs(60),
            move |_| {
                let (count, cvar) = &*arrived;
                let mut count = count.lock().unwrap();
                *count += 1;
                cvar.notify_all();
                let (_count, wait) = cvar
                    .wait_timeout_while(count, Duration::from_secs(2), |n| *n < 2)
                    .unwrap();
                if !wait.timed_out() {
                    met.fetch_add(1, Ordering::SeqCst);
                }
                done.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
    }

    hub.shutdown();
    wait_until(|| done.load(Ordering::SeqCst) == 2).await;
    assert_eq!(met.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_without_responder_returns_none() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let result = hub
        .request(event("q", "lonely", "request.content"), Duration::from_millis(20))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_state_is_stored_and_announced() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let announcements = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&announcements);
    hub.register_listener(
        et(event_type::HUB),
        es(event_source::SHARED_STATE),
        move |e: &Event| sink.lock().unwrap().push(e.data()[STATE_OWNER_KEY].clone()),
    );

    let mut state = VariantMap::new();
    state.insert("mid".to_string(), Variant::from("12345"));
    hub.set_shared_state("identity", state).unwrap();

    wait_until(|| announcements.lock().unwrap().len() == 1).await;
    assert_eq!(announcements.lock().unwrap()[0], Variant::from("identity"));
    assert_eq!(
        hub.shared_state("identity").unwrap()["mid"],
        Variant::from("12345")
    );
    assert!(hub.shared_state("analytics").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_rejects_dispatch_and_resolves_pending() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let (tx, rx) = oneshot::channel();
    hub.dispatch_paired(
        event("waiting", "shutdown.test", "request.content"),
        Duration::from_secs(60),
        move |outcome| {
            let _ = tx.send(outcome);
        },
    )
    .unwrap();

    hub.shutdown();
    let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, ResponseOutcome::TimedOut));

    assert!(!hub.is_running());
    assert_eq!(
        hub.dispatch(event("late", "shutdown.test", "s")),
        Err(HubError::ShutDown)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_listener_keeps_its_worker() {
    let hub = EventHub::start(HubConfig::default()).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hub.register_listener(et("panics"), es("s"), move |e: &Event| {
        if e.name() == "boom" {
            panic!("listener failure");
        }
        sink.lock().unwrap().push(e.name().to_string());
    });

    hub.dispatch(event("boom", "panics", "s")).unwrap();
    hub.dispatch(event("after", "panics", "s")).unwrap();
    wait_until(|| seen.lock().unwrap().len() == 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["after"]);
}

#[test]
fn test_start_outside_runtime_fails() {
    assert!(matches!(
        EventHub::start(HubConfig::default()),
        Err(HubError::NoRuntime)
    ));
}
