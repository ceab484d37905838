use super::*;

#[test]
fn test_valid_event_builds() {
    let event = Event::builder("Track Action", "Analytics", "Request.Content")
        .insert("action", "login")
        .insert("count", 3)
        .timestamp_ms(1707668400000)
        .build()
        .unwrap();

    assert_eq!(event.name(), "Track Action");
    assert_eq!(event.event_type().name(), "analytics");
    assert_eq!(event.source().name(), "request.content");
    assert_eq!(event.timestamp_ms(), 1707668400000);
    assert_eq!(event.data()["action"], Variant::from("login"));
    assert_eq!(event.data()["count"], Variant::from(3));
    assert_eq!(event.unique_id().get_version_num(), 7);
    assert!(event.pair_id().is_none());
    assert_eq!(event.chain_depth(), 0);
}

#[test]
fn test_type_and_source_are_interned() {
    let event = Event::builder("e", "Config", "Response.Content").build().unwrap();

    assert!(EventType::ptr_eq(
        event.event_type(),
        &EventType::get("config").unwrap()
    ));
    assert!(EventSource::ptr_eq(
        event.source(),
        &EventSource::get("RESPONSE.CONTENT").unwrap()
    ));
}

#[test]
fn test_missing_name_fails() {
    let result = Event::builder("  ", "analytics", "request").build();
    assert_eq!(result.unwrap_err(), EventError::MissingName);
}

#[test]
fn test_missing_type_fails() {
    let result = Event::builder("e", "", "request").build();
    assert_eq!(result.unwrap_err(), EventError::MissingType);
}

#[test]
fn test_missing_source_fails() {
    let result = Event::builder("e", "analytics", "   ").build();
    assert_eq!(result.unwrap_err(), EventError::MissingSource);
}

#[test]
fn test_wildcard_type_is_reserved() {
    let result = Event::builder("e", event_type::WILDCARD, "request").build();
    match result.unwrap_err() {
        EventError::ReservedName(_) => {}
        other => panic!("Expected ReservedName error, got {:?}", other),
    }

    let result = Event::builder("e", "analytics", event_source::WILDCARD).build();
    assert!(matches!(result, Err(EventError::ReservedName(_))));
}

#[test]
fn test_unique_ids_differ() {
    let a = Event::builder("e", "t", "s").build().unwrap();
    let b = Event::builder("e", "t", "s").build().unwrap();
    assert_ne!(a.unique_id(), b.unique_id());
    assert_ne!(a.response_id(), b.response_id());
}

#[test]
fn test_response_copies_request_response_id() {
    let request = Event::builder("get identity", "identity", "request.content")
        .build()
        .unwrap();
    let response = Event::builder("identity", "identity", "response.content")
        .in_response_to(&request)
        .build()
        .unwrap();

    assert!(response.is_response());
    assert_eq!(response.pair_id(), Some(request.response_id()));
    assert!(!request.is_response());
}

#[test]
fn test_consequence_chain_depth() {
    let trigger = Event::builder("t", "a", "b").build().unwrap();
    let first = Event::builder("c", "a", "b").caused_by(&trigger).build().unwrap();
    let second = Event::builder("c", "a", "b").caused_by(&first).build().unwrap();

    assert_eq!(first.chain_depth(), 1);
    assert_eq!(second.chain_depth(), 2);
}

#[test]
fn test_display_includes_routing() {
    let event = Event::builder("Ping", "hub", "test").insert("k", "v").build().unwrap();
    let text = event.to_string();
    assert!(text.contains("name=Ping"));
    assert!(text.contains("type=hub"));
    assert!(text.contains("\"k\":\"v\""));
}
