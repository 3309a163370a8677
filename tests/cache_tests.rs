//! Cache behaviour of the dispatcher and event store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::{self, OBJECT_PATH};
use common::{assert_ok, harness, object_server};
use hyperlog::{
    AggregateStatus, Aggregator, EventState, JsonLinkResolver, Lookup, Method, ObjectAggregator,
    ObjectAssembly, ResourceKey, SubType,
};
use hyperlog_transport::MockTransport;

#[tokio::test]
async fn test_cached_response_skips_transport_and_counts_hit() {
    let h = harness(object_server());

    let first = assert_ok(h.dispatcher.get(OBJECT_PATH).await, "first fetch");
    assert_eq!(first.read().cache_hits(), 0);

    let second = assert_ok(h.dispatcher.get(OBJECT_PATH).await, "second fetch");
    let third = assert_ok(h.dispatcher.get(OBJECT_PATH).await, "third fetch");

    assert_eq!(h.mock.calls_to(OBJECT_PATH), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(first.read().cache_hits(), 2);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.dispatcher.metrics().snapshot().cache_hits, 2);
}

#[tokio::test]
async fn test_equivalent_volatile_key_is_served_from_cache() {
    let mock = Arc::new(MockTransport::new("layouts"));
    mock.add_route("/objects/simple.Foo/AAAA/object-layout", "L");
    let h = harness(mock);

    assert_ok(
        h.dispatcher.get("/objects/simple.Foo/AAAA/object-layout").await,
        "layout fetch",
    );
    let other = assert_ok(
        h.dispatcher.get("/objects/simple.Foo/BBBB/object-layout").await,
        "equivalent layout fetch",
    );

    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(other.read().peek_response(), "L");
    assert_eq!(other.read().cache_hits(), 1);
}

#[tokio::test]
async fn test_named_segment_difference_is_not_a_hit() {
    let mock = Arc::new(MockTransport::new("layouts"));
    mock.add_route("/objects/simple.Foo/AAAA/object-layout", "L1");
    mock.add_route("/objects/simple.Bar/AAAA/object-layout", "L2");
    let h = harness(mock);

    h.dispatcher
        .get("/objects/simple.Foo/AAAA/object-layout")
        .await
        .unwrap();
    let bar = h
        .dispatcher
        .get("/objects/simple.Bar/AAAA/object-layout")
        .await
        .unwrap();

    assert_eq!(h.mock.call_count(), 2);
    assert_eq!(bar.read().peek_response(), "L2");
}

#[tokio::test]
async fn test_sub_type_is_part_of_the_key() {
    let h = harness(object_server());
    let json = ResourceKey::json(OBJECT_PATH);
    let xml = ResourceKey::new(OBJECT_PATH, SubType::Xml);

    h.dispatcher.fetch(json.clone(), Method::Get, None, None).await.unwrap();
    h.dispatcher.fetch(xml, Method::Get, None, None).await.unwrap();
    h.dispatcher.fetch(json, Method::Get, None, None).await.unwrap();

    assert_eq!(h.mock.calls_to(OBJECT_PATH), 2);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_put_forces_next_get_to_the_wire() {
    let h = harness(object_server());
    let key = ResourceKey::json(OBJECT_PATH);

    h.dispatcher.fetch(key.clone(), Method::Get, None, None).await.unwrap();
    h.dispatcher
        .fetch(key.clone(), Method::Put, Some(r#"{"name":{"value":"Bar"}}"#.into()), None)
        .await
        .unwrap();
    assert!(!h.store.is_cached(&ResourceKey::json(fixtures::url(OBJECT_PATH)), Method::Get));
    h.dispatcher.fetch(key, Method::Get, None, None).await.unwrap();

    let calls = h.mock.calls();
    let methods: Vec<Method> = calls.iter().map(|call| call.method).collect();
    assert_eq!(methods, vec![Method::Get, Method::Put, Method::Get]);
    assert_eq!(calls[1].body.as_deref(), Some(r#"{"name":{"value":"Bar"}}"#));

    let states: Vec<EventState> = h.store.snapshot().iter().map(|e| e.state()).collect();
    assert_eq!(
        states,
        vec![EventState::Reload, EventState::Success, EventState::Success]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_join_one_transport_call() {
    let mock = object_server();
    mock.set_latency(OBJECT_PATH, Duration::from_millis(50));
    let h = harness(mock);

    let (first, second) = tokio::join!(
        h.dispatcher.get(OBJECT_PATH),
        h.dispatcher.get(OBJECT_PATH)
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(first.read().state(), EventState::Success);
    assert_eq!(h.dispatcher.metrics().snapshot().joined, 1);
}

#[tokio::test]
async fn test_failed_request_is_retried_and_reported() {
    let mock = Arc::new(MockTransport::new("flaky"));
    mock.add_failure("/objects/simple.Foo/X1", "connection reset");
    let h = harness(mock);

    let failed = h.dispatcher.get("/objects/simple.Foo/X1").await.unwrap();
    assert_eq!(failed.read().state(), EventState::Error);
    assert!(matches!(
        h.store.lookup(&ResourceKey::json(fixtures::url("/objects/simple.Foo/X1")), Method::Get),
        Lookup::Miss
    ));

    h.mock.add_route("/objects/simple.Foo/X1", "{}");
    let retried = h.dispatcher.get("/objects/simple.Foo/X1").await.unwrap();
    assert_eq!(retried.read().state(), EventState::Success);
    assert_eq!(h.mock.call_count(), 2);

    let title = fixtures::url("/objects/simple.Foo/X1");
    assert_eq!(
        h.observer.states_for(&title),
        vec![
            EventState::Running,
            EventState::Error,
            EventState::Running,
            EventState::Success
        ]
    );
}

#[tokio::test]
async fn test_end_and_fault_by_key() {
    let h = harness(object_server());
    let key = ResourceKey::json(fixtures::url(OBJECT_PATH));

    h.store.start(key.clone(), Method::Get, None, None);
    let entry = h.store.end(&key, "R").unwrap();
    assert_eq!(entry.read().peek_response(), "R");
    assert!(h.store.is_cached(&key, Method::Get));

    let err = h.store.fault(&key, "late").unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("NotFoundForUpdate: no running entry for {}", key.url)
    );
}

#[tokio::test]
async fn test_digit_suffixed_properties_are_distinct_resources() {
    let mock = Arc::new(MockTransport::new("properties"));
    mock.add_route("/objects/simple.Foo/1/properties/address1", r#"{"id":"address1"}"#);
    mock.add_route("/objects/simple.Foo/1/properties/address2", r#"{"id":"address2"}"#);
    let h = harness(mock);

    h.dispatcher
        .get("/objects/simple.Foo/1/properties/address1")
        .await
        .unwrap();
    let second = h
        .dispatcher
        .get("/objects/simple.Foo/1/properties/address2")
        .await
        .unwrap();

    assert_eq!(h.mock.call_count(), 2);
    assert_eq!(second.read().peek_response(), r#"{"id":"address2"}"#);
    assert_eq!(second.read().cache_hits(), 0);
    assert_eq!(h.store.len(), 2);
}

#[tokio::test]
async fn test_relative_store_entry_answers_dispatcher_fetch() {
    let h = harness(object_server());
    let relative = ResourceKey::json(OBJECT_PATH);

    h.store.start(relative.clone(), Method::Get, None, None);
    h.store.end(&relative, fixtures::object()).unwrap();

    let served = h.dispatcher.get(OBJECT_PATH).await.unwrap();

    assert_eq!(h.mock.call_count(), 0);
    assert_eq!(h.store.len(), 1);
    assert_eq!(served.read().peek_response(), fixtures::object());
    assert_eq!(h.dispatcher.metrics().snapshot().cache_hits, 1);
    assert!(h.store.is_cached(&ResourceKey::json(fixtures::url(OBJECT_PATH)), Method::Get));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_owner_fails_joined_request() {
    let mock = object_server();
    mock.set_latency(OBJECT_PATH, Duration::from_millis(100));
    let h = harness(mock);

    let dispatcher = h.dispatcher.clone();
    let owner = tokio::spawn(async move { dispatcher.get(OBJECT_PATH).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let aggregator = Arc::new(ObjectAggregator::new(ObjectAssembly, Arc::new(JsonLinkResolver)));
    let shared: Arc<dyn Aggregator> = aggregator.clone();
    let joined = h
        .dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();
    assert!(joined.read().is_running());
    assert_eq!(h.dispatcher.metrics().snapshot().joined, 1);

    owner.abort();
    assert!(owner.await.unwrap_err().is_cancelled());

    assert_eq!(joined.read().state(), EventState::Error);
    assert!(joined
        .read()
        .fault_message()
        .unwrap()
        .contains("abandoned"));
    assert!(matches!(aggregator.status(), AggregateStatus::Failed { .. }));

    let retried = h.dispatcher.get(OBJECT_PATH).await.unwrap();
    assert_eq!(retried.read().state(), EventState::Success);
    assert_eq!(h.mock.call_count(), 2);
}
