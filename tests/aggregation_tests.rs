//! Fan-in aggregation driven through the dispatcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::{
    self, ITEMS_PATH, LAYOUT_PATH, LIST_PATH, MEMBER_LAYOUT_PATH, MEMBER_NAME_PATH, MEMBER_PATH,
    NOTES_PATH, OBJECT_PATH,
};
use common::{harness, object_server};
use hyperlog::{
    AggregateStatus, Aggregator, EventState, JsonLinkResolver, ListAggregator, ListAssembly,
    ListRole, Method, ObjectAggregator, ObjectAssembly, ObjectRole, ResourceKey,
};
use hyperlog_transport::MockTransport;
use parking_lot::Mutex;

fn object_aggregator() -> Arc<ObjectAggregator> {
    Arc::new(ObjectAggregator::new(ObjectAssembly, Arc::new(JsonLinkResolver)))
}

fn list_aggregator() -> Arc<ListAggregator> {
    Arc::new(ListAggregator::new(ListAssembly, Arc::new(JsonLinkResolver)))
}

#[tokio::test]
async fn test_object_view_fetches_layout_and_collections() {
    let h = harness(object_server());
    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    let root = h
        .dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert_eq!(root.read().state(), EventState::Success);
    assert!(aggregator.is_ready());
    assert_eq!(h.mock.call_count(), 4);
    for path in [OBJECT_PATH, LAYOUT_PATH, ITEMS_PATH, NOTES_PATH] {
        assert_eq!(h.mock.calls_to(path), 1, "{}", path);
    }

    let roles: Vec<ObjectRole> = aggregator.parts().iter().map(|part| part.role).collect();
    assert_eq!(roles.len(), 4);
    assert_eq!(roles[0], ObjectRole::Object);
    assert_eq!(roles[1], ObjectRole::Layout);
    assert_eq!(
        roles.iter().filter(|role| **role == ObjectRole::Collection).count(),
        2
    );
    assert_eq!(
        aggregator.part(ObjectRole::Layout).unwrap().body,
        fixtures::layout()
    );

    let layout = h
        .store
        .find(&ResourceKey::json(fixtures::url(LAYOUT_PATH)))
        .unwrap();
    assert_eq!(
        layout.read().key().and_then(|key| key.referrer_url.clone()),
        Some(fixtures::url(OBJECT_PATH))
    );
}

#[tokio::test(start_paused = true)]
async fn test_children_may_arrive_in_any_order() {
    let mock = object_server();
    mock.set_latency(LAYOUT_PATH, Duration::from_millis(10));
    mock.set_latency(ITEMS_PATH, Duration::from_millis(80));
    mock.set_latency(NOTES_PATH, Duration::from_millis(5));
    let h = harness(mock);

    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    let aggregator = Arc::new(
        ObjectAggregator::new(ObjectAssembly, Arc::new(JsonLinkResolver))
            .with_name("object:AAA")
            .with_listener(Arc::new(move |name: &str, status: &AggregateStatus| {
                sink.lock().push((name.to_string(), status.clone()));
            })),
    );
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(aggregator.is_ready());
    assert_eq!(
        *order.lock(),
        vec![("object:AAA".to_string(), AggregateStatus::Ready)]
    );

    let resolved = h.observer.titles_in(EventState::Success);
    assert_eq!(resolved.first(), Some(&fixtures::url(OBJECT_PATH)));
    assert_eq!(resolved.last(), Some(&fixtures::url(ITEMS_PATH)));
}

#[tokio::test]
async fn test_precached_layout_is_not_fetched_again() {
    let h = harness(object_server());
    h.dispatcher.get(LAYOUT_PATH).await.unwrap();

    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(aggregator.is_ready());
    assert_eq!(h.mock.calls_to(LAYOUT_PATH), 1);
    assert_eq!(h.mock.call_count(), 4);
    assert_eq!(h.dispatcher.metrics().snapshot().cache_hits, 1);
}

#[tokio::test]
async fn test_second_view_is_assembled_from_cache() {
    let h = harness(object_server());
    let first: Arc<dyn Aggregator> = object_aggregator();
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(first))
        .await
        .unwrap();

    let second = object_aggregator();
    let shared: Arc<dyn Aggregator> = second.clone();
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(second.is_ready());
    assert_eq!(second.parts().len(), 4);
    assert_eq!(h.mock.call_count(), 4);
    assert_eq!(h.store.total_cache_hits(), 4);
}

#[tokio::test]
async fn test_failed_collection_leaves_partial_view() {
    let mock = object_server();
    mock.add_failure(NOTES_PATH, "connection reset");
    let h = harness(mock);
    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert_eq!(
        aggregator.status(),
        AggregateStatus::Partial {
            failed: vec![fixtures::url(NOTES_PATH)]
        }
    );
    assert!(!aggregator.is_ready());
    assert_eq!(aggregator.parts().len(), 3);
}

#[tokio::test]
async fn test_failed_root_fails_the_view() {
    let mock = object_server();
    mock.add_failure(OBJECT_PATH, "connection refused");
    let h = harness(mock);
    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(matches!(aggregator.status(), AggregateStatus::Failed { .. }));
    assert_eq!(h.mock.call_count(), 1);
}

#[tokio::test]
async fn test_list_view_fetches_first_member_metadata() {
    let h = harness(object_server());
    let aggregator = list_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.dispatcher
        .fetch(ResourceKey::json(LIST_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(aggregator.is_ready());
    for path in [LIST_PATH, MEMBER_PATH, MEMBER_LAYOUT_PATH, MEMBER_NAME_PATH] {
        assert_eq!(h.mock.calls_to(path), 1, "{}", path);
    }
    assert_eq!(h.mock.calls_to("/objects/simple.Foo/M2"), 0);
    assert_eq!(
        aggregator.part(ListRole::Property).unwrap().body,
        r#"{"id":"name"}"#
    );
}

#[tokio::test(start_paused = true)]
async fn test_closing_view_discards_in_flight_results() {
    let mock = object_server();
    mock.set_latency(OBJECT_PATH, Duration::from_millis(50));
    let h = harness(mock);

    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();
    h.store.add_view("Object: Foo AAA", Some(shared.clone()));

    let dispatcher = h.dispatcher.clone();
    let task = tokio::spawn(async move {
        dispatcher
            .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    h.store.close_view("Object: Foo AAA").unwrap();

    let root = task.await.unwrap().unwrap();
    assert_eq!(root.read().state(), EventState::Success);
    assert_eq!(aggregator.status(), AggregateStatus::Idle);
    assert_eq!(aggregator.discarded_updates(), 1);
    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(h.store.views()[0].state(), EventState::Closed);
}

#[tokio::test]
async fn test_reopened_view_can_be_assembled_again() {
    let h = harness(object_server());
    let aggregator = object_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.store.add_view("Object: Foo AAA", Some(shared.clone()));
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared.clone()))
        .await
        .unwrap();
    assert!(aggregator.is_ready());

    h.store.close_view("Object: Foo AAA").unwrap();
    assert_eq!(aggregator.status(), AggregateStatus::Idle);

    h.store.add_view("Object: Foo AAA", Some(shared.clone()));
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(aggregator.is_ready());
    assert_eq!(h.mock.call_count(), 4);
}

#[tokio::test]
async fn test_list_view_fetches_each_numbered_property() {
    let member = "/objects/simple.Foo/1";
    let address = |n: u8| format!("{}/properties/address{}", member, n);
    let mock = Arc::new(MockTransport::new("addresses"));
    mock.add_route(
        LIST_PATH,
        format!(r#"{{"value": [{{"href": "{}"}}]}}"#, fixtures::url(member)),
    );
    mock.add_route(
        member,
        format!(
            r#"{{"members": {{
  "address1": {{"memberType": "property", "links": [{{"rel": "urn:org.restfulobjects:rels/details", "href": "{}"}}]}},
  "address2": {{"memberType": "property", "links": [{{"rel": "urn:org.restfulobjects:rels/details", "href": "{}"}}]}}
}}}}"#,
            fixtures::url(&address(1)),
            fixtures::url(&address(2))
        ),
    );
    mock.add_route(&address(1), r#"{"id":"address1"}"#);
    mock.add_route(&address(2), r#"{"id":"address2"}"#);
    let h = harness(mock);
    let aggregator = list_aggregator();
    let shared: Arc<dyn Aggregator> = aggregator.clone();

    h.dispatcher
        .fetch(ResourceKey::json(LIST_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();

    assert!(aggregator.is_ready());
    assert_eq!(h.mock.calls_to(&address(1)), 1);
    assert_eq!(h.mock.calls_to(&address(2)), 1);
    let mut properties: Vec<String> = aggregator
        .parts()
        .into_iter()
        .filter(|part| part.role == ListRole::Property)
        .map(|part| part.body)
        .collect();
    properties.sort();
    assert_eq!(properties, vec![r#"{"id":"address1"}"#, r#"{"id":"address2"}"#]);
}

#[tokio::test]
async fn test_closed_view_is_detached_from_cached_entries() {
    let h = harness(object_server());
    let first = object_aggregator();
    let shared: Arc<dyn Aggregator> = first.clone();
    h.store.add_view("Object: Foo AAA", Some(shared.clone()));
    h.dispatcher
        .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(shared))
        .await
        .unwrap();
    assert!(first.is_ready());

    h.store.close_view("Object: Foo AAA").unwrap();
    for entry in h.store.entries() {
        assert!(entry.read().aggregators().is_empty(), "{}", entry.read().title());
    }

    for round in 0..3 {
        let title = format!("Object: Foo AAA ({})", round);
        let again: Arc<dyn Aggregator> = object_aggregator();
        h.store.add_view(&title, Some(again.clone()));
        h.dispatcher
            .fetch(ResourceKey::json(OBJECT_PATH), Method::Get, None, Some(again.clone()))
            .await
            .unwrap();
        assert!(again.is_ready());
        let root = h
            .store
            .find(&ResourceKey::json(fixtures::url(OBJECT_PATH)))
            .unwrap();
        assert_eq!(root.read().aggregators().len(), 1);
        h.store.close_view(&title).unwrap();
    }

    let root = h
        .store
        .find(&ResourceKey::json(fixtures::url(OBJECT_PATH)))
        .unwrap();
    assert!(root.read().aggregators().is_empty());
    assert_eq!(first.discarded_updates(), 0);
    assert_eq!(h.mock.call_count(), 4);
}
