use std::sync::Arc;

use jsonapi_store::{Method, Store};
use serde_json::json;

use crate::support::{config, store, url, MockTransport};

fn event(id: i64, name: &str) -> serde_json::Value {
    json!({"data": {"id": id, "type": "events", "attributes": {"name": name}}})
}

#[tokio::test]
async fn concurrent_fetches_share_one_request() {
    let transport = MockTransport::new();
    transport
        .delay(20)
        .reply(Method::Get, &url("events/1"), 200, event(1, "Demo"));
    let store = store(&transport);

    let (a, b) = futures::join!(
        store.fetch("events", 1, false, None),
        store.fetch("events", 1, false, None)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.record().unwrap().ptr_eq(&b.record().unwrap()));
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 1);
}

#[tokio::test]
async fn completed_fetch_is_served_from_cache() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, &url("events/1"), 200, event(1, "Demo"));
    let store = store(&transport);

    store.fetch("events", 1, false, None).await.unwrap();
    let again = store.fetch("events", 1, false, None).await.unwrap();

    assert_eq!(again.record().unwrap().get("name"), Some(json!("Demo")));
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 1);
    assert_eq!(store.cached_requests().unwrap(), 1);
}

#[tokio::test]
async fn failed_fetch_is_evicted_and_retried() {
    let transport = MockTransport::new();
    transport
        .reply(Method::Get, &url("events/1"), 500, json!({"errors": [{"title": "boom"}]}))
        .reply(Method::Get, &url("events/1"), 200, event(1, "Demo"));
    let store = store(&transport);

    assert!(store.fetch("events", 1, false, None).await.is_err());
    assert_eq!(store.cached_requests().unwrap(), 0);

    let response = store.fetch("events", 1, false, None).await.unwrap();
    assert_eq!(response.record().unwrap().get("name"), Some(json!("Demo")));
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 2);
}

#[tokio::test]
async fn force_refetches_into_the_same_record() {
    let transport = MockTransport::new();
    transport
        .reply(Method::Get, &url("events/1"), 200, event(1, "Demo"))
        .reply(Method::Get, &url("events/1"), 200, event(1, "Renamed"));
    let store = store(&transport);

    let first = store.fetch("events", 1, false, None).await.unwrap().record().unwrap();
    let second = store.fetch("events", 1, true, None).await.unwrap().record().unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(first.get("name"), Some(json!("Renamed")));
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 2);
}

#[tokio::test]
async fn fetch_all_and_fetch_share_records() {
    let transport = MockTransport::new();
    transport
        .reply(
            Method::Get,
            &url("events"),
            200,
            json!({"data": [
                {"id": 1, "type": "events", "attributes": {"name": "a"}},
                {"id": 2, "type": "events", "attributes": {"name": "b"}}
            ]}),
        )
        .reply(Method::Get, &url("events/1"), 200, event(1, "a"));
    let store = store(&transport);

    let all = store.fetch_all("events", false, None).await.unwrap();
    let one = store.fetch("events", 1, false, None).await.unwrap();

    assert_eq!(all.records().len(), 2);
    assert!(all.records()[0].ptr_eq(&one.record().unwrap()));
    assert_eq!(store.find_all("events").unwrap().len(), 2);
}

#[tokio::test]
async fn remove_all_evicts_cached_requests() {
    let transport = MockTransport::new();
    transport
        .reply(Method::Get, &url("events"), 200, json!({"data": [{"id": 1, "type": "events"}]}))
        .reply(Method::Get, &url("events/1"), 200, event(1, "a"));
    let store = store(&transport);

    store.fetch_all("events", false, None).await.unwrap();
    store.fetch("events", 1, false, None).await.unwrap();
    assert_eq!(store.cached_requests().unwrap(), 2);

    store.remove_all("events").unwrap();
    assert_eq!(store.cached_requests().unwrap(), 0);

    store.fetch_all("events", false, None).await.unwrap();
    assert_eq!(transport.calls(Method::Get, &url("events")), 2);
}

#[tokio::test]
async fn local_remove_evicts_record_fetch() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, &url("events/1"), 200, event(1, "a"));
    let store = store(&transport);

    store.fetch("events", 1, false, None).await.unwrap();
    store.remove("events", 1).unwrap();

    assert_eq!(store.cached_requests().unwrap(), 0);
    store.fetch("events", 1, false, None).await.unwrap();
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 2);
}

#[tokio::test]
async fn reset_clears_records_and_cache() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, &url("events/1"), 200, event(1, "a"));
    let store = store(&transport);

    store.fetch("events", 1, false, None).await.unwrap();
    store.reset().unwrap();

    assert!(store.is_empty().unwrap());
    assert_eq!(store.cached_requests().unwrap(), 0);
}

#[tokio::test]
async fn disabled_cache_always_requests() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, &url("events/1"), 200, event(1, "a"));
    let store = Store::new(config(&transport).with_cache(false));

    let first = store.fetch("events", 1, false, None).await.unwrap().record().unwrap();
    let second = store.fetch("events", 1, false, None).await.unwrap().record().unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(transport.calls(Method::Get, &url("events/1")), 2);
    assert_eq!(store.cached_requests().unwrap(), 0);
}
