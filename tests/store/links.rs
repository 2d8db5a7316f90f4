use std::sync::Arc;

use jsonapi_store::Method;
use serde_json::json;

use crate::support::{store, url, MockTransport};

fn page(ids: &[i64], next: Option<&str>) -> serde_json::Value {
    let data: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "type": "events"}))
        .collect();
    json!({
        "data": data,
        "links": {
            "first": url("events?page=1"),
            "prev": null,
            "next": next,
        }
    })
}

#[tokio::test]
async fn next_page_is_fetched_once() {
    let page2 = url("events?page=2");
    let transport = MockTransport::new();
    transport
        .reply(Method::Get, &url("events"), 200, page(&[1, 2], Some(&page2)))
        .reply(Method::Get, &page2, 200, page(&[3], None));
    let store = store(&transport);

    let first = store.fetch_all("events", false, None).await.unwrap();
    let next = first.next().await.unwrap();
    let again = first.next().await.unwrap();

    assert!(Arc::ptr_eq(&next, &again));
    assert_eq!(next.records().len(), 1);
    assert_eq!(store.find_all("events").unwrap().len(), 3);
    assert_eq!(transport.calls(Method::Get, &page2), 1);
    assert_eq!(first.resolved_links(), vec!["next".to_string()]);
}

#[tokio::test]
async fn null_link_resolves_to_empty_response() {
    let transport = MockTransport::new();
    transport.reply(Method::Get, &url("events"), 200, page(&[1], None));
    let store = store(&transport);

    let first = store.fetch_all("events", false, None).await.unwrap();
    let prev = first.prev().await.unwrap();
    let last = first.last().await.unwrap();

    assert!(prev.data().is_none());
    assert!(last.data().is_none());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn link_fetch_keeps_request_headers() {
    let page2 = url("events?page=2");
    let transport = MockTransport::new();
    transport
        .reply(Method::Get, &url("events"), 200, page(&[1], Some(&page2)))
        .reply(Method::Get, &page2, 200, page(&[2], None));
    let store = store(&transport);

    let options = jsonapi_store::RequestOptions::new().with_header("authorization", "Bearer token");
    let first = store.fetch_all("events", false, Some(&options)).await.unwrap();
    first.next().await.unwrap();

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.url, page2);
    assert_eq!(sent.headers["authorization"], "Bearer token");
}

#[tokio::test]
async fn record_links_are_memoized() {
    let comments = url("events/1/comments");
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &comments,
        200,
        json!({"data": [{"id": 9, "type": "comments", "attributes": {"body": "hi"}}]}),
    );
    let store = store(&transport);
    let event = store
        .sync_value(&json!({
            "data": {"id": 1, "type": "events", "links": {"comments": comments}}
        }))
        .unwrap()
        .unwrap()
        .as_one()
        .cloned()
        .unwrap();

    let a = store.fetch_link(&event, "comments", false, None).await.unwrap();
    let b = store.fetch_link(&event, "comments", false, None).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(transport.calls(Method::Get, &comments), 1);

    store.fetch_link(&event, "comments", true, None).await.unwrap();
    assert_eq!(transport.calls(Method::Get, &comments), 2);
    assert_eq!(store.find("comments", 9).unwrap().unwrap().get("body"), Some(json!("hi")));
}

#[tokio::test]
async fn relationship_related_link() {
    let related = url("events/1/images");
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &related,
        200,
        json!({"data": [{"id": 2, "type": "images", "attributes": {"name": "Header"}}]}),
    );
    let store = store(&transport);
    let event = store
        .sync_value(&json!({
            "data": {
                "id": 1,
                "type": "events",
                "relationships": {
                    "images": {
                        "links": {"related": related},
                        "data": [{"id": 2, "type": "images"}]
                    }
                }
            }
        }))
        .unwrap()
        .unwrap()
        .as_one()
        .cloned()
        .unwrap();

    let response = store
        .fetch_relationship_link(&event, "images", "related", false, None)
        .await
        .unwrap();

    let image = &response.records()[0];
    assert_eq!(image.get("name"), Some(json!("Header")));
    assert!(event.related("images").unwrap().records()[0].ptr_eq(image));
}

#[tokio::test]
async fn missing_record_link_resolves_empty() {
    let transport = MockTransport::new();
    let store = store(&transport);
    let event = store.add(jsonapi_store::Record::new("events").with_id(1)).unwrap();

    let response = store.fetch_link(&event, "comments", false, None).await.unwrap();

    assert!(response.data().is_none());
    assert!(transport.requests().is_empty());
}
