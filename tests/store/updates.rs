use jsonapi_store::{Id, Method, OneOrMany, RecordStatus, Schema, Store, StoreError};
use serde_json::{json, Value};

use crate::support::{attrs, config, store, url, MockTransport};

fn persisted_event(store: &Store) -> jsonapi_store::Record {
    store
        .sync_value(&json!({"data": {"id": 1, "type": "events", "attributes": {"name": "Demo"}}}))
        .unwrap()
        .unwrap()
        .as_one()
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn save_new_record_posts_and_takes_server_identity() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Post,
        &url("events"),
        201,
        json!({
            "data": {
                "id": 12345,
                "type": "events",
                "attributes": {"name": "Demo", "slug": "demo"}
            }
        }),
    );
    let store = store(&transport);
    let record = store.create("events", attrs(json!({"name": "Demo"}))).unwrap();

    let outcome = store.save(&record, None).await.unwrap();

    assert!(!outcome.is_queued());
    assert!(outcome.record().ptr_eq(&record));
    assert_eq!(record.id(), Some(Id::from(12345)));
    assert_eq!(record.status(), RecordStatus::Persisted);
    assert_eq!(record.get("slug"), Some(json!("demo")));
    assert!(store.find("events", 12345).unwrap().unwrap().ptr_eq(&record));
    assert_eq!(store.find_all("events").unwrap().len(), 1);

    let sent = transport.last_request().unwrap();
    assert_eq!(
        sent.body,
        Some(json!({"data": {"type": "events", "attributes": {"name": "Demo"}}}))
    );
}

#[tokio::test]
async fn save_persisted_record_patches() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Patch,
        &url("events/1"),
        200,
        json!({"data": {"id": 1, "type": "events", "attributes": {"name": "Changed"}}}),
    );
    let store = store(&transport);
    let record = persisted_event(&store);
    record.set("name", "Changed");

    store.save(&record, None).await.unwrap();

    assert_eq!(transport.calls(Method::Patch, &url("events/1")), 1);
    let sent = transport.last_request().unwrap();
    assert_eq!(sent.body.unwrap()["data"]["id"], json!(1));
    assert_eq!(record.get("name"), Some(json!("Changed")));
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn update_method_can_be_put() {
    let transport = MockTransport::new();
    transport.reply(Method::Put, &url("events/1"), 204, Value::Null);
    let store = Store::new(config(&transport).with_update_method(Method::Put));
    let record = persisted_event(&store);

    store.save(&record, None).await.unwrap();

    assert_eq!(transport.calls(Method::Put, &url("events/1")), 1);
}

#[tokio::test]
async fn no_content_keeps_local_attributes() {
    let transport = MockTransport::new();
    transport.reply(Method::Patch, &url("events/1"), 204, Value::Null);
    let store = store(&transport);
    let record = persisted_event(&store);
    record.set("name", "Local");

    let outcome = store.save(&record, None).await.unwrap();

    assert!(outcome.record().ptr_eq(&record));
    assert_eq!(record.status(), RecordStatus::Persisted);
    assert_eq!(record.get("name"), Some(json!("Local")));
}

#[tokio::test]
async fn failed_save_restores_status() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Post,
        &url("events"),
        422,
        json!({"errors": [{"title": "Name is taken", "status": "422"}]}),
    );
    let store = store(&transport);
    let record = store.create("events", attrs(json!({"name": "Demo"}))).unwrap();

    let err = store.save(&record, None).await.unwrap_err();

    assert_eq!(err.status(), Some(422));
    assert_eq!(record.status(), RecordStatus::Unpersisted);
    assert!(store.contains(&record).unwrap());
}

#[tokio::test]
async fn client_generated_ids_are_sent() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Post,
        &url("events"),
        201,
        json!({"data": {"id": "c-1", "type": "events", "attributes": {"name": "Demo"}}}),
    );
    let store = store(&transport);
    store
        .register(Schema::new("events").client_ids_with(|| Id::from("c-1")))
        .unwrap();
    let record = store.create("events", attrs(json!({"name": "Demo"}))).unwrap();

    store.save(&record, None).await.unwrap();

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.body.unwrap()["data"]["id"], json!("c-1"));
    assert!(store.find("events", "c-1").unwrap().unwrap().ptr_eq(&record));
    assert!(record.is_persisted());
}

#[tokio::test]
async fn save_detached_record() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Post,
        &url("events"),
        201,
        json!({"data": {"id": 7, "type": "events", "attributes": {"name": "Demo"}}}),
    );
    let store = store(&transport);
    let record =
        jsonapi_store::Record::new("events").with_attributes(attrs(json!({"name": "Demo"})));

    store.save(&record, None).await.unwrap();

    assert_eq!(record.id(), Some(Id::from(7)));
    assert!(record.is_persisted());
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn remove_persisted_record() {
    let transport = MockTransport::new();
    transport.reply(Method::Delete, &url("events/1"), 204, Value::Null);
    let store = store(&transport);
    let record = persisted_event(&store);

    assert!(store.remove_record_remote(&record, None).await.unwrap());

    assert_eq!(record.status(), RecordStatus::Removed);
    assert!(store.find("events", 1).unwrap().is_none());
}

#[tokio::test]
async fn remove_unpersisted_record_stays_local() {
    let transport = MockTransport::new();
    let store = store(&transport);
    let record = store.create("events", attrs(json!({"name": "Draft"}))).unwrap();

    assert!(store.remove_record_remote(&record, None).await.unwrap());

    assert_eq!(record.status(), RecordStatus::Removed);
    assert!(store.is_empty().unwrap());
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn failed_remove_keeps_record() {
    let transport = MockTransport::new();
    transport.reply(Method::Delete, &url("events/1"), 500, Value::Null);
    let store = store(&transport);
    let record = persisted_event(&store);

    let err = store.remove_record_remote(&record, None).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(store.contains(&record).unwrap());
    assert_eq!(record.status(), RecordStatus::Persisted);
}

#[tokio::test]
async fn destroy_by_type_and_id() {
    let transport = MockTransport::new();
    transport.reply(Method::Delete, &url("events/1"), 204, Value::Null);
    let store = store(&transport);
    persisted_event(&store);

    assert!(store.destroy("events", 1, None).await.unwrap());
    assert!(store.destroy("events", 1, None).await.unwrap());
    assert_eq!(transport.calls(Method::Delete, &url("events/1")), 1);
}

#[tokio::test]
async fn save_relationship_patches_self_link() {
    let self_link = url("events/1/relationships/images");
    let transport = MockTransport::new();
    transport.reply(
        Method::Patch,
        &self_link,
        200,
        json!({"data": [{"type": "images", "id": 2}, {"type": "images", "id": 3}]}),
    );
    let store = store(&transport);
    let event = store
        .sync_value(&json!({
            "data": {
                "id": 1,
                "type": "events",
                "relationships": {
                    "images": {
                        "links": {"self": self_link},
                        "data": [{"type": "images", "id": 2}]
                    }
                }
            }
        }))
        .unwrap()
        .unwrap()
        .as_one()
        .cloned()
        .unwrap();

    store
        .assign_ref(&event, "images", "images", OneOrMany::Many(vec![Id::from(2), Id::from(3)]))
        .unwrap();
    let saved = store.save_relationship(&event, "images", None).await.unwrap();

    assert!(saved.ptr_eq(&event));
    let sent = transport.last_request().unwrap();
    assert_eq!(
        sent.body,
        Some(json!({"data": [{"type": "images", "id": 2}, {"type": "images", "id": 3}]}))
    );
    assert_eq!(event.get("imagesId"), Some(json!([2, 3])));
    assert_eq!(event.related("images").unwrap().records().len(), 2);
}

#[tokio::test]
async fn save_relationship_requires_self_link() {
    let store = store(&MockTransport::new());
    let event = persisted_event(&store);

    let err = store.save_relationship(&event, "images", None).await.unwrap_err();

    assert!(matches!(
        err,
        StoreError::MissingSelfLink { relationship } if relationship == "images"
    ));
}
