use std::sync::Arc;

use jsonapi_store::{ChangeKind, Method, RecordingObserver, Store};
use serde_json::json;

use crate::support::{config, url, MockTransport};

#[tokio::test]
async fn sync_and_edits_are_reported() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &url("events/1"),
        200,
        json!({"data": {"id": 1, "type": "events", "attributes": {"name": "Demo"}}}),
    );
    let observer = Arc::new(RecordingObserver::new());
    let store = Store::new(config(&transport).with_observer(observer.clone()));

    let record = store.fetch("events", 1, false, None).await.unwrap().record().unwrap();
    store.fetch("events", 1, true, None).await.unwrap();
    record.set("name", "Changed");
    store.remove("events", 1).unwrap();

    let kinds: Vec<ChangeKind> = observer.changes().iter().map(|change| change.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Added, ChangeKind::Updated, ChangeKind::Field, ChangeKind::Removed]
    );
    assert_eq!(observer.of_kind(ChangeKind::Field)[0].field.as_deref(), Some("name"));
}

#[cfg(feature = "emitter")]
#[tokio::test]
async fn emitter_observer_delivers_by_kind() {
    use std::sync::mpsc;
    use std::time::Duration;

    use jsonapi_store::EmitterObserver;

    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &url("events/1"),
        200,
        json!({"data": {"id": 1, "type": "events"}}),
    );
    let observer = Arc::new(EmitterObserver::new());
    let (tx, rx) = mpsc::channel();
    observer.on(ChangeKind::Added, move |change| {
        let _ = tx.send(change);
    });
    let store = Store::new(config(&transport).with_observer(observer.clone()));

    store.fetch("events", 1, false, None).await.unwrap();

    let change = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(change.record_type, "events");
    assert_eq!(change.id.as_deref(), Some("1"));
}
