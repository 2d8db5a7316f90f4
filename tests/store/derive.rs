use jsonapi_store::{Id, Method, Resource};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::support::{store, url, MockTransport};

#[derive(Debug, Serialize, Deserialize, Resource)]
#[resource(type = "events", endpoint = "event", relationships(images = "images"))]
struct Event {
    id: Option<Id>,
    name: String,
    #[serde(rename = "imagesId", default)]
    images_id: Vec<Id>,
}

#[derive(Debug, Serialize, Deserialize, Resource)]
struct BlogPost {
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize, Resource)]
#[resource(type = "drafts", client_ids)]
struct Draft {
    id: Option<Id>,
}

#[test]
fn derive_reads_attributes() {
    let schema = Event::schema();
    assert_eq!(Event::TYPE, "events");
    assert_eq!(schema.path(), "event");
    assert_eq!(schema.relationship_type("images"), Some("images"));
    assert!(!schema.uses_client_ids());
}

#[test]
fn derive_defaults_type_name() {
    assert_eq!(BlogPost::TYPE, "blog_posts");
    assert_eq!(BlogPost::schema().path(), "blog_posts");
}

#[test]
fn derive_client_ids() {
    assert!(Draft::schema().uses_client_ids());
}

#[tokio::test]
async fn registered_type_drives_urls_and_models() {
    let transport = MockTransport::new();
    transport.reply(
        Method::Get,
        &url("event/1"),
        200,
        json!({
            "data": {
                "id": 1,
                "type": "events",
                "attributes": {"name": "Demo"},
                "relationships": {"images": {"data": [{"id": 2, "type": "images"}]}}
            }
        }),
    );
    let store = store(&transport);
    store.register_type::<Event>().unwrap();

    let record = store.fetch("events", 1, false, None).await.unwrap().record().unwrap();
    let event: Event = record.to_model().unwrap();

    assert_eq!(event.id, Some(Id::from(1)));
    assert_eq!(event.name, "Demo");
    assert_eq!(event.images_id, vec![Id::from(2)]);
}
