//! Per-type schema: endpoint, defaults, relationship targets, derived fields
//! and client-generated ids.
//!
//! Types without a registered schema still work; records of those types are
//! plain generic records addressed by their type name.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::Id;
use crate::record::Record;

pub type DerivedFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
pub type IdGenerator = Arc<dyn Fn() -> Id + Send + Sync>;

/// Describes one resource type.
///
/// ```ignore
/// let schema = Schema::new("events")
///     .endpoint("event")
///     .default("name", "untitled")
///     .relationship("images", "images")
///     .derived("title", |record| record.get("name").unwrap_or_default());
/// store.register(schema);
/// ```
#[derive(Clone)]
pub struct Schema {
    record_type: String,
    endpoint: Option<String>,
    defaults: Map<String, Value>,
    relationships: BTreeMap<String, String>,
    derived: BTreeMap<String, DerivedFn>,
    client_ids: Option<IdGenerator>,
}

impl Schema {
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            endpoint: None,
            defaults: Map::new(),
            relationships: BTreeMap::new(),
            derived: BTreeMap::new(),
            client_ids: None,
        }
    }

    /// URL path segment used instead of the type name.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attribute value applied to newly created records.
    pub fn default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Declares the target type of a relationship.
    pub fn relationship(mut self, name: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.relationships.insert(name.into(), target_type.into());
        self
    }

    pub fn derived<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.derived.insert(name.into(), Arc::new(compute));
        self
    }

    /// Generate ids on the client (UUID v4).
    pub fn client_ids(self) -> Self {
        self.client_ids_with(|| Id::Text(uuid::Uuid::new_v4().to_string()))
    }

    pub fn client_ids_with<F>(mut self, generate: F) -> Self
    where
        F: Fn() -> Id + Send + Sync + 'static,
    {
        self.client_ids = Some(Arc::new(generate));
        self
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Path segment for requests: the endpoint if set, else the type name.
    pub fn path(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(&self.record_type)
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    pub fn relationships(&self) -> &BTreeMap<String, String> {
        &self.relationships
    }

    pub fn relationship_type(&self, name: &str) -> Option<&str> {
        self.relationships.get(name).map(String::as_str)
    }

    pub fn derived_fn(&self, name: &str) -> Option<&DerivedFn> {
        self.derived.get(name)
    }

    pub fn derived_names(&self) -> impl Iterator<Item = &str> {
        self.derived.keys().map(String::as_str)
    }

    pub fn uses_client_ids(&self) -> bool {
        self.client_ids.is_some()
    }

    pub fn generate_id(&self) -> Option<Id> {
        self.client_ids.as_ref().map(|generate| generate())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("record_type", &self.record_type)
            .field("endpoint", &self.endpoint)
            .field("defaults", &self.defaults)
            .field("relationships", &self.relationships)
            .field("derived", &self.derived.keys().collect::<Vec<_>>())
            .field("client_ids", &self.client_ids.is_some())
            .finish()
    }
}

/// A typed view of one resource type.
///
/// Usually derived:
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Resource)]
/// #[resource(type = "events", endpoint = "event", relationships(images = "images"))]
/// struct Event {
///     id: Option<String>,
///     name: String,
/// }
/// ```
pub trait Resource: Serialize + DeserializeOwned {
    const TYPE: &'static str;

    fn schema() -> Schema {
        Schema::new(Self::TYPE)
    }
}
