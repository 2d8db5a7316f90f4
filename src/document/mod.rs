//! JSON:API wire format.
//!
//! These types mirror the document shape exchanged with the server. They are
//! deliberately permissive on optional members (absent, `null` and empty all
//! deserialize to the empty value) and strict on the members that identify a
//! resource (`type`, identifier `id`).

mod id;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use id::Id;

/// A member that is either a single value or an array of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_one(&self) -> Option<&T> {
        match self {
            OneOrMany::One(item) => Some(item),
            OneOrMany::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> Option<&[T]> {
        match self {
            OneOrMany::One(_) => None,
            OneOrMany::Many(items) => Some(items),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }

    /// Map every element while keeping the arity.
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> OneOrMany<U> {
        match self {
            OneOrMany::One(item) => OneOrMany::One(f(item)),
            OneOrMany::Many(items) => OneOrMany::Many(items.into_iter().map(f).collect()),
        }
    }

    pub fn as_ref(&self) -> OneOrMany<&T> {
        match self {
            OneOrMany::One(item) => OneOrMany::One(item),
            OneOrMany::Many(items) => OneOrMany::Many(items.iter().collect()),
        }
    }
}

/// A link: a bare URL or an object with `href` and `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    Url(String),
    Object {
        href: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        meta: Map<String, Value>,
    },
}

impl Link {
    pub fn href(&self) -> &str {
        match self {
            Link::Url(url) => url,
            Link::Object { href, .. } => href,
        }
    }
}

impl From<&str> for Link {
    fn from(url: &str) -> Self {
        Link::Url(url.to_string())
    }
}

/// Named links; `null` entries are kept so that "no next page" stays observable.
pub type Links = BTreeMap<String, Option<Link>>;

/// Resource identifier object (`{type, id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: Id,
}

impl Identifier {
    pub fn new(resource_type: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

/// Relationship object as sent inside a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OneOrMany<Identifier>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, RelationshipObject>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, id: Option<Id>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            attributes: Map::new(),
            relationships: BTreeMap::new(),
            links: Links::new(),
            meta: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, rel: RelationshipObject) -> Self {
        self.relationships.insert(name.into(), rel);
        self
    }

    pub fn identifier(&self) -> Option<Identifier> {
        self.id
            .clone()
            .map(|id| Identifier::new(self.resource_type.clone(), id))
    }
}

/// Source of a JSON:API error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// JSON:API error object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

/// Top-level JSON:API document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<OneOrMany<Resource>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorObject>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub jsonapi: Map<String, Value>,
}

impl Document {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Document::deserialize(value)
    }

    /// Every resource in the document, `included` first.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.included
            .iter()
            .chain(self.data.iter().flat_map(|data| data.iter()))
    }
}
