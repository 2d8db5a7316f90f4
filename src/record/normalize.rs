use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::{Id, Links, Resource};

/// Suffix of the attribute that carries a relationship's `meta`.
pub const META_SUFFIX: &str = "Meta";

/// Side channel kept next to a record's attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMeta {
    pub links: Links,
    pub relationship_links: BTreeMap<String, Links>,
    pub meta: Map<String, Value>,
}

impl RecordMeta {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.relationship_links.is_empty() && self.meta.is_empty()
    }

    /// Merge `other` in, later entries win.
    pub fn merge(&mut self, other: RecordMeta) {
        self.links.extend(other.links);
        self.relationship_links.extend(other.relationship_links);
        self.meta.extend(other.meta);
    }
}

/// A resource object reduced to what a record stores.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub record_type: String,
    pub id: Option<Id>,
    pub attributes: Map<String, Value>,
    pub meta: RecordMeta,
}

/// Flatten a resource object. Relationship `data` is left for the resolver.
pub fn flatten(resource: &Resource) -> Flattened {
    let mut attributes = Map::with_capacity(resource.attributes.len());
    for (key, value) in &resource.attributes {
        if key == "id" || key == "type" {
            continue;
        }
        attributes.insert(key.clone(), value.clone());
    }

    let mut meta = RecordMeta::default();

    for (name, relationship) in &resource.relationships {
        if let Some(rel_meta) = &relationship.meta {
            attributes.insert(format!("{}{}", name, META_SUFFIX), rel_meta.clone());
        }
        if !relationship.links.is_empty() {
            meta.relationship_links
                .insert(name.clone(), relationship.links.clone());
        }
    }

    for (name, link) in &resource.links {
        if link.is_some() {
            meta.links.insert(name.clone(), link.clone());
        }
    }

    for (key, value) in &resource.meta {
        if !value.is_null() {
            meta.meta.insert(key.clone(), value.clone());
        }
    }

    Flattened {
        record_type: resource.resource_type.clone(),
        id: resource.id.clone(),
        attributes,
        meta,
    }
}
