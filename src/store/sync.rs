use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use super::relationships::{link_arrivals, wire};
use super::{IdentityMap, Store};
use crate::document::{Document, OneOrMany, Resource};
use crate::error::StoreError;
use crate::observe::{Change, ChangeKind};
use crate::record::{flatten, Record};
use crate::schema::Schema;

impl Store {
    /// Sync a raw JSON body. See [`Store::sync`].
    pub fn sync_value(&self, body: &Value) -> Result<Option<OneOrMany<Record>>, StoreError> {
        let document =
            Document::from_value(body).map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        self.sync(&document)
    }

    /// Import a document into the identity map.
    ///
    /// Upserts every resource (`included` first, then `data`), then wires
    /// relationships, all under one write lock. Returns the records of the
    /// top-level `data`, in its shape.
    pub fn sync(&self, document: &Document) -> Result<Option<OneOrMany<Record>>, StoreError> {
        validate(document)?;
        let schemas = self.schemas()?;
        let mut changes = Vec::new();
        let mut arrivals = Vec::new();

        let (data, linked) = {
            let mut map = self.records_write("sync")?;

            for resource in &document.included {
                self.upsert(&mut map, &schemas, resource, &mut changes, &mut arrivals);
            }
            let data = document.data.as_ref().map(|data| {
                data.as_ref().map(|resource| {
                    self.upsert(&mut map, &schemas, resource, &mut changes, &mut arrivals)
                })
            });

            for resource in document.resources() {
                wire(&map, resource);
            }
            let linked = link_arrivals(&map, &arrivals);
            (data, linked)
        };

        debug!(
            included = document.included.len(),
            data = document.data.as_ref().map(OneOrMany::len).unwrap_or(0),
            linked,
            "synced document"
        );
        self.notify(&changes);
        Ok(data)
    }

    fn upsert(
        &self,
        map: &mut IdentityMap,
        schemas: &HashMap<String, Arc<Schema>>,
        resource: &Resource,
        changes: &mut Vec<Change>,
        arrivals: &mut Vec<Record>,
    ) -> Record {
        let flat = flatten(resource);
        let id = flat.id.as_ref().map(|id| id.as_key());

        let existing = flat
            .id
            .as_ref()
            .and_then(|id| map.get(&flat.record_type, id));

        match existing {
            Some(record) => {
                trace!(record_type = %flat.record_type, id = ?id, "updating record");
                changes.push(Change::new(ChangeKind::Updated, flat.record_type.clone(), id));
                record.merge(flat);
                record
            }
            None => {
                trace!(record_type = %flat.record_type, id = ?id, "adding record");
                changes.push(Change::new(ChangeKind::Added, flat.record_type.clone(), id));
                let schema = schemas.get(&flat.record_type).cloned();
                let record = Record::from_flattened(flat, schema);
                self.attach(&record);
                map.insert(record.clone());
                arrivals.push(record.clone());
                record
            }
        }
    }
}

fn validate(document: &Document) -> Result<(), StoreError> {
    for resource in document.resources() {
        if resource.resource_type.is_empty() {
            return Err(StoreError::InvalidDocument(
                "resource object without a type".to_string(),
            ));
        }
        match &resource.id {
            Some(id) if !id.is_empty() => {}
            _ => {
                return Err(StoreError::InvalidDocument(format!(
                    "resource of type `{}` has no id",
                    resource.resource_type
                )))
            }
        }
    }
    Ok(())
}
