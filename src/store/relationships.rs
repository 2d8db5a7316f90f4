use std::collections::HashMap;

use tracing::debug;

use super::{IdentityMap, RecordKey, Store};
use crate::document::{Id, Identifier, OneOrMany, Resource};
use crate::error::StoreError;
use crate::observe::{Change, ChangeKind};
use crate::record::{Record, RecordStatus};

/// Point the owner's relationships at the records the identifiers name.
///
/// Relationships without data, or with an empty array, are left as they are.
pub(crate) fn wire(map: &IdentityMap, resource: &Resource) {
    let Some(owner) = resource
        .id
        .as_ref()
        .and_then(|id| map.get(&resource.resource_type, id))
    else {
        return;
    };

    for (name, relationship) in &resource.relationships {
        let Some(data) = &relationship.data else {
            continue;
        };
        let Some(first) = data.iter().next() else {
            continue;
        };

        let target_type = first.resource_type.clone();
        let targets: Vec<Option<Record>> = data
            .iter()
            .map(|identifier| map.get(&identifier.resource_type, &identifier.id))
            .collect();
        owner.assign_slot(name, &target_type, data.clone(), &targets);
    }
}

/// Point dangling relationship members at records that just arrived.
///
/// A relationship wired before its target was known holds only the raw id.
/// Once a record with that type and id is added, those members resolve to it.
pub(crate) fn link_arrivals(map: &IdentityMap, arrivals: &[Record]) -> usize {
    if arrivals.is_empty() {
        return 0;
    }
    let by_key: HashMap<(String, String), &Record> = arrivals
        .iter()
        .filter_map(|record| {
            let id = record.id()?;
            Some(((record.record_type(), id.as_key()), record))
        })
        .collect();

    let mut linked = 0;
    for record in map.records() {
        let mut state = record.write();
        for slot in state.relationships.values_mut() {
            for slot_ref in slot.entries.refs_mut() {
                if slot_ref.target.upgrade().is_some() {
                    continue;
                }
                let key = (slot_ref.target_type.clone(), slot_ref.id.as_key());
                if let Some(target) = by_key.get(&key) {
                    slot_ref.target = target.downgrade();
                    linked += 1;
                }
            }
        }
    }
    linked
}

/// Copy identity and data of `existing` onto `replacement`.
pub(crate) fn copy_state(existing: &Record, replacement: &Record) {
    let source = existing.read().clone();
    let mut target = replacement.write();
    target.record_type = source.record_type;
    target.id = source.id;
    target.attributes.extend(source.attributes);
    target.relationships.extend(source.relationships);
    target.foreign_keys.extend(source.foreign_keys);
    target.internal.merge(source.internal);
    target.status = RecordStatus::Persisted;
}

impl Store {
    /// Set a relationship locally. Targets are resolved through the store.
    pub fn assign_ref(
        &self,
        record: &Record,
        name: &str,
        target_type: &str,
        ids: OneOrMany<Id>,
    ) -> Result<(), StoreError> {
        let targets: Vec<Option<Record>> = {
            let map = self.records_read("assign_ref")?;
            ids.iter().map(|id| map.get(target_type, id)).collect()
        };
        let members = ids.map(|id| Identifier::new(target_type, id));
        record.assign_slot(name, target_type, members, &targets);
        self.notify(&[Change::new(
            ChangeKind::Field,
            record.record_type(),
            record.id().map(|id| id.as_key()),
        )
        .with_field(name)]);
        Ok(())
    }

    /// Swap `replacement` in for `existing`, taking over its identity.
    ///
    /// `existing` leaves the identity map and `replacement` takes its key.
    /// Every foreign key and relationship in the store that referred to the
    /// replacement's old id, or to `existing`, is pointed at the replacement.
    pub fn replace_data(
        &self,
        existing: &Record,
        replacement: &Record,
    ) -> Result<Record, StoreError> {
        if existing.ptr_eq(replacement) {
            return Ok(replacement.clone());
        }

        let old_type = replacement.record_type();
        let old_key = RecordKey::of(replacement);
        let old_id = replacement.id();
        let new_type = existing.record_type();
        let new_key = RecordKey::of(existing);
        let new_id = existing.id();

        let rewritten = {
            let mut map = self.records_write("replace_data")?;
            let existing_seq = map.remove_exact(&new_type, &new_key, existing);
            let replacement_seq = map.remove_exact(&old_type, &old_key, replacement);

            copy_state(existing, replacement);
            match existing_seq.or(replacement_seq) {
                Some(seq) => map.insert_at(seq, replacement.clone()),
                None => map.insert(replacement.clone()),
            };
            self.attach(replacement);

            let mut rewritten = 0;
            for record in map.records() {
                let mut guard = record.write();
                let state = &mut *guard;
                if let (Some(old), Some(new)) = (&old_id, &new_id) {
                    for (name, foreign_key) in state.foreign_keys.iter_mut() {
                        let targets_type = match state.relationships.get(name) {
                            Some(slot) => slot.holds_type(&old_type) || slot.holds_type(&new_type),
                            None => true,
                        };
                        if targets_type && foreign_key.replace(old, new) {
                            rewritten += 1;
                        }
                    }
                }
                for slot in state.relationships.values_mut() {
                    for slot_ref in slot.entries.refs_mut() {
                        if slot_ref.target_type != old_type && slot_ref.target_type != new_type {
                            continue;
                        }
                        let stale_id = slot_ref.target.upgrade().is_none()
                            && old_id.as_ref() == Some(&slot_ref.id);
                        if slot_ref.points_at(existing)
                            || slot_ref.points_at(replacement)
                            || stale_id
                        {
                            if let Some(new) = &new_id {
                                slot_ref.id = new.clone();
                            }
                            slot_ref.target = replacement.downgrade();
                            slot_ref.target_type = new_type.clone();
                        }
                    }
                }
            }
            rewritten
        };

        debug!(
            record_type = %new_type,
            old_id = ?old_id,
            new_id = ?new_id,
            rewritten,
            "replaced record identity"
        );
        self.notify(&[Change::new(
            ChangeKind::Updated,
            new_type,
            new_id.map(|id| id.as_key()),
        )]);
        Ok(replacement.clone())
    }
}
