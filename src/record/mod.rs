//! Records: one shared, mutable handle per live entity.
//!
//! A [`Record`] is a cheap-to-clone handle; every clone observes the same
//! state, and [`Record::ptr_eq`] is the identity the store guarantees to keep
//! stable across syncs. Relationships hold weak references, so cycles such as
//! event -> image -> event never keep records alive on their own.

pub mod normalize;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::document::{Id, Identifier, Link, Links, OneOrMany, RelationshipObject, Resource};
use crate::error::StoreError;
use crate::observe::{Change, ChangeKind, ObservableContainer};
use crate::schema::Schema;

pub use normalize::{flatten, Flattened, RecordMeta, META_SUFFIX};

/// Suffix of the field holding a relationship's raw id(s).
pub const FOREIGN_KEY_SUFFIX: &str = "Id";

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

fn next_local_id() -> u64 {
    NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    /// Created locally, never saved.
    Unpersisted,
    /// A create or update request is in flight.
    Submitted,
    /// The server accepted the create as a background job (202).
    Queued,
    Persisted,
    Removed,
}

/// One resolved relationship member.
#[derive(Clone)]
pub enum Related {
    Record(Record),
    /// The target is not in the store (or no longer alive).
    Id(Id),
}

impl Related {
    pub fn record(&self) -> Option<&Record> {
        match self {
            Related::Record(record) => Some(record),
            Related::Id(_) => None,
        }
    }

    pub fn id(&self) -> Option<Id> {
        match self {
            Related::Record(record) => record.id(),
            Related::Id(id) => Some(id.clone()),
        }
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Related::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Related::Id(id) => f.debug_tuple("Id").field(id).finish(),
        }
    }
}

/// Value of a relationship, keeping the arity of the wire data.
#[derive(Debug, Clone)]
pub enum Relation {
    One(Option<Related>),
    Many(Vec<Related>),
}

impl Relation {
    pub fn is_many(&self) -> bool {
        matches!(self, Relation::Many(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Relation::One(one) => usize::from(one.is_some()),
            Relation::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn one(&self) -> Option<&Related> {
        match self {
            Relation::One(one) => one.as_ref(),
            Relation::Many(_) => None,
        }
    }

    pub fn many(&self) -> &[Related] {
        match self {
            Relation::One(_) => &[],
            Relation::Many(many) => many,
        }
    }

    /// Members that resolved to live records.
    pub fn records(&self) -> Vec<Record> {
        match self {
            Relation::One(one) => one.iter().filter_map(|r| r.record().cloned()).collect(),
            Relation::Many(many) => many.iter().filter_map(|r| r.record().cloned()).collect(),
        }
    }
}

/// The `<name>Id` companion of a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForeignKey {
    One(Id),
    Many(Vec<Id>),
}

impl ForeignKey {
    pub fn ids(&self) -> Vec<&Id> {
        match self {
            ForeignKey::One(id) => vec![id],
            ForeignKey::Many(ids) => ids.iter().collect(),
        }
    }

    pub fn contains(&self, id: &Id) -> bool {
        match self {
            ForeignKey::One(one) => one == id,
            ForeignKey::Many(ids) => ids.contains(id),
        }
    }

    /// Rewrite every occurrence of `old` to `new`. Returns whether anything changed.
    pub fn replace(&mut self, old: &Id, new: &Id) -> bool {
        match self {
            ForeignKey::One(id) if id == old => {
                *id = new.clone();
                true
            }
            ForeignKey::One(_) => false,
            ForeignKey::Many(ids) => {
                let mut changed = false;
                for id in ids.iter_mut().filter(|id| *id == old) {
                    *id = new.clone();
                    changed = true;
                }
                changed
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ForeignKey::One(id) => Value::from(id.clone()),
            ForeignKey::Many(ids) => Value::Array(ids.iter().cloned().map(Value::from).collect()),
        }
    }
}

#[derive(Clone)]
pub(crate) struct SlotRef {
    pub(crate) target_type: String,
    pub(crate) id: Id,
    pub(crate) target: Weak<RwLock<RecordState>>,
}

impl SlotRef {
    pub(crate) fn new(identifier: Identifier, target: Option<&Record>) -> Self {
        Self {
            target_type: identifier.resource_type,
            id: identifier.id,
            target: target.map(Record::downgrade).unwrap_or_default(),
        }
    }

    fn resolve(&self) -> Related {
        match self.target.upgrade() {
            Some(inner) => Related::Record(Record { inner }),
            None => Related::Id(self.id.clone()),
        }
    }

    pub(crate) fn points_at(&self, record: &Record) -> bool {
        Weak::as_ptr(&self.target) == Arc::as_ptr(&record.inner)
    }
}

#[derive(Clone)]
pub(crate) enum SlotEntries {
    One(SlotRef),
    Many(Vec<SlotRef>),
}

impl SlotEntries {
    pub(crate) fn refs_mut(&mut self) -> std::slice::IterMut<'_, SlotRef> {
        match self {
            SlotEntries::One(one) => std::slice::from_mut(one).iter_mut(),
            SlotEntries::Many(many) => many.iter_mut(),
        }
    }
}

impl SlotEntries {
    fn refs(&self) -> &[SlotRef] {
        match self {
            SlotEntries::One(one) => std::slice::from_ref(one),
            SlotEntries::Many(many) => many,
        }
    }
}

/// A relationship's members. `target_type` is the declared type; each member
/// carries its own, which differs for polymorphic relationships.
#[derive(Clone)]
pub(crate) struct RelationSlot {
    pub(crate) target_type: String,
    pub(crate) entries: SlotEntries,
}

impl RelationSlot {
    pub(crate) fn holds_type(&self, record_type: &str) -> bool {
        self.target_type == record_type
            || self
                .entries
                .refs()
                .iter()
                .any(|member| member.target_type == record_type)
    }

    /// Type of the member at `index`, when it still holds `id`.
    fn member_type(&self, index: usize, id: &Id) -> &str {
        match self.entries.refs().get(index) {
            Some(member) if &member.id == id => &member.target_type,
            _ => &self.target_type,
        }
    }
}

#[derive(Clone)]
pub(crate) struct RecordState {
    pub(crate) record_type: String,
    pub(crate) id: Option<Id>,
    pub(crate) local_id: u64,
    pub(crate) attributes: Map<String, Value>,
    pub(crate) relationships: BTreeMap<String, RelationSlot>,
    pub(crate) foreign_keys: BTreeMap<String, ForeignKey>,
    pub(crate) internal: RecordMeta,
    pub(crate) status: RecordStatus,
    pub(crate) schema: Option<Arc<Schema>>,
    pub(crate) queued_for: Option<Record>,
    pub(crate) observer: Option<Arc<dyn ObservableContainer>>,
}

impl RecordState {
    fn change(&self, kind: ChangeKind) -> Change {
        Change::new(kind, self.record_type.clone(), self.id.as_ref().map(Id::as_key))
    }
}

/// Shared handle to one entity.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RwLock<RecordState>>,
}

impl Record {
    /// A generic, unpersisted record.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self::from_state(RecordState {
            record_type: record_type.into(),
            id: None,
            local_id: next_local_id(),
            attributes: Map::new(),
            relationships: BTreeMap::new(),
            foreign_keys: BTreeMap::new(),
            internal: RecordMeta::default(),
            status: RecordStatus::Unpersisted,
            schema: None,
            queued_for: None,
            observer: None,
        })
    }

    /// An unpersisted record of a schema-backed type, defaults applied.
    pub fn with_schema(schema: Arc<Schema>) -> Self {
        let record = Self::new(schema.record_type());
        {
            let mut state = record.write();
            state.attributes = schema.defaults().clone();
            state.schema = Some(schema);
        }
        record
    }

    pub fn with_id(self, id: impl Into<Id>) -> Self {
        self.write().id = Some(id.into());
        self
    }

    pub fn with_attributes(self, attributes: Map<String, Value>) -> Self {
        self.write().attributes.extend(attributes);
        self
    }

    /// A persisted record built from a normalized resource.
    pub(crate) fn from_flattened(flat: Flattened, schema: Option<Arc<Schema>>) -> Self {
        let record = match &schema {
            Some(schema) => Self::with_schema(schema.clone()),
            None => Self::new(flat.record_type.clone()),
        };
        record.merge(flat);
        record
    }

    fn from_state(state: RecordState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RecordState> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RecordState> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn downgrade(&self) -> Weak<RwLock<RecordState>> {
        Arc::downgrade(&self.inner)
    }

    /// Whether both handles refer to the same record.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn record_type(&self) -> String {
        self.read().record_type.clone()
    }

    pub fn id(&self) -> Option<Id> {
        self.read().id.clone()
    }

    /// Process-unique key of this record, stable for its whole life.
    pub fn local_id(&self) -> u64 {
        self.read().local_id
    }

    pub fn status(&self) -> RecordStatus {
        self.read().status
    }

    pub fn is_persisted(&self) -> bool {
        self.status() == RecordStatus::Persisted
    }

    pub fn schema(&self) -> Option<Arc<Schema>> {
        self.read().schema.clone()
    }

    /// For a queued job placeholder: the client record waiting on it.
    pub fn queued_for(&self) -> Option<Record> {
        self.read().queued_for.clone()
    }

    pub(crate) fn set_status(&self, status: RecordStatus) {
        self.write().status = status;
    }

    pub(crate) fn set_queued_for(&self, record: Option<Record>) {
        self.write().queued_for = record;
    }

    pub(crate) fn set_observer(&self, observer: Option<Arc<dyn ObservableContainer>>) {
        self.write().observer = observer;
    }

    /// Merge a normalized resource in place and mark the record persisted.
    pub(crate) fn merge(&self, flat: Flattened) {
        let mut state = self.write();
        state.record_type = flat.record_type;
        if flat.id.is_some() {
            state.id = flat.id;
        }
        state.attributes.extend(flat.attributes);
        state.internal.merge(flat.meta);
        state.status = RecordStatus::Persisted;
    }

    /// Attribute value. Also answers `id` and `<relationship>Id`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let state = self.read();
        if let Some(value) = state.attributes.get(key) {
            return Some(value.clone());
        }
        if key == "id" {
            return state.id.clone().map(Value::from);
        }
        key.strip_suffix(FOREIGN_KEY_SUFFIX)
            .and_then(|name| state.foreign_keys.get(name))
            .map(ForeignKey::to_value)
    }

    /// Write an attribute and notify the observer.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let (observer, change) = {
            let mut state = self.write();
            state.attributes.insert(key.clone(), value.into());
            (state.observer.clone(), state.change(ChangeKind::Field).with_field(key))
        };
        if let Some(observer) = observer {
            observer.notify(&change);
        }
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Value> {
        let (removed, observer, change) = {
            let mut state = self.write();
            let removed = state.attributes.shift_remove(key);
            (removed, state.observer.clone(), state.change(ChangeKind::Field).with_field(key))
        };
        if removed.is_some() {
            if let Some(observer) = observer {
                observer.notify(&change);
            }
        }
        removed
    }

    pub fn attributes(&self) -> Map<String, Value> {
        self.read().attributes.clone()
    }

    pub fn relationship_names(&self) -> Vec<String> {
        self.read().relationships.keys().cloned().collect()
    }

    pub fn related(&self, name: &str) -> Option<Relation> {
        let state = self.read();
        let slot = state.relationships.get(name)?;
        Some(match &slot.entries {
            SlotEntries::One(one) => Relation::One(Some(one.resolve())),
            SlotEntries::Many(many) => Relation::Many(many.iter().map(SlotRef::resolve).collect()),
        })
    }

    pub fn foreign_key(&self, name: &str) -> Option<ForeignKey> {
        self.read().foreign_keys.get(name).cloned()
    }

    /// Type of the records a relationship points at.
    pub fn relationship_type(&self, name: &str) -> Option<String> {
        let state = self.read();
        state
            .relationships
            .get(name)
            .map(|slot| slot.target_type.clone())
            .or_else(|| {
                state
                    .schema
                    .as_ref()
                    .and_then(|schema| schema.relationship_type(name).map(str::to_string))
            })
    }

    /// Point a relationship at `targets`; the foreign key follows.
    pub(crate) fn assign_slot(
        &self,
        name: &str,
        target_type: &str,
        members: OneOrMany<Identifier>,
        targets: &[Option<Record>],
    ) {
        let foreign_key = match &members {
            OneOrMany::One(member) => ForeignKey::One(member.id.clone()),
            OneOrMany::Many(members) => {
                ForeignKey::Many(members.iter().map(|member| member.id.clone()).collect())
            }
        };
        let mut refs = members
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(i, member)| SlotRef::new(member, targets.get(i).and_then(Option::as_ref)));

        let entries = match &foreign_key {
            ForeignKey::One(_) => match refs.next() {
                Some(one) => SlotEntries::One(one),
                None => return,
            },
            ForeignKey::Many(_) => SlotEntries::Many(refs.collect()),
        };

        let mut state = self.write();
        state.relationships.insert(
            name.to_string(),
            RelationSlot {
                target_type: target_type.to_string(),
                entries,
            },
        );
        state.foreign_keys.insert(name.to_string(), foreign_key);
    }

    pub fn links(&self) -> Links {
        self.read().internal.links.clone()
    }

    pub fn link(&self, name: &str) -> Option<Link> {
        self.read().internal.links.get(name).cloned().flatten()
    }

    pub fn meta(&self) -> Map<String, Value> {
        self.read().internal.meta.clone()
    }

    pub fn relationship_links(&self, name: &str) -> Option<Links> {
        self.read().internal.relationship_links.get(name).cloned()
    }

    /// Evaluate a derived field from the record's schema.
    pub fn derived(&self, name: &str) -> Option<Value> {
        let compute = self.read().schema.as_ref()?.derived_fn(name)?.clone();
        Some(compute(self))
    }

    /// Flat view: `id`, attributes and `<relationship>Id` fields.
    pub fn to_value(&self) -> Value {
        let state = self.read();
        let mut object = Map::new();
        if let Some(id) = &state.id {
            object.insert("id".to_string(), Value::from(id.clone()));
        }
        for (key, value) in &state.attributes {
            object.insert(key.clone(), value.clone());
        }
        for (name, foreign_key) in &state.foreign_keys {
            object.insert(format!("{}{}", name, FOREIGN_KEY_SUFFIX), foreign_key.to_value());
        }
        Value::Object(object)
    }

    /// Resource object sent to the server on save.
    ///
    /// The id is included once persisted, or earlier when the type generates
    /// ids on the client.
    pub fn to_json_api(&self) -> Resource {
        let state = self.read();
        let client_ids = state
            .schema
            .as_ref()
            .map(|schema| schema.uses_client_ids())
            .unwrap_or(false);
        let send_id = state.status == RecordStatus::Persisted || client_ids;

        let mut resource = Resource::new(
            state.record_type.clone(),
            if send_id { state.id.clone() } else { None },
        );
        for (key, value) in &state.attributes {
            if key == "id" || key == "type" {
                continue;
            }
            resource.attributes.insert(key.clone(), value.clone());
        }

        for (name, foreign_key) in &state.foreign_keys {
            let slot = state.relationships.get(name);
            let declared = slot
                .map(|slot| slot.target_type.clone())
                .or_else(|| {
                    state
                        .schema
                        .as_ref()
                        .and_then(|schema| schema.relationship_type(name).map(str::to_string))
                })
                .unwrap_or_else(|| name.clone());
            let identifier = |index: usize, id: &Id| {
                let member_type = slot.map(|slot| slot.member_type(index, id).to_string());
                Identifier::new(member_type.unwrap_or_else(|| declared.clone()), id.clone())
            };
            let data = match foreign_key {
                ForeignKey::One(id) => OneOrMany::One(identifier(0, id)),
                ForeignKey::Many(ids) => OneOrMany::Many(
                    ids.iter()
                        .enumerate()
                        .map(|(index, id)| identifier(index, id))
                        .collect(),
                ),
            };
            resource.relationships.insert(
                name.clone(),
                RelationshipObject {
                    data: Some(data),
                    ..Default::default()
                },
            );
        }
        resource
    }

    /// Deserialize the flat view into a typed model.
    pub fn to_model<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Record")
            .field("type", &state.record_type)
            .field("id", &state.id)
            .field("status", &state.status)
            .field("attributes", &state.attributes)
            .finish_non_exhaustive()
    }
}
