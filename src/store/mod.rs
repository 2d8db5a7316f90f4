//! Identity-map store.
//!
//! At most one [`Record`] lives per `(type, id)`. Records that have no server
//! id yet are keyed by their local id until they are saved. The identity map
//! and the request cache are the only shared mutable state; both sit behind
//! locks owned by the store and are only touched through its methods.

mod cache;
mod network;
mod relationships;
mod sync;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::document::Id;
use crate::error::StoreError;
use crate::observe::{Change, ChangeKind};
use crate::query::{build_url, prefix_url, RequestOptions};
use crate::record::{Record, RecordStatus};
use crate::schema::{Resource, Schema};

use self::cache::RequestCache;

pub use self::cache::SharedFetch;
pub use self::network::{QueueState, SaveOutcome};
pub(crate) use self::network::load;
pub(crate) use self::relationships::copy_state;

/// Identity-map key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum RecordKey {
    Server(Id),
    Local(u64),
}

impl RecordKey {
    pub(crate) fn of(record: &Record) -> Self {
        let state = record.read();
        match &state.id {
            Some(id) => RecordKey::Server(id.clone()),
            None => RecordKey::Local(state.local_id),
        }
    }
}

#[derive(Default)]
pub(crate) struct IdentityMap {
    seq: u64,
    types: HashMap<String, HashMap<RecordKey, (u64, Record)>>,
}

impl IdentityMap {
    pub(crate) fn get(&self, record_type: &str, id: &Id) -> Option<Record> {
        self.types
            .get(record_type)?
            .get(&RecordKey::Server(id.clone()))
            .map(|(_, record)| record.clone())
    }

    pub(crate) fn insert(&mut self, record: Record) -> Option<Record> {
        self.seq += 1;
        let seq = self.seq;
        self.insert_at(seq, record)
    }

    fn insert_at(&mut self, seq: u64, record: Record) -> Option<Record> {
        let record_type = record.record_type();
        let key = RecordKey::of(&record);
        self.types
            .entry(record_type)
            .or_default()
            .insert(key, (seq, record))
            .map(|(_, previous)| previous)
    }

    /// Remove the entry at `key` if it holds `record`. Returns its sequence number.
    pub(crate) fn remove_exact(
        &mut self,
        record_type: &str,
        key: &RecordKey,
        record: &Record,
    ) -> Option<u64> {
        let bucket = self.types.get_mut(record_type)?;
        match bucket.get(key) {
            Some((_, held)) if held.ptr_eq(record) => bucket.remove(key).map(|(seq, _)| seq),
            _ => None,
        }
    }

    pub(crate) fn remove(&mut self, record_type: &str, key: &RecordKey) -> Option<Record> {
        self.types
            .get_mut(record_type)?
            .remove(key)
            .map(|(_, record)| record)
    }

    pub(crate) fn contains(&self, record: &Record) -> bool {
        let record_type = record.record_type();
        let key = RecordKey::of(record);
        self.types
            .get(&record_type)
            .and_then(|bucket| bucket.get(&key))
            .map(|(_, held)| held.ptr_eq(record))
            .unwrap_or(false)
    }

    /// Records of one type in insertion order.
    pub(crate) fn all(&self, record_type: &str) -> Vec<Record> {
        let mut entries: Vec<&(u64, Record)> = match self.types.get(record_type) {
            Some(bucket) => bucket.values().collect(),
            None => return Vec::new(),
        };
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, record)| record.clone()).collect()
    }

    pub(crate) fn records(&self) -> impl Iterator<Item = &Record> {
        self.types
            .values()
            .flat_map(|bucket| bucket.values().map(|(_, record)| record))
    }

    pub(crate) fn take_type(&mut self, record_type: &str) -> Vec<Record> {
        let mut entries: Vec<(u64, Record)> = self
            .types
            .remove(record_type)
            .map(|bucket| bucket.into_values().collect())
            .unwrap_or_default();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, record)| record).collect()
    }

    pub(crate) fn clear(&mut self) -> Vec<Record> {
        let records = self.records().cloned().collect();
        self.types.clear();
        records
    }

    pub(crate) fn len(&self) -> usize {
        self.types.values().map(HashMap::len).sum()
    }
}

pub(crate) struct Inner {
    config: Arc<Config>,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
    records: RwLock<IdentityMap>,
    cache: Mutex<RequestCache>,
}

/// The record store. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Non-owning store handle, held by responses.
#[derive(Clone)]
pub(crate) struct WeakStore(Weak<Inner>);

impl WeakStore {
    pub(crate) fn upgrade(&self) -> Option<Store> {
        self.0.upgrade().map(|inner| Store { inner })
    }
}

impl Store {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                schemas: RwLock::new(HashMap::new()),
                records: RwLock::new(IdentityMap::default()),
                cache: Mutex::new(RequestCache::default()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn shared_config(&self) -> Arc<Config> {
        self.inner.config.clone()
    }

    pub(crate) fn downgrade(&self) -> WeakStore {
        WeakStore(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn records_read(
        &self,
        op: &'static str,
    ) -> Result<RwLockReadGuard<'_, IdentityMap>, StoreError> {
        self.inner
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned(op))
    }

    pub(crate) fn records_write(
        &self,
        op: &'static str,
    ) -> Result<RwLockWriteGuard<'_, IdentityMap>, StoreError> {
        self.inner
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned(op))
    }

    pub(crate) fn cache(&self) -> Result<MutexGuard<'_, RequestCache>, StoreError> {
        self.inner
            .cache
            .lock()
            .map_err(|_| StoreError::LockPoisoned("request cache"))
    }

    pub(crate) fn notify(&self, changes: &[Change]) {
        if let Some(observer) = &self.inner.config.observer {
            for change in changes {
                observer.notify(change);
            }
        }
    }

    pub(crate) fn attach(&self, record: &Record) {
        record.set_observer(self.inner.config.observer.clone());
    }

    // ---- types ----

    pub fn register(&self, schema: Schema) -> Result<(), StoreError> {
        let mut schemas = self
            .inner
            .schemas
            .write()
            .map_err(|_| StoreError::LockPoisoned("schema write"))?;
        schemas.insert(schema.record_type().to_string(), Arc::new(schema));
        Ok(())
    }

    pub fn register_type<T: Resource>(&self) -> Result<(), StoreError> {
        self.register(T::schema())
    }

    pub fn schema(&self, record_type: &str) -> Option<Arc<Schema>> {
        self.inner
            .schemas
            .read()
            .ok()
            .and_then(|schemas| schemas.get(record_type).cloned())
    }

    pub(crate) fn schemas(&self) -> Result<HashMap<String, Arc<Schema>>, StoreError> {
        self.inner
            .schemas
            .read()
            .map(|schemas| schemas.clone())
            .map_err(|_| StoreError::LockPoisoned("schema read"))
    }

    /// URL path segment for a type.
    pub fn path_for(&self, record_type: &str) -> String {
        self.schema(record_type)
            .map(|schema| schema.path().to_string())
            .unwrap_or_else(|| record_type.to_string())
    }

    pub fn url_for(
        &self,
        record_type: &str,
        id: Option<&Id>,
        options: Option<&RequestOptions>,
    ) -> String {
        let config = self.config();
        build_url(
            &config.base_url,
            &self.path_for(record_type),
            id,
            options,
            config.param_array_type,
        )
    }

    /// URL a record is saved to and deleted from.
    pub fn record_url(&self, record: &Record) -> String {
        if let Some(link) = record.link("self") {
            return link.href().to_string();
        }
        let path = self.path_for(&record.record_type());
        match record.id() {
            Some(id) if record.is_persisted() => {
                prefix_url(&self.config().base_url, &format!("{}/{}", path, id))
            }
            _ => prefix_url(&self.config().base_url, &path),
        }
    }

    // ---- local CRUD ----

    /// Build a new unpersisted record of `record_type` and add it.
    pub fn create(
        &self,
        record_type: &str,
        attributes: Map<String, Value>,
    ) -> Result<Record, StoreError> {
        let record = match self.schema(record_type) {
            Some(schema) => {
                let id = schema.generate_id();
                let record = Record::with_schema(schema);
                match id {
                    Some(id) => record.with_id(id),
                    None => record,
                }
            }
            None => Record::new(record_type),
        };
        self.add(record.with_attributes(attributes))
    }

    /// Add a record; it replaces any record under the same key.
    pub fn add(&self, record: Record) -> Result<Record, StoreError> {
        self.attach(&record);
        let replaced = {
            let mut map = self.records_write("add")?;
            map.insert(record.clone())
        };
        let change = Change::new(
            ChangeKind::Added,
            record.record_type(),
            record.id().map(|id| id.as_key()),
        );
        if let Some(previous) = replaced.filter(|previous| !previous.ptr_eq(&record)) {
            previous.set_status(RecordStatus::Removed);
        }
        self.notify(&[change]);
        Ok(record)
    }

    pub fn find(&self, record_type: &str, id: impl Into<Id>) -> Result<Option<Record>, StoreError> {
        let id = id.into();
        Ok(self.records_read("find")?.get(record_type, &id))
    }

    pub fn find_all(&self, record_type: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self.records_read("find_all")?.all(record_type))
    }

    pub fn contains(&self, record: &Record) -> Result<bool, StoreError> {
        Ok(self.records_read("contains")?.contains(record))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records_read("len")?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Number of cached `fetch` and `fetch_all` requests.
    pub fn cached_requests(&self) -> Result<usize, StoreError> {
        Ok(self.cache()?.len())
    }

    /// Remove one record locally.
    pub fn remove(
        &self,
        record_type: &str,
        id: impl Into<Id>,
    ) -> Result<Option<Record>, StoreError> {
        let key = RecordKey::Server(id.into());
        let removed = self.records_write("remove")?.remove(record_type, &key);
        if let Some(record) = &removed {
            self.detach(record)?;
        }
        Ok(removed)
    }

    /// Remove this exact record locally. Returns whether it was in the store.
    pub fn remove_record(&self, record: &Record) -> Result<bool, StoreError> {
        let record_type = record.record_type();
        let key = RecordKey::of(record);
        let removed = self
            .records_write("remove")?
            .remove_exact(&record_type, &key, record)
            .is_some();
        if removed {
            self.detach(record)?;
        }
        Ok(removed)
    }

    fn detach(&self, record: &Record) -> Result<(), StoreError> {
        record.set_status(RecordStatus::Removed);
        self.cache()?.evict_links(record.local_id());
        let record_type = record.record_type();
        if let Some(id) = record.id() {
            let url = build_url(
                &self.config().base_url,
                &self.path_for(&record_type),
                Some(&id),
                None,
                self.config().param_array_type,
            );
            let evicted = self.cache()?.evict_url(&record_type, &url);
            if evicted > 0 {
                debug!(
                    record_type = %record_type,
                    %id,
                    evicted,
                    "evicted cached fetches of removed record"
                );
            }
        }
        self.notify(&[Change::new(
            ChangeKind::Removed,
            record_type,
            record.id().map(|id| id.as_key()),
        )]);
        Ok(())
    }

    /// Remove every record of a type and every cached request for it.
    pub fn remove_all(&self, record_type: &str) -> Result<Vec<Record>, StoreError> {
        let removed = self.records_write("remove_all")?.take_type(record_type);
        let evicted = {
            let mut cache = self.cache()?;
            for record in &removed {
                cache.evict_links(record.local_id());
            }
            cache.evict_type(record_type)
        };
        debug!(record_type, removed = removed.len(), evicted, "removed all records of type");

        let changes: Vec<Change> = removed
            .iter()
            .map(|record| {
                record.set_status(RecordStatus::Removed);
                Change::new(ChangeKind::Removed, record_type, record.id().map(|id| id.as_key()))
            })
            .collect();
        self.notify(&changes);
        Ok(removed)
    }

    /// Drop all records and all cached requests.
    pub fn reset(&self) -> Result<(), StoreError> {
        let removed = self.records_write("reset")?.clear();
        self.cache()?.clear();
        debug!(removed = removed.len(), "store reset");

        let changes: Vec<Change> = removed
            .iter()
            .map(|record| {
                record.set_status(RecordStatus::Removed);
                Change::new(
                    ChangeKind::Removed,
                    record.record_type(),
                    record.id().map(|id| id.as_key()),
                )
            })
            .collect();
        self.notify(&changes);
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("records", &self.len().unwrap_or_default())
            .finish()
    }
}
