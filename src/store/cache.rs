use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, Shared};

use crate::error::StoreError;
use crate::response::Response;

/// A request every caller can await. Clones share one underlying request.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Response>, StoreError>>>;

pub(crate) struct CacheEntry {
    generation: u64,
    fetch: SharedFetch,
}

/// In-flight and completed requests, keyed by URL.
///
/// `fetch` entries are grouped by record type. `fetch_all` entries are keyed
/// by URL alone and remember the type they were issued for, so both tables
/// can be evicted per type. Each entry carries the generation it was created
/// in; a failing request only evicts its own entry, never a newer one issued
/// with `force` while it was in flight.
///
/// Link fetches are memoized per record, keyed by the record's local id. They
/// live here rather than on the record: a response to a record's own link
/// holds that record, and the store drops the entry when the record leaves.
#[derive(Default)]
pub(crate) struct RequestCache {
    generation: u64,
    fetch: HashMap<String, HashMap<String, CacheEntry>>,
    fetch_all: HashMap<String, (String, CacheEntry)>,
    links: HashMap<u64, HashMap<String, SharedFetch>>,
}

impl RequestCache {
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) fn get_fetch(&self, record_type: &str, url: &str) -> Option<SharedFetch> {
        self.fetch
            .get(record_type)?
            .get(url)
            .map(|entry| entry.fetch.clone())
    }

    pub(crate) fn insert_fetch(
        &mut self,
        record_type: &str,
        url: String,
        generation: u64,
        fetch: SharedFetch,
    ) {
        self.fetch
            .entry(record_type.to_string())
            .or_default()
            .insert(url, CacheEntry { generation, fetch });
    }

    pub(crate) fn evict_fetch(&mut self, record_type: &str, url: &str, generation: u64) -> bool {
        let Some(bucket) = self.fetch.get_mut(record_type) else {
            return false;
        };
        match bucket.get(url) {
            Some(entry) if entry.generation == generation => {
                bucket.remove(url);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get_fetch_all(&self, url: &str) -> Option<SharedFetch> {
        self.fetch_all.get(url).map(|(_, entry)| entry.fetch.clone())
    }

    pub(crate) fn insert_fetch_all(
        &mut self,
        record_type: &str,
        url: String,
        generation: u64,
        fetch: SharedFetch,
    ) {
        self.fetch_all
            .insert(url, (record_type.to_string(), CacheEntry { generation, fetch }));
    }

    pub(crate) fn evict_fetch_all(&mut self, url: &str, generation: u64) -> bool {
        match self.fetch_all.get(url) {
            Some((_, entry)) if entry.generation == generation => {
                self.fetch_all.remove(url);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get_link(&self, local_id: u64, key: &str) -> Option<SharedFetch> {
        self.links.get(&local_id)?.get(key).cloned()
    }

    pub(crate) fn insert_link(&mut self, local_id: u64, key: String, fetch: SharedFetch) {
        self.links.entry(local_id).or_default().insert(key, fetch);
    }

    /// Forget every link fetched for a record.
    pub(crate) fn evict_links(&mut self, local_id: u64) -> usize {
        self.links.remove(&local_id).map(|links| links.len()).unwrap_or(0)
    }

    /// Evict `fetch` entries of a type whose URL is `url`, with or without a query.
    pub(crate) fn evict_url(&mut self, record_type: &str, url: &str) -> usize {
        let Some(bucket) = self.fetch.get_mut(record_type) else {
            return 0;
        };
        let before = bucket.len();
        let with_query = format!("{}?", url);
        bucket.retain(|key, _| key != url && !key.starts_with(&with_query));
        before - bucket.len()
    }

    /// Evict every entry issued for a type.
    pub(crate) fn evict_type(&mut self, record_type: &str) -> usize {
        let fetched = self.fetch.remove(record_type).map(|bucket| bucket.len()).unwrap_or(0);
        let before = self.fetch_all.len();
        self.fetch_all.retain(|_, (owner, _)| owner != record_type);
        fetched + before - self.fetch_all.len()
    }

    pub(crate) fn clear(&mut self) {
        self.fetch.clear();
        self.fetch_all.clear();
        self.links.clear();
    }

    /// Number of cached `fetch` and `fetch_all` requests.
    pub(crate) fn len(&self) -> usize {
        self.fetch.values().map(HashMap::len).sum::<usize>() + self.fetch_all.len()
    }
}
