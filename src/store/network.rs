use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};
use tracing::debug;

use super::Store;
use crate::config::Config;
use crate::document::{Id, OneOrMany};
use crate::error::StoreError;
use crate::query::{prefix_url, RequestOptions};
use crate::record::{Record, RecordStatus};
use crate::response::{self, Response};
use crate::store::SharedFetch;
use crate::transport::{Adapter, Headers, Method};

/// Outcome of [`Store::save`].
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// The record is saved; this is the same instance that was passed in.
    Persisted(Record),
    /// The server queued the create (202). Holds the job record.
    Queued(Record),
}

impl SaveOutcome {
    pub fn record(&self) -> &Record {
        match self {
            SaveOutcome::Persisted(record) | SaveOutcome::Queued(record) => record,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, SaveOutcome::Queued(_))
    }
}

/// Result of polling a queued job.
#[derive(Debug, Clone)]
pub enum QueueState {
    Pending(Record),
    Resolved(Record),
}

/// Run one request and wrap the outcome in a [`Response`].
pub(crate) async fn load(
    config: &Config,
    store: Option<&Store>,
    method: Method,
    url: &str,
    body: Option<Value>,
    headers: &Headers,
    options: Option<RequestOptions>,
) -> Result<Arc<Response>, StoreError> {
    let raw = Adapter::execute(config, method, url, body, headers).await;
    let config = match store {
        Some(store) => store.shared_config(),
        None => Arc::new(config.clone()),
    };
    Response::from_raw(raw, store, config, options).map(Arc::new)
}

fn headers_of(options: Option<&RequestOptions>) -> Headers {
    options.map(|options| options.headers.clone()).unwrap_or_default()
}

fn failed(err: StoreError) -> SharedFetch {
    futures::future::ready(Err(err)).boxed().shared()
}

impl Store {
    fn get(&self, url: String, options: Option<RequestOptions>) -> SharedFetch {
        let store = self.clone();
        async move {
            let headers = headers_of(options.as_ref());
            load(
                &store.shared_config(),
                Some(&store),
                Method::Get,
                &url,
                None,
                &headers,
                options,
            )
            .await
        }
        .boxed()
        .shared()
    }

    /// Fetch one record.
    ///
    /// Concurrent calls for the same URL share one request. A failed request
    /// is dropped from the cache before its error is returned, so the next
    /// call retries. `force` always issues a new request.
    pub fn fetch(
        &self,
        record_type: &str,
        id: impl Into<Id>,
        force: bool,
        options: Option<&RequestOptions>,
    ) -> SharedFetch {
        let id = id.into();
        let url = self.url_for(record_type, Some(&id), options);
        let options = options.cloned();

        if !self.config().cache {
            return self.get(url, options);
        }

        let mut cache = match self.cache() {
            Ok(cache) => cache,
            Err(err) => return failed(err),
        };
        if !force {
            if let Some(hit) = cache.get_fetch(record_type, &url) {
                debug!(%url, "fetch cache hit");
                return hit;
            }
        }

        debug!(%url, force, "fetch cache miss");
        let generation = cache.next_generation();
        let request = self.get(url.clone(), options);
        let store = self.clone();
        let owner = record_type.to_string();
        let key = url.clone();
        let fetch = async move {
            let result = request.await;
            if result.is_err() {
                if let Ok(mut cache) = store.cache() {
                    if cache.evict_fetch(&owner, &key, generation) {
                        debug!(url = %key, "evicted failed fetch");
                    }
                }
            }
            result
        }
        .boxed()
        .shared();

        cache.insert_fetch(record_type, url, generation, fetch.clone());
        fetch
    }

    /// Fetch the collection of a type. Cached by URL like [`Store::fetch`].
    pub fn fetch_all(
        &self,
        record_type: &str,
        force: bool,
        options: Option<&RequestOptions>,
    ) -> SharedFetch {
        let url = self.url_for(record_type, None, options);
        let options = options.cloned();

        if !self.config().cache {
            return self.get(url, options);
        }

        let mut cache = match self.cache() {
            Ok(cache) => cache,
            Err(err) => return failed(err),
        };
        if !force {
            if let Some(hit) = cache.get_fetch_all(&url) {
                debug!(%url, "fetch_all cache hit");
                return hit;
            }
        }

        debug!(%url, force, "fetch_all cache miss");
        let generation = cache.next_generation();
        let request = self.get(url.clone(), options);
        let store = self.clone();
        let key = url.clone();
        let fetch = async move {
            let result = request.await;
            if result.is_err() {
                if let Ok(mut cache) = store.cache() {
                    if cache.evict_fetch_all(&key, generation) {
                        debug!(url = %key, "evicted failed fetch_all");
                    }
                }
            }
            result
        }
        .boxed()
        .shared();

        cache.insert_fetch_all(record_type, url, generation, fetch.clone());
        fetch
    }

    /// Uncached request against a path relative to the base URL.
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        body: Option<Value>,
        options: Option<&RequestOptions>,
    ) -> Result<Arc<Response>, StoreError> {
        let url = prefix_url(&self.config().base_url, url);
        load(
            self.config(),
            Some(self),
            method,
            &url,
            body,
            &headers_of(options),
            options.cloned(),
        )
        .await
    }

    /// Create or update a record on the server.
    ///
    /// A 202 answer means the server queued the create: the returned job
    /// record points back at `record`, which stays [`RecordStatus::Queued`]
    /// until [`Store::poll_queue`] sees the final resource.
    pub async fn save(
        &self,
        record: &Record,
        options: Option<&RequestOptions>,
    ) -> Result<SaveOutcome, StoreError> {
        let previous = record.status();
        let method = if previous == RecordStatus::Persisted {
            self.config().update_method
        } else {
            Method::Post
        };
        let url = self.record_url(record);
        let body = json!({ "data": record.to_json_api() });
        let in_store = self.contains(record)?;

        record.set_status(RecordStatus::Submitted);
        let headers = headers_of(options);
        let raw = Adapter::execute(self.config(), method, &url, Some(body), &headers).await;
        let status = raw.status;

        let response = match Response::from_raw(
            raw,
            in_store.then_some(self),
            self.shared_config(),
            options.cloned(),
        ) {
            Ok(response) => response,
            Err(err) => {
                record.set_status(previous);
                return Err(err);
            }
        };

        match status {
            Some(204) => {
                record.set_status(RecordStatus::Persisted);
                Ok(SaveOutcome::Persisted(record.clone()))
            }
            Some(202) => {
                let Some(job) = response.record() else {
                    record.set_status(previous);
                    return Err(StoreError::InvalidDocument(
                        "a queued save must return the job resource".to_string(),
                    ));
                };
                job.set_queued_for(Some(record.clone()));
                record.set_status(RecordStatus::Queued);
                debug!(url = %url, job_type = %job.record_type(), "save queued");
                Ok(SaveOutcome::Queued(job))
            }
            _ => {
                if response.record().is_some() {
                    response.replace_data(record)?;
                }
                record.set_status(RecordStatus::Persisted);
                Ok(SaveOutcome::Persisted(record.clone()))
            }
        }
    }

    /// Delete a record on the server and drop it from the store.
    ///
    /// Only a persisted record with an id is deleted remotely. Anything else,
    /// including a record whose create is still queued, is removed locally.
    pub async fn remove_record_remote(
        &self,
        record: &Record,
        options: Option<&RequestOptions>,
    ) -> Result<bool, StoreError> {
        if record.status() != RecordStatus::Persisted || record.id().is_none() {
            self.remove_record(record)?;
            record.set_status(RecordStatus::Removed);
            return Ok(true);
        }

        let url = self.record_url(record);
        let in_store = self.contains(record)?;
        let headers = headers_of(options);
        let raw = Adapter::execute(self.config(), Method::Delete, &url, None, &headers).await;
        Response::from_raw(raw, in_store.then_some(self), self.shared_config(), options.cloned())?;

        self.remove_record(record)?;
        record.set_status(RecordStatus::Removed);
        Ok(true)
    }

    /// Remove a record by type and id, remotely and locally. A record that is
    /// not in the store counts as already removed.
    pub async fn destroy(
        &self,
        record_type: &str,
        id: impl Into<Id>,
        options: Option<&RequestOptions>,
    ) -> Result<bool, StoreError> {
        match self.find(record_type, id)? {
            Some(record) => self.remove_record_remote(&record, options).await,
            None => Ok(true),
        }
    }

    /// PATCH a relationship's `self` link with its current members.
    pub async fn save_relationship(
        &self,
        record: &Record,
        name: &str,
        options: Option<&RequestOptions>,
    ) -> Result<Record, StoreError> {
        let href = record
            .relationship_links(name)
            .and_then(|links| links.get("self").cloned().flatten())
            .map(|link| link.href().to_string())
            .ok_or_else(|| StoreError::MissingSelfLink {
                relationship: name.to_string(),
            })?;

        let target_type = record.relationship_type(name).unwrap_or_else(|| name.to_string());
        let members = record
            .to_json_api()
            .relationships
            .remove(name)
            .and_then(|relationship| relationship.data);
        let data = match members {
            Some(members) => serde_json::to_value(members)?,
            None => Value::Array(Vec::new()),
        };

        let response = self
            .request(&href, Method::Patch, Some(json!({ "data": data })), options)
            .await?;

        if let Some(members) = response.data() {
            let target_type = members
                .iter()
                .next()
                .map(Record::record_type)
                .unwrap_or(target_type);
            let ids: Vec<Id> = members.iter().filter_map(Record::id).collect();
            let ids = match members {
                OneOrMany::One(_) => ids.into_iter().next().map(OneOrMany::One),
                OneOrMany::Many(_) => Some(OneOrMany::Many(ids)),
            };
            if let Some(ids) = ids {
                self.assign_ref(record, name, &target_type, ids)?;
            }
        }
        Ok(record.clone())
    }

    /// Fetch one of the record's own links. Memoized per record unless `force`.
    ///
    /// For a queued job, a response of the waiting record's type completes the
    /// queue: the waiting record takes over the result's identity and data.
    pub fn fetch_link(
        &self,
        record: &Record,
        name: &str,
        force: bool,
        options: Option<&RequestOptions>,
    ) -> SharedFetch {
        let key = format!("links.{}", name);
        if !force {
            match self.memoized_link(record, &key) {
                Ok(Some(hit)) => return hit,
                Ok(None) => {}
                Err(err) => return failed(err),
            }
        }

        let fetch = response::fetch_link(
            record.link(name),
            Some(self.clone()),
            self.shared_config(),
            headers_of(options),
            options.cloned(),
        );

        let fetch = match record.queued_for() {
            Some(_) => {
                let store = self.clone();
                let job = record.clone();
                async move {
                    let response = fetch.await?;
                    store.complete_queue(&job, response)
                }
                .boxed()
                .shared()
            }
            None => fetch,
        };

        self.memoize_link(record, key, fetch)
    }

    /// Fetch a link of one of the record's relationships (`self`, `related`).
    pub fn fetch_relationship_link(
        &self,
        record: &Record,
        relationship: &str,
        name: &str,
        force: bool,
        options: Option<&RequestOptions>,
    ) -> SharedFetch {
        let key = format!("relationships.{}.{}", relationship, name);
        if !force {
            match self.memoized_link(record, &key) {
                Ok(Some(hit)) => return hit,
                Ok(None) => {}
                Err(err) => return failed(err),
            }
        }

        let link = record
            .relationship_links(relationship)
            .and_then(|links| links.get(name).cloned().flatten());
        let fetch = response::fetch_link(
            link,
            Some(self.clone()),
            self.shared_config(),
            headers_of(options),
            options.cloned(),
        );
        self.memoize_link(record, key, fetch)
    }

    fn memoized_link(&self, record: &Record, key: &str) -> Result<Option<SharedFetch>, StoreError> {
        Ok(self.cache()?.get_link(record.local_id(), key))
    }

    fn memoize_link(&self, record: &Record, key: String, fetch: SharedFetch) -> SharedFetch {
        match self.cache() {
            Ok(mut cache) => {
                cache.insert_link(record.local_id(), key, fetch.clone());
                fetch
            }
            Err(err) => failed(err),
        }
    }

    fn complete_queue(
        &self,
        job: &Record,
        response: Arc<Response>,
    ) -> Result<Arc<Response>, StoreError> {
        let (Some(client), Some(result)) = (job.queued_for(), response.record()) else {
            return Ok(response);
        };
        let result_type = result.record_type();
        if result_type == job.record_type() || result_type != client.record_type() {
            return Ok(response);
        }

        let replaced = response.replace_data(&client)?;
        client.set_status(RecordStatus::Persisted);
        job.set_queued_for(None);
        debug!(record_type = %result_type, id = ?client.id(), "queued save completed");
        Ok(Arc::new(replaced))
    }

    /// Poll a queued job once through its `self` link.
    pub async fn poll_queue(&self, job: &Record) -> Result<QueueState, StoreError> {
        let client = job.queued_for().ok_or(StoreError::NotQueued)?;
        self.fetch_link(job, "self", true, None).await?;

        if client.status() == RecordStatus::Persisted {
            Ok(QueueState::Resolved(client))
        } else {
            Ok(QueueState::Pending(job.clone()))
        }
    }
}
