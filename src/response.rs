//! Response / link envelope.
//!
//! A [`Response`] wraps one request's outcome: the synced record(s), the
//! document's `meta`, `links` and `jsonapi` members, headers and status. A
//! failed request never produces an `Ok(Response)`; the response travels
//! inside [`StoreError::Response`] instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::document::{Document, Link, Links, OneOrMany};
use crate::error::{ResponseError, StoreError};
use crate::query::RequestOptions;
use crate::record::{flatten, Record};
use crate::store::{self, SharedFetch, Store, WeakStore};
use crate::transport::{Headers, Method, RawResponse};

pub struct Response {
    data: Option<OneOrMany<Record>>,
    meta: Map<String, Value>,
    links: Links,
    jsonapi: Map<String, Value>,
    headers: Headers,
    request_headers: Headers,
    status: Option<u16>,
    error: Option<ResponseError>,
    store: Option<WeakStore>,
    config: Arc<Config>,
    options: Option<RequestOptions>,
    resolved: Mutex<HashMap<String, SharedFetch>>,
}

impl Response {
    /// Build a response from a transport result.
    ///
    /// With a store the body is synced and `data` holds the synced records.
    /// Without one, `data` is a single detached record; a collection is
    /// rejected with [`StoreError::CollectionReturned`].
    pub fn from_raw(
        raw: RawResponse,
        store: Option<&Store>,
        config: Arc<Config>,
        options: Option<RequestOptions>,
    ) -> Result<Response, StoreError> {
        let document = match &raw.body {
            Some(body) => match Document::from_value(body) {
                Ok(document) => document,
                Err(_) if raw.error.is_some() => Document::default(),
                Err(err) => return Err(StoreError::InvalidDocument(err.to_string())),
            },
            None => Document::default(),
        };

        let error = match &document.errors {
            Some(errors) if !errors.is_empty() => Some(ResponseError::JsonApi(errors.clone())),
            _ => raw.error.clone().map(ResponseError::Transport),
        };

        let data = if error.is_some() {
            None
        } else if let Some(store) = store {
            store.sync(&document)?
        } else {
            match &document.data {
                Some(OneOrMany::Many(_)) => return Err(StoreError::CollectionReturned),
                Some(OneOrMany::One(resource)) => {
                    Some(OneOrMany::One(Record::from_flattened(flatten(resource), None)))
                }
                None => None,
            }
        };

        let response = Response {
            data,
            meta: document.meta,
            links: document.links,
            jsonapi: document.jsonapi,
            headers: raw.headers,
            request_headers: raw.request_headers,
            status: raw.status,
            error,
            store: store.map(Store::downgrade),
            config,
            options,
            resolved: Mutex::new(HashMap::new()),
        };

        match response.error {
            Some(_) => Err(StoreError::Response(Arc::new(response))),
            None => Ok(response),
        }
    }

    /// A response with no data, used for links that point nowhere.
    pub fn empty(store: Option<&Store>, config: Arc<Config>) -> Response {
        Response {
            data: None,
            meta: Map::new(),
            links: Links::new(),
            jsonapi: Map::new(),
            headers: Headers::new(),
            request_headers: Headers::new(),
            status: None,
            error: None,
            store: store.map(Store::downgrade),
            config,
            options: None,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// A copy of this response whose data is `record`, after `record` has
    /// taken over the identity of this response's record.
    pub fn replace_data(&self, record: &Record) -> Result<Response, StoreError> {
        if let Some(OneOrMany::One(current)) = &self.data {
            match self.store() {
                Some(store) => {
                    store.replace_data(current, record)?;
                }
                None => {
                    if !current.ptr_eq(record) {
                        store::copy_state(current, record);
                    }
                }
            }
        }

        Ok(Response {
            data: Some(OneOrMany::One(record.clone())),
            meta: self.meta.clone(),
            links: self.links.clone(),
            jsonapi: self.jsonapi.clone(),
            headers: self.headers.clone(),
            request_headers: self.request_headers.clone(),
            status: self.status,
            error: None,
            store: self.store.clone(),
            config: self.config.clone(),
            options: self.options.clone(),
            resolved: Mutex::new(HashMap::new()),
        })
    }

    pub fn data(&self) -> Option<&OneOrMany<Record>> {
        self.data.as_ref()
    }

    /// The single record, when `data` is one resource.
    pub fn record(&self) -> Option<Record> {
        self.data.as_ref()?.as_one().cloned()
    }

    pub fn records(&self) -> Vec<Record> {
        self.data
            .as_ref()
            .map(|data| data.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn jsonapi(&self) -> &Map<String, Value> {
        &self.jsonapi
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn request_headers(&self) -> &Headers {
        &self.request_headers
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn error(&self) -> Option<&ResponseError> {
        self.error.as_ref()
    }

    pub fn store(&self) -> Option<Store> {
        self.store.as_ref()?.upgrade()
    }

    /// Fetch a named link. The first call issues the request; later calls
    /// return the same shared future.
    pub fn resolve_link(&self, name: &str) -> SharedFetch {
        let mut resolved = match self.resolved.lock() {
            Ok(resolved) => resolved,
            Err(_) => {
                return futures::future::ready(Err(StoreError::LockPoisoned("response links")))
                    .boxed()
                    .shared()
            }
        };
        if let Some(fetch) = resolved.get(name) {
            return fetch.clone();
        }

        let link = self.links.get(name).cloned().flatten();
        let fetch = fetch_link(
            link,
            self.store(),
            self.config.clone(),
            self.request_headers.clone(),
            self.options.clone(),
        );
        resolved.insert(name.to_string(), fetch.clone());
        fetch
    }

    /// Names of the links resolved so far.
    pub fn resolved_links(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .resolved
            .lock()
            .map(|resolved| resolved.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn first(&self) -> SharedFetch {
        self.resolve_link("first")
    }

    pub fn prev(&self) -> SharedFetch {
        self.resolve_link("prev")
    }

    pub fn next(&self) -> SharedFetch {
        self.resolve_link("next")
    }

    pub fn last(&self) -> SharedFetch {
        self.resolve_link("last")
    }
}

/// GET a link, or resolve to an empty response when there is none.
pub(crate) fn fetch_link(
    link: Option<Link>,
    store: Option<Store>,
    config: Arc<Config>,
    headers: Headers,
    options: Option<RequestOptions>,
) -> SharedFetch {
    async move {
        match link {
            Some(link) => {
                store::load(
                    &config,
                    store.as_ref(),
                    Method::Get,
                    link.href(),
                    None,
                    &headers,
                    options,
                )
                .await
            }
            None => Ok(Arc::new(Response::empty(store.as_ref(), config.clone()))),
        }
    }
    .boxed()
    .shared()
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("data", &self.data)
            .field("meta", &self.meta)
            .field("links", &self.links)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
