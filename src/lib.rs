//! Client-side data layer for JSON:API servers.
//!
//! Documents fetched through a [`Store`] are normalized into shared
//! [`Record`] handles, one per `(type, id)`, with relationships wired
//! between them. Reads of the same URL are deduplicated by a request cache,
//! and every request returns a [`Response`] envelope whose pagination links
//! can be followed.

extern crate self as jsonapi_store;

mod config;
mod document;
mod error;
mod observe;
mod query;
mod record;
mod response;
mod schema;
mod store;
mod transport;

pub use config::{
    Config, TransformRequest, TransformResponse, DEFAULT_BASE_URL, JSON_API_CONTENT_TYPE,
};
pub use document::{
    Document, ErrorObject, ErrorSource, Id, Identifier, Link, Links, OneOrMany, RelationshipObject,
    Resource as ResourceObject,
};
pub use error::{ResponseError, StoreError, TransportError};
pub use observe::{Change, ChangeKind, ObservableContainer, RecordingObserver};
pub use query::{build_url, ParamArrayType, QueryParam, RequestOptions};
pub use record::{
    ForeignKey, Record, RecordMeta, RecordStatus, Related, Relation, FOREIGN_KEY_SUFFIX,
    META_SUFFIX,
};
pub use response::Response;
pub use schema::{DerivedFn, IdGenerator, Resource, Schema};
pub use store::{QueueState, SaveOutcome, SharedFetch, Store};
pub use transport::{
    Adapter, FnTransport, Headers, HttpResponse, Method, NullTransport, RawResponse, Request,
    Transport,
};

#[cfg(feature = "emitter")]
pub use observe::EmitterObserver;

#[cfg(feature = "http")]
pub use transport::ReqwestTransport;

// Derive macro, same name as the trait it implements
pub use jsonapi_store_macros::Resource;
