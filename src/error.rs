use std::sync::Arc;

use thiserror::Error;

use crate::document::ErrorObject;
use crate::response::Response;

/// Failure reported by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request never produced an HTTP status (connection, DNS, no transport).
    #[error("network error: {0}")]
    Network(String),
    /// The server answered with a status of 400 or above.
    #[error("{message}")]
    Http { status: u16, message: String },
    /// The body could not be parsed as JSON.
    #[error("invalid response body: {message}")]
    Parse { status: Option<u16>, message: String },
}

impl TransportError {
    pub fn http(status: u16) -> Self {
        TransportError::Http {
            status,
            message: format!("Invalid HTTP status: {}", status),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Network(_) => None,
            TransportError::Http { status, .. } => Some(*status),
            TransportError::Parse { status, .. } => *status,
        }
    }
}

/// Error carried by a [`Response`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponseError {
    #[error(transparent)]
    Transport(TransportError),
    #[error("server returned {} error object(s)", .0.len())]
    JsonApi(Vec<ErrorObject>),
}

impl ResponseError {
    /// JSON:API error objects, when the server sent any.
    pub fn errors(&self) -> Option<&[ErrorObject]> {
        match self {
            ResponseError::JsonApi(errors) => Some(errors),
            ResponseError::Transport(_) => None,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("invalid JSON:API document: {0}")]
    InvalidDocument(String),
    #[error("a save/remove operation should not return an array of results")]
    CollectionReturned,
    #[error("the relationship `{relationship}` doesn't have a self link")]
    MissingSelfLink { relationship: String },
    #[error("record is not a queued job")]
    NotQueued,
    #[error("request failed: {}", .0.error().map(|e| e.to_string()).unwrap_or_default())]
    Response(Arc<Response>),
    #[error("model serialization error: {0}")]
    Serde(String),
}

impl StoreError {
    /// The failed response, for errors raised by a request.
    pub fn response(&self) -> Option<&Arc<Response>> {
        match self {
            StoreError::Response(response) => Some(response),
            _ => None,
        }
    }

    /// The response's error, for errors raised by a request.
    pub fn response_error(&self) -> Option<&ResponseError> {
        self.response().and_then(|response| response.error())
    }

    /// HTTP status of the failed request, if one was received.
    pub fn status(&self) -> Option<u16> {
        self.response().and_then(|response| response.status())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serde(err.to_string())
    }
}
