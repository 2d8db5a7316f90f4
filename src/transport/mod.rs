//! Transport Adapter.
//!
//! The store never talks HTTP itself. It hands a [`Request`] to whatever
//! [`Transport`] the [`Config`] carries and turns the outcome into a
//! [`RawResponse`], which never fails: every failure mode is recorded on it.

#[cfg(feature = "http")]
mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::TransportError;

#[cfg(feature = "http")]
pub use self::http::ReqwestTransport;

/// Header name to value.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// GET and HEAD never carry a body.
    pub fn allows_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing request as seen by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Value>,
}

/// What a [`Transport`] hands back: status, headers and the unparsed body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Normalized outcome of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResponse {
    /// `None` when the request never reached the server.
    pub status: Option<u16>,
    pub headers: Headers,
    pub request_headers: Headers,
    pub body: Option<Value>,
    pub error: Option<TransportError>,
}

impl RawResponse {
    /// A response that carries nothing but an empty document.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Pluggable fetch primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError>;
}

type SendFn =
    dyn Fn(Request) -> BoxFuture<'static, Result<HttpResponse, TransportError>> + Send + Sync;

/// Adapts a closure into a [`Transport`].
#[derive(Clone)]
pub struct FnTransport {
    send: Arc<SendFn>,
}

impl FnTransport {
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(Request) -> BoxFuture<'static, Result<HttpResponse, TransportError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            send: Arc::new(send),
        }
    }
}

#[async_trait]
impl Transport for FnTransport {
    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        (self.send)(request).await
    }
}

/// Transport of a default [`Config`]: every request fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        Err(TransportError::Network(format!(
            "no transport configured for {} {}",
            request.method, request.url
        )))
    }
}

/// Runs one request through the configured transport.
pub struct Adapter;

impl Adapter {
    pub async fn execute(
        config: &Config,
        method: Method,
        url: &str,
        body: Option<Value>,
        headers: &Headers,
    ) -> RawResponse {
        let mut request_headers = config.default_headers.clone();
        request_headers.extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut request = Request {
            method,
            url: url.to_string(),
            headers: request_headers,
            body: if method.allows_body() { body } else { None },
        };
        if let Some(transform) = &config.transform_request {
            request = transform(request);
        }

        debug!(method = %request.method, url = %request.url, "dispatching request");
        let request_headers = request.headers.clone();
        let raw = match config.transport.send(request).await {
            Ok(response) => Self::parse(response, request_headers),
            Err(err) => {
                warn!(url, error = %err, "transport failure");
                RawResponse {
                    status: None,
                    headers: Headers::new(),
                    request_headers,
                    body: None,
                    error: Some(err),
                }
            }
        };

        match &config.transform_response {
            Some(transform) => transform(raw),
            None => raw,
        }
    }

    fn parse(response: HttpResponse, request_headers: Headers) -> RawResponse {
        let status = response.status;
        let mut error = None;

        let body = if response.body.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => Some(value),
                Err(err) => {
                    error = Some(TransportError::Parse {
                        status: Some(status),
                        message: err.to_string(),
                    });
                    None
                }
            }
        };

        if status >= 400 {
            warn!(status, "request failed");
            error = Some(TransportError::http(status));
        }

        RawResponse {
            status: Some(status),
            headers: response.headers,
            request_headers,
            body,
            error,
        }
    }
}
