use std::fmt;
use std::sync::Arc;

use crate::observe::ObservableContainer;
use crate::query::ParamArrayType;
use crate::transport::{Headers, Method, NullTransport, RawResponse, Request, Transport};

pub const DEFAULT_BASE_URL: &str = "/";
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

pub type TransformRequest = Arc<dyn Fn(Request) -> Request + Send + Sync>;
pub type TransformResponse = Arc<dyn Fn(RawResponse) -> RawResponse + Send + Sync>;

/// Per-store configuration.
///
/// Built once and moved into [`Store::new`](crate::Store::new):
///
/// ```ignore
/// let config = Config::new()
///     .with_base_url("http://example.com/")
///     .with_transport(ReqwestTransport::new())
///     .with_param_array_type(ParamArrayType::ParamArray);
/// let store = Store::new(config);
/// ```
#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    pub default_headers: Headers,
    pub transport: Arc<dyn Transport>,
    pub transform_request: Option<TransformRequest>,
    pub transform_response: Option<TransformResponse>,
    pub param_array_type: ParamArrayType,
    pub cache: bool,
    pub update_method: Method,
    pub observer: Option<Arc<dyn ObservableContainer>>,
}

impl Config {
    pub fn new() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert("content-type".to_string(), JSON_API_CONTENT_TYPE.to_string());

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_headers,
            transport: Arc::new(NullTransport),
            transform_request: None,
            transform_response: None,
            param_array_type: ParamArrayType::default(),
            cache: true,
            update_method: Method::Patch,
            observer: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_transform_request<F>(mut self, transform: F) -> Self
    where
        F: Fn(Request) -> Request + Send + Sync + 'static,
    {
        self.transform_request = Some(Arc::new(transform));
        self
    }

    pub fn with_transform_response<F>(mut self, transform: F) -> Self
    where
        F: Fn(RawResponse) -> RawResponse + Send + Sync + 'static,
    {
        self.transform_response = Some(Arc::new(transform));
        self
    }

    pub fn with_param_array_type(mut self, param_array_type: ParamArrayType) -> Self {
        self.param_array_type = param_array_type;
        self
    }

    /// Turn the request cache off; every fetch then hits the transport.
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Use PUT instead of PATCH when saving persisted records.
    pub fn with_update_method(mut self, method: Method) -> Self {
        self.update_method = method;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ObservableContainer>) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("param_array_type", &self.param_array_type)
            .field("cache", &self.cache)
            .field("update_method", &self.update_method)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}
