//! Scripted in-memory transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonapi_store::{Config, HttpResponse, Method, Request, Store, Transport, TransportError};
use serde_json::Value;

pub const BASE_URL: &str = "http://example.com/";

#[derive(Clone)]
enum Reply {
    Http(HttpResponse),
    Fail(TransportError),
}

#[derive(Default)]
struct MockState {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    requests: Mutex<Vec<Request>>,
    delay: Mutex<Option<Duration>>,
}

/// Answers requests from a per-route script. The last reply of a route
/// repeats; unscripted routes answer 404 with an empty body.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, method: Method, url: &str, status: u16, body: Value) -> &Self {
        let response = if body.is_null() {
            HttpResponse::new(status, "")
        } else {
            HttpResponse::json(status, &body)
        };
        self.push(method, url, Reply::Http(response))
    }

    pub fn reply_raw(&self, method: Method, url: &str, response: HttpResponse) -> &Self {
        self.push(method, url, Reply::Http(response))
    }

    pub fn fail(&self, method: Method, url: &str, error: TransportError) -> &Self {
        self.push(method, url, Reply::Fail(error))
    }

    /// Delay every answer, so concurrent callers overlap.
    pub fn delay(&self, millis: u64) -> &Self {
        *self.state.delay.lock().unwrap() = Some(Duration::from_millis(millis));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, method: Method, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests().last().cloned()
    }

    fn push(&self, method: Method, url: &str, reply: Reply) -> &Self {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry((method, url.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    fn next_reply(&self, method: Method, url: &str) -> Option<Reply> {
        let mut routes = self.state.routes.lock().unwrap();
        let queue = routes.get_mut(&(method, url.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        self.state.requests.lock().unwrap().push(request.clone());

        let delay = *self.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(request.method, &request.url) {
            Some(Reply::Http(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}

pub fn config(transport: &MockTransport) -> Config {
    Config::new()
        .with_base_url(BASE_URL)
        .with_transport(transport.clone())
}

pub fn store(transport: &MockTransport) -> Store {
    Store::new(config(transport))
}

pub fn url(path: &str) -> String {
    format!("{}{}", BASE_URL, path)
}

pub fn attrs(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}
