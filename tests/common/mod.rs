//! Shared test support: an in-memory DSS and a tool-call helper.
//!
//! Routes are keyed by `"METHOD /path"` without the query string. Replies
//! registered for the same route are served in order and the last one
//! repeats. Unrouted reads answer 404; unrouted writes succeed with `{}`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use dataiku_mcp::dss::{ApiRequest, Dss, DssApi, Method, Polling};
use dataiku_mcp::error::DssError;

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Text(String),
    Fail(u16, String),
}

/// A scripted DSS that records every request it receives.
#[derive(Default)]
pub struct MockDss {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl MockDss {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, route: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Answers `route` with a JSON body.
    pub fn on(&self, route: &str, body: Value) -> &Self {
        self.push(route, Reply::Json(body));
        self
    }

    /// Answers `route` with a raw text body.
    pub fn text(&self, route: &str, body: &str) -> &Self {
        self.push(route, Reply::Text(body.to_string()));
        self
    }

    /// Answers `route` with an HTTP error.
    pub fn fail(&self, route: &str, status: u16, message: &str) -> &Self {
        self.push(route, Reply::Fail(status, message.to_string()));
        self
    }

    fn reply(&self, request: &ApiRequest) -> Reply {
        let key = request.to_string();
        self.log.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None if request.method == Method::Get => Reply::Fail(404, format!("No mock for {key}")),
            None => Reply::Json(json!({})),
        }
    }

    /// Every request received, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Requests that changed something on the DSS side.
    pub fn writes(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method != Method::Get)
            .map(ToString::to_string)
            .collect()
    }

    /// The last request sent to `route`.
    pub fn last(&self, route: &str) -> Option<ApiRequest> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.to_string() == route)
            .cloned()
    }

    /// Body of the last request sent to `route`.
    pub fn body(&self, route: &str) -> Value {
        self.last(route).and_then(|r| r.body).unwrap_or(Value::Null)
    }

    /// Number of requests sent to `route`.
    pub fn count(&self, route: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.to_string() == route)
            .count()
    }
}

#[async_trait]
impl DssApi for MockDss {
    async fn request(&self, request: ApiRequest) -> Result<Value, DssError> {
        match self.reply(&request) {
            Reply::Json(body) => Ok(body),
            Reply::Text(body) => serde_json::from_str(&body)
                .map_err(|e| DssError::InvalidResponse(e.to_string())),
            Reply::Fail(status, message) => Err(DssError::Api { status, message }),
        }
    }

    async fn request_text(&self, request: ApiRequest) -> Result<String, DssError> {
        match self.reply(&request) {
            Reply::Json(body) => Ok(body.to_string()),
            Reply::Text(body) => Ok(body),
            Reply::Fail(status, message) => Err(DssError::Api { status, message }),
        }
    }
}

/// A [`Dss`] over the mock with fast polling.
pub fn dss(mock: &Arc<MockDss>) -> Dss {
    Dss::new(
        mock.clone(),
        Polling {
            interval: Duration::from_millis(1),
            max_wait: Duration::from_secs(5),
        },
    )
}

/// A [`Dss`] over the mock that gives up waiting after `max_wait`.
pub fn dss_waiting(mock: &Arc<MockDss>, max_wait: Duration) -> Dss {
    Dss::new(
        mock.clone(),
        Polling {
            interval: Duration::from_millis(1),
            max_wait,
        },
    )
}

/// Outcome of one tool call: the error flag and the decoded JSON body.
pub struct Outcome {
    pub is_error: bool,
    pub body: Value,
}

/// Calls a tool and decodes its JSON text.
pub async fn call(dss: &Dss, name: &str, arguments: Value) -> Outcome {
    let result = dataiku_mcp::tools::call_tool(dss, name, &arguments).await;
    let text = result.first_text().unwrap_or_default();
    Outcome {
        is_error: result.is_error,
        body: serde_json::from_str(text).unwrap_or_else(|_| json!(text)),
    }
}
