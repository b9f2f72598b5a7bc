//! Mock transport for testing.
//!
//! [`MockTransport`] answers from a script keyed by method and path and records
//! every request it receives, so tests can assert which candidate endpoints
//! were tried and in what order.

use crate::error::ApiError;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport, TransportFuture};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with `status` and `body` (non-2xx becomes `ApiError::Status`)
    Json {
        /// HTTP status
        status: u16,
        /// Response body
        body: Value,
    },
    /// Fail before any response
    TransportError(String),
    /// Answer after a delay
    Delayed {
        /// How long to wait
        delay: Duration,
        /// Status after the delay
        status: u16,
        /// Body after the delay
        body: Value,
    },
    /// Never answer
    Hang,
}

/// Scripted in-memory [`Transport`]
///
/// Replies queued for the same method and path are used in order; the last
/// one sticks for any further calls. Unscripted routes answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<HashMap<(Method, String), VecDeque<MockReply>>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Empty script: every route answers 404
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON reply
    pub fn reply(&self, method: Method, path: &str, status: u16, body: Value) {
        self.push(method, path, MockReply::Json { status, body });
    }

    /// Queue any reply
    pub fn push(&self, method: Method, path: &str, reply: MockReply) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far
    #[must_use]
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Paths requested so far, in order
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.path).collect()
    }

    /// Number of requests to `path`
    #[must_use]
    pub fn count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    fn next_reply(&self, method: Method, path: &str) -> MockReply {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        match script.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockReply::Hang),
            Some(queue) => queue.front().cloned().unwrap_or(MockReply::Hang),
            None => MockReply::Json {
                status: 404,
                body: Value::Null,
            },
        }
    }
}

fn answer(status: u16, body: Value) -> Result<ApiResponse, ApiError> {
    if (200..300).contains(&status) {
        Ok(ApiResponse { status, body })
    } else {
        Err(ApiError::Status { status, body })
    }
}

impl Transport for MockTransport {
    fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
        let reply = self.next_reply(request.method, &request.path);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        Box::pin(async move {
            match reply {
                MockReply::Json { status, body } => answer(status, body),
                MockReply::TransportError(message) => Err(ApiError::Transport(message)),
                MockReply::Delayed { delay, status, body } => {
                    tokio::time::sleep(delay).await;
                    answer(status, body)
                },
                MockReply::Hang => futures::future::pending().await,
            }
        })
    }
}
