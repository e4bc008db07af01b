//! Transport boundary.
//!
//! The fetch loop hands each request to a [`Transport`] together with a
//! [`ReplySender`]. The transport completes the request whenever it likes by
//! sending the outcome through the reply, which lands on the loop's
//! completion queue.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::query::{QueryCode, TransportFailure};

/// One request against a marketplace endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A reply from the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Per-call-site request flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFlags {
    /// Re-dispatch transient failures instead of failing the batch.
    pub retry: bool,
    /// The request may share the connection with other in-flight requests.
    pub pipelineable: bool,
}

impl Default for QueryFlags {
    fn default() -> Self {
        Self {
            retry: true,
            pipelineable: true,
        }
    }
}

impl QueryFlags {
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn serial(mut self) -> Self {
        self.pipelineable = false;
        self
    }

    /// Whether a failure with `code` goes back onto the worklist.
    pub fn allows_retry(&self, code: &QueryCode) -> bool {
        self.retry && code.is_retryable()
    }
}

/// An entry on the completion queue.
#[derive(Debug)]
pub struct Completion {
    pub index: usize,
    pub outcome: Result<Response, QueryCode>,
}

/// One-shot handle that completes a dispatched request.
///
/// Dropping it without sending completes the request with
/// [`TransportFailure::Dropped`], so the loop never waits on a lost reply.
#[derive(Debug)]
pub struct ReplySender {
    index: usize,
    queue: Option<mpsc::UnboundedSender<Completion>>,
}

impl ReplySender {
    pub fn new(index: usize, queue: mpsc::UnboundedSender<Completion>) -> Self {
        Self {
            index,
            queue: Some(queue),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn send(mut self, outcome: Result<Response, QueryCode>) {
        self.push(outcome);
    }

    fn push(&mut self, outcome: Result<Response, QueryCode>) {
        if let Some(queue) = self.queue.take() {
            // The loop may already be gone; nothing is waiting then.
            let _ = queue.send(Completion {
                index: self.index,
                outcome,
            });
        }
    }
}

impl Drop for ReplySender {
    fn drop(&mut self) {
        self.push(Err(QueryCode::Transport(TransportFailure::Dropped)));
    }
}

/// Request/reply client for one endpoint.
///
/// `enqueue` must not block; the reply may be sent from any thread, before
/// or after `enqueue` returns.
pub trait Transport: Send + Sync {
    fn enqueue(&self, request: Request, flags: QueryFlags, reply: ReplySender);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn enqueue(&self, request: Request, flags: QueryFlags, reply: ReplySender) {
        (**self).enqueue(request, flags, reply)
    }
}

/// Async request executor, e.g. an HTTP client.
#[async_trait::async_trait]
pub trait Execute: Send + Sync + 'static {
    async fn execute(&self, request: Request) -> Result<Response, TransportFailure>;
}

/// [`Transport`] that runs each request as a tokio task on an [`Execute`].
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct SpawningTransport<E> {
    executor: Arc<E>,
}

impl<E: Execute> SpawningTransport<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<E: Execute> Transport for SpawningTransport<E> {
    fn enqueue(&self, request: Request, _flags: QueryFlags, reply: ReplySender) {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let outcome = executor.execute(request).await.map_err(QueryCode::from);
            reply.send(outcome);
        });
    }
}
