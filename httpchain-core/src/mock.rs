//! Scripted transport for tests.
//!
//! ```rust
//! use httpchain_core::MockTransport;
//!
//! let transport = MockTransport::new()
//!     .fail("connection refused")
//!     .reply(503, "busy")
//!     .reply(200, "ok");
//! ```

use crate::error::{ChainError, Result};
use crate::http::{Body, HttpRequest, HttpResponse};
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Respond with a status and body.
    Response {
        /// Status code.
        status: u16,
        /// Body bytes.
        body: Bytes,
    },
    /// Respond with a status, then fail the body stream after `partial`.
    BrokenBody {
        /// Status code.
        status: u16,
        /// Bytes streamed before the failure.
        partial: Bytes,
        /// Body error message.
        error: String,
    },
    /// Fail with a connection error.
    ConnectionError(String),
}

impl MockReply {
    fn produce(&self) -> Result<HttpResponse> {
        match self {
            MockReply::Response { status, body } => {
                Ok(HttpResponse::from_status(*status)?.with_body(body.clone()))
            }
            MockReply::BrokenBody {
                status,
                partial,
                error,
            } => {
                let chunks = vec![Ok(partial.clone()), Err(ChainError::Body(error.clone()))];
                Ok(HttpResponse::from_status(*status)?
                    .with_body(Body::from_stream(stream::iter(chunks).boxed())))
            }
            MockReply::ConnectionError(msg) => Err(ChainError::Connection(msg.clone())),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<MockReply>,
    fallback: Option<MockReply>,
    requests: Vec<HttpRequest>,
}

/// Transport that replays a queue of outcomes and records what it was sent.
///
/// Once the queue is empty it repeats the fallback outcome, or answers
/// `200` with an empty body when none is set. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    latency: Option<Duration>,
}

impl MockTransport {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn reply(self, status: u16, body: impl Into<Bytes>) -> Self {
        self.push(MockReply::Response {
            status,
            body: body.into(),
        })
    }

    /// Queue a response whose body stream fails after `partial`.
    #[must_use]
    pub fn reply_broken(
        self,
        status: u16,
        partial: impl Into<Bytes>,
        error: impl Into<String>,
    ) -> Self {
        self.push(MockReply::BrokenBody {
            status,
            partial: partial.into(),
            error: error.into(),
        })
    }

    /// Queue a connection failure.
    #[must_use]
    pub fn fail(self, msg: impl Into<String>) -> Self {
        self.push(MockReply::ConnectionError(msg.into()))
    }

    /// Answer with this response once the queue is empty.
    #[must_use]
    pub fn always(self, status: u16, body: impl Into<Bytes>) -> Self {
        self.state.lock().fallback = Some(MockReply::Response {
            status,
            body: body.into(),
        });
        self
    }

    /// Fail with a connection error once the queue is empty.
    #[must_use]
    pub fn always_fail(self, msg: impl Into<String>) -> Self {
        self.state.lock().fallback = Some(MockReply::ConnectionError(msg.into()));
        self
    }

    /// Wait this long before every outcome.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of requests performed so far.
    pub fn calls(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Requests performed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    fn push(self, reply: MockReply) -> Self {
        self.state.lock().script.push_back(reply);
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = {
            let mut state = self.state.lock();
            state.requests.push(request);
            state.script.pop_front().or_else(|| state.fallback.clone())
        };

        match reply {
            Some(reply) => reply.produce(),
            None => HttpResponse::from_status(200),
        }
    }
}
