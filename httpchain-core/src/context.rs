//! Per-call state threaded through the interceptor chain.

use crate::chain::Replay;
use crate::error::{ChainError, Result};
use crate::http::{HttpRequest, HttpResponse};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque id shared by every attempt of one logical call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// Cancellation and deadline carrier supplied by the caller.
///
/// Clones share the same cancellation token, so replays of a call are
/// cancelled together with it.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallScope {
    /// Create a scope that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Get the cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Get the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a future until it finishes, the token fires, or the deadline passes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChainError::Cancelled),
            _ = wait_until(self.deadline) => Err(ChainError::DeadlineExceeded),
            out = fut => out,
        }
    }

    /// Sleep, waking early with an error on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Whether a context belongs to the caller's call or to a retry replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    /// Issued by the caller.
    Fresh,
    /// Re-issued by a retry through the replay capability.
    Replay,
}

/// Typed per-call storage for interceptors.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    /// Insert a value, returning the previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast().ok().map(|boxed| *boxed))
    }

    /// Get a value by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Get a value by type, mutably.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Remove a value by type.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast().ok().map(|boxed| *boxed))
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Mutable state of one pass through the chain.
///
/// The pristine request is a snapshot taken when the context is created and
/// cannot be changed afterwards; `request` is what will actually be sent.
pub struct CallContext {
    id: CorrelationId,
    scope: CallScope,
    origin: CallOrigin,
    pristine: HttpRequest,
    replay: Option<Arc<dyn Replay>>,
    /// Request that will be sent. Hooks may rewrite it.
    pub request: HttpRequest,
    /// Response, once one exists.
    pub response: Option<HttpResponse>,
    /// Terminal error, once one exists.
    pub error: Option<ChainError>,
    /// Per-call storage for interceptors.
    pub extensions: Extensions,
}

impl CallContext {
    /// Create a context for a fresh call.
    pub fn new(request: HttpRequest, id: CorrelationId, scope: CallScope) -> Self {
        Self {
            id,
            scope,
            origin: CallOrigin::Fresh,
            pristine: request.clone(),
            replay: None,
            request,
            response: None,
            error: None,
            extensions: Extensions::default(),
        }
    }

    /// Mark the origin of this pass.
    #[must_use]
    pub fn with_origin(mut self, origin: CallOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Attach the replay capability of the executing chain.
    #[must_use]
    pub fn with_replay(mut self, replay: Arc<dyn Replay>) -> Self {
        self.replay = Some(replay);
        self
    }

    /// Get the correlation id.
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Get the caller's scope.
    pub fn scope(&self) -> &CallScope {
        &self.scope
    }

    /// Get the origin of this pass.
    pub fn origin(&self) -> CallOrigin {
        self.origin
    }

    /// Check whether this pass is a retry replay.
    pub fn is_replay(&self) -> bool {
        self.origin == CallOrigin::Replay
    }

    /// Get the request as it was when the call started.
    pub fn pristine_request(&self) -> &HttpRequest {
        &self.pristine
    }

    /// Get the replay capability of the executing chain.
    pub fn replay(&self) -> Option<Arc<dyn Replay>> {
        self.replay.clone()
    }

    /// Check whether the call currently counts as failed.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Status of the current response, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(HttpResponse::status_code)
    }

    /// Resolve the context into the call's result.
    ///
    /// A terminal error wins over a response.
    pub fn into_result(self) -> Result<HttpResponse> {
        match (self.error, self.response) {
            (Some(err), _) => Err(err),
            (None, Some(response)) => Ok(response),
            (None, None) => Err(ChainError::NoResponse),
        }
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
