//! The chain executor.
//!
//! A [`Chain`] owns a transport and an ordered list of interceptors. Each call
//! gets a fresh [`CallContext`]; the chain itself holds no per-call state, so
//! one chain can serve many concurrent calls.
//!
//! ```text
//! before hooks (registration order)
//!     -> response attached?  return it
//!     -> hook Err?           return it
//! terminal error set?        return it
//! transport (once)
//! after hooks (same order)
//!     -> hook Err?           return it
//! error ? Err(error) : Ok(response)
//! ```

use crate::context::{CallContext, CallOrigin, CallScope, CorrelationId};
use crate::error::{ChainError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::interceptor::Interceptor;
use crate::transport::{ReqwestTransport, Transport};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, debug_span, Instrument};

/// Re-issues a request as a new pass through a chain, keeping its id.
///
/// Retries use this so that every attempt goes through all interceptors and
/// attempt counters keyed by the id keep accumulating.
#[async_trait]
pub trait Replay: Send + Sync {
    /// Run the request as a fresh chain execution under an existing id.
    async fn perform_with_correlation_id(
        &self,
        request: HttpRequest,
        id: CorrelationId,
        scope: CallScope,
    ) -> Result<HttpResponse>;
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Correlation id to use instead of a generated one.
    pub correlation_id: Option<CorrelationId>,
    /// Cancellation and deadline for the call.
    pub scope: CallScope,
}

impl CallOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific correlation id.
    #[must_use]
    pub fn correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Use a specific scope.
    #[must_use]
    pub fn scope(mut self, scope: CallScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Ordered interceptors around a transport.
pub struct Chain {
    transport: Arc<dyn Transport>,
    interceptors: RwLock<Vec<Arc<dyn Interceptor>>>,
    this: Weak<Chain>,
}

impl Chain {
    /// Create a chain with no interceptors.
    pub fn new(transport: impl Transport + 'static) -> Arc<Self> {
        Self::with_interceptors(transport, Vec::new())
    }

    /// Create a chain with an initial list of interceptors.
    pub fn with_interceptors(
        transport: impl Transport + 'static,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Arc<Self> {
        Self::from_shared(Arc::new(transport), interceptors)
    }

    /// Create a chain around an already shared transport.
    pub fn from_shared(
        transport: Arc<dyn Transport>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            transport,
            interceptors: RwLock::new(interceptors),
            this: this.clone(),
        })
    }

    /// Create a chain over a default `reqwest` client.
    pub fn reqwest() -> Arc<Self> {
        Self::new(ReqwestTransport::new())
    }

    /// Append an interceptor.
    pub fn add_interceptor(&self, interceptor: impl Interceptor + 'static) {
        self.interceptors.write().push(Arc::new(interceptor));
    }

    /// Append several interceptors, keeping their order.
    pub fn add_interceptors(&self, interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>) {
        self.interceptors.write().extend(interceptors);
    }

    /// Names of the registered interceptors, in order.
    pub fn interceptor_names(&self) -> Vec<&'static str> {
        self.interceptors.read().iter().map(|i| i.name()).collect()
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.read().len()
    }

    /// Check whether no interceptors are registered.
    pub fn is_empty(&self) -> bool {
        self.interceptors.read().is_empty()
    }

    /// Replay capability bound to this chain.
    pub fn replayer(&self) -> Arc<dyn Replay> {
        Arc::new(ChainReplayer {
            chain: self.this.clone(),
        })
    }

    /// Execute a request under a fresh correlation id.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with(request, CallOptions::default()).await
    }

    /// Execute a request under a caller-chosen correlation id.
    pub async fn execute_with_correlation_id(
        &self,
        request: HttpRequest,
        id: impl Into<CorrelationId>,
    ) -> Result<HttpResponse> {
        self.execute_with(request, CallOptions::new().correlation_id(id))
            .await
    }

    /// Execute a request with explicit options.
    pub async fn execute_with(
        &self,
        request: HttpRequest,
        options: CallOptions,
    ) -> Result<HttpResponse> {
        let id = options.correlation_id.unwrap_or_default();
        self.run(request, id, options.scope, CallOrigin::Fresh)
            .await
    }

    async fn run(
        &self,
        request: HttpRequest,
        id: CorrelationId,
        scope: CallScope,
        origin: CallOrigin,
    ) -> Result<HttpResponse> {
        let span = debug_span!(
            "http_call",
            correlation_id = %id,
            method = %request.method,
            url = %request.url,
            ?origin,
        );
        self.run_hooks(request, id, scope, origin)
            .instrument(span)
            .await
    }

    async fn run_hooks(
        &self,
        request: HttpRequest,
        id: CorrelationId,
        scope: CallScope,
        origin: CallOrigin,
    ) -> Result<HttpResponse> {
        // Snapshot so the lock is never held across an await.
        let interceptors = self.interceptors.read().clone();
        let mut ctx = CallContext::new(request, id, scope)
            .with_origin(origin)
            .with_replay(self.replayer());

        for interceptor in &interceptors {
            interceptor.before_request(&mut ctx).await?;
            if ctx.response.is_some() {
                debug!(
                    interceptor = interceptor.name(),
                    "Response attached before request, skipping transport"
                );
                return ctx.into_result();
            }
        }

        if let Some(err) = ctx.error.take() {
            debug!(error = %err, "Call failed before request, skipping transport");
            return Err(err);
        }

        let outcome = ctx
            .scope()
            .run(self.transport.perform(ctx.request.clone()))
            .await;
        match outcome {
            Ok(response) => {
                debug!(status = response.status_code(), "Received response");
                ctx.response = Some(response);
            }
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                debug!(error = %err, "Transport failed");
                ctx.error = Some(err);
            }
        }

        for interceptor in &interceptors {
            interceptor.after_response(&mut ctx).await?;
        }

        ctx.into_result()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("interceptors", &self.interceptor_names())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Replay for Chain {
    async fn perform_with_correlation_id(
        &self,
        request: HttpRequest,
        id: CorrelationId,
        scope: CallScope,
    ) -> Result<HttpResponse> {
        self.run(request, id, scope, CallOrigin::Replay).await
    }
}

/// Weak handle so contexts never keep their chain alive.
struct ChainReplayer {
    chain: Weak<Chain>,
}

#[async_trait]
impl Replay for ChainReplayer {
    async fn perform_with_correlation_id(
        &self,
        request: HttpRequest,
        id: CorrelationId,
        scope: CallScope,
    ) -> Result<HttpResponse> {
        let chain = self
            .chain
            .upgrade()
            .ok_or_else(|| ChainError::Configuration("chain dropped before replay".into()))?;
        chain.perform_with_correlation_id(request, id, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use reqwest::header::{HeaderValue, AUTHORIZATION};
    use std::time::Duration;

    /// Records each hook invocation into a shared journal.
    struct Recorder {
        name: &'static str,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
            self.journal.lock().push(format!("{}:before", self.name));
            ctx.request
                .headers
                .append("x-seen", HeaderValue::from_static(self.name));
            Ok(())
        }

        async fn after_response(&self, _ctx: &mut CallContext) -> Result<()> {
            self.journal.lock().push(format!("{}:after", self.name));
            Ok(())
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Interceptor for ShortCircuit {
        async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
            ctx.response = Some(HttpResponse::from_status(203)?.with_body("cached"));
            Ok(())
        }
    }

    struct FailBefore;

    #[async_trait]
    impl Interceptor for FailBefore {
        fn name(&self) -> &'static str {
            "fail-before"
        }

        async fn before_request(&self, _ctx: &mut CallContext) -> Result<()> {
            Err(ChainError::interceptor("fail-before", "refused"))
        }
    }

    struct MarkFailed;

    #[async_trait]
    impl Interceptor for MarkFailed {
        async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
            ctx.error = Some(ChainError::CircuitOpen);
            Ok(())
        }
    }

    struct Stamp;

    #[async_trait]
    impl Interceptor for Stamp {
        async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
            ctx.request
                .headers
                .insert(AUTHORIZATION, HeaderValue::from_static("Bearer t"));
            Ok(())
        }
    }

    fn recorder(name: &'static str, journal: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
        Arc::new(Recorder {
            name,
            journal: journal.clone(),
        })
    }

    fn request() -> HttpRequest {
        HttpRequest::get("https://api.example.com/items").unwrap()
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new().reply(200, "ok");
        let chain = Chain::with_interceptors(
            transport.clone(),
            vec![recorder("a", &journal), recorder("b", &journal)],
        );

        let response = chain.execute(request()).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "ok");
        assert_eq!(
            *journal.lock(),
            vec!["a:before", "b:before", "a:after", "b:after"]
        );

        let sent = transport.requests();
        let seen: Vec<_> = sent[0].headers.get_all("x-seen").iter().collect();
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_attached_response_skips_transport() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new();
        let chain = Chain::with_interceptors(
            transport.clone(),
            vec![Arc::new(ShortCircuit) as Arc<dyn Interceptor>, recorder("late", &journal)],
        );

        let response = chain.execute(request()).await.unwrap();
        assert_eq!(response.status_code(), 203);
        assert_eq!(transport.calls(), 0);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_hook_failure_aborts_chain() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new();
        let chain = Chain::with_interceptors(
            transport.clone(),
            vec![Arc::new(FailBefore) as Arc<dyn Interceptor>, recorder("late", &journal)],
        );

        let err = chain.execute(request()).await.unwrap_err();
        assert!(matches!(err, ChainError::Interceptor { name: "fail-before", .. }));
        assert_eq!(transport.calls(), 0);
        assert!(journal.lock().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_error_lets_before_phase_finish() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new();
        let chain = Chain::with_interceptors(
            transport.clone(),
            vec![Arc::new(MarkFailed) as Arc<dyn Interceptor>, recorder("late", &journal)],
        );

        let err = chain.execute(request()).await.unwrap_err();
        assert!(matches!(err, ChainError::CircuitOpen));
        assert_eq!(transport.calls(), 0);
        assert_eq!(*journal.lock(), vec!["late:before"]);
    }

    #[tokio::test]
    async fn test_transport_error_reaches_after_hooks() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new().fail("connection refused");
        let chain = Chain::with_interceptors(transport, vec![recorder("obs", &journal)]);

        let err = chain.execute(request()).await.unwrap_err();
        assert!(matches!(err, ChainError::Connection(_)));
        assert_eq!(*journal.lock(), vec!["obs:before", "obs:after"]);
    }

    #[tokio::test]
    async fn test_working_request_is_sent() {
        let transport = MockTransport::new();
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(Stamp);

        chain.execute(request()).await.unwrap();
        assert_eq!(transport.requests()[0].headers[AUTHORIZATION], "Bearer t");
    }

    #[tokio::test]
    async fn test_add_interceptors_appends() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new(MockTransport::new());
        chain.add_interceptors(vec![recorder("a", &journal)]);
        chain.add_interceptors(vec![recorder("b", &journal)]);

        assert_eq!(chain.interceptor_names(), vec!["a", "b"]);
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn test_replay_keeps_correlation_id() {
        let chain = Chain::new(MockTransport::new());
        let replay = chain.replayer();

        let response = replay
            .perform_with_correlation_id(request(), CorrelationId::from("id-1"), CallScope::new())
            .await
            .unwrap();
        assert_eq!(response.status_code(), 200);
    }

    #[tokio::test]
    async fn test_replay_after_chain_dropped() {
        let chain = Chain::new(MockTransport::new());
        let replay = chain.replayer();
        drop(chain);

        let err = replay
            .perform_with_correlation_id(request(), CorrelationId::new(), CallScope::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_in_flight_attempt() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::new().with_latency(Duration::from_secs(30));
        let chain = Chain::with_interceptors(transport, vec![recorder("obs", &journal)]);

        let scope = CallScope::new().with_timeout(Duration::from_secs(1));
        let err = chain
            .execute_with(request(), CallOptions::new().scope(scope))
            .await
            .unwrap_err();

        assert!(matches!(err, ChainError::DeadlineExceeded));
        assert_eq!(*journal.lock(), vec!["obs:before"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let transport = MockTransport::new();
        let chain = Chain::new(transport.clone());
        chain.add_interceptor(Stamp);

        let calls = (0..8).map(|_| chain.execute(request()));
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(transport.calls(), 8);
    }
}
