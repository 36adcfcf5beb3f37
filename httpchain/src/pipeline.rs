//! Assembling the standard interceptor chain.

use crate::config::{ConfigError, PipelineConfig};
use httpchain_breaker::{CircuitBreaker, CircuitBreakerInterceptor};
use httpchain_core::{
    CallOptions, Chain, CorrelationId, HttpRequest, HttpResponse, Interceptor, ReqwestTransport,
    Result, Transport,
};
use httpchain_interceptors::{Authenticator, ErrorClassifier, LogSink, Logger, LoggerOptions};
use httpchain_retries::{Retrier, RetryConfig};
use std::sync::Arc;

/// A ready-to-use chain plus handles to its shared components.
#[derive(Debug, Clone)]
pub struct Pipeline {
    chain: Arc<Chain>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build a pipeline over `reqwest` from a config.
    pub fn from_config(config: &PipelineConfig) -> std::result::Result<Self, ConfigError> {
        PipelineBuilder::from_config(config)?
            .build()
            .map_err(ConfigError::from)
    }

    /// Get the underlying chain.
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// Get the circuit breaker, if one is installed.
    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Execute a request under a fresh correlation id.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.chain.execute(request).await
    }

    /// Execute a request under a caller-chosen correlation id.
    pub async fn execute_with_correlation_id(
        &self,
        request: HttpRequest,
        id: impl Into<CorrelationId>,
    ) -> Result<HttpResponse> {
        self.chain.execute_with_correlation_id(request, id).await
    }

    /// Execute a request with explicit options.
    pub async fn execute_with(
        &self,
        request: HttpRequest,
        options: CallOptions,
    ) -> Result<HttpResponse> {
        self.chain.execute_with(request, options).await
    }
}

/// Builder for [`Pipeline`].
///
/// Interceptors are installed in a fixed order regardless of the order the
/// builder methods are called in: authenticator, logger, error classifier,
/// circuit breaker, retrier, then any extra interceptors.
#[derive(Default)]
pub struct PipelineBuilder {
    transport: Option<Arc<dyn Transport>>,
    secret: Option<String>,
    logger: Option<Logger>,
    classifier: Option<ErrorClassifier>,
    breaker: Option<(Arc<CircuitBreaker>, bool)>,
    retrier: Option<Retrier>,
    extra: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    /// Create a builder from a config. The transport defaults to `reqwest`.
    pub fn from_config(config: &PipelineConfig) -> std::result::Result<Self, ConfigError> {
        let mut builder = Self::default();
        if let Some(secret) = &config.secret {
            builder = builder.bearer(secret.clone());
        }
        if let Some(logger) = &config.logger {
            builder = builder.logger(logger.to_options()?);
        }
        if config.classify_errors {
            builder = builder.classify_errors();
        }
        if let Some(settings) = &config.circuit_breaker {
            let breaker = Arc::new(CircuitBreaker::new(settings.to_config()));
            builder = builder.circuit_breaker(breaker, settings.abort_on_open);
        }
        if let Some(retry) = &config.retry {
            builder = builder.retry(&retry.to_config());
        }
        Ok(builder)
    }

    /// Send requests through this transport.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Send requests through a shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Authenticate with a bearer secret.
    pub fn bearer(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Log through `tracing` with these options.
    pub fn logger(mut self, opts: LoggerOptions) -> Self {
        self.logger = Some(Logger::new(opts));
        self
    }

    /// Log through a custom sink.
    pub fn logger_with_sink(mut self, opts: LoggerOptions, sink: Arc<dyn LogSink>) -> Self {
        self.logger = Some(Logger::with_sink(opts, sink));
        self
    }

    /// Turn every status >= 400 into an error.
    pub fn classify_errors(self) -> Self {
        self.error_classifier(ErrorClassifier::default())
    }

    /// Use a specific error classifier.
    pub fn error_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Guard calls with a shared circuit breaker.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>, abort_on_open: bool) -> Self {
        self.breaker = Some((breaker, abort_on_open));
        self
    }

    /// Retry failed calls.
    pub fn retry(self, config: &RetryConfig) -> Self {
        self.retrier(Retrier::from_config(config))
    }

    /// Use a specific retrier.
    pub fn retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = Some(retrier);
        self
    }

    /// Append an interceptor after the standard ones.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.extra.push(Arc::new(interceptor));
        self
    }

    /// Build the pipeline.
    ///
    /// Fails if the bearer secret cannot be used as a header value.
    pub fn build(self) -> Result<Pipeline> {
        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();

        if let Some(secret) = &self.secret {
            interceptors.push(Arc::new(Authenticator::new(secret)?));
        }
        if let Some(logger) = self.logger {
            interceptors.push(Arc::new(logger));
        }
        if let Some(classifier) = self.classifier {
            interceptors.push(Arc::new(classifier));
        }
        let breaker = self.breaker.map(|(breaker, abort_on_open)| {
            interceptors.push(Arc::new(CircuitBreakerInterceptor::new(
                breaker.clone(),
                abort_on_open,
            )));
            breaker
        });
        if let Some(retrier) = self.retrier {
            interceptors.push(Arc::new(retrier));
        }
        interceptors.extend(self.extra);

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        Ok(Pipeline {
            chain: Chain::from_shared(transport, interceptors),
            breaker,
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("has_transport", &self.transport.is_some())
            .field("has_secret", &self.secret.is_some())
            .field("logger", &self.logger)
            .field("classifier", &self.classifier.is_some())
            .field("breaker", &self.breaker.as_ref().map(|(_, abort)| *abort))
            .field("retrier", &self.retrier)
            .field("extra", &self.extra.len())
            .finish()
    }
}

/// Chain over `reqwest` that authenticates every request with `secret`.
pub fn with_default_auth(secret: impl AsRef<str>) -> Result<Arc<Chain>> {
    let auth: Arc<dyn Interceptor> = Arc::new(Authenticator::new(secret)?);
    Ok(Chain::with_interceptors(ReqwestTransport::new(), vec![auth]))
}
