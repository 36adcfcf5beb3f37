//! Turning failed responses into errors.

use async_trait::async_trait;
use httpchain_core::{CallContext, ChainError, HttpResponse, Interceptor, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Decides whether a response is a failure.
#[async_trait]
pub trait ErrorDetector: Send + Sync {
    /// Return the error to attach, or `None` to keep the call successful.
    ///
    /// The detector may buffer the response body; it must leave it readable.
    async fn detect(&self, response: &mut HttpResponse) -> Option<ChainError>;
}

/// Treats every response with status >= 400 as a failure.
///
/// The message is taken from a JSON body, first match wins:
/// `message.detail`, `reason`, `error`. Anything else falls back to
/// `non-2xx response: <code>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusErrorDetector;

const MESSAGE_POINTERS: [&str; 3] = ["/message/detail", "/reason", "/error"];

impl StatusErrorDetector {
    fn extract_message(body: &[u8]) -> Option<String> {
        if body.is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "Failed to parse error body");
                return None;
            }
        };
        MESSAGE_POINTERS.iter().find_map(|pointer| {
            value
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        })
    }
}

#[async_trait]
impl ErrorDetector for StatusErrorDetector {
    async fn detect(&self, response: &mut HttpResponse) -> Option<ChainError> {
        let status = response.status_code();
        if status < 400 {
            return None;
        }

        let (body, read_error) = response.body.buffer_partial().await;
        if let Some(err) = read_error {
            debug!(status, error = %err, "Failed to read error body");
        }
        let message = Self::extract_message(&body)
            .unwrap_or_else(|| format!("non-2xx response: {status}"));
        Some(ChainError::status(status, message))
    }
}

/// Interceptor that sets the call's error when the detector flags the
/// response. The response itself is kept.
#[derive(Clone)]
pub struct ErrorClassifier {
    detector: Arc<dyn ErrorDetector>,
}

impl ErrorClassifier {
    /// Create a classifier with a custom detector.
    pub fn new(detector: impl ErrorDetector + 'static) -> Self {
        Self {
            detector: Arc::new(detector),
        }
    }

    /// Classify every status >= 400 as a failure.
    pub fn all_failures() -> Self {
        Self::new(StatusErrorDetector)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::all_failures()
    }
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for ErrorClassifier {
    fn name(&self) -> &'static str {
        "error_classifier"
    }

    async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
        let Some(response) = ctx.response.as_mut() else {
            return Ok(());
        };
        if let Some(err) = self.detector.detect(response).await {
            ctx.error = Some(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpchain_core::{Chain, HttpRequest, MockTransport};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn request() -> HttpRequest {
        HttpRequest::get("https://api.example.com/v1/servers/42").unwrap()
    }

    #[rstest]
    #[case(404, r#"{"message":{"detail":"not found"}}"#, "not found")]
    #[case(400, r#"{"reason":"bad flavor","error":"ignored"}"#, "bad flavor")]
    #[case(403, r#"{"error":"forbidden"}"#, "forbidden")]
    #[case(409, r#"{"message":"plain string","error":"conflict"}"#, "conflict")]
    #[case(422, r#"{"message":{"detail":""},"reason":"invalid"}"#, "invalid")]
    #[case(500, "<html>oops</html>", "non-2xx response: 500")]
    #[case(502, "", "non-2xx response: 502")]
    #[case(503, r#"{"details":"only details"}"#, "non-2xx response: 503")]
    #[tokio::test]
    async fn test_extracts_message(#[case] status: u16, #[case] body: &'static str, #[case] expected: &str) {
        let chain = Chain::new(MockTransport::new().reply(status, body));
        chain.add_interceptor(ErrorClassifier::default());

        let err = chain.execute(request()).await.unwrap_err();
        assert_eq!(err.status_code(), Some(status));
        assert_eq!(err.to_string(), expected);
    }

    #[tokio::test]
    async fn test_success_is_untouched() {
        let chain = Chain::new(MockTransport::new().reply(201, "created"));
        chain.add_interceptor(ErrorClassifier::default());

        let response = chain.execute(request()).await.unwrap();
        assert_eq!(response.text().await.unwrap(), "created");
    }

    #[tokio::test]
    async fn test_keeps_response_for_later_hooks() {
        struct BodyAfter(parking_lot::Mutex<Option<String>>);

        #[async_trait]
        impl Interceptor for BodyAfter {
            async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
                if let Some(response) = ctx.response.as_mut() {
                    let body = response.body.buffer().await?;
                    *self.0.lock() = Some(String::from_utf8_lossy(&body).into_owned());
                }
                Ok(())
            }
        }

        let seen = Arc::new(BodyAfter(parking_lot::Mutex::new(None)));
        let chain = Chain::new(MockTransport::new().reply(404, r#"{"error":"gone"}"#));
        chain.add_interceptor(ErrorClassifier::default());
        chain.add_interceptors(vec![seen.clone() as Arc<dyn Interceptor>]);

        let err = chain.execute(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "gone");
        assert_eq!(seen.0.lock().as_deref(), Some(r#"{"error":"gone"}"#));
    }

    #[tokio::test]
    async fn test_broken_error_body_still_classified_by_status() {
        let chain = Chain::new(MockTransport::new().reply_broken(503, r#"{"reason":"#, "reset"));
        chain.add_interceptor(ErrorClassifier::default());

        let err = chain.execute(request()).await.unwrap_err();
        assert!(matches!(
            &err,
            ChainError::Status { status: 503, message } if message == "non-2xx response: 503"
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_partial_error_body_is_parsed() {
        let chain = Chain::new(MockTransport::new().reply_broken(
            429,
            r#"{"reason":"slow down"}"#,
            "reset",
        ));
        chain.add_interceptor(ErrorClassifier::default());

        let err = chain.execute(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "slow down");
        assert_eq!(err.status_code(), Some(429));
    }

    #[tokio::test]
    async fn test_custom_detector() {
        struct TeapotOnly;

        #[async_trait]
        impl ErrorDetector for TeapotOnly {
            async fn detect(&self, response: &mut HttpResponse) -> Option<ChainError> {
                (response.status_code() == 418).then(|| ChainError::status(418, "teapot"))
            }
        }

        let chain = Chain::new(MockTransport::new().reply(500, "").reply(418, ""));
        chain.add_interceptor(ErrorClassifier::new(TeapotOnly));

        assert_eq!(chain.execute(request()).await.unwrap().status_code(), 500);
        assert_eq!(chain.execute(request()).await.unwrap_err().to_string(), "teapot");
    }
}
