//! Request, response, and body types passed through the chain.
//!
//! Requests hold their body in memory so the chain can snapshot them for
//! replay. Responses may carry a streaming body; interceptors that need to
//! look at it call [`Body::buffer`], which reads the stream once and puts the
//! bytes back so nothing downstream loses them. A stream that fails midway is
//! put back as [`Body::Failed`], so later readers still see the failure.

use crate::error::{ChainError, Result};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use std::fmt;

/// Stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a request from a URL string.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| ChainError::Configuration(format!("invalid URL '{url}': {e}")))?;
        Ok(Self::new(method, url))
    }

    /// Create a GET request.
    pub fn get(url: &str) -> Result<Self> {
        Self::parse(Method::GET, url)
    }

    /// Create a POST request.
    pub fn post(url: &str) -> Result<Self> {
        Self::parse(Method::POST, url)
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a header from strings.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        Ok(self.with_header(name, value))
    }

    /// Get the URL path.
    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// A response body, either in memory or still streaming.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Fully buffered body.
    Full(Bytes),
    /// Body not read yet.
    Streaming(BodyStream),
    /// Body whose stream failed after yielding `partial`.
    ///
    /// Reading it again returns `error`.
    Failed {
        /// Bytes received before the failure.
        partial: Bytes,
        /// The stream's error.
        error: ChainError,
    },
}

impl Body {
    /// Create a streaming body.
    pub fn from_stream(stream: BodyStream) -> Self {
        Self::Streaming(stream)
    }

    /// Check whether the body is known to be empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(bytes) => bytes.is_empty(),
            Body::Streaming(_) | Body::Failed { .. } => false,
        }
    }

    /// Check whether the body has been read into memory.
    pub fn is_buffered(&self) -> bool {
        !matches!(self, Body::Streaming(_))
    }

    /// Read the whole body without consuming it.
    ///
    /// A streaming body is drained once and replaced by a buffered body
    /// holding the same bytes. If the stream fails midway the body becomes
    /// [`Body::Failed`] and every read, this one included, returns the error.
    pub async fn buffer(&mut self) -> Result<Bytes> {
        match self.buffer_partial().await {
            (bytes, None) => Ok(bytes),
            (_, Some(err)) => Err(err),
        }
    }

    /// Read as much of the body as possible without consuming it.
    ///
    /// Returns the bytes received and, if the stream failed, its error. The
    /// failure stays in the body for the next reader. Meant for hooks that
    /// only inspect the body.
    pub async fn buffer_partial(&mut self) -> (Bytes, Option<ChainError>) {
        let mut stream = match std::mem::take(self) {
            Body::Empty => return (Bytes::new(), None),
            Body::Full(bytes) => {
                *self = Body::Full(bytes.clone());
                return (bytes, None);
            }
            Body::Failed { partial, error } => {
                *self = Body::Failed {
                    partial: partial.clone(),
                    error: error.clone(),
                };
                return (partial, Some(error));
            }
            Body::Streaming(stream) => stream,
        };

        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => buf.extend_from_slice(&chunk),
                Err(error) => {
                    let partial = buf.freeze();
                    *self = Body::Failed {
                        partial: partial.clone(),
                        error: error.clone(),
                    };
                    return (partial, Some(error));
                }
            }
        }

        let bytes = buf.freeze();
        *self = Body::Full(bytes.clone());
        (bytes, None)
    }

    /// Consume the body into bytes.
    pub async fn into_bytes(mut self) -> Result<Bytes> {
        self.buffer().await
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
            Body::Streaming(_) => f.write_str("Body::Streaming(..)"),
            Body::Failed { partial, error } => f
                .debug_struct("Body::Failed")
                .field("partial", &partial.len())
                .field("error", error)
                .finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Body::Empty
        } else {
            Body::Full(bytes)
        }
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::from(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::from(Bytes::from(s))
    }
}

/// An HTTP response flowing back through the chain.
#[derive(Debug)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Body,
}

impl HttpResponse {
    /// Create an empty response.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    /// Create an empty response from a raw status code.
    pub fn from_status(status: u16) -> Result<Self> {
        let status = StatusCode::from_u16(status)
            .map_err(|e| ChainError::Configuration(format!("invalid status {status}: {e}")))?;
        Ok(Self::new(status))
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Get the status code as a number.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Check for a 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Read the body into bytes.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body.into_bytes().await
    }

    /// Read the body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ChainError::Configuration(format!("invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| ChainError::Configuration(format!("invalid header value: {e}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunked(parts: Vec<Result<Bytes>>) -> Body {
        Body::from_stream(stream::iter(parts).boxed())
    }

    #[tokio::test]
    async fn test_buffer_restores_streaming_body() {
        let mut body = chunked(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        assert!(!body.is_buffered());

        let first = body.buffer().await.unwrap();
        assert_eq!(&first[..], b"hello world");
        assert!(body.is_buffered());

        let second = body.buffer().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(&body.into_bytes().await.unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn test_failed_stream_stays_failed() {
        let mut body = chunked(vec![
            Ok(Bytes::from_static(b"part")),
            Err(ChainError::Body("reset".into())),
        ]);

        assert!(matches!(body.buffer().await, Err(ChainError::Body(_))));
        assert!(body.is_buffered());
        assert!(!body.is_empty());

        let (partial, err) = body.buffer_partial().await;
        assert_eq!(&partial[..], b"part");
        assert!(matches!(err, Some(ChainError::Body(msg)) if msg == "reset"));

        let err = body.into_bytes().await.unwrap_err();
        assert_eq!(err.to_string(), "Body error: reset");
    }

    #[tokio::test]
    async fn test_buffer_partial_on_healthy_stream() {
        let mut body = chunked(vec![Ok(Bytes::from_static(b"whole"))]);
        let (bytes, err) = body.buffer_partial().await;
        assert_eq!(&bytes[..], b"whole");
        assert!(err.is_none());
        assert!(matches!(body, Body::Full(_)));
    }

    #[tokio::test]
    async fn test_failed_response_text_is_error() {
        let mut response = HttpResponse::from_status(200).unwrap().with_body(chunked(vec![
            Ok(Bytes::from_static(b"{\"items\":[1,")),
            Err(ChainError::Body("connection reset".into())),
        ]));
        assert!(response.body.buffer().await.is_err());

        let err = response.text().await.unwrap_err();
        assert!(matches!(err, ChainError::Body(msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn test_response_text() {
        let response = HttpResponse::from_status(200).unwrap().with_body("ok");
        assert!(response.is_success());
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::post("https://api.example.com/v1/items?limit=2")
            .unwrap()
            .with_body("{}")
            .try_header("x-trace", "abc")
            .unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path(), "/v1/items");
        assert_eq!(request.headers["x-trace"], "abc");
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = HttpRequest::get("not a url").unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[test]
    fn test_empty_bytes_become_empty_body() {
        assert!(matches!(Body::from(Bytes::new()), Body::Empty));
        assert!(Body::from("x").is_buffered());
    }
}
