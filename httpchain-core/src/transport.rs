//! The underlying transport the chain sends requests through.

use crate::error::Result;
use crate::http::{Body, HttpRequest, HttpResponse};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

/// Performs a single HTTP exchange.
///
/// Connection pooling, TLS, and redirects belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the response.
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by a `reqwest` client.
///
/// Response bodies are left streaming; they are only read when an
/// interceptor or the caller asks for them.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a custom client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        debug!(method = %method, url = %url, "Sending HTTP request");

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Into::into))
            .boxed();

        Ok(HttpResponse::new(status)
            .with_headers(headers)
            .with_body(Body::from_stream(stream)))
    }
}
