//! # httpchain-core
//!
//! Call context, interceptor contract, and chain executor for httpchain.
//!
//! ## Core Concepts
//!
//! - **[`Chain`]**: Runs interceptors around a single transport call
//! - **[`Interceptor`]**: Two-hook contract (`before_request` / `after_response`)
//! - **[`CallContext`]**: Per-call state shared by the hooks
//! - **[`Transport`]**: Performs the actual HTTP exchange
//! - **[`Replay`]**: Re-issues a request through a chain under the same id
//!
//! ## Example
//!
//! ```ignore
//! use httpchain_core::{Chain, HttpRequest, ReqwestTransport};
//!
//! let chain = Chain::new(ReqwestTransport::new());
//! chain.add_interceptor(my_interceptor);
//!
//! let response = chain.execute(HttpRequest::get("https://api.example.com/v1/items")?).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod chain;
pub mod context;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod mock;
pub mod transport;

// Re-exports
pub use chain::{CallOptions, Chain, Replay};
pub use context::{CallContext, CallOrigin, CallScope, CorrelationId, Extensions};
pub use error::{ChainError, Result};
pub use http::{Body, BodyStream, HttpRequest, HttpResponse};
pub use interceptor::Interceptor;
pub use mock::{MockReply, MockTransport};
pub use transport::{ReqwestTransport, Transport};

pub use async_trait::async_trait;
pub use reqwest::header;
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode, Url};
pub use tokio_util::sync::CancellationToken;
