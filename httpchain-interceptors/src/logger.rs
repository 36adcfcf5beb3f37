//! Request and response logging.
//!
//! Each phase builds its lines into one block and hands it to a [`LogSink`]
//! once. Bodies are read through [`Body::buffer`](httpchain_core::Body::buffer)
//! so the caller still sees every byte.

use async_trait::async_trait;
use bytes::Bytes;
use httpchain_core::{CallContext, CorrelationId, HeaderMap, Interceptor, Result};
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::Level;

/// Marker appended to a body cut at `max_body_log_size`.
pub const TRUNCATED_MARKER: &str = " [truncated...]";

/// Default maximum number of body bytes logged.
pub const DEFAULT_MAX_BODY_LOG_SIZE: usize = 1024;

/// Destination for formatted log blocks.
pub trait LogSink: Send + Sync {
    /// Emit one block of lines.
    fn emit(&self, level: Level, block: &str);
}

/// Sink emitting `tracing` events on target `httpchain::http`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: Level, block: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "httpchain::http", "{block}"),
            Level::WARN => tracing::warn!(target: "httpchain::http", "{block}"),
            Level::INFO => tracing::info!(target: "httpchain::http", "{block}"),
            Level::DEBUG => tracing::debug!(target: "httpchain::http", "{block}"),
            Level::TRACE => tracing::trace!(target: "httpchain::http", "{block}"),
        }
    }
}

/// Options for the [`Logger`].
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    /// Log method, URL and status.
    pub log_basic_info: bool,
    /// Log headers.
    pub log_headers: bool,
    /// Log bodies.
    pub log_body: bool,
    /// Maximum body bytes logged before truncation.
    pub max_body_log_size: usize,
    /// Header names left out of the log, lowercased.
    pub skip_headers: Vec<String>,
    /// URL path prefixes that are not logged at all.
    pub skip_paths: Vec<String>,
    /// Level the blocks are emitted at.
    pub level: Level,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            log_basic_info: true,
            log_headers: false,
            log_body: false,
            max_body_log_size: DEFAULT_MAX_BODY_LOG_SIZE,
            skip_headers: Vec::new(),
            skip_paths: Vec::new(),
            level: Level::INFO,
        }
    }
}

impl LoggerOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log everything.
    pub fn verbose() -> Self {
        Self::new().headers(true).body(true)
    }

    /// Toggle method, URL and status lines.
    pub fn basic_info(mut self, enabled: bool) -> Self {
        self.log_basic_info = enabled;
        self
    }

    /// Toggle header lines.
    pub fn headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    /// Toggle body lines.
    pub fn body(mut self, enabled: bool) -> Self {
        self.log_body = enabled;
        self
    }

    /// Set the body truncation size. Zero means the default.
    pub fn max_body_log_size(mut self, size: usize) -> Self {
        self.max_body_log_size = if size == 0 {
            DEFAULT_MAX_BODY_LOG_SIZE
        } else {
            size
        };
        self
    }

    /// Leave a header out of the log.
    pub fn skip_header(mut self, name: impl AsRef<str>) -> Self {
        self.skip_headers.push(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Do not log calls whose path starts with `prefix`.
    pub fn skip_path(mut self, prefix: impl Into<String>) -> Self {
        self.skip_paths.push(prefix.into());
        self
    }

    /// Set the emit level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    fn normalized(mut self) -> Self {
        if self.max_body_log_size == 0 {
            self.max_body_log_size = DEFAULT_MAX_BODY_LOG_SIZE;
        }
        for name in &mut self.skip_headers {
            name.make_ascii_lowercase();
        }
        self
    }
}

/// Interceptor that logs requests and responses.
#[derive(Clone)]
pub struct Logger {
    opts: LoggerOptions,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Create a logger writing to `tracing`.
    pub fn new(opts: LoggerOptions) -> Self {
        Self::with_sink(opts, Arc::new(TracingSink))
    }

    /// Create a logger writing to a custom sink.
    pub fn with_sink(opts: LoggerOptions, sink: Arc<dyn LogSink>) -> Self {
        Self {
            opts: opts.normalized(),
            sink,
        }
    }

    /// Get the options.
    pub fn options(&self) -> &LoggerOptions {
        &self.opts
    }

    fn skips(&self, path: &str) -> bool {
        self.opts
            .skip_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn write_headers(&self, out: &mut String, id: &CorrelationId, prefix: &str, headers: &HeaderMap) {
        for (name, value) in headers {
            if self.opts.skip_headers.iter().any(|skip| skip == name.as_str()) {
                continue;
            }
            let value = String::from_utf8_lossy(value.as_bytes());
            let _ = writeln!(out, "[{id}] {prefix} HEADER: {name}: {value}");
        }
    }

    fn write_body(&self, out: &mut String, id: &CorrelationId, prefix: &str, body: &Bytes) {
        let max = self.opts.max_body_log_size;
        let (shown, marker) = if body.len() > max {
            (&body[..max], TRUNCATED_MARKER)
        } else {
            (&body[..], "")
        };
        let text = String::from_utf8_lossy(shown);
        let _ = writeln!(out, "[{id}] {prefix} BODY: {text}{marker}");
    }

    fn emit(&self, out: String) {
        if !out.is_empty() {
            self.sink.emit(self.opts.level, out.trim_end_matches('\n'));
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Interceptor for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
        if self.skips(ctx.request.path()) {
            return Ok(());
        }

        let id = ctx.id();
        let mut out = String::new();
        if self.opts.log_basic_info {
            let _ = writeln!(out, "[{id}] --> {} {}", ctx.request.method, ctx.request.url);
        }
        if self.opts.log_headers {
            self.write_headers(&mut out, id, "REQ", &ctx.request.headers);
        }
        if self.opts.log_body {
            if let Some(body) = &ctx.request.body {
                self.write_body(&mut out, id, "REQ", body);
            }
        }

        self.emit(out);
        Ok(())
    }

    async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
        if self.skips(ctx.request.path()) {
            return Ok(());
        }

        let id = ctx.id().clone();
        let mut out = String::new();

        let Some(response) = ctx.response.as_mut() else {
            if self.opts.log_basic_info {
                match &ctx.error {
                    Some(err) => {
                        let _ = writeln!(out, "[{id}] <-- error: {err}");
                    }
                    None => {
                        let _ = writeln!(out, "[{id}] <-- no response");
                    }
                }
            }
            self.emit(out);
            return Ok(());
        };

        if self.opts.log_basic_info {
            let reason = response.status.canonical_reason().unwrap_or("");
            let _ = writeln!(out, "[{id}] <-- {} {reason}", response.status.as_u16());
        }
        if self.opts.log_headers {
            self.write_headers(&mut out, &id, "RESP", &response.headers);
        }
        if self.opts.log_body {
            match response.body.buffer().await {
                Ok(body) => self.write_body(&mut out, &id, "RESP", &body),
                Err(err) => {
                    let _ = writeln!(out, "[{id}] Error reading response body: {err}");
                }
            }
        }

        self.emit(out);
        Ok(())
    }
}
