//! Error types for the interceptor chain.

use thiserror::Error;

/// Every way a call through the chain can fail.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The transport timed out.
    #[error("Timeout")]
    Timeout,

    /// The transport could not connect.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Any other transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response classified as a failure.
    ///
    /// Displays only the extracted message so callers see the server's reason.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Reason extracted from the body, or a generic fallback.
        message: String,
    },

    /// Retries ran out without a concrete underlying error.
    #[error("max retries exceeded")]
    AttemptsExhausted {
        /// Number of retries evaluated when the budget ran out.
        attempts: u32,
    },

    /// The circuit breaker refused the call.
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// A hook failed internally.
    #[error("Interceptor '{name}' failed: {message}")]
    Interceptor {
        /// Interceptor name.
        name: &'static str,
        /// What went wrong.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reading a body stream failed.
    #[error("Body error: {0}")]
    Body(String),

    /// The chain finished with neither a response nor an error.
    #[error("call completed without a response")]
    NoResponse,

    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,

    /// The caller's deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl ChainError {
    /// Create a classified status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an interceptor failure.
    pub fn interceptor(name: &'static str, message: impl Into<String>) -> Self {
        Self::Interceptor {
            name,
            message: message.into(),
        }
    }

    /// Check if this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::Transport(_)
        )
    }

    /// Check if a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) | Self::Transport(_) => true,
            Self::Status { .. } => true,
            Self::CircuitOpen => true,
            Self::AttemptsExhausted { .. }
            | Self::Interceptor { .. }
            | Self::Configuration(_)
            | Self::Body(_)
            | Self::NoResponse
            | Self::Cancelled
            | Self::DeadlineExceeded => false,
        }
    }

    /// Check if the caller asked for the call to stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Get the HTTP status if this is a classified failure.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChainError::Timeout
        } else if err.is_connect() {
            ChainError::Connection(err.to_string())
        } else if err.is_body() || err.is_decode() {
            ChainError::Body(err.to_string())
        } else {
            ChainError::Transport(err.to_string())
        }
    }
}

/// Result type alias using ChainError.
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_displays_message_only() {
        let err = ChainError::status(404, "not found");
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn test_fixed_messages() {
        assert_eq!(
            ChainError::AttemptsExhausted { attempts: 3 }.to_string(),
            "max retries exceeded"
        );
        assert_eq!(ChainError::CircuitOpen.to_string(), "circuit breaker is open");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ChainError::Timeout.is_retryable());
        assert!(ChainError::connection("refused").is_retryable());
        assert!(ChainError::status(500, "boom").is_retryable());
        assert!(ChainError::CircuitOpen.is_retryable());
        assert!(!ChainError::AttemptsExhausted { attempts: 1 }.is_retryable());
        assert!(!ChainError::Configuration("bad".into()).is_retryable());
        assert!(!ChainError::Cancelled.is_retryable());
    }

    #[test]
    fn test_transport_kinds() {
        assert!(ChainError::Transport("reset".into()).is_transport());
        assert!(!ChainError::status(500, "x").is_transport());
        assert!(ChainError::DeadlineExceeded.is_cancellation());
    }
}
