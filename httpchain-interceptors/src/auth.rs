//! Bearer token authentication.

use async_trait::async_trait;
use httpchain_core::header::AUTHORIZATION;
use httpchain_core::{CallContext, ChainError, HeaderValue, Interceptor, Result};
use std::fmt;

/// Stamps every request with `Authorization: Bearer <secret>`.
#[derive(Clone)]
pub struct Authenticator {
    value: HeaderValue,
}

impl Authenticator {
    /// Create an authenticator for a secret key.
    ///
    /// Fails with [`ChainError::Configuration`] if the secret cannot be
    /// carried in a header value.
    pub fn new(secret: impl AsRef<str>) -> Result<Self> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", secret.as_ref()))
            .map_err(|_| ChainError::Configuration("secret is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("value", &"Bearer <redacted>")
            .finish()
    }
}

#[async_trait]
impl Interceptor for Authenticator {
    fn name(&self) -> &'static str {
        "authenticator"
    }

    async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
        ctx.request.headers.insert(AUTHORIZATION, self.value.clone());
        Ok(())
    }
}
