//! The two-hook interceptor contract.

use crate::context::CallContext;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A behavior that runs around every call made through a chain.
///
/// `before_request` hooks run in registration order before the network call,
/// `after_response` hooks run in the same order afterwards. Returning `Err`
/// from either hook stops the chain and becomes the call's result.
///
/// A before hook may also:
/// - rewrite `ctx.request`;
/// - set `ctx.response` to skip the remaining before hooks and the network call;
/// - set `ctx.error` so the network call is not made once the before phase ends.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Runs before the network call.
    async fn before_request(&self, _ctx: &mut CallContext) -> Result<()> {
        Ok(())
    }

    /// Runs after the network call, observing its response or error.
    async fn after_response(&self, _ctx: &mut CallContext) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn before_request(&self, ctx: &mut CallContext) -> Result<()> {
        (**self).before_request(ctx).await
    }

    async fn after_response(&self, ctx: &mut CallContext) -> Result<()> {
        (**self).after_response(ctx).await
    }
}
