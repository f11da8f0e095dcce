//! Outbound message gateway abstraction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::event::ReplyTarget;

/// Sends plain-text messages back to the messaging platform.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Sends `text` to `target`.
    async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()>;
}

/// Shared gateway handle.
pub type BoxedGateway = Arc<dyn Gateway>;

#[async_trait]
impl<G: Gateway + ?Sized> Gateway for Arc<G> {
    async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
        (**self).send(target, text).await
    }
}
