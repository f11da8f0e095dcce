//! Responders and their registration entries.
//!
//! A [`Handler`] decides whether it wants an event ([`Handler::matches`]) and
//! then acts on it ([`Handler::execute`]). Handlers are registered with the
//! [`Dispatcher`](crate::Dispatcher) as [`Route`]s, which may attach a shared
//! [`RateLimiter`].
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_core::{Event, Handler, HandlerContext, HandlerResult, Route};
//!
//! struct Ping;
//!
//! #[async_trait::async_trait]
//! impl Handler for Ping {
//!     fn name(&self) -> &str { "ping" }
//!
//!     fn matches(&self, event: &Event) -> bool {
//!         event.text() == Some("ping")
//!     }
//!
//!     async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
//!         ctx.reply(event, "pong").await?;
//!         Ok(())
//!     }
//! }
//!
//! dispatcher.add(Route::new(Ping));
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{GatewayResult, HandlerResult};
use crate::event::{Event, ReplyTarget};
use crate::gateway::BoxedGateway;
use crate::rate_limit::RateLimiter;

/// Notice sent when a route's limiter rejects a request.
pub const DEFAULT_THROTTLE_NOTICE: &str = "调用过于频繁，请稍后再试。";

// ============================================================================
// Handler
// ============================================================================

/// A responder registered with the dispatcher.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Name used in logs and dispatch reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns `true` if this handler wants `event`.
    fn matches(&self, event: &Event) -> bool;

    /// Acts on a matched event.
    ///
    /// Returning an error stops the remaining handlers for this event.
    async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult;
}

/// Shared state handed to every [`Handler::execute`] call.
#[derive(Clone)]
pub struct HandlerContext {
    gateway: BoxedGateway,
}

impl HandlerContext {
    /// Creates a context around an outbound gateway.
    pub fn new(gateway: BoxedGateway) -> Self {
        Self { gateway }
    }

    /// The outbound gateway.
    pub fn gateway(&self) -> &BoxedGateway {
        &self.gateway
    }

    /// Sends `text` to an explicit target.
    pub async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
        self.gateway.send(target, text).await
    }

    /// Replies to the conversation `event` came from.
    ///
    /// Events without a reply target are ignored.
    pub async fn reply(&self, event: &Event, text: &str) -> GatewayResult<()> {
        match event.reply_target() {
            Some(target) => self.gateway.send(target, text).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext").finish_non_exhaustive()
    }
}

// ============================================================================
// Route
// ============================================================================

/// A handler plus its dispatch policy.
#[derive(Clone)]
pub struct Route {
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) limiter: Option<Arc<RateLimiter>>,
    pub(crate) throttle_notice: String,
}

impl Route {
    /// Creates an unlimited route for `handler`.
    pub fn new(handler: impl Handler) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Creates a route for an already shared handler.
    pub fn from_arc(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            limiter: None,
            throttle_notice: DEFAULT_THROTTLE_NOTICE.to_string(),
        }
    }

    /// Guards the handler with a limiter, which may be shared with other routes.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sets the notice sent when the limiter rejects a request.
    pub fn throttle_notice(mut self, notice: impl Into<String>) -> Self {
        self.throttle_notice = notice.into();
        self
    }

    /// The handler's name.
    pub fn name(&self) -> &str {
        self.handler.name()
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("handler", &self.handler.name())
            .field("limited", &self.limiter.is_some())
            .field("throttle_notice", &self.throttle_notice)
            .finish()
    }
}
