//! # Kestrel Core
//!
//! The event ingestion, resilience and dispatch engine of the Kestrel bot.
//!
//! Frames arrive from a long-lived transport connection, are decoded into typed
//! events, filtered for duplicates, banned senders and abusive call rates, and
//! routed to every registered responder whose predicate matches.
//!
//! ## Components
//!
//! - **Event Codec**: raw OneBot v11 frames to [`Event`] ([`EventCodec`])
//! - **Dedup Cache**: bounded set of dispatched ids ([`DedupCache`])
//! - **Rate Limiter**: fixed window with optional cooldown ([`RateLimiter`])
//! - **Ban Gate**: reloadable blocked-sender set ([`BanGate`])
//! - **Dispatch Router**: ordered multi-handler dispatch ([`Dispatcher`], [`Route`])
//! - **Connection Supervisor**: connect, receive, reconnect ([`ConnectionSupervisor`])
//!
//! Concrete transports and the outbound HTTP gateway live in
//! `kestrel-transport`; this crate only defines the seams they plug into
//! ([`Connector`], [`FrameStream`], [`Gateway`]).
//!
//! ## Data Flow
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌────────────┐   ┌─────────┐
//! │ Supervisor │──▶│  Codec  │──▶│ Dispatcher │──▶│ Gateway │
//! └────────────┘   └─────────┘   └────────────┘   └─────────┘
//!                                  │ dedup
//!                                  │ ban gate
//!                                  │ rate limit
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kestrel_core::*;
//!
//! let dispatcher = Dispatcher::new(gateway)
//!     .bans(Arc::new(BanGate::load(FileBanList::new("ban.txt"))?))
//!     .with(Route::new(Ping));
//!
//! let pipeline = EventPipeline::new(EventCodec::default(), dispatcher);
//! let supervisor = ConnectionSupervisor::new(connector, Arc::new(pipeline));
//! supervisor.start();
//! ```

pub mod ban;
pub mod clock;
pub mod codec;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod gateway;
pub mod handler;
pub mod pipeline;
pub mod rate_limit;
pub mod segment;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use ban::{BanGate, BanListSource, DEFAULT_BAN_NOTICE, FileBanList, StaticBanList, parse_ban_list};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{BotIdentity, EventCodec};
pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupCache};
pub use dispatcher::{DispatchAbort, DispatchReport, Dispatcher};
pub use error::{
    BanListError, DecodeError, GatewayError, GatewayResult, HandlerError, HandlerResult,
    TransportError, TransportResult,
};
pub use event::{Event, GroupMessage, Mention, PrivateMessage, ReplyTarget, UNKNOWN_SENDER_NAME};
pub use gateway::{BoxedGateway, Gateway};
pub use handler::{DEFAULT_THROTTLE_NOTICE, Handler, HandlerContext, Route};
pub use pipeline::EventPipeline;
pub use rate_limit::{RateLimiter, RateWindow};
pub use segment::{Segment, render_segments, strip_cq_codes};
pub use supervisor::{
    Connector, ConnectionState, ConnectionSupervisor, DEFAULT_RECONNECT_DELAY, FrameSink,
    FrameStream, SupervisorStats,
};

pub use async_trait::async_trait;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        Event, Gateway, Handler, HandlerContext, HandlerError, HandlerResult, ReplyTarget, Route,
    };
}
