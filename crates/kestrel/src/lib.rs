//! # Kestrel
//!
//! A resilient OneBot v11 bot: event ingestion, deduplication, rate limiting,
//! blocked-sender filtering and ordered multi-handler dispatch.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌──────────────────────────────┐   ┌─────────┐
//! │ Supervisor │──▶│  Codec  │──▶│ Dispatcher                   │──▶│ Gateway │
//! │ (WebSocket)│   │         │   │ dedup → ban → limit → action │   │ (HTTP)  │
//! └────────────┘   └─────────┘   └──────────────────────────────┘   └─────────┘
//!                                              │
//!                                              ▼
//!                                         TaskQueue ──▶ slow collaborators
//! ```
//!
//! - **Runtime**: loads configuration, builds transports, runs the supervisor
//! - **Supervisor**: keeps one connection open, reconnecting after a fixed delay
//! - **Dispatcher**: runs every matching [`Handler`](kestrel_core::Handler) in order
//! - **TaskQueue**: bounded workers for responders that wait on remote services
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kestrel::prelude::*;
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl Handler for Ping {
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
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KestrelRuntime::builder().build()?;
//!     runtime.route(Route::new(Ping));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use kestrel_core as core;
pub use kestrel_runtime as runtime;
pub use kestrel_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use kestrel::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use kestrel_runtime::{KestrelConfig, KestrelRuntime, QueueError, TaskQueue};

    // Handlers and routing
    pub use kestrel_core::{
        BoxedGateway, Event, Gateway, Handler, HandlerContext, HandlerError, HandlerResult,
        RateLimiter, ReplyTarget, Route,
    };

    pub use kestrel_core::async_trait;
}
