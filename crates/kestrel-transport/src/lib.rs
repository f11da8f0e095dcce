//! # Kestrel Transport
//!
//! Network transports for the Kestrel bot.
//!
//! This crate provides concrete implementations of the seams defined in
//! `kestrel-core`. Each transport sits behind a feature flag.
//!
//! ## Features
//!
//! - `ws-client` (default): WebSocket [`Connector`](kestrel_core::Connector)
//!   for the gateway's event stream
//! - `http-client` (default): HTTP [`Gateway`](kestrel_core::Gateway) for
//!   outbound messages
//! - `full`: All transports
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  kestrel-runtime    │  (wiring, config)
//! ├─────────────────────┤
//! │  kestrel-core       │  (Connector / Gateway traits)
//! ├─────────────────────┤
//! │  kestrel-transport  │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kestrel_transport::{HttpGateway, WsConnector};
//!
//! let connector = WsConnector::new("ws://127.0.0.1:3001").access_token(token);
//! let gateway = HttpGateway::builder("http://127.0.0.1:3000")
//!     .access_token(token)
//!     .build()?;
//! ```

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "ws-client")]
pub mod websocket;

#[cfg(feature = "http-client")]
pub use http::{
    DEFAULT_HTTP_CONNECT_TIMEOUT, DEFAULT_HTTP_REQUEST_TIMEOUT, HttpGateway, HttpGatewayBuilder,
    send_request,
};

#[cfg(feature = "ws-client")]
pub use websocket::{DEFAULT_CONNECT_TIMEOUT, WsConnector};
