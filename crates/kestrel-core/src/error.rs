//! Unified error types for the Kestrel core.
//!
//! Each layer of the pipeline owns one error enum. None of them are fatal to
//! the process: transport errors feed the reconnect loop, decode errors turn
//! into [`Event::Unknown`](crate::Event::Unknown), handler errors abort the
//! remaining handlers of a single event, and gateway errors are logged.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors produced while decoding an inbound transport frame.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame is JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// A field required by the classified event kind is missing.
    #[error("missing required field `{field}` for {kind} event")]
    MissingField {
        /// The event kind being decoded.
        kind: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// The envelope fields do not name an event kind this codec understands.
    #[error("unrecognized event: post_type={post_type:?}, detail={detail:?}")]
    Unrecognized {
        /// The `post_type` envelope field.
        post_type: String,
        /// The `message_type` / `meta_event_type` envelope field.
        detail: String,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Reading a frame failed.
    #[error("failed to receive frame: {0}")]
    ReceiveFailed(String),

    /// Handshake timed out.
    #[error("connect timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

// =============================================================================
// Gateway Errors
// =============================================================================

/// Errors returned by an outbound [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The request could not be delivered.
    #[error("request failed: {0}")]
    Request(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The gateway answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the caller if needed.
        body: String,
    },

    /// The gateway answered but reported an API failure.
    #[error("API error ({retcode}): {message}")]
    Api {
        /// OneBot return code.
        retcode: i64,
        /// Message reported by the gateway.
        message: String,
    },
}

// =============================================================================
// Handler Errors
// =============================================================================

/// Errors that escape a handler's predicate or action.
///
/// Returning one of these from [`Handler::execute`](crate::Handler::execute)
/// aborts the remaining handlers for the current event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Sending a reply failed and the handler chose not to swallow it.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The handler panicked; the payload message is preserved when available.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    /// Creates a generic handler error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

// =============================================================================
// Ban List Errors
// =============================================================================

/// Errors raised while loading a ban list source.
#[derive(Debug, Error)]
pub enum BanListError {
    /// The ban list file could not be read or created.
    #[error("failed to access ban list {path}: {source}")]
    Io {
        /// Path of the ban list.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for outbound gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type for handler actions.
pub type HandlerResult<T = ()> = Result<T, HandlerError>;
