//! Kestrel Runtime - orchestration layer for the Kestrel bot.
//!
//! This crate provides:
//! - Layered configuration (`figment`): defaults, `kestrel.toml`, `KESTREL_*`
//!   environment variables, programmatic overrides
//! - Logging setup (`tracing-subscriber`, `tracing-appender`)
//! - A bounded background [`TaskQueue`] for slow collaborators
//! - Runtime orchestration ([`KestrelRuntime`]): transport construction,
//!   supervisor lifecycle, signal handling and ban-list reload
//!
//! ```ignore
//! use kestrel_runtime::KestrelRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KestrelRuntime::builder().build()?;
//!     runtime.route(Route::new(MyHandler));
//!
//!     // Run until Ctrl+C; SIGHUP reloads the ban list
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod task_queue;

pub use config::{ConfigError, ConfigLoader, ConfigResult, KestrelConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{KestrelRuntime, RuntimeBuilder};
pub use task_queue::{QueueError, QueueStats, TaskQueue};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Logging macros plus the runtime entry points.
pub mod prelude {
    pub use super::{KestrelRuntime, QueueError, TaskQueue};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
