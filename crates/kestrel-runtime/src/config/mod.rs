//! Configuration module for the Kestrel runtime.
//!
//! Layered loading (defaults, files, `KESTREL_*` environment, overrides)
//! followed by validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, PROFILE_ENV, Profile, load_config, load_config_from_file};
pub use schema::{
    BanConfig, DispatchConfig, GatewayConfig, IdentityConfig, KestrelConfig, LogFormat, LogOutput,
    LoggingConfig, PLACEHOLDER_TOKEN, RateLimitConfig, SpanEventConfig, TaskConfig,
};
pub use validation::{config_warnings, validate_config};
