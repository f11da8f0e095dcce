//! Configuration schema definitions.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a runnable configuration pointing at a local gateway.
//!
//! ```toml
//! [gateway]
//! ws_url = "ws://127.0.0.1:3001"
//! api_url = "http://127.0.0.1:3000"
//! access_token = "secret"
//!
//! [identity]
//! names = ["kestrel"]
//!
//! [rate_limit]
//! window_ms = 60000
//! max_requests = 10
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kestrel_core::{BotIdentity, DEFAULT_BAN_NOTICE, RateLimiter};

/// Placeholder token shipped in sample configurations.
pub const PLACEHOLDER_TOKEN: &str = "YOUR_TOKEN_HERE";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KestrelConfig {
    /// Gateway endpoints and connection timing.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// How the bot recognizes mentions of itself.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Shared rate limit for throttled responders.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Blocked-sender list.
    #[serde(default)]
    pub ban: BanConfig,

    /// Background task queue.
    #[serde(default)]
    pub tasks: TaskConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Gateway
// =============================================================================

/// OneBot gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Event stream endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// HTTP API root.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for both endpoints.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Delay before reconnecting, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Connection establishment timeout, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Total HTTP request timeout, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_url: default_api_url(),
            access_token: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl GatewayConfig {
    /// The reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// The connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The access token, unless it is unset, empty or the placeholder.
    pub fn effective_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty() && *t != PLACEHOLDER_TOKEN)
    }
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:3001".to_string()
}

fn default_api_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10000
}

fn default_request_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Identity & Dispatch
// =============================================================================

/// Bot identity used for mention detection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// The bot's account id; the gateway-reported id is used when unset.
    #[serde(default)]
    pub self_id: Option<i64>,

    /// Mention display names that address the bot.
    #[serde(default)]
    pub names: Vec<String>,
}

impl IdentityConfig {
    /// Converts to the codec's identity.
    pub fn to_identity(&self) -> BotIdentity {
        BotIdentity {
            self_id: self.self_id,
            names: self.names.clone(),
        }
    }
}

/// Dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of message ids remembered before the cache is cleared.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

fn default_dedup_capacity() -> usize {
    1000
}

// =============================================================================
// Rate Limit
// =============================================================================

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length, in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Lock-out after the limit is hit, in milliseconds.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            cooldown_ms: None,
        }
    }
}

impl RateLimitConfig {
    /// Builds a limiter from these settings.
    pub fn build_limiter(&self) -> RateLimiter {
        let window = Duration::from_millis(self.window_ms);
        match self.cooldown_ms {
            Some(cooldown) => {
                RateLimiter::with_cooldown(self.max_requests, window, Duration::from_millis(cooldown))
            }
            None => RateLimiter::fixed_window(self.max_requests, window),
        }
    }
}

fn default_window_ms() -> u64 {
    60000
}

fn default_max_requests() -> u32 {
    10
}

// =============================================================================
// Ban List
// =============================================================================

/// Blocked-sender list settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanConfig {
    /// Path of the list file; created empty when missing.
    #[serde(default = "default_ban_path")]
    pub path: PathBuf,

    /// Notice sent to banned senders.
    #[serde(default = "default_ban_notice")]
    pub notice: String,
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            path: default_ban_path(),
            notice: default_ban_notice(),
        }
    }
}

fn default_ban_path() -> PathBuf {
    PathBuf::from("ban.txt")
}

fn default_ban_notice() -> String {
    DEFAULT_BAN_NOTICE.to_string()
}

// =============================================================================
// Task Queue
// =============================================================================

/// Background task queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Number of worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Tasks that may wait for a worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Per-task time limit, in milliseconds.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            task_timeout_ms: default_task_timeout_ms(),
        }
    }
}

impl TaskConfig {
    /// The per-task time limit.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    32
}

fn default_task_timeout_ms() -> u64 {
    20000
}

// =============================================================================
// Logging
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact single-line output.
    #[default]
    Compact,
    /// Default `tracing-subscriber` output.
    Full,
    /// Multi-line human-friendly output.
    Pretty,
    /// JSON lines (requires the `json-log` feature).
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A file, see [`LoggingConfig::file_path`].
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    /// Span creation.
    #[serde(default)]
    pub new: bool,
    /// Span entry.
    #[serde(default)]
    pub enter: bool,
    /// Span exit.
    #[serde(default)]
    pub exit: bool,
    /// Span close.
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// File path for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `kestrel_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the base level.
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        self.level.parse().ok()
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
