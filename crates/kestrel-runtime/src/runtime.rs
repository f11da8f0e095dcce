//! Runtime orchestration.
//!
//! [`KestrelRuntime`] wires configuration into the core: it builds the HTTP
//! gateway, the WebSocket connector, the shared dedup cache, ban gate and task
//! queue, then runs a [`ConnectionSupervisor`] feeding an [`EventPipeline`]
//! until shutdown.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kestrel_runtime::KestrelRuntime;
//!
//! let runtime = KestrelRuntime::builder()
//!     .config_file("kestrel.toml")
//!     .build()?;
//!
//! runtime.route(Route::new(TriggerReply::new("oi", "io")));
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, KestrelConfig, config_warnings, validate_config};
use crate::error::RuntimeResult;
use crate::logging;
use crate::task_queue::TaskQueue;
use kestrel_core::{
    BanGate, BoxedGateway, ConnectionState, ConnectionSupervisor, Connector, DedupCache,
    Dispatcher, EventCodec, EventPipeline, FileBanList, RateLimiter, Route,
};
use kestrel_transport::{HttpGateway, WsConnector};

/// The bot runtime.
pub struct KestrelRuntime {
    config: KestrelConfig,
    gateway: BoxedGateway,
    connector: Arc<dyn Connector>,
    dedup: Arc<DedupCache>,
    bans: Arc<BanGate>,
    tasks: Arc<TaskQueue>,
    routes: Mutex<Vec<Route>>,
    supervisor: Mutex<Option<ConnectionSupervisor>>,
}

impl KestrelRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Must be called from within a tokio runtime (the task queue spawns its
    /// workers here).
    pub fn from_config(config: KestrelConfig) -> RuntimeResult<Self> {
        Self::assemble(config, None, None)
    }

    fn assemble(
        config: KestrelConfig,
        gateway: Option<BoxedGateway>,
        connector: Option<Arc<dyn Connector>>,
    ) -> RuntimeResult<Self> {
        validate_config(&config)?;
        for warning in config_warnings(&config) {
            warn!("{warning}");
        }

        let token = config.gateway.effective_token().map(str::to_owned);

        let gateway = match gateway {
            Some(gateway) => gateway,
            None => {
                let mut builder = HttpGateway::builder(&config.gateway.api_url)
                    .connect_timeout(config.gateway.connect_timeout())
                    .request_timeout(config.gateway.request_timeout());
                if let Some(token) = &token {
                    builder = builder.access_token(token);
                }
                Arc::new(builder.build()?) as BoxedGateway
            }
        };

        let connector = match connector {
            Some(connector) => connector,
            None => {
                let mut ws = WsConnector::new(&config.gateway.ws_url)
                    .connect_timeout(config.gateway.connect_timeout());
                if let Some(token) = &token {
                    ws = ws.access_token(token);
                }
                Arc::new(ws) as Arc<dyn Connector>
            }
        };

        let bans = BanGate::new(FileBanList::new(&config.ban.path)).notice_text(&config.ban.notice);
        info!(
            path = %config.ban.path.display(),
            banned = bans.len(),
            "Ban list loaded"
        );

        let dedup = DedupCache::new(config.dispatch.dedup_capacity);
        let tasks = TaskQueue::from_config(&config.tasks);

        info!(
            ws_url = %config.gateway.ws_url,
            api_url = %config.gateway.api_url,
            log_level = %config.logging.level,
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            gateway,
            connector,
            dedup: Arc::new(dedup),
            bans: Arc::new(bans),
            tasks: Arc::new(tasks),
            routes: Mutex::new(Vec::new()),
            supervisor: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &KestrelConfig {
        &self.config
    }

    /// The outbound gateway shared by every responder.
    pub fn gateway(&self) -> BoxedGateway {
        Arc::clone(&self.gateway)
    }

    /// The blocked-sender gate.
    pub fn ban_gate(&self) -> Arc<BanGate> {
        Arc::clone(&self.bans)
    }

    /// The dedup cache.
    pub fn dedup_cache(&self) -> Arc<DedupCache> {
        Arc::clone(&self.dedup)
    }

    /// The background task queue.
    pub fn task_queue(&self) -> Arc<TaskQueue> {
        Arc::clone(&self.tasks)
    }

    /// Creates a new limiter with the configured window. Routes that should
    /// share a budget must share the returned `Arc`.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::new(self.config.rate_limit.build_limiter())
    }

    /// Registers a route. Routes are tried in registration order.
    pub fn route(&self, route: Route) {
        if self.supervisor.lock().is_some() {
            warn!(route = route.name(), "Route registered after start is ignored");
            return;
        }
        debug!(route = route.name(), "Registered route");
        self.routes.lock().push(route);
    }

    /// Builder-style [`route`](Self::route).
    pub fn with_route(self, route: Route) -> Self {
        self.route(route);
        self
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    /// Current connection state, or `Disconnected` before start.
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor
            .lock()
            .as_ref()
            .map_or(ConnectionState::Disconnected, ConnectionSupervisor::state)
    }

    /// Whether the supervisor is running.
    pub fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .is_some_and(ConnectionSupervisor::is_running)
    }

    /// Re-reads the ban list. The previous set stays in force on failure.
    pub fn reload_bans(&self) -> RuntimeResult<usize> {
        match self.bans.reload() {
            Ok(count) => {
                info!(banned = count, "Ban list reloaded");
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "Ban list reload failed, keeping previous list");
                Err(e.into())
            }
        }
    }

    /// Builds the dispatcher from the registered routes and starts the
    /// connection supervisor.
    pub fn start(&self) {
        let mut slot = self.supervisor.lock();
        if slot.is_some() {
            warn!("Runtime is already running");
            return;
        }

        let mut dispatcher = Dispatcher::new(Arc::clone(&self.gateway))
            .dedup(Arc::clone(&self.dedup))
            .bans(Arc::clone(&self.bans));
        for route in self.routes.lock().drain(..) {
            dispatcher.add(route);
        }
        info!(routes = dispatcher.route_count(), "Dispatcher ready");

        let codec = EventCodec::new(self.config.identity.to_identity());
        let pipeline = EventPipeline::new(codec, dispatcher);
        let supervisor = ConnectionSupervisor::new(Arc::clone(&self.connector), Arc::new(pipeline))
            .reconnect_delay(self.config.gateway.reconnect_delay());
        supervisor.start();

        info!(endpoint = %self.connector.endpoint(), "Kestrel runtime started");
        *slot = Some(supervisor);
    }

    /// Stops the supervisor and shuts the task queue down.
    pub async fn stop(&self) {
        let supervisor = self.supervisor.lock().take();
        match supervisor {
            Some(supervisor) => {
                info!("Stopping Kestrel runtime");
                supervisor.stop().await;
            }
            None => warn!("Runtime is not running"),
        }
        self.tasks.shutdown().await;
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C (or SIGTERM on unix). SIGHUP reloads the ban list.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start();
        info!("Kestrel is now running. Press Ctrl+C to stop.");

        let result = self.wait_for_shutdown().await;
        self.stop().await;
        result
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start();
        shutdown.await;
        self.stop().await;
        Ok(())
    }

    async fn wait_for_shutdown(&self) -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal as unix_signal};

            let mut sigterm = unix_signal(SignalKind::terminate())?;
            let mut sighup = unix_signal(SignalKind::hangup())?;

            loop {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        result?;
                        info!("Received Ctrl+C, shutting down");
                        break;
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                        break;
                    }
                    _ = sighup.recv() => {
                        info!("Received SIGHUP, reloading ban list");
                        let _ = self.reload_bans();
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, shutting down");
        }

        Ok(())
    }
}

impl std::fmt::Debug for KestrelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KestrelRuntime")
            .field("endpoint", &self.connector.endpoint())
            .field("routes", &self.route_count())
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`KestrelRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<KestrelConfig>,
    init_logging: bool,
    gateway: Option<BoxedGateway>,
    connector: Option<Arc<dyn Connector>>,
}

impl RuntimeBuilder {
    /// Creates a builder that searches the current directory for config.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            init_logging: true,
            gateway: None,
            connector: None,
        }
    }

    /// Loads this file instead of searching.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables `KESTREL_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides a single dotted configuration key.
    pub fn set<V: Serialize>(mut self, key: &str, value: V) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: KestrelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Whether to install the global log subscriber (default: true).
    pub fn logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Replaces the HTTP gateway.
    pub fn gateway(mut self, gateway: BoxedGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Replaces the WebSocket connector.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Loads configuration, initializes logging and builds the runtime.
    pub fn build(self) -> RuntimeResult<KestrelRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        KestrelRuntime::assemble(config, self.gateway, self.connector)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kestrel_core::{
        Event, FrameStream, Gateway, GatewayResult, Handler, HandlerContext, HandlerResult,
        ReplyTarget, TransportResult,
    };
    use tokio::sync::mpsc;

    use super::*;

    struct ScriptedStream {
        frames: Vec<String>,
    }

    #[async_trait]
    impl FrameStream for ScriptedStream {
        async fn next_frame(&mut self) -> Option<TransportResult<String>> {
            if self.frames.is_empty() {
                futures::future::pending::<()>().await;
            }
            Some(Ok(self.frames.remove(0)))
        }

        async fn close(&mut self) {}
    }

    struct ScriptedConnector {
        frames: Vec<String>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> TransportResult<Box<dyn FrameStream>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedStream {
                frames: self.frames.clone(),
            }))
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    struct ChannelGateway {
        tx: mpsc::UnboundedSender<(ReplyTarget, String)>,
    }

    #[async_trait]
    impl Gateway for ChannelGateway {
        async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
            let _ = self.tx.send((target, text.to_string()));
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        fn matches(&self, event: &Event) -> bool {
            event.text() == Some("oi")
        }

        async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
            ctx.reply(event, "io").await?;
            Ok(())
        }
    }

    fn test_config(name: &str) -> KestrelConfig {
        let mut config = KestrelConfig::default();
        config.ban.path = scratch_path(name);
        config
    }

    fn scratch_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("kestrel-runtime-{}-{name}", std::process::id()))
            .join("ban.txt");
        let _ = std::fs::remove_file(&path);
        path
    }

    fn group_frame(message_id: i64, text: &str) -> String {
        serde_json::json!({
            "post_type": "message",
            "message_type": "group",
            "self_id": 1,
            "group_id": 100,
            "user_id": 7,
            "message_id": message_id,
            "message": text,
            "sender": {"user_id": 7, "nickname": "tester"}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_run_until_routes_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ScriptedConnector {
            frames: vec![group_frame(1, "oi"), group_frame(1, "oi"), group_frame(2, "hello")],
            connects: AtomicUsize::new(0),
        });

        let runtime = KestrelRuntime::builder()
            .config(test_config("routes"))
            .logging(false)
            .gateway(Arc::new(ChannelGateway { tx }))
            .connector(connector.clone())
            .build()
            .unwrap()
            .with_route(Route::new(Echo));
        assert_eq!(runtime.route_count(), 1);

        runtime
            .run_until(async {
                let (target, text) = rx.recv().await.unwrap();
                assert_eq!(target, ReplyTarget::Group(100));
                assert_eq!(text, "io");
            })
            .await
            .unwrap();

        assert!(!runtime.is_running());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(runtime.dedup_cache().seen(1));
        assert!(runtime.task_queue().is_closed());
        // The duplicate frame produced no second reply.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = test_config("invalid");
        config.gateway.ws_url = "http://wrong".to_string();

        let result = KestrelRuntime::builder().config(config).logging(false).build();
        assert!(matches!(result, Err(crate::RuntimeError::Config(_))));
    }

    #[tokio::test]
    async fn test_reload_bans_from_file() {
        let config = test_config("bans");
        let path = config.ban.path.clone();
        let runtime = KestrelRuntime::builder()
            .config(config)
            .logging(false)
            .build()
            .unwrap();

        assert!(path.exists());
        assert!(!runtime.ban_gate().is_banned(42));

        std::fs::write(&path, "42\n# comment\n43\n").unwrap();
        assert_eq!(runtime.reload_bans().unwrap(), 2);
        assert!(runtime.ban_gate().is_banned(42));

        runtime.stop().await;
    }

    #[tokio::test]
    async fn test_unreadable_ban_list_is_not_fatal() {
        let mut config = test_config("blocked");
        let dir = config.ban.path.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        let _ = std::fs::remove_dir_all(&blocker);
        std::fs::write(&blocker, "").unwrap();

        config.ban.path = blocker.join("ban.txt");
        let runtime = KestrelRuntime::builder()
            .config(config)
            .logging(false)
            .build()
            .unwrap();

        assert!(runtime.ban_gate().is_empty());
        assert!(matches!(runtime.reload_bans(), Err(crate::RuntimeError::BanList(_))));

        // Once the path becomes usable, a reload picks the list up.
        std::fs::remove_file(&blocker).unwrap();
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("ban.txt"), "42\n").unwrap();
        assert_eq!(runtime.reload_bans().unwrap(), 1);
        assert!(runtime.ban_gate().is_banned(42));

        runtime.stop().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_rate_limiter_factory_uses_config() {
        let mut config = test_config("limiter");
        config.rate_limit.max_requests = 2;
        let runtime = KestrelRuntime::builder()
            .config(config)
            .logging(false)
            .build()
            .unwrap();

        let limiter = runtime.rate_limiter();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.max_requests(), 2);

        runtime.stop().await;
    }
}
