//! Reconnecting connection supervisor.
//!
//! The [`ConnectionSupervisor`] owns one background task that opens the
//! transport through a [`Connector`], hands every inbound frame to a
//! [`FrameSink`] in arrival order, and reconnects after a fixed delay whenever
//! the connection closes or fails, until [`stop`](ConnectionSupervisor::stop)
//! is called.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing | Failed -> Disconnected
//!      ^                                                             |
//!      +------------------------ reconnect delay --------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_core::ConnectionSupervisor;
//!
//! let supervisor = ConnectionSupervisor::new(connector, pipeline)
//!     .reconnect_delay(Duration::from_secs(5));
//! supervisor.start();
//! // ...
//! supervisor.stop().await;
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportResult;

/// Delay between a disconnect and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

// ============================================================================
// Transport Seams
// ============================================================================

/// Opens transport connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new connection.
    async fn connect(&self) -> TransportResult<Box<dyn FrameStream>>;

    /// A description of the endpoint for logs.
    fn endpoint(&self) -> String;
}

/// An open connection delivering text frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Waits for the next text frame.
    ///
    /// Returns `None` once the peer closed the connection.
    async fn next_frame(&mut self) -> Option<TransportResult<String>>;

    /// Closes the connection.
    async fn close(&mut self);
}

/// Consumes inbound frames.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Handles one frame. Frames are delivered one at a time.
    async fn on_frame(&self, frame: String);
}

// ============================================================================
// State & Stats
// ============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Frames are being received.
    Connected,
    /// The connection is closing normally.
    Closing,
    /// The connection attempt or the open connection failed.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Counters maintained by the supervisor.
#[derive(Debug, Default)]
pub struct SupervisorStats {
    connect_attempts: AtomicU64,
    reconnects_scheduled: AtomicU64,
    frames_received: AtomicU64,
}

impl SupervisorStats {
    /// Connection attempts made so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Reconnects scheduled so far.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled.load(Ordering::Relaxed)
    }

    /// Frames delivered to the sink so far.
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// Keeps a transport connection alive and feeds its frames to a sink.
pub struct ConnectionSupervisor {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn FrameSink>,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    stats: Arc<SupervisorStats>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Creates a stopped supervisor.
    pub fn new(connector: Arc<dyn Connector>, sink: Arc<dyn FrameSink>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            sink,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            state: Arc::new(state),
            stats: Arc::new(SupervisorStats::default()),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Sets the delay before each reconnect attempt.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Starts the supervisor task. Does nothing if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("Supervisor already running");
            return;
        }

        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        let worker = SupervisorLoop {
            connector: Arc::clone(&self.connector),
            sink: Arc::clone(&self.sink),
            reconnect_delay: self.reconnect_delay,
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
            cancel: token,
        };
        info!(endpoint = %self.connector.endpoint(), "Starting connection supervisor");
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Stops the supervisor, closing any open connection.
    ///
    /// No reconnect happens after this returns, even if the connection was
    /// closing concurrently.
    pub async fn stop(&self) {
        let token = self.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(error = %err, "Supervisor task ended abnormally");
        }
    }

    /// Returns `true` while the supervisor task is alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The supervisor's counters.
    pub fn stats(&self) -> &Arc<SupervisorStats> {
        &self.stats
    }
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &self.connector.endpoint())
            .field("reconnect_delay", &self.reconnect_delay)
            .field("state", &self.state())
            .field("stats", &self.stats)
            .finish()
    }
}

/// How a connected session ended.
enum SessionEnd {
    Stopped,
    Closed,
    Failed,
}

struct SupervisorLoop {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn FrameSink>,
    reconnect_delay: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    stats: Arc<SupervisorStats>,
    cancel: CancellationToken,
}

impl SupervisorLoop {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn run(self) {
        let endpoint = self.connector.endpoint();

        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(endpoint = %endpoint, attempt, "Connecting");

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    self.set_state(ConnectionState::Connected);
                    info!(endpoint = %endpoint, "Connected");
                    if let SessionEnd::Stopped = self.session(stream).await {
                        break;
                    }
                }
                Err(err) => {
                    self.set_state(ConnectionState::Failed);
                    warn!(endpoint = %endpoint, error = %err, "Connection attempt failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            if self.cancel.is_cancelled() {
                break;
            }

            self.stats.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(endpoint = %endpoint, "Connection supervisor stopped");
    }

    async fn session(&self, mut stream: Box<dyn FrameStream>) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    stream.close().await;
                    return SessionEnd::Stopped;
                }
                frame = stream.next_frame() => frame,
            };

            match frame {
                Some(Ok(text)) => {
                    self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    self.sink.on_frame(text).await;
                }
                Some(Err(err)) => {
                    self.set_state(ConnectionState::Failed);
                    warn!(error = %err, "Connection failed");
                    stream.close().await;
                    return SessionEnd::Failed;
                }
                None => {
                    self.set_state(ConnectionState::Closing);
                    info!("Connection closed by peer");
                    return SessionEnd::Closed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use super::*;
    use crate::error::TransportError;

    const DELAY: Duration = Duration::from_millis(5000);

    /// Connector whose every attempt fails, reporting the attempt number.
    struct FailingConnector {
        attempts: mpsc::UnboundedSender<u64>,
        count: AtomicU64,
    }

    #[async_trait]
    impl Connector for FailingConnector {
        async fn connect(&self) -> TransportResult<Box<dyn FrameStream>> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.attempts.send(n);
            Err(TransportError::ConnectionFailed {
                url: "ws://test".into(),
                reason: "refused".into(),
            })
        }

        fn endpoint(&self) -> String {
            "ws://test".into()
        }
    }

    struct ScriptedStream {
        frames: VecDeque<String>,
        hang: bool,
        closed: Arc<AtomicU64>,
    }

    #[async_trait]
    impl FrameStream for ScriptedStream {
        async fn next_frame(&mut self) -> Option<TransportResult<String>> {
            match self.frames.pop_front() {
                Some(frame) => Some(Ok(frame)),
                None if self.hang => futures::future::pending().await,
                None => None,
            }
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// First connection yields two frames then closes; later ones stay open.
    struct ScriptedConnector {
        count: AtomicU64,
        closed: Arc<AtomicU64>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self) -> TransportResult<Box<dyn FrameStream>> {
            let n = self.count.fetch_add(1, Ordering::SeqCst);
            let frames = if n == 0 {
                VecDeque::from(["a".to_string(), "b".to_string()])
            } else {
                VecDeque::from([format!("again-{n}")])
            };
            Ok(Box::new(ScriptedStream {
                frames,
                hang: n > 0,
                closed: Arc::clone(&self.closed),
            }))
        }

        fn endpoint(&self) -> String {
            "ws://scripted".into()
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn on_frame(&self, frame: String) {
            let _ = self.0.send(frame);
        }
    }

    fn failing() -> (ConnectionSupervisor, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink_tx, _) = mpsc::unbounded_channel();
        let connector = FailingConnector {
            attempts: tx,
            count: AtomicU64::new(0),
        };
        let supervisor = ConnectionSupervisor::new(Arc::new(connector), Arc::new(ChannelSink(sink_tx)))
            .reconnect_delay(DELAY);
        (supervisor, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_schedules_one_reconnect_after_delay() {
        let (supervisor, mut attempts) = failing();
        supervisor.start();

        assert_eq!(attempts.recv().await, Some(1));
        assert!(
            timeout(DELAY - Duration::from_millis(1), attempts.recv())
                .await
                .is_err(),
            "reconnected before the delay elapsed"
        );
        assert_eq!(attempts.recv().await, Some(2));
        assert_eq!(supervisor.stats().connect_attempts(), 2);

        supervisor.stop().await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_delay_prevents_reconnect() {
        let (supervisor, mut attempts) = failing();
        supervisor.start();
        assert_eq!(attempts.recv().await, Some(1));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        supervisor.stop().await;

        assert!(timeout(DELAY * 3, attempts.recv()).await.is_err());
        assert_eq!(supervisor.stats().connect_attempts(), 1);
        assert_eq!(supervisor.stats().reconnects_scheduled(), 1);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_delivered_in_order_and_reconnect_on_close() {
        let closed = Arc::new(AtomicU64::new(0));
        let connector = ScriptedConnector {
            count: AtomicU64::new(0),
            closed: Arc::clone(&closed),
        };
        let (tx, mut frames) = mpsc::unbounded_channel();
        let supervisor = ConnectionSupervisor::new(Arc::new(connector), Arc::new(ChannelSink(tx)))
            .reconnect_delay(DELAY);
        let mut state = supervisor.subscribe();

        supervisor.start();

        assert_eq!(frames.recv().await.as_deref(), Some("a"));
        assert_eq!(frames.recv().await.as_deref(), Some("b"));
        assert_eq!(frames.recv().await.as_deref(), Some("again-1"));
        assert_eq!(supervisor.stats().connect_attempts(), 2);
        assert_eq!(supervisor.stats().frames_received(), 3);

        state
            .wait_for(|s| *s == ConnectionState::Connected)
            .await
            .unwrap();

        supervisor.stop().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (supervisor, mut attempts) = failing();
        supervisor.start();
        supervisor.start();

        assert_eq!(attempts.recv().await, Some(1));
        assert!(timeout(Duration::from_millis(10), attempts.recv()).await.is_err());

        supervisor.stop().await;
    }
}
