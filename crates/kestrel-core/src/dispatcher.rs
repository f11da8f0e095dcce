//! Ordered multi-handler dispatch.
//!
//! The [`Dispatcher`] owns the registered [`Route`]s and the shared guards
//! (dedup cache and ban gate). For each event:
//!
//! 1. Message events with empty text are skipped outright
//! 2. Events whose dedup id was already recorded are dropped
//! 3. Every route is checked in registration order; a matching route whose
//!    sender is banned gets the ban notice, a matching route whose limiter
//!    rejects gets its throttle notice, anything else is executed
//! 4. An error or panic from a handler stops the remaining routes
//! 5. The dedup id is recorded whatever the outcome
//!
//! ```rust,ignore
//! use kestrel_core::{Dispatcher, Route};
//!
//! let dispatcher = Dispatcher::new(gateway)
//!     .bans(ban_gate)
//!     .with(Route::new(TriggerReply::default()))
//!     .with(Route::new(Chat::new(backend)).limiter(limiter));
//!
//! let report = dispatcher.dispatch(&event).await;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::ban::BanGate;
use crate::dedup::DedupCache;
use crate::error::HandlerError;
use crate::event::{Event, ReplyTarget};
use crate::gateway::BoxedGateway;
use crate::handler::{HandlerContext, Route};

// ============================================================================
// Dispatch Report
// ============================================================================

/// Why dispatch stopped before reaching every route.
#[derive(Debug)]
pub struct DispatchAbort {
    /// Name of the handler that failed.
    pub handler: String,
    /// What went wrong.
    pub error: HandlerError,
}

/// What happened to a single event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// The event was a message with no text and was not dispatched.
    pub skipped: bool,
    /// The event's id had already been dispatched.
    pub duplicate: bool,
    /// Handlers whose action ran to completion.
    pub executed: Vec<String>,
    /// Handlers that matched but were answered with the ban notice.
    pub banned: Vec<String>,
    /// Handlers that matched but were answered with a throttle notice.
    pub throttled: Vec<String>,
    /// Set when a handler failed and the remaining routes were skipped.
    pub aborted: Option<DispatchAbort>,
}

impl DispatchReport {
    /// Returns `true` if any route matched the event.
    pub fn matched(&self) -> bool {
        !self.executed.is_empty()
            || !self.banned.is_empty()
            || !self.throttled.is_empty()
            || self.aborted.is_some()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes events to registered handlers.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Vec<Route>,
    dedup: Arc<DedupCache>,
    bans: Arc<BanGate>,
    ctx: HandlerContext,
}

impl Dispatcher {
    /// Creates a dispatcher with no routes, a default dedup cache and an
    /// empty ban gate.
    pub fn new(gateway: BoxedGateway) -> Self {
        Self {
            routes: Vec::new(),
            dedup: Arc::new(DedupCache::default()),
            bans: Arc::new(BanGate::empty()),
            ctx: HandlerContext::new(gateway),
        }
    }

    /// Uses a shared dedup cache.
    pub fn dedup(mut self, dedup: Arc<DedupCache>) -> Self {
        self.dedup = dedup;
        self
    }

    /// Uses a shared ban gate.
    pub fn bans(mut self, bans: Arc<BanGate>) -> Self {
        self.bans = bans;
        self
    }

    /// Registers a route (builder pattern).
    pub fn with(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Registers a route. Routes are checked in the order they are added.
    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Number of registered routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// The dedup cache.
    pub fn dedup_cache(&self) -> &Arc<DedupCache> {
        &self.dedup
    }

    /// The ban gate.
    pub fn ban_gate(&self) -> &Arc<BanGate> {
        &self.bans
    }

    /// Dispatches one event to every matching route.
    pub async fn dispatch(&self, event: &Event) -> DispatchReport {
        let span = debug_span!("dispatch", kind = event.kind(), message_id = event.dedup_id());
        self.dispatch_inner(event).instrument(span).await
    }

    async fn dispatch_inner(&self, event: &Event) -> DispatchReport {
        let mut report = DispatchReport::default();

        if event.text().is_some_and(str::is_empty) {
            debug!("Skipping message with empty text");
            report.skipped = true;
            return report;
        }

        let dedup_id = event.dedup_id();
        if let Some(id) = dedup_id
            && self.dedup.seen(id)
        {
            debug!(message_id = id, "Skipping duplicate message");
            report.duplicate = true;
            return report;
        }

        log_incoming(event);

        let banned = event.sender_id().is_some_and(|id| self.bans.is_banned(id));

        for route in &self.routes {
            let name = route.name().to_string();

            let matched = std::panic::catch_unwind(AssertUnwindSafe(|| route.handler.matches(event)));
            let matched = match matched {
                Ok(matched) => matched,
                Err(payload) => {
                    report.aborted = Some(abort(name, HandlerError::Panicked(panic_message(&*payload))));
                    break;
                }
            };
            if !matched {
                continue;
            }

            if banned {
                warn!(handler = %name, sender_id = event.sender_id(), "Banned sender matched handler");
                self.notify(event.reply_target(), self.bans.notice()).await;
                report.banned.push(name);
                continue;
            }

            if let Some(limiter) = &route.limiter
                && !limiter.try_acquire()
            {
                info!(handler = %name, sender_id = event.sender_id(), "Request throttled");
                self.notify(event.reply_target(), &route.throttle_notice).await;
                report.throttled.push(name);
                continue;
            }

            debug!(handler = %name, "Executing handler");
            let result = AssertUnwindSafe(route.handler.execute(event, &self.ctx))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(())) => report.executed.push(name),
                Ok(Err(err)) => {
                    report.aborted = Some(abort(name, err));
                    break;
                }
                Err(payload) => {
                    report.aborted = Some(abort(name, HandlerError::Panicked(panic_message(&*payload))));
                    break;
                }
            }
        }

        if let Some(id) = dedup_id {
            self.dedup.record(id);
        }

        report
    }

    async fn notify(&self, target: Option<ReplyTarget>, text: &str) {
        let Some(target) = target else {
            return;
        };
        if let Err(err) = self.ctx.send(target, text).await {
            error!(reply_to = %target, error = %err, "Failed to send notice");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes)
            .field("dedup", &self.dedup)
            .field("bans", &self.bans)
            .finish()
    }
}

fn abort(handler: String, error: HandlerError) -> DispatchAbort {
    error!(handler = %handler, error = %error, "Handler failed, skipping remaining handlers");
    DispatchAbort { handler, error }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_incoming(event: &Event) {
    match event {
        Event::GroupMessage(msg) => info!(
            group_id = msg.group_id,
            sender_id = msg.sender_id,
            sender = %msg.display_name,
            message_id = msg.message_id,
            text = %msg.text,
            "Group message"
        ),
        Event::PrivateMessage(msg) => info!(
            sender_id = msg.sender_id,
            sender = %msg.display_name,
            message_id = msg.message_id,
            text = %msg.text,
            "Private message"
        ),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::ban::StaticBanList;
    use crate::clock::ManualClock;
    use crate::rate_limit::RateLimiter;
    use crate::testing::{Outcome, ProbeHandler, RecordingGateway, group_event, private_event};

    #[tokio::test]
    async fn test_multi_match_executes_each_once() {
        let gateway = RecordingGateway::new();
        let (a, a_calls) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let (b, b_calls) = ProbeHandler::new("b", "oi", Outcome::Reply);
        let (c, c_calls) = ProbeHandler::new("c", "other", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone())
            .with(Route::new(a))
            .with(Route::new(b))
            .with(Route::new(c));

        let report = dispatcher.dispatch(&group_event(7, 1, "oi")).await;

        assert_eq!(report.executed, vec!["a", "b"]);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.texts(), vec!["a ok", "b ok"]);
    }

    #[tokio::test]
    async fn test_duplicate_dropped() {
        let gateway = RecordingGateway::new();
        let (a, calls) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone()).with(Route::new(a));

        let first = dispatcher.dispatch(&group_event(7, 42, "oi")).await;
        let second = dispatcher.dispatch(&group_event(7, 42, "oi")).await;

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_dedup_overflow_runs_again() {
        let gateway = RecordingGateway::new();
        let (a, calls) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway)
            .dedup(Arc::new(DedupCache::new(3)))
            .with(Route::new(a));

        for id in 1..=4 {
            let report = dispatcher.dispatch(&group_event(7, id, "oi")).await;
            assert!(!report.duplicate);
        }
        // The fourth id overflowed the cache, so id 1 is no longer known.
        let redelivered = dispatcher.dispatch(&group_event(7, 1, "oi")).await;

        assert!(!redelivered.duplicate);
        assert_eq!(redelivered.executed, vec!["a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_missing_message_id_not_deduplicated() {
        let gateway = RecordingGateway::new();
        let (a, calls) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway).with(Route::new(a));

        dispatcher.dispatch(&group_event(7, 0, "oi")).await;
        dispatcher.dispatch(&group_event(7, 0, "oi")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(dispatcher.dedup_cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_skipped_without_recording() {
        let gateway = RecordingGateway::new();
        let dispatcher = Dispatcher::new(gateway);

        let report = dispatcher.dispatch(&group_event(7, 9, "")).await;

        assert!(report.skipped);
        assert!(!dispatcher.dedup_cache().seen(9));
    }

    #[tokio::test]
    async fn test_banned_sender_gets_notice_per_matching_handler() {
        let gateway = RecordingGateway::new();
        let bans = Arc::new(BanGate::load(StaticBanList::from_ids([7])).unwrap());
        let (a, a_calls) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let (b, b_calls) = ProbeHandler::new("b", "oi", Outcome::Reply);
        let (c, _) = ProbeHandler::new("c", "nope", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone())
            .bans(bans)
            .with(Route::new(a))
            .with(Route::new(b))
            .with(Route::new(c));

        let report = dispatcher.dispatch(&group_event(7, 1, "oi")).await;

        assert_eq!(report.banned, vec!["a", "b"]);
        assert!(report.executed.is_empty());
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            gateway.sent(),
            vec![
                (ReplyTarget::Group(100), "you are banned server".to_string()),
                (ReplyTarget::Group(100), "you are banned server".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_banned_private_sender_notified_privately() {
        let gateway = RecordingGateway::new();
        let bans = Arc::new(BanGate::load(StaticBanList::from_ids([8])).unwrap());
        let (a, _) = ProbeHandler::new("a", "hello", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone()).bans(bans).with(Route::new(a));

        dispatcher.dispatch(&private_event(8, 1, "hello")).await;

        assert_eq!(
            gateway.sent(),
            vec![(ReplyTarget::Private(8), "you are banned server".to_string())]
        );
    }

    #[tokio::test]
    async fn test_shared_limiter_throttles_eleventh_request() {
        let gateway = RecordingGateway::new();
        let clock = ManualClock::new();
        let limiter = Arc::new(
            RateLimiter::fixed_window(10, Duration::from_secs(60)).clock(clock.clone()),
        );
        let (a, calls) = ProbeHandler::new("chat", "hi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone()).with(
            Route::new(a)
                .limiter(limiter)
                .throttle_notice("slow down"),
        );

        for id in 1..=10 {
            let report = dispatcher.dispatch(&group_event(7, id, "hi")).await;
            assert_eq!(report.executed, vec!["chat"]);
        }
        let report = dispatcher.dispatch(&group_event(7, 11, "hi")).await;

        assert_eq!(report.throttled, vec!["chat"]);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(gateway.texts().last().map(String::as_str), Some("slow down"));

        clock.advance(Duration::from_secs(60));
        let report = dispatcher.dispatch(&group_event(7, 12, "hi")).await;
        assert_eq!(report.executed, vec!["chat"]);
    }

    #[tokio::test]
    async fn test_error_aborts_remaining_handlers() {
        let gateway = RecordingGateway::new();
        let (a, _) = ProbeHandler::new("a", "oi", Outcome::Fail);
        let (b, b_calls) = ProbeHandler::new("b", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway)
            .with(Route::new(a))
            .with(Route::new(b));

        let report = dispatcher.dispatch(&group_event(7, 5, "oi")).await;

        let abort = report.aborted.unwrap();
        assert_eq!(abort.handler, "a");
        assert!(matches!(abort.error, HandlerError::Other(_)));
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.dedup_cache().seen(5));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let gateway = RecordingGateway::new();
        let (a, _) = ProbeHandler::new("a", "oi", Outcome::Panic);
        let (b, b_calls) = ProbeHandler::new("b", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway)
            .with(Route::new(a))
            .with(Route::new(b));

        let report = dispatcher.dispatch(&group_event(7, 6, "oi")).await;

        match report.aborted.map(|a| a.error) {
            Some(HandlerError::Panicked(msg)) => assert_eq!(msg, "a exploded"),
            other => panic!("expected panic abort, got {other:?}"),
        }
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);

        // The dispatcher keeps working afterwards.
        let report = dispatcher.dispatch(&group_event(7, 7, "other")).await;
        assert!(report.aborted.is_none());
    }

    #[tokio::test]
    async fn test_notice_failure_does_not_abort() {
        let gateway = RecordingGateway::failing();
        let bans = Arc::new(BanGate::load(StaticBanList::from_ids([7])).unwrap());
        let (a, _) = ProbeHandler::new("a", "oi", Outcome::Reply);
        let (b, _) = ProbeHandler::new("b", "oi", Outcome::Reply);
        let dispatcher = Dispatcher::new(gateway.clone())
            .bans(bans)
            .with(Route::new(a))
            .with(Route::new(b));

        let report = dispatcher.dispatch(&group_event(7, 1, "oi")).await;

        assert_eq!(report.banned, vec!["a", "b"]);
        assert!(report.aborted.is_none());
        assert_eq!(gateway.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_non_message_events_reach_handlers() {
        struct OnHeartbeat;

        #[async_trait::async_trait]
        impl crate::Handler for OnHeartbeat {
            fn matches(&self, event: &Event) -> bool {
                matches!(event, Event::Heartbeat)
            }

            async fn execute(&self, _event: &Event, _ctx: &HandlerContext) -> crate::HandlerResult {
                Ok(())
            }
        }

        let dispatcher = Dispatcher::new(RecordingGateway::new()).with(Route::new(OnHeartbeat));
        let report = dispatcher.dispatch(&Event::Heartbeat).await;

        assert_eq!(report.executed.len(), 1);
        assert!(report.executed[0].ends_with("OnHeartbeat"));
        assert!(dispatcher.dedup_cache().is_empty());
    }
}
