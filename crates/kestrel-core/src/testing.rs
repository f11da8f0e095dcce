//! Recording fakes shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GatewayError, GatewayResult, HandlerError, HandlerResult};
use crate::event::{Event, GroupMessage, PrivateMessage, ReplyTarget};
use crate::gateway::Gateway;
use crate::handler::{Handler, HandlerContext};

/// Gateway that records every send.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(ReplyTarget, String)>>,
    fail: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let gateway = Self::default();
        gateway.fail.store(true, Ordering::SeqCst);
        Arc::new(gateway)
    }

    pub fn sent(&self) -> Vec<(ReplyTarget, String)> {
        self.sent.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
        self.sent.lock().push((target, text.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("offline".into()));
        }
        Ok(())
    }
}

/// What a [`ProbeHandler`] does when executed.
#[derive(Clone, Copy)]
pub enum Outcome {
    Reply,
    Fail,
    Panic,
}

/// Handler matching a fixed text and counting its executions.
pub struct ProbeHandler {
    name: String,
    trigger: String,
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
}

impl ProbeHandler {
    pub fn new(name: &str, trigger: &str, outcome: Outcome) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Self {
            name: name.into(),
            trigger: trigger.into(),
            outcome,
            calls: Arc::clone(&calls),
        };
        (handler, calls)
    }
}

#[async_trait]
impl Handler for ProbeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, event: &Event) -> bool {
        event.text() == Some(self.trigger.as_str())
    }

    async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Reply => {
                ctx.reply(event, &format!("{} ok", self.name)).await?;
                Ok(())
            }
            Outcome::Fail => Err(HandlerError::other("boom")),
            Outcome::Panic => panic!("{} exploded", self.name),
        }
    }
}

pub fn group_event(sender_id: i64, message_id: i64, text: &str) -> Event {
    Event::GroupMessage(GroupMessage {
        self_id: 1,
        group_id: 100,
        sender_id,
        display_name: "tester".into(),
        message_id,
        text: text.into(),
        segments: vec![],
        mention: None,
    })
}

pub fn private_event(sender_id: i64, message_id: i64, text: &str) -> Event {
    Event::PrivateMessage(PrivateMessage {
        self_id: 1,
        sender_id,
        display_name: "tester".into(),
        message_id,
        text: text.into(),
    })
}
