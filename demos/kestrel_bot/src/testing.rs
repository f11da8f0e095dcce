//! Event builders and a recording gateway for responder tests.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel::core::{GatewayResult, GroupMessage, Mention, PrivateMessage, Segment};
use kestrel::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Records every send, optionally forwarding it to a channel.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(ReplyTarget, String)>>,
    forward: Option<mpsc::UnboundedSender<(ReplyTarget, String)>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_channel(tx: mpsc::UnboundedSender<(ReplyTarget, String)>) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            forward: Some(tx),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
        self.sent.lock().push((target, text.to_string()));
        if let Some(tx) = &self.forward {
            let _ = tx.send((target, text.to_string()));
        }
        Ok(())
    }
}

/// A group message from sender 7 in group 100.
pub fn group_text(message_id: i64, text: &str) -> Event {
    Event::GroupMessage(GroupMessage {
        self_id: 1,
        group_id: 100,
        sender_id: 7,
        display_name: "tester".into(),
        message_id,
        text: text.trim().to_string(),
        segments: vec![Segment::text(text)],
        mention: None,
    })
}

/// A group message opening with an @mention of the bot.
pub fn group_mention(message_id: i64, request: &str) -> Event {
    Event::GroupMessage(GroupMessage {
        self_id: 1,
        group_id: 100,
        sender_id: 7,
        display_name: "tester".into(),
        message_id,
        text: request.to_string(),
        segments: vec![Segment::at(1), Segment::text(request)],
        mention: Some(Mention {
            target: "kestrel".into(),
            request: request.to_string(),
        }),
    })
}

/// A private message from sender 7.
pub fn private_text(message_id: i64, text: &str) -> Event {
    Event::PrivateMessage(PrivateMessage {
        self_id: 1,
        sender_id: 7,
        display_name: "tester".into(),
        message_id,
        text: text.trim().to_string(),
    })
}
