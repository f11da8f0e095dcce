//! Fixed trigger → reply responder.

use async_trait::async_trait;
use kestrel::prelude::*;
use tracing::info;

/// Replies `reply` to a group message whose text is exactly `trigger`.
pub struct TriggerReply {
    trigger: String,
    reply: String,
}

impl TriggerReply {
    pub fn new(trigger: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Handler for TriggerReply {
    fn name(&self) -> &str {
        "trigger"
    }

    fn matches(&self, event: &Event) -> bool {
        matches!(event, Event::GroupMessage(msg) if msg.text.trim() == self.trigger)
    }

    async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
        info!(trigger = %self.trigger, sender = ?event.sender_id(), "Trigger matched");
        ctx.reply(event, &self.reply).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{group_text, private_text};

    #[test]
    fn test_exact_match_only() {
        let handler = TriggerReply::new("oi", "io");
        assert!(handler.matches(&group_text(1, " oi ")));
        assert!(!handler.matches(&group_text(2, "oi!")));
        assert!(!handler.matches(&private_text(3, "oi")));
        assert!(!handler.matches(&Event::Heartbeat));
    }
}
