//! Language-model chat responder.
//!
//! Answers group messages that open with an @mention of the bot, and every
//! private message. The backend call runs on the [`TaskQueue`] so the
//! dispatch path never waits on the model.

use std::sync::Arc;

use async_trait::async_trait;
use kestrel::prelude::*;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, ChatBackend};

/// Sent when the shared chat limiter rejects a request.
pub const CHAT_THROTTLE_NOTICE: &str = "调用过于频繁，请一分钟后再试。";

/// Sent when the backend had nothing to say or is not configured.
pub const EMPTY_ANSWER_REPLY: &str = "抱歉，我现在无法回答，请稍后再试喵~";

/// Sent when the backend call failed.
pub const ERROR_REPLY: &str = "抱歉，处理你的消息时出错了喵~";

/// Sent when every worker is busy.
pub const BUSY_REPLY: &str = "现在找我聊天的人太多啦，请稍后再试喵~";

/// Routes questions to a [`ChatBackend`] through a [`TaskQueue`].
pub struct ChatResponder {
    backend: Arc<dyn ChatBackend>,
    tasks: Arc<TaskQueue>,
}

impl ChatResponder {
    pub fn new(backend: Arc<dyn ChatBackend>, tasks: Arc<TaskQueue>) -> Self {
        Self { backend, tasks }
    }

    /// Wraps the responder in a route limited by `limiter`.
    pub fn into_route(self, limiter: Arc<RateLimiter>) -> Route {
        Route::new(self)
            .limiter(limiter)
            .throttle_notice(CHAT_THROTTLE_NOTICE)
    }

    fn question(event: &Event) -> Option<&str> {
        match event {
            Event::GroupMessage(_) => event.mention().map(|m| m.request.as_str()),
            Event::PrivateMessage(msg) => Some(msg.text.trim()).filter(|t| !t.is_empty()),
            _ => None,
        }
    }
}

/// Chooses the reply text for a backend outcome.
pub fn reply_for(outcome: Result<String, BackendError>) -> String {
    match outcome {
        Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
        Ok(_) => {
            warn!("Backend returned an empty answer");
            EMPTY_ANSWER_REPLY.to_string()
        }
        Err(BackendError::NotConfigured) => EMPTY_ANSWER_REPLY.to_string(),
        Err(e) => {
            error!(error = %e, "Backend call failed");
            ERROR_REPLY.to_string()
        }
    }
}

#[async_trait]
impl Handler for ChatResponder {
    fn name(&self) -> &str {
        "chat"
    }

    fn matches(&self, event: &Event) -> bool {
        Self::question(event).is_some()
    }

    async fn execute(&self, event: &Event, ctx: &HandlerContext) -> HandlerResult {
        let (Some(question), Some(target)) = (Self::question(event), event.reply_target()) else {
            return Ok(());
        };
        info!(reply_to = %target, sender = ?event.sender_id(), question = %question, "Chat request");

        let backend = Arc::clone(&self.backend);
        let gateway = Arc::clone(ctx.gateway());
        let question = question.to_string();

        let submitted = self.tasks.try_submit(format!("chat:{target}"), async move {
            let reply = reply_for(backend.answer(&question).await);
            match gateway.send(target, &reply).await {
                Ok(()) => debug!(reply_to = %target, "Chat reply sent"),
                Err(e) => warn!(reply_to = %target, error = %e, "Failed to send chat reply"),
            }
        });

        match submitted {
            Ok(()) => Ok(()),
            Err(QueueError::Full) => {
                ctx.send(target, BUSY_REPLY).await?;
                Ok(())
            }
            Err(QueueError::Closed) => {
                debug!("Task queue closed, dropping chat request");
                Ok(())
            }
        }
    }
}
