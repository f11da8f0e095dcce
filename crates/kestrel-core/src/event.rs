//! Typed inbound events.
//!
//! An [`Event`] is produced once by the [`EventCodec`](crate::EventCodec) and
//! consumed once by the [`Dispatcher`](crate::Dispatcher). Events are
//! immutable after construction.

use std::fmt;

use serde_json::Value;

use crate::segment::Segment;

/// Display name used when a sender has neither a group card nor a nickname.
pub const UNKNOWN_SENDER_NAME: &str = "未知";

// ============================================================================
// Reply Target
// ============================================================================

/// Where replies, ban notices and throttle notices for an event are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyTarget {
    /// A group conversation.
    Group(i64),
    /// A private conversation with a user.
    Private(i64),
}

impl ReplyTarget {
    /// Returns the group or user id.
    pub fn id(&self) -> i64 {
        match self {
            Self::Group(id) | Self::Private(id) => *id,
        }
    }
}

impl fmt::Display for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group:{id}"),
            Self::Private(id) => write!(f, "private:{id}"),
        }
    }
}

// ============================================================================
// Message Payloads
// ============================================================================

/// A request addressed to the bot by a leading @mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// The mention's display name, or the raw target when unnamed.
    pub target: String,
    /// Text following the mention, trimmed and never empty.
    pub request: String,
}

/// A message posted in a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMessage {
    /// The bot account that received the message.
    pub self_id: i64,
    /// Group the message was posted in.
    pub group_id: i64,
    /// Sender account id.
    pub sender_id: i64,
    /// Group card if set, else nickname.
    pub display_name: String,
    /// Gateway message id, falling back to `message_seq`; zero when absent.
    pub message_id: i64,
    /// Plain text with CQ codes removed, trimmed.
    pub text: String,
    /// Segments as delivered, empty when the gateway sent a string message.
    pub segments: Vec<Segment>,
    /// Leading @mention of the bot, when present.
    pub mention: Option<Mention>,
}

/// A message sent to the bot directly.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivateMessage {
    /// The bot account that received the message.
    pub self_id: i64,
    /// Sender account id.
    pub sender_id: i64,
    /// Sender nickname.
    pub display_name: String,
    /// Gateway message id, falling back to `message_seq`; zero when absent.
    pub message_id: i64,
    /// Plain text with CQ codes removed, trimmed.
    pub text: String,
}

// ============================================================================
// Event
// ============================================================================

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A group message.
    GroupMessage(GroupMessage),
    /// A private message.
    PrivateMessage(PrivateMessage),
    /// Gateway heartbeat.
    Heartbeat,
    /// Gateway lifecycle notification (`connect`, `enable`, `disable`).
    Lifecycle {
        /// The lifecycle sub type.
        sub_type: String,
    },
    /// Anything the codec did not classify, kept verbatim.
    Unknown {
        /// The raw frame, as JSON when it parsed, else as a string.
        raw: Value,
    },
}

impl Event {
    /// A static label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GroupMessage(_) => "group_message",
            Self::PrivateMessage(_) => "private_message",
            Self::Heartbeat => "heartbeat",
            Self::Lifecycle { .. } => "lifecycle",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// Returns `true` for group and private messages.
    pub fn is_message(&self) -> bool {
        matches!(self, Self::GroupMessage(_) | Self::PrivateMessage(_))
    }

    /// Returns the sender id of a message event.
    pub fn sender_id(&self) -> Option<i64> {
        match self {
            Self::GroupMessage(msg) => Some(msg.sender_id),
            Self::PrivateMessage(msg) => Some(msg.sender_id),
            _ => None,
        }
    }

    /// Returns the sender's display name of a message event.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::GroupMessage(msg) => Some(&msg.display_name),
            Self::PrivateMessage(msg) => Some(&msg.display_name),
            _ => None,
        }
    }

    /// Returns where replies to this event go.
    pub fn reply_target(&self) -> Option<ReplyTarget> {
        match self {
            Self::GroupMessage(msg) => Some(ReplyTarget::Group(msg.group_id)),
            Self::PrivateMessage(msg) => Some(ReplyTarget::Private(msg.sender_id)),
            _ => None,
        }
    }

    /// Returns the identifier used for duplicate suppression.
    ///
    /// Only message events with a positive id have one.
    pub fn dedup_id(&self) -> Option<i64> {
        let id = match self {
            Self::GroupMessage(msg) => msg.message_id,
            Self::PrivateMessage(msg) => msg.message_id,
            _ => return None,
        };
        (id > 0).then_some(id)
    }

    /// Returns the plain text of a message event.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::GroupMessage(msg) => Some(&msg.text),
            Self::PrivateMessage(msg) => Some(&msg.text),
            _ => None,
        }
    }

    /// Returns the bot mention of a group message, if any.
    pub fn mention(&self) -> Option<&Mention> {
        match self {
            Self::GroupMessage(msg) => msg.mention.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(message_id: i64) -> Event {
        Event::GroupMessage(GroupMessage {
            self_id: 1,
            group_id: 100,
            sender_id: 7,
            display_name: "alice".into(),
            message_id,
            text: "hi".into(),
            segments: vec![],
            mention: None,
        })
    }

    #[test]
    fn test_accessors() {
        let event = group(5);
        assert_eq!(event.kind(), "group_message");
        assert_eq!(event.sender_id(), Some(7));
        assert_eq!(event.reply_target(), Some(ReplyTarget::Group(100)));
        assert_eq!(event.dedup_id(), Some(5));
        assert_eq!(event.text(), Some("hi"));
        assert!(event.is_message());
    }

    #[test]
    fn test_non_positive_message_id_has_no_dedup_id() {
        assert_eq!(group(0).dedup_id(), None);
        assert_eq!(group(-3).dedup_id(), None);
        assert_eq!(Event::Heartbeat.dedup_id(), None);
    }

    #[test]
    fn test_private_reply_goes_to_sender() {
        let event = Event::PrivateMessage(PrivateMessage {
            self_id: 1,
            sender_id: 42,
            display_name: "bob".into(),
            message_id: 9,
            text: "yo".into(),
        });
        assert_eq!(event.reply_target(), Some(ReplyTarget::Private(42)));
        assert_eq!(event.mention(), None);
        assert_eq!(ReplyTarget::Private(42).to_string(), "private:42");
    }
}
