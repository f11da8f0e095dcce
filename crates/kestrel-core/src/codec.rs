//! Decoding of raw OneBot v11 frames into typed [`Event`]s.
//!
//! The codec first classifies a frame by its envelope (`post_type` plus
//! `message_type` or `meta_event_type`) and only then deserializes the fields
//! that kind needs. Anything it cannot classify becomes [`Event::Unknown`].
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_core::{EventCodec, BotIdentity};
//!
//! let codec = EventCodec::new(BotIdentity::new().name("kestrel"));
//! let event = codec.decode(frame);
//! ```

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::event::{Event, GroupMessage, Mention, PrivateMessage, UNKNOWN_SENDER_NAME};
use crate::segment::{Segment, render_segments, strip_cq_codes, text_after_first};

// ============================================================================
// Bot Identity
// ============================================================================

/// How the codec recognizes a mention of the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotIdentity {
    /// The bot's account id. When unset, the frame's `self_id` is used.
    pub self_id: Option<i64>,
    /// Mention display names that address the bot.
    pub names: Vec<String>,
}

impl BotIdentity {
    /// Creates an identity with no known id and no names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bot's account id.
    pub fn self_id(mut self, id: i64) -> Self {
        self.self_id = Some(id);
        self
    }

    /// Adds a mention display name that addresses the bot.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    fn addresses(&self, segment: &Segment, frame_self_id: i64) -> bool {
        if let Some(display) = segment.at_display()
            && self.names.iter().any(|n| n == display)
        {
            return true;
        }

        let bot_id = self
            .self_id
            .filter(|id| *id != 0)
            .unwrap_or(frame_self_id);
        bot_id != 0 && segment.at_target_id() == Some(bot_id)
    }
}

// ============================================================================
// Wire Shapes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    post_type: String,
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    meta_event_type: String,
    #[serde(default)]
    sub_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct SenderFrame {
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    card: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageFrame {
    #[serde(default)]
    self_id: i64,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    message_id: i64,
    #[serde(default)]
    message_seq: i64,
    #[serde(default)]
    sender: Option<SenderFrame>,
    #[serde(default)]
    message: Value,
    #[serde(default)]
    raw_message: String,
}

impl MessageFrame {
    fn message_id(&self) -> i64 {
        if self.message_id != 0 {
            self.message_id
        } else {
            self.message_seq
        }
    }

    fn sender_id(&self) -> i64 {
        self.sender
            .as_ref()
            .map(|s| s.user_id)
            .filter(|id| *id != 0)
            .unwrap_or(self.user_id)
    }

    fn nickname(&self) -> String {
        self.sender
            .as_ref()
            .and_then(|s| s.nickname.clone())
            .unwrap_or_else(|| UNKNOWN_SENDER_NAME.to_string())
    }

    fn display_name(&self) -> String {
        self.sender
            .as_ref()
            .and_then(|s| s.card.clone())
            .filter(|card| !card.is_empty())
            .unwrap_or_else(|| self.nickname())
    }

    /// Segments that do not parse are dropped so the frame still yields a
    /// message built from `raw_message`.
    fn segments(&self) -> Vec<Segment> {
        match &self.message {
            Value::Array(_) => Vec::<Segment>::deserialize(&self.message).unwrap_or_else(|err| {
                warn!(
                    error = %err,
                    message_id = self.message_id,
                    "Ignoring malformed message segments"
                );
                Vec::new()
            }),
            _ => Vec::new(),
        }
    }

    fn text(&self, segments: &[Segment]) -> String {
        if !self.raw_message.is_empty() {
            return strip_cq_codes(&self.raw_message);
        }
        match &self.message {
            Value::String(s) => strip_cq_codes(s),
            Value::Array(_) => render_segments(segments),
            _ => String::new(),
        }
    }
}

// ============================================================================
// Event Codec
// ============================================================================

/// Turns raw transport frames into [`Event`]s.
#[derive(Debug, Clone, Default)]
pub struct EventCodec {
    identity: BotIdentity,
}

impl EventCodec {
    /// Creates a codec that recognizes mentions of the given identity.
    pub fn new(identity: BotIdentity) -> Self {
        Self { identity }
    }

    /// Returns the identity used for mention detection.
    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Decodes a frame, never failing.
    ///
    /// Frames that cannot be decoded become [`Event::Unknown`] and the cause is
    /// logged.
    pub fn decode(&self, frame: &str) -> Event {
        match self.try_decode(frame) {
            Ok(event) => event,
            Err(DecodeError::Unrecognized { post_type, detail }) => {
                debug!(post_type = %post_type, detail = %detail, "Ignoring unrecognized event");
                Event::Unknown {
                    raw: unknown_raw(frame),
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to decode frame");
                Event::Unknown {
                    raw: unknown_raw(frame),
                }
            }
        }
    }

    /// Decodes a frame, reporting why it could not be classified.
    pub fn try_decode(&self, frame: &str) -> Result<Event, DecodeError> {
        let value: Value = serde_json::from_str(frame)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        let envelope = Envelope::deserialize(&value)?;

        match (
            envelope.post_type.as_str(),
            envelope.message_type.as_str(),
            envelope.meta_event_type.as_str(),
        ) {
            ("message", "group", _) => self.decode_group(MessageFrame::deserialize(&value)?),
            ("message", "private", _) => self.decode_private(MessageFrame::deserialize(&value)?),
            ("meta_event", _, "heartbeat") => Ok(Event::Heartbeat),
            ("meta_event", _, "lifecycle") => Ok(Event::Lifecycle {
                sub_type: envelope.sub_type,
            }),
            (post_type, message_type, meta_type) => Err(DecodeError::Unrecognized {
                post_type: post_type.to_string(),
                detail: if message_type.is_empty() {
                    meta_type.to_string()
                } else {
                    message_type.to_string()
                },
            }),
        }
    }

    fn decode_group(&self, frame: MessageFrame) -> Result<Event, DecodeError> {
        let group_id = frame.group_id.ok_or(DecodeError::MissingField {
            kind: "group_message",
            field: "group_id",
        })?;
        let sender_id = frame.sender_id();
        if sender_id == 0 {
            return Err(DecodeError::MissingField {
                kind: "group_message",
                field: "user_id",
            });
        }

        let segments = frame.segments();
        let text = frame.text(&segments);
        let mention = self.extract_mention(&segments, frame.self_id);

        Ok(Event::GroupMessage(GroupMessage {
            self_id: frame.self_id,
            group_id,
            sender_id,
            display_name: frame.display_name(),
            message_id: frame.message_id(),
            text,
            segments,
            mention,
        }))
    }

    fn decode_private(&self, frame: MessageFrame) -> Result<Event, DecodeError> {
        let sender_id = frame.sender_id();
        if sender_id == 0 {
            return Err(DecodeError::MissingField {
                kind: "private_message",
                field: "user_id",
            });
        }

        let segments = frame.segments();

        Ok(Event::PrivateMessage(PrivateMessage {
            self_id: frame.self_id,
            sender_id,
            display_name: frame.nickname(),
            message_id: frame.message_id(),
            text: frame.text(&segments),
        }))
    }

    fn extract_mention(&self, segments: &[Segment], frame_self_id: i64) -> Option<Mention> {
        let first = segments.first()?;
        if !self.identity.addresses(first, frame_self_id) {
            return None;
        }

        let request = text_after_first(segments);
        if request.is_empty() {
            return None;
        }

        Some(Mention {
            target: first.at_display().unwrap_or_default().to_string(),
            request,
        })
    }
}

fn unknown_raw(frame: &str) -> Value {
    serde_json::from_str(frame).unwrap_or_else(|_| Value::String(frame.to_string()))
}
