//! OneBot v11 message segments and plain-text extraction.
//!
//! Segments arrive as `{"type": "...", "data": {...}}` objects. Only the two
//! kinds the engine inspects are modeled; every other kind collapses into
//! [`Segment::Other`] carrying just its type name.
//!
//! # Example
//!
//! ```rust,ignore
//! use kestrel_core::Segment;
//!
//! let segments: Vec<Segment> = serde_json::from_str(
//!     r#"[{"type":"at","data":{"qq":"10001"}},{"type":"text","data":{"text":" hi"}}]"#,
//! )?;
//! assert_eq!(kestrel_core::render_segments(&segments), "[at] hi");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const CQ_OPEN: &str = "[CQ:";

// ============================================================================
// Segment
// ============================================================================

/// A single unit of message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// Plain text.
    Text(String),
    /// An @mention.
    At {
        /// Display name the client attached to the mention, if any.
        name: Option<String>,
        /// The `qq` field verbatim: a numeric id, or `all`.
        target: String,
    },
    /// Any other segment kind, identified by its type name.
    Other(String),
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a mention segment for the given account.
    pub fn at(target: i64) -> Self {
        Self::At {
            name: None,
            target: target.to_string(),
        }
    }

    /// Returns the OneBot type name of this segment.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::At { .. } => "at",
            Self::Other(kind) => kind,
        }
    }

    /// Returns the text if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the numeric mention target, if this mentions a single account.
    pub fn at_target_id(&self) -> Option<i64> {
        match self {
            Self::At { target, .. } => target.parse().ok(),
            _ => None,
        }
    }

    /// Returns the mention's display name, falling back to the raw target.
    pub fn at_display(&self) -> Option<&str> {
        match self {
            Self::At { name, target } => Some(
                name.as_deref()
                    .filter(|n| !n.is_empty())
                    .unwrap_or(target.as_str()),
            ),
            _ => None,
        }
    }
}

/// Wire shape shared by every segment kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawSegment {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        let field = |key: &str| -> Option<String> {
            match raw.data.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        match raw.kind.as_str() {
            "text" => Self::Text(field("text").unwrap_or_default()),
            "at" => Self::At {
                name: field("name"),
                target: field("qq").unwrap_or_default(),
            },
            _ => Self::Other(raw.kind),
        }
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        match segment {
            Segment::Text(text) => RawSegment {
                kind: "text".into(),
                data: json!({ "text": text }),
            },
            Segment::At { name, target } => {
                let mut data = json!({ "qq": target });
                if let Some(name) = name {
                    data["name"] = Value::String(name);
                }
                RawSegment {
                    kind: "at".into(),
                    data,
                }
            }
            Segment::Other(kind) => RawSegment {
                kind,
                data: json!({}),
            },
        }
    }
}

// ============================================================================
// Text Extraction
// ============================================================================

/// Removes every `[CQ:...]` code from a raw message string and trims it.
///
/// A code needs at least one character between `[CQ:` and the closing `]`;
/// anything else is left in place.
pub fn strip_cq_codes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find(CQ_OPEN) {
        let body = &rest[start + CQ_OPEN.len()..];
        match body.find(']') {
            Some(end) if end > 0 => {
                out.push_str(&rest[..start]);
                rest = &body[end + 1..];
            }
            _ => {
                out.push_str(&rest[..start + CQ_OPEN.len()]);
                rest = body;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// Renders a segment list as plain text.
///
/// Text segments are concatenated in order, every other segment is rendered
/// as `[type]`, and the result is trimmed.
pub fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            other => {
                out.push('[');
                out.push_str(other.kind());
                out.push(']');
            }
        }
    }
    out.trim().to_string()
}

/// Concatenates the text segments that follow the first segment, trimmed.
pub(crate) fn text_after_first(segments: &[Segment]) -> String {
    segments
        .iter()
        .skip(1)
        .filter_map(Segment::as_text)
        .collect::<String>()
        .trim()
        .to_string()
}
