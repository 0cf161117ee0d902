use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::ser::SerializeMap as _;

use crate::errors::TransportError;

/// Response body as delivered by a transport: byte chunks in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Canonical events emitted by the pipeline to a renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text to append. Empty text is a valid no-op emission.
    Content { text: String },
    /// The backend signalled completion of the turn.
    Done,
    /// The backend is idle/queuing (keep-alive); surfaced at most once per
    /// keep-alive period.
    WaitQueuing,
}

impl StreamEvent {
    /// Creates a content event.
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Returns the text carried by a `Content` event.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content { text } => Some(text),
            Self::Done | Self::WaitQueuing => None,
        }
    }

    /// True for `Done`.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// True for a `Content` event with empty text.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Content { text } if text.is_empty())
    }
}

/// Wire shape consumed by UI collaborators:
/// `{"content": "..."}`, `{"done": true}` or `{"isWaitQueuing": true}`.
impl serde::Serialize for StreamEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Content { text } => map.serialize_entry("content", text)?,
            Self::Done => map.serialize_entry("done", &true)?,
            Self::WaitQueuing => map.serialize_entry("isWaitQueuing", &true)?,
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_renderer_wire_shape() {
        let content = serde_json::to_string(&StreamEvent::content("hi")).expect("json");
        assert_eq!(content, r#"{"content":"hi"}"#);
        let done = serde_json::to_string(&StreamEvent::Done).expect("json");
        assert_eq!(done, r#"{"done":true}"#);
        let wait = serde_json::to_string(&StreamEvent::WaitQueuing).expect("json");
        assert_eq!(wait, r#"{"isWaitQueuing":true}"#);
    }

    #[test]
    fn empty_content_is_a_noop() {
        assert!(StreamEvent::content("").is_noop());
        assert!(!StreamEvent::content(" ").is_noop());
        assert!(!StreamEvent::Done.is_noop());
    }
}
