use serde_json::Value;

use super::classify::{ClassifiedPayload, NoiseFilter, SseBody, Signal};
use super::reasoning::Delta;
use crate::stream::StreamEvent;

const NESTED_DATA_PREFIX: &str = "data:";

/// Output of the normalizer: a finished event, or a delta that still needs
/// the reasoning transducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalized {
    Event(StreamEvent),
    Delta(Delta),
}

impl Normalized {
    /// True when this output puts text on screen or ends the turn.
    fn is_visible(&self) -> bool {
        match self {
            Self::Event(StreamEvent::WaitQueuing) => false,
            Self::Event(event) => !event.is_noop(),
            Self::Delta(delta) => delta.has_text(),
        }
    }
}

/// Maps classified payloads to canonical events and owns the keep-alive
/// suppression flag.
#[derive(Clone, Debug, Default)]
pub struct EventNormalizer {
    noise: NoiseFilter,
    keep_alive_shown: bool,
}

impl EventNormalizer {
    pub fn new(noise: NoiseFilter) -> Self {
        Self {
            noise,
            keep_alive_shown: false,
        }
    }

    pub fn keep_alive_shown(&self) -> bool {
        self.keep_alive_shown
    }

    pub fn reset(&mut self) {
        self.keep_alive_shown = false;
    }

    /// Normalizes one payload. Pure noise yields `None`; a completion signal
    /// always yields `Done`.
    pub fn normalize(&mut self, payload: ClassifiedPayload) -> Option<Normalized> {
        let out = match payload {
            ClassifiedPayload::KeepAlive => {
                if self.keep_alive_shown {
                    return None;
                }
                self.keep_alive_shown = true;
                return Some(Normalized::Event(StreamEvent::WaitQueuing));
            }
            ClassifiedPayload::Ignored(Signal::Done) => Some(Normalized::Event(StreamEvent::Done)),
            ClassifiedPayload::Ignored(Signal::None) => None,
            ClassifiedPayload::Sse(SseBody::Json(value)) | ClassifiedPayload::Json(value) => {
                self.extract(&value)
            }
            ClassifiedPayload::Sse(SseBody::Text(text)) | ClassifiedPayload::Plain(text) => {
                self.text_event(&text)
            }
        };
        if out.as_ref().is_some_and(Normalized::is_visible) {
            self.keep_alive_shown = false;
        }
        out
    }

    /// Content extraction, first match wins: typed envelope, `content`,
    /// `text`, `message`, delta structure, then the whole payload as text.
    fn extract(&self, value: &Value) -> Option<Normalized> {
        if let Value::String(text) = value {
            return self.json_event(text);
        }
        match (
            value.get("type").and_then(Value::as_str),
            value.get("data"),
        ) {
            (Some("content" | "error"), Some(data)) => {
                let text = truthy_text(data)?;
                let text = text.strip_prefix(NESTED_DATA_PREFIX).unwrap_or(&text);
                return self.json_event(text);
            }
            (Some("think"), Some(data)) => {
                return truthy_text(data).map(|text| Normalized::Delta(Delta::reasoning(text)));
            }
            (Some("end"), _) => return None,
            _ => {}
        }

        if let Some(content) = value.get("content") {
            return match content {
                Value::Null => None,
                Value::String(text) => self.json_event(text),
                other => self.json_event(&other.to_string()),
            };
        }
        if let Some(text) = value.get("text").and_then(truthy_text) {
            return self.json_event(&text);
        }
        if let Some(message) = value.get("message").and_then(message_text) {
            return self.json_event(&message);
        }
        if let Some(delta) = delta_object(value) {
            return Some(Normalized::Delta(Delta::from_json(delta)));
        }
        if value.get("choices").is_some_and(Value::is_array) {
            // Usage/finish chunks without a delta carry nothing to show.
            return None;
        }
        self.json_event(&value.to_string())
    }

    /// JSON-extracted text keeps whitespace-only tokens; only empty text is
    /// dropped.
    fn json_event(&self, text: &str) -> Option<Normalized> {
        let cleaned = self.noise.clean(text);
        if cleaned.is_empty() {
            return None;
        }
        Some(Normalized::Event(StreamEvent::content(cleaned)))
    }

    /// Literal-text fallbacks are dropped when nothing but whitespace remains.
    fn text_event(&self, text: &str) -> Option<Normalized> {
        let cleaned = self.noise.clean(text);
        if cleaned.trim().is_empty() {
            return None;
        }
        Some(Normalized::Event(StreamEvent::content(cleaned)))
    }
}

fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// `message` is either a string or a chat message object with `content`.
fn message_text(value: &Value) -> Option<String> {
    match value.get("content") {
        Some(content) if value.is_object() => truthy_text(content),
        _ => truthy_text(value),
    }
}

fn delta_object(value: &Value) -> Option<&Value> {
    value
        .pointer("/choices/0/delta")
        .or_else(|| value.get("delta"))
        .filter(|delta| delta.is_object())
}
