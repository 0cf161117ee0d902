use std::borrow::Cow;

use serde_json::Value;
use tracing::debug;

use super::repair::{close_truncated_json, repair_frame, unwrap_nested_data_prefix};
use super::splitter::RawFrame;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const COMPLETION_MARKERS: [&str; 4] = [DONE_SENTINEL, "event:done", "event: done", r#""name":"done""#];
const COMPLETION_FLAGS: [&str; 3] = ["done", "finished", "complete"];
/// SSE field lines that carry nothing for this pipeline once repaired.
const SSE_FIELD_PREFIXES: [&str; 3] = ["event:", "id:", "retry:"];

pub const DEFAULT_KEEP_ALIVE: &str = ": keep-alive";

/// Body of a `data:` frame.
#[derive(Clone, Debug, PartialEq)]
pub enum SseBody {
    Json(Value),
    /// Body that did not parse as JSON; kept as literal text.
    Text(String),
}

/// Signal carried by an ignored frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// Completion was detected; the normalizer must emit `Done`.
    Done,
    /// Pure noise.
    None,
}

/// Result of repairing and classifying one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassifiedPayload {
    /// `data:` frame.
    Sse(SseBody),
    /// Bare JSON object line from an NDJSON-style backend.
    Json(Value),
    /// Non-SSE text (degraded mode).
    Plain(String),
    /// Keep-alive literal, or a JSON `isWaitQueuing: true` notice.
    KeepAlive,
    Ignored(Signal),
}

/// One deny rule: matches when every substring is present.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DenyRule {
    pub all_of: Vec<String>,
}

impl DenyRule {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all_of: parts.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        !self.all_of.is_empty() && self.all_of.iter().all(|part| text.contains(part.as_str()))
    }
}

/// Known noise phrases: diagnostic dumps and generation-complete banners.
///
/// Heuristics are substring based and kept in this one place so they can be
/// replaced through configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct NoiseFilter {
    /// Frames matching any rule are dropped entirely.
    pub deny_rules: Vec<DenyRule>,
    /// Banners dropped as whole frames in text mode and stripped from
    /// extracted content.
    pub banners: Vec<String>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self {
            deny_rules: vec![DenyRule::new(["思考过程", "嗯，用户是个"])],
            banners: vec!["生成完成".to_string()],
        }
    }
}

impl NoiseFilter {
    /// A filter that lets everything through.
    pub fn none() -> Self {
        Self {
            deny_rules: Vec::new(),
            banners: Vec::new(),
        }
    }

    pub fn is_denied(&self, text: &str) -> bool {
        self.deny_rules.iter().any(|rule| rule.matches(text))
    }

    pub fn has_banner(&self, text: &str) -> bool {
        self.banners
            .iter()
            .any(|banner| !banner.is_empty() && text.contains(banner.as_str()))
    }

    /// Removes completion sentinels and banners from text about to be shown.
    pub fn clean<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for phrase in std::iter::once(DONE_SENTINEL).chain(self.banners.iter().map(String::as_str))
        {
            if !phrase.is_empty() && out.contains(phrase) {
                out = Cow::Owned(out.replace(phrase, ""));
            }
        }
        out
    }
}

/// True when the text carries any textual completion signal: `[DONE]`
/// anywhere, `event:done` / `event: done`, or `"name":"done"`.
pub fn is_completion_signal(text: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|marker| text.contains(*marker))
}

/// True when a parsed JSON object sets any of `done`, `finished` or
/// `complete` to `true`.
pub fn json_signals_completion(value: &Value) -> bool {
    COMPLETION_FLAGS
        .iter()
        .any(|flag| value.get(*flag).and_then(Value::as_bool) == Some(true))
}

fn json_signals_wait(value: &Value) -> bool {
    value.get("isWaitQueuing").and_then(Value::as_bool) == Some(true)
}

/// Repairs a frame and decides what kind of payload it carries.
#[derive(Clone, Debug)]
pub struct Classifier {
    noise: NoiseFilter,
    keep_alive: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(NoiseFilter::default(), DEFAULT_KEEP_ALIVE)
    }
}

impl Classifier {
    pub fn new(noise: NoiseFilter, keep_alive: impl Into<String>) -> Self {
        Self {
            noise,
            keep_alive: keep_alive.into(),
        }
    }

    pub fn noise(&self) -> &NoiseFilter {
        &self.noise
    }

    pub fn classify(&self, frame: &RawFrame) -> ClassifiedPayload {
        let repaired = repair_frame(frame.as_str());
        let text = repaired.trim();
        if text.is_empty() {
            return ClassifiedPayload::Ignored(Signal::None);
        }
        // Completion wins over every other interpretation of the frame.
        if is_completion_signal(text) {
            return ClassifiedPayload::Ignored(Signal::Done);
        }
        match text.strip_prefix(DATA_PREFIX) {
            Some(body) => self.classify_data(body.trim()),
            None => self.classify_bare(text),
        }
    }

    fn classify_data(&self, body: &str) -> ClassifiedPayload {
        if body.is_empty() || self.noise.is_denied(body) {
            return ClassifiedPayload::Ignored(Signal::None);
        }
        let closed = close_truncated_json(body);
        let candidate = unwrap_nested_data_prefix(&closed);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => classify_json(value, |v| ClassifiedPayload::Sse(SseBody::Json(v))),
            Err(err) => {
                debug!(error = %err, body_len = body.len(), "data frame is not JSON; keeping as text");
                ClassifiedPayload::Sse(SseBody::Text(body.to_string()))
            }
        }
    }

    fn classify_bare(&self, text: &str) -> ClassifiedPayload {
        if text == self.keep_alive {
            return ClassifiedPayload::KeepAlive;
        }
        if text.starts_with(':')
            || SSE_FIELD_PREFIXES.iter().any(|p| text.starts_with(*p))
            || self.noise.is_denied(text)
            || self.noise.has_banner(text)
        {
            return ClassifiedPayload::Ignored(Signal::None);
        }
        if text.starts_with('{')
            && text.ends_with('}')
            && let Ok(value) = serde_json::from_str::<Value>(text)
        {
            return classify_json(value, ClassifiedPayload::Json);
        }
        ClassifiedPayload::Plain(text.to_string())
    }
}

fn classify_json(value: Value, wrap: impl FnOnce(Value) -> ClassifiedPayload) -> ClassifiedPayload {
    if json_signals_completion(&value) {
        ClassifiedPayload::Ignored(Signal::Done)
    } else if json_signals_wait(&value) {
        ClassifiedPayload::KeepAlive
    } else {
        wrap(value)
    }
}
