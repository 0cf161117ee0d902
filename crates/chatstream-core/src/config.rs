use crate::errors::ChatStreamError;
use crate::pipeline::classify::{DEFAULT_KEEP_ALIVE, NoiseFilter};
use crate::pipeline::reasoning::ReasoningMarkers;
use crate::pipeline::splitter::FrameDelimiter;

const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Tunables shared by every pipeline instance.
///
/// Deserializes from JSON with every field optional, so a deployment can
/// override only the heuristics it needs.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delimiter used for `text/event-stream` responses.
    pub sse_delimiter: FrameDelimiter,
    /// Delimiter used for any other (or missing) content type.
    pub plain_delimiter: FrameDelimiter,
    /// Exact frame text that marks a keep-alive.
    pub keep_alive: String,
    pub noise: NoiseFilter,
    pub markers: ReasoningMarkers,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sse_delimiter: FrameDelimiter::default(),
            plain_delimiter: FrameDelimiter::default(),
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
            noise: NoiseFilter::default(),
            markers: ReasoningMarkers::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ChatStreamError> {
        serde_json::from_str(raw)
            .map_err(|e| ChatStreamError::Config(format!("invalid pipeline config: {e}")))
    }

    /// Picks the frame delimiter for a response content type.
    pub fn delimiter_for(&self, content_type: Option<&str>) -> &FrameDelimiter {
        let is_event_stream = content_type.is_some_and(|ct| {
            ct.to_ascii_lowercase()
                .contains(EVENT_STREAM_CONTENT_TYPE)
        });
        if is_event_stream {
            &self.sse_delimiter
        } else {
            &self.plain_delimiter
        }
    }

    /// Overrides the noise filter.
    pub fn noise(mut self, noise: NoiseFilter) -> Self {
        self.noise = noise;
        self
    }

    /// Overrides the reasoning markers.
    pub fn markers(mut self, markers: ReasoningMarkers) -> Self {
        self.markers = markers;
        self
    }

    /// Overrides the keep-alive literal.
    pub fn keep_alive(mut self, literal: impl Into<String>) -> Self {
        self.keep_alive = literal.into();
        self
    }

    /// Overrides the delimiter used for plain (non event-stream) responses.
    pub fn plain_delimiter(mut self, delimiter: FrameDelimiter) -> Self {
        self.plain_delimiter = delimiter;
        self
    }
}
