use serde_json::Value;

/// Tri-state view of a delta field: missing, explicit `null`, or text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeltaField {
    #[default]
    Absent,
    Null,
    Text(String),
}

impl DeltaField {
    /// Reads a JSON field. Non-string scalars are rendered as text.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            None => Self::Absent,
            Some(Value::Null) => Self::Null,
            Some(Value::String(text)) => Self::Text(text.clone()),
            Some(other) => Self::Text(other.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Absent | Self::Null => None,
        }
    }

    fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// A delta-style payload: answer text and reasoning text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    pub content: DeltaField,
    pub reasoning: DeltaField,
}

impl Delta {
    /// Reads `{content, reasoning_content}` from a delta object. Deltas that
    /// carry their answer under `text` instead of `content` are accepted too.
    pub fn from_json(delta: &Value) -> Self {
        let content = delta.get("content").or_else(|| delta.get("text"));
        Self {
            content: DeltaField::from_json(content),
            reasoning: DeltaField::from_json(delta.get("reasoning_content")),
        }
    }

    /// Reasoning-only delta (`content: null`).
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            content: DeltaField::Null,
            reasoning: DeltaField::Text(text.into()),
        }
    }

    /// Answer delta from a model with a reasoning channel
    /// (`reasoning_content: null`).
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            content: DeltaField::Text(text.into()),
            reasoning: DeltaField::Null,
        }
    }

    /// True when either field carries non-empty text.
    pub fn has_text(&self) -> bool {
        [&self.content, &self.reasoning]
            .iter()
            .any(|field| field.as_text().is_some_and(|text| !text.is_empty()))
    }

    /// Empty reasoning text carries nothing and counts as `null`; so does
    /// empty answer text sent next to real reasoning.
    fn normalized(&self) -> (DeltaField, DeltaField) {
        let reasoning = match &self.reasoning {
            DeltaField::Text(text) if text.is_empty() => DeltaField::Null,
            other => other.clone(),
        };
        let content = match &self.content {
            DeltaField::Text(text) if text.is_empty() && reasoning.is_text() => DeltaField::Null,
            other => other.clone(),
        };
        (content, reasoning)
    }
}

/// Plain-text markers wrapped around reasoning segments.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ReasoningMarkers {
    pub open: String,
    pub close: String,
    /// Inserted after `close` when answer text follows.
    pub separator: String,
}

impl Default for ReasoningMarkers {
    fn default() -> Self {
        Self {
            open: "<think>".to_string(),
            close: "</think>".to_string(),
            separator: "<br><br>".to_string(),
        }
    }
}

/// Interleaves reasoning and answer text, opening and closing a marked
/// segment as the stream switches channels.
#[derive(Clone, Debug, Default)]
pub struct ReasoningTransducer {
    markers: ReasoningMarkers,
    is_thinking: bool,
}

impl ReasoningTransducer {
    pub fn new(markers: ReasoningMarkers) -> Self {
        Self {
            markers,
            is_thinking: false,
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.is_thinking
    }

    pub fn markers(&self) -> &ReasoningMarkers {
        &self.markers
    }

    /// Returns the text for one delta, markers included. Combinations that
    /// carry nothing usable yield an empty string.
    pub fn transform(&mut self, delta: &Delta) -> String {
        let mut out = String::new();
        match delta.normalized() {
            (content, DeltaField::Text(reasoning)) if !content.is_text() => {
                if !self.is_thinking {
                    out.push_str(&self.markers.open);
                    self.is_thinking = true;
                }
                out.push_str(&reasoning);
            }
            (DeltaField::Text(content), DeltaField::Null | DeltaField::Absent) => {
                // A model without a reasoning channel (`Absent`) still closes
                // a segment left open, so markers stay balanced.
                if self.is_thinking {
                    self.close_into(&mut out);
                    out.push_str(&self.markers.separator);
                }
                out.push_str(&content);
            }
            _ => {}
        }
        out
    }

    /// Closing marker for a segment still open at the end of the turn.
    pub fn finish(&mut self) -> Option<String> {
        if !self.is_thinking {
            return None;
        }
        let mut out = String::new();
        self.close_into(&mut out);
        Some(out)
    }

    pub fn reset(&mut self) {
        self.is_thinking = false;
    }

    fn close_into(&mut self, out: &mut String) {
        out.push_str(&self.markers.close);
        self.is_thinking = false;
    }
}

/// Renders a delta without cross-event state: reasoning is wrapped in a
/// complete segment, otherwise the answer text is returned.
pub fn render_stateless(delta: &Delta, markers: &ReasoningMarkers) -> String {
    let (content, reasoning) = delta.normalized();
    match (reasoning, content) {
        (DeltaField::Text(reasoning), _) => {
            format!("{}{}{}", markers.open, reasoning, markers.close)
        }
        (_, DeltaField::Text(content)) => content,
        _ => String::new(),
    }
}
