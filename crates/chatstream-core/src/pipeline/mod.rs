//! Stream normalization stages, in data-flow order.

pub mod classify;
pub mod driver;
pub mod normalize;
pub mod reasoning;
pub mod repair;
pub mod splitter;

pub use classify::{
    ClassifiedPayload, Classifier, DenyRule, NoiseFilter, SseBody, Signal, is_completion_signal,
    json_signals_completion,
};
pub use driver::{Pipeline, PipelineMode, PipelineState, normalize_stream};
pub use normalize::{EventNormalizer, Normalized};
pub use reasoning::{Delta, DeltaField, ReasoningMarkers, ReasoningTransducer, render_stateless};
pub use repair::repair_frame;
pub use splitter::{FrameDelimiter, FrameSplitter, RawFrame};
