//! Common imports for typical usage.
pub use crate::{
    AbortHandle, AdapterId, AdapterRegistry, ChatStreamError, DeepSeekConfig, LocalModelConfig,
    MemoryCredentialStore, MessageLocale, MockConfig, Pipeline, PipelineConfig, PipelineMode,
    StandardAdapters, StreamEvent, TurnBuilder, TurnOutcome, TurnStream, TurnSummary,
};
