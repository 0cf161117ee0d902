//! Streaming response normalization for chat LLM backends.
//!
//! A backend response arrives as chunked, possibly malformed, SSE-flavoured
//! text. The pipeline splits it into frames, repairs and classifies each one,
//! normalizes the payload and interleaves reasoning text, producing an ordered
//! sequence of [`StreamEvent`]s (`Content`, `Done`, `WaitQueuing`).
//!
//! # Running a turn
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatstream_core::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatStreamError> {
//! let registry = AdapterRegistry::standard(StandardAdapters::new(
//!     DeepSeekConfig::from_env()?,
//!     LocalModelConfig::from_env()?,
//!     Arc::new(MemoryCredentialStore::default()),
//! ))?;
//!
//! let mut turn = registry.turn("deepseek-v3").user_text("Say hello").start().await?;
//! while let Some(event) = turn.next_event().await {
//!     if let StreamEvent::Content { text } = event {
//!         print!("{text}");
//!     }
//! }
//! let summary = turn.finish().await?;
//! println!("\n{:?}", summary.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Normalizing bytes directly
//!
//! ```
//! use chatstream_core::prelude::*;
//!
//! let mut pipeline = Pipeline::new(&PipelineConfig::default(), PipelineMode::default());
//! let events = pipeline.push_chunk(b"data: {\"content\":\"hi\"}\ndata: [DONE]\n");
//! assert_eq!(events, vec![StreamEvent::content("hi"), StreamEvent::Done]);
//! ```

/// Model adapters, transports, credentials and the adapter registry.
pub mod adapters;
/// Pipeline tunables.
pub mod config;
/// Public error types.
pub mod errors;
/// Process-wide logging setup.
pub mod observability;
/// Frame splitting, classification, normalization and the pipeline driver.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Canonical events and byte stream types.
pub mod stream;
/// Async turn runtime: builder, streaming handle and cancellation.
pub mod turn;

pub use adapters::{
    AdapterId, AdapterRegistry, AdapterRegistryBuilder, AdapterResponse, CredentialStore,
    DeepSeekConfig, HttpTransport, LocalModelConfig, LoginRedirect, MemoryCredentialStore,
    MessageLocale, MockConfig, ModelAdapter, ModelBackend, StandardAdapters,
};
pub use config::PipelineConfig;
pub use errors::{ChatStreamError, TransportError};
pub use observability::{ObservabilityConfig, init_observability, init_with};
pub use pipeline::{Pipeline, PipelineMode, PipelineState, normalize_stream};
pub use stream::{ByteStream, StreamEvent};
pub use turn::{AbortHandle, TurnBuilder, TurnOutcome, TurnStream, TurnSummary};
