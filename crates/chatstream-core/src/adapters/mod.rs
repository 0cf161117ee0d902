//! Model adapters: how a chat turn reaches a backend and which
//! normalization path its response takes.

pub mod credentials;
pub mod deepseek;
pub mod error_frame;
pub mod local;
pub mod mock;
pub mod registry;
pub mod transport;

use std::fmt;

pub use credentials::{CredentialStore, LogRedirect, LoginRedirect, MemoryCredentialStore};
pub use deepseek::{DeepSeekBackend, DeepSeekConfig};
pub use error_frame::{FailureNotice, MessageLocale};
pub use local::{LocalBackend, LocalModelConfig, LocalTransform};
pub use mock::{MockBackend, MockConfig};
pub use registry::{AdapterRegistry, AdapterRegistryBuilder, StandardAdapters};
pub use transport::{AdapterResponse, HttpRequest, HttpTransport, ReqwestTransport, RequestBody};

use crate::pipeline::PipelineMode;

/// Stable adapter identifier (for example `deepseek-v3`).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct AdapterId(String);

impl AdapterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AdapterId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// The closed set of backend kinds.
#[derive(Clone)]
pub enum ModelBackend {
    /// Scripted transcript replay.
    Mock(MockBackend),
    /// OpenAI-compatible chat completions with reasoning deltas.
    DeepSeek(DeepSeekBackend),
    /// Authenticated backend emitting pre-normalized JSON.
    Local(LocalBackend),
}

impl ModelBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mock(_) => "mock",
            Self::DeepSeek(_) => "deepseek",
            Self::Local(_) => "local",
        }
    }
}

/// Immutable descriptor of one selectable model.
#[derive(Clone)]
pub struct ModelAdapter {
    id: AdapterId,
    display_name: String,
    backend: ModelBackend,
}

impl ModelAdapter {
    pub fn new(id: impl Into<AdapterId>, display_name: impl Into<String>, backend: ModelBackend) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            backend,
        }
    }

    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn backend(&self) -> &ModelBackend {
        &self.backend
    }

    /// Issues the streaming request. Never fails: transport, HTTP and auth
    /// failures come back as a synthesized error frame in the body.
    pub async fn request(&self, text: &str, session_id: Option<&str>) -> AdapterResponse {
        match &self.backend {
            ModelBackend::Mock(backend) => backend.request(text).await,
            ModelBackend::DeepSeek(backend) => backend.request(text).await,
            ModelBackend::Local(backend) => backend.request(text, session_id).await,
        }
    }

    /// Normalization path for this adapter's responses. `reasoning` only
    /// applies to the shared path.
    pub fn pipeline_mode(&self, reasoning: bool) -> PipelineMode {
        match &self.backend {
            ModelBackend::Mock(_) | ModelBackend::DeepSeek(_) => PipelineMode::Shared { reasoning },
            ModelBackend::Local(_) => PipelineMode::Local,
        }
    }
}

impl fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("backend", &self.backend.kind())
            .finish()
    }
}
