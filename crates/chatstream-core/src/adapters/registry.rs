use std::collections::HashSet;
use std::sync::Arc;

use super::credentials::{CredentialStore, LogRedirect, LoginRedirect};
use super::deepseek::{DeepSeekBackend, DeepSeekConfig};
use super::local::{LocalBackend, LocalModelConfig};
use super::mock::{MockBackend, MockConfig};
use super::transport::{HttpTransport, ReqwestTransport};
use super::{AdapterId, ModelAdapter, ModelBackend};
use crate::config::PipelineConfig;
use crate::errors::ChatStreamError;
use crate::turn::TurnBuilder;

pub const MOCK_ADAPTER_ID: &str = "standard";
pub const DEEPSEEK_ADAPTER_ID: &str = "deepseek-v3";
pub const LOCAL_ADAPTER_ID: &str = "local-model";

struct RegistryInner {
    adapters: Vec<Arc<ModelAdapter>>,
    default_id: Option<AdapterId>,
    pipeline: PipelineConfig,
}

/// Ordered, read-only set of adapters plus the pipeline configuration turns
/// run with. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct AdapterRegistry {
    inner: Arc<RegistryInner>,
}

impl AdapterRegistry {
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder::default()
    }

    /// The default three adapters, in order `standard`, `deepseek-v3`,
    /// `local-model`, with `local-model` as the default.
    pub fn standard(config: StandardAdapters) -> Result<Self, ChatStreamError> {
        let deepseek_transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.deepseek.timeout)?);
        let local_transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(config.local.timeout)?);
        Self::standard_with_transports(config, deepseek_transport, local_transport)
    }

    /// Like [`AdapterRegistry::standard`], with caller-provided transports.
    pub fn standard_with_transports(
        config: StandardAdapters,
        deepseek_transport: Arc<dyn HttpTransport>,
        local_transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ChatStreamError> {
        let StandardAdapters {
            mock,
            deepseek,
            local,
            credentials,
            redirect,
            pipeline,
        } = config;
        Self::builder()
            .register(ModelAdapter::new(
                MOCK_ADAPTER_ID,
                "模型测试",
                ModelBackend::Mock(MockBackend::new(mock)),
            ))
            .register(ModelAdapter::new(
                DEEPSEEK_ADAPTER_ID,
                "🐋 DeepSeek-V3",
                ModelBackend::DeepSeek(DeepSeekBackend::new(deepseek, deepseek_transport)),
            ))
            .register(ModelAdapter::new(
                LOCAL_ADAPTER_ID,
                "🤖 本地模型",
                ModelBackend::Local(LocalBackend::new(
                    local,
                    local_transport,
                    credentials,
                    redirect,
                )),
            ))
            .default_adapter(LOCAL_ADAPTER_ID)
            .pipeline_config(pipeline)
            .build()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModelAdapter>> {
        self.inner
            .adapters
            .iter()
            .find(|adapter| adapter.id().as_str() == id)
            .cloned()
    }

    /// Adapters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelAdapter> {
        self.inner.adapters.iter().map(Arc::as_ref)
    }

    pub fn ids(&self) -> Vec<AdapterId> {
        self.iter().map(|adapter| adapter.id().clone()).collect()
    }

    pub fn default_id(&self) -> Option<&AdapterId> {
        self.inner.default_id.as_ref()
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.inner.pipeline
    }

    pub fn len(&self) -> usize {
        self.inner.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.adapters.is_empty()
    }

    /// Starts configuring a chat turn against one adapter.
    pub fn turn(&self, adapter: impl Into<AdapterId>) -> TurnBuilder {
        TurnBuilder::new(self.clone(), adapter.into())
    }
}

/// Collects adapters before freezing them into an [`AdapterRegistry`].
#[derive(Default)]
pub struct AdapterRegistryBuilder {
    adapters: Vec<ModelAdapter>,
    default_id: Option<AdapterId>,
    pipeline: PipelineConfig,
}

impl AdapterRegistryBuilder {
    /// Registers an adapter. Ids must be unique.
    pub fn register(mut self, adapter: ModelAdapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Selects the default adapter. Without it the first registered one is
    /// the default.
    pub fn default_adapter(mut self, id: impl Into<AdapterId>) -> Self {
        self.default_id = Some(id.into());
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    /// Validates registrations (duplicates, unknown default) and builds.
    pub fn build(self) -> Result<AdapterRegistry, ChatStreamError> {
        let mut seen: HashSet<AdapterId> = HashSet::new();
        for adapter in &self.adapters {
            if !seen.insert(adapter.id().clone()) {
                return Err(ChatStreamError::Config(format!(
                    "duplicate adapter registration: {}",
                    adapter.id()
                )));
            }
        }
        let default_id = match self.default_id {
            Some(id) if !seen.contains(&id) => {
                return Err(ChatStreamError::Config(format!(
                    "default adapter is not registered: {id}"
                )));
            }
            Some(id) => Some(id),
            None => self.adapters.first().map(|adapter| adapter.id().clone()),
        };
        Ok(AdapterRegistry {
            inner: Arc::new(RegistryInner {
                adapters: self.adapters.into_iter().map(Arc::new).collect(),
                default_id,
                pipeline: self.pipeline,
            }),
        })
    }
}

/// Inputs for [`AdapterRegistry::standard`].
pub struct StandardAdapters {
    pub mock: MockConfig,
    pub deepseek: DeepSeekConfig,
    pub local: LocalModelConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub redirect: Arc<dyn LoginRedirect>,
    pub pipeline: PipelineConfig,
}

impl StandardAdapters {
    pub fn new(
        deepseek: DeepSeekConfig,
        local: LocalModelConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            mock: MockConfig::default(),
            deepseek,
            local,
            credentials,
            redirect: Arc::new(LogRedirect),
            pipeline: PipelineConfig::default(),
        }
    }

    pub fn mock(mut self, mock: MockConfig) -> Self {
        self.mock = mock;
        self
    }

    pub fn redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::credentials::MemoryCredentialStore;
    use crate::adapters::transport::testing::{FakeReply, FakeTransport};
    use crate::errors::TransportError;

    fn mock_adapter(id: &str) -> ModelAdapter {
        ModelAdapter::new(id, id, ModelBackend::Mock(MockBackend::default()))
    }

    fn fake() -> Arc<dyn HttpTransport> {
        Arc::new(FakeTransport::new(FakeReply::Fail(TransportError::request(
            "unused",
        ))))
    }

    #[test]
    fn build_rejects_duplicate_adapter_ids() {
        let result = AdapterRegistry::builder()
            .register(mock_adapter("a"))
            .register(mock_adapter("a"))
            .build();
        assert!(
            matches!(result, Err(ChatStreamError::Config(message)) if message.contains("duplicate adapter"))
        );
    }

    #[test]
    fn build_rejects_unknown_default() {
        let result = AdapterRegistry::builder()
            .register(mock_adapter("a"))
            .default_adapter("b")
            .build();
        assert!(matches!(result, Err(ChatStreamError::Config(message)) if message.contains("default adapter")));
    }

    #[test]
    fn default_falls_back_to_first_registered() {
        let registry = AdapterRegistry::builder()
            .register(mock_adapter("a"))
            .register(mock_adapter("b"))
            .build()
            .expect("registry");
        assert_eq!(registry.default_id().map(AdapterId::as_str), Some("a"));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("b").is_some());
        assert!(registry.get("c").is_none());

        let empty = AdapterRegistry::builder().build().expect("registry");
        assert!(empty.is_empty());
        assert_eq!(empty.default_id(), None);
    }

    #[test]
    fn standard_registry_order_and_default() {
        let config = StandardAdapters::new(
            DeepSeekConfig::new("sk"),
            LocalModelConfig::default(),
            Arc::new(MemoryCredentialStore::default()),
        );
        let registry =
            AdapterRegistry::standard_with_transports(config, fake(), fake()).expect("registry");
        let ids: Vec<String> = registry.ids().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["standard", "deepseek-v3", "local-model"]);
        assert_eq!(
            registry.default_id().map(AdapterId::as_str),
            Some(LOCAL_ADAPTER_ID)
        );
        let names: Vec<&str> = registry.iter().map(ModelAdapter::display_name).collect();
        assert_eq!(names, vec!["模型测试", "🐋 DeepSeek-V3", "🤖 本地模型"]);
    }
}
