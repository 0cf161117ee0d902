use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use super::transport::AdapterResponse;
use crate::stream::ByteStream;

/// Built-in transcript: a reasoning-model answer in OpenAI-compatible SSE.
pub const DEFAULT_MOCK_TRANSCRIPT: &str = concat!(
    ": keep-alive\n",
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":null,\"reasoning_content\":\"The user wants a greeting.\"}}]}\n",
    "data: {\"choices\":[{\"delta\":{\"content\":null,\"reasoning_content\":\" Keep it short.\"}}]}\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\",\"reasoning_content\":null}}]}\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"! How can I help you today?\",\"reasoning_content\":null}}]}\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":12}}\n",
    "data: [DONE]\n",
);

/// Scripted-replay settings for the `standard` adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockConfig {
    /// SSE text replayed line by line, one chunk per line.
    pub transcript: String,
    /// Wait before the response is returned.
    pub delay: Duration,
    /// Wait between chunks.
    pub chunk_interval: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            transcript: DEFAULT_MOCK_TRANSCRIPT.to_string(),
            delay: Duration::from_millis(500),
            chunk_interval: Duration::ZERO,
        }
    }
}

impl MockConfig {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            ..Self::default()
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn chunk_interval(mut self, interval: Duration) -> Self {
        self.chunk_interval = interval;
        self
    }
}

/// Replays a transcript without any network access.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    config: MockConfig,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub async fn request(&self, text: &str) -> AdapterResponse {
        debug!(prompt_len = text.len(), "replaying mock transcript");
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }
        let lines: Vec<Bytes> = self
            .config
            .transcript
            .split('\n')
            .map(|line| Bytes::from(format!("{line}\n")))
            .collect();
        let interval = self.config.chunk_interval;
        let body: ByteStream = Box::pin(futures::stream::iter(lines).then(move |chunk| async move {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            Ok(chunk)
        }));
        let headers = BTreeMap::from([(
            "content-type".to_string(),
            "text/event-stream".to_string(),
        )]);
        AdapterResponse::new(200, headers, body)
    }
}
