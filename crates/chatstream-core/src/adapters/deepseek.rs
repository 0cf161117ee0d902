use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::error_frame::{FailureNotice, MessageLocale, error_response};
use super::transport::{AdapterResponse, HttpRequest, HttpTransport, RequestBody, read_body_snippet};
use crate::errors::ChatStreamError;

const FAILURE_BODY_CHARS: usize = 200;

/// Configuration for the DeepSeek chat-completions backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeepSeekConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint (or a proxy in front of it).
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub locale: MessageLocale,
}

impl DeepSeekConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(120),
            locale: MessageLocale::default(),
        }
    }

    /// Builds a config from `DEEPSEEK_API_KEY` and optional `DEEPSEEK_BASE_URL`.
    pub fn from_env() -> Result<Self, ChatStreamError> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ChatStreamError::Config(
                "missing DEEPSEEK_API_KEY for deepseek-v3 adapter".into(),
            ));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("DEEPSEEK_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url);
        }
        Ok(config)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn locale(mut self, locale: MessageLocale) -> Self {
        self.locale = locale;
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Streams chat completions with reasoning deltas from DeepSeek.
#[derive(Clone)]
pub struct DeepSeekBackend {
    config: DeepSeekConfig,
    transport: Arc<dyn HttpTransport>,
}

impl DeepSeekBackend {
    pub fn new(config: DeepSeekConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &DeepSeekConfig {
        &self.config
    }

    pub async fn request(&self, text: &str) -> AdapterResponse {
        let body = json!({
            "model": self.config.model,
            "stream": true,
            "messages": [{"role": "user", "content": text}],
        });
        let request = HttpRequest::post(self.config.chat_completions_url(), RequestBody::Json(body))
            .header("Content-Type", "application/json")
            .bearer(&self.config.api_key);
        debug!(model = %self.config.model, "starting deepseek chat stream");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "deepseek request failed");
                return error_response(
                    &FailureNotice::ConnectionFailed(err.to_string()),
                    self.config.locale,
                );
            }
        };
        if response.ok {
            return response;
        }
        let status = response.status;
        let body = read_body_snippet(response.body, FAILURE_BODY_CHARS).await;
        warn!(status, "deepseek request rejected");
        error_response(&FailureNotice::RequestFailed { status, body }, self.config.locale)
    }
}
