use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use super::credentials::{CredentialStore, LoginRedirect, login_target, schedule_login_redirect};
use super::error_frame::{FailureNotice, MessageLocale, error_response};
use super::transport::{AdapterResponse, HttpRequest, HttpTransport, RequestBody, read_body_snippet};
use crate::errors::ChatStreamError;
use crate::pipeline::classify::{ClassifiedPayload, SseBody, Signal};

const FAILURE_BODY_CHARS: usize = 200;

/// Configuration for the authenticated local chat backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalModelConfig {
    pub base_url: String,
    /// Login page the user is sent to when authentication fails.
    pub login_path: String,
    /// Location the login page returns to.
    pub return_to: String,
    /// Delay before the login redirect, so the notice can be read first.
    pub redirect_delay: Duration,
    pub timeout: Duration,
    pub locale: MessageLocale,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

impl LocalModelConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login_path: "/login".to_string(),
            return_to: "/".to_string(),
            redirect_delay: Duration::from_millis(1500),
            timeout: Duration::from_secs(300),
            locale: MessageLocale::default(),
        }
    }

    /// Builds a config from `CHATSTREAM_LOCAL_BASE_URL`, falling back to the
    /// default address when unset.
    pub fn from_env() -> Result<Self, ChatStreamError> {
        match std::env::var("CHATSTREAM_LOCAL_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => {
                reqwest::Url::parse(base_url.trim()).map_err(|e| {
                    ChatStreamError::Config(format!("invalid CHATSTREAM_LOCAL_BASE_URL: {e}"))
                })?;
                Ok(Self::new(base_url.trim()))
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn return_to(mut self, location: impl Into<String>) -> Self {
        self.return_to = location.into();
        self
    }

    pub fn redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
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

    /// `{base}/api/chat`, with `sessionId` appended when non-blank.
    pub(crate) fn chat_url(&self, session_id: Option<&str>) -> Result<String, ChatStreamError> {
        let base = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let mut url = reqwest::Url::parse(&base)
            .map_err(|e| ChatStreamError::Config(format!("invalid local-model URL {base}: {e}")))?;
        if let Some(session_id) = session_id.map(str::trim).filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("sessionId", session_id);
        }
        Ok(url.into())
    }
}

/// Authenticated backend that streams pre-normalized JSON frames.
#[derive(Clone)]
pub struct LocalBackend {
    config: LocalModelConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    redirect: Arc<dyn LoginRedirect>,
}

impl LocalBackend {
    pub fn new(
        config: LocalModelConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            redirect,
        }
    }

    pub fn config(&self) -> &LocalModelConfig {
        &self.config
    }

    pub async fn request(&self, text: &str, session_id: Option<&str>) -> AdapterResponse {
        let locale = self.config.locale;
        let Some(token) = self.credentials.token().filter(|t| !t.trim().is_empty()) else {
            warn!("no credential for local-model; login required");
            self.redirect_to_login();
            return error_response(&FailureNotice::LoginRequired, locale);
        };

        let url = match self.config.chat_url(session_id) {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "local-model URL rejected");
                return error_response(&FailureNotice::ConnectionFailed(err.to_string()), locale);
            }
        };
        let request = HttpRequest::post(url, RequestBody::Text(text.to_string()))
            .header("Content-Type", "text/plain")
            .header("Accept", "text/event-stream")
            .bearer(&token);
        debug!(session_id = session_id.unwrap_or_default(), "starting local chat stream");

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "local-model request failed");
                return error_response(&FailureNotice::ConnectionFailed(err.to_string()), locale);
            }
        };
        match response.status {
            401 | 403 => {
                warn!(status = response.status, "local-model rejected credential");
                self.credentials.clear();
                self.redirect_to_login();
                error_response(&FailureNotice::SessionExpired, locale)
            }
            _ if response.ok => response,
            status => {
                let body = read_body_snippet(response.body, FAILURE_BODY_CHARS).await;
                warn!(status, "local-model request rejected");
                error_response(&FailureNotice::RequestFailed { status, body }, locale)
            }
        }
    }

    fn redirect_to_login(&self) {
        schedule_login_redirect(
            self.redirect.clone(),
            login_target(&self.config.login_path, &self.config.return_to),
            self.config.redirect_delay,
        );
    }
}

/// Local backend mapping applied on top of the shared classification: its
/// server sets `done` / `isWaitQueuing` to any truthy value, not only `true`.
///
/// Repair, noise filtering, keep-alive suppression and content extraction
/// (`{content}`, `{type:"content", data}`, error envelopes, serialized
/// fallback) stay with the shared classifier and normalizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LocalTransform;

impl LocalTransform {
    pub fn apply(&self, payload: ClassifiedPayload) -> ClassifiedPayload {
        let value = match &payload {
            ClassifiedPayload::Sse(SseBody::Json(value)) | ClassifiedPayload::Json(value) => value,
            _ => return payload,
        };
        if truthy(value.get("done")) {
            ClassifiedPayload::Ignored(Signal::Done)
        } else if truthy(value.get("isWaitQueuing")) {
            ClassifiedPayload::KeepAlive
        } else {
            payload
        }
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}
