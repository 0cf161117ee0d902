use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use futures::StreamExt as _;

use crate::errors::{ChatStreamError, TransportError};
use crate::stream::ByteStream;

/// Outgoing request body.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// A streaming POST request as issued by an adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// First value of a header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A streaming response: status, headers (lower-cased names) and body bytes.
///
/// Adapters always hand one of these to the pipeline; failures are
/// synthesized into the body instead of surfacing as errors.
pub struct AdapterResponse {
    pub ok: bool,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: ByteStream,
}

impl AdapterResponse {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: ByteStream) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            headers,
            body,
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

impl fmt::Debug for AdapterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterResponse")
            .field("ok", &self.ok)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP seam used by the network-backed adapters.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and returns as soon as response headers arrive.
    /// Non-success statuses are returned as responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<AdapterResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client with the given overall request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ChatStreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatStreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<AdapterResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Text(text) => builder.body(text),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
            })
            .collect();
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| TransportError::read(e.to_string()))),
        );
        Ok(AdapterResponse::new(status, headers, body))
    }
}

/// Reads a (failed) response body as text, keeping at most `max_chars`
/// characters. Read errors end the read early.
pub(crate) async fn read_body_snippet(mut body: ByteStream, max_chars: usize) -> String {
    let mut raw = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => raw.extend_from_slice(&bytes),
            Err(_) => break,
        }
        // Four bytes per char at most.
        if raw.len() >= max_chars.saturating_mul(4) {
            break;
        }
    }
    String::from_utf8_lossy(&raw).chars().take(max_chars).collect()
}
