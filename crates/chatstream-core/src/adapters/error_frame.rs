use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::json;

use super::transport::AdapterResponse;
use crate::stream::ByteStream;

/// Language of user-facing failure notices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLocale {
    #[default]
    Zh,
    En,
}

impl std::str::FromStr for MessageLocale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Ok(Self::Zh),
            "en" | "en-us" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Failures an adapter reports to the user through the stream itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureNotice {
    /// No credential is available.
    LoginRequired,
    /// The backend rejected the credential (401/403).
    SessionExpired,
    /// The backend answered with another non-success status.
    RequestFailed { status: u16, body: String },
    /// The request never got a response. An empty detail reads as unknown.
    ConnectionFailed(String),
}

impl FailureNotice {
    pub fn message(&self, locale: MessageLocale) -> String {
        match (self, locale) {
            (Self::LoginRequired, MessageLocale::Zh) => {
                "您需要登录才能使用AI助手功能。<br>正在为您跳转到登录页面...".to_string()
            }
            (Self::LoginRequired, MessageLocale::En) => {
                "You need to sign in to use the AI assistant.<br>Redirecting to the login page..."
                    .to_string()
            }
            (Self::SessionExpired, MessageLocale::Zh) => {
                "您的登录已过期，需要重新登录。<br>正在为您跳转到登录页面...".to_string()
            }
            (Self::SessionExpired, MessageLocale::En) => {
                "Your session has expired, please sign in again.<br>Redirecting to the login page..."
                    .to_string()
            }
            (Self::RequestFailed { status, body }, MessageLocale::Zh) => {
                format!("连接异常: 请求失败 {status}: {body}")
            }
            (Self::RequestFailed { status, body }, MessageLocale::En) => {
                format!("Connection error: request failed {status}: {body}")
            }
            (Self::ConnectionFailed(detail), MessageLocale::Zh) if detail.trim().is_empty() => {
                "连接异常: 未知错误".to_string()
            }
            (Self::ConnectionFailed(detail), MessageLocale::Zh) => format!("连接异常: {detail}"),
            (Self::ConnectionFailed(detail), MessageLocale::En) if detail.trim().is_empty() => {
                "Connection error: unknown error".to_string()
            }
            (Self::ConnectionFailed(detail), MessageLocale::En) => {
                format!("Connection error: {detail}")
            }
        }
    }
}

/// Renders one SSE frame carrying a styled warning as a content envelope.
pub fn error_frame(message: &str) -> String {
    let html = format!(
        "<div style='text-align:center;padding:20px;'><span style='color:#f5222d;font-weight:bold;font-size:16px'>⚠️ {message}</span></div>"
    );
    let envelope = json!({"type": "content", "data": html});
    format!("data: {envelope}\n\n")
}

/// A well-formed event-stream response whose body is a single error frame.
pub fn error_response(notice: &FailureNotice, locale: MessageLocale) -> AdapterResponse {
    let frame = error_frame(&notice.message(locale));
    let headers = BTreeMap::from([(
        "content-type".to_string(),
        "text/event-stream".to_string(),
    )]);
    let body: ByteStream = Box::pin(futures::stream::once(async move {
        Ok(Bytes::from(frame))
    }));
    AdapterResponse::new(200, headers, body)
}

#[cfg(test)]
mod tests {
    use futures::StreamExt as _;

    use super::*;

    #[test]
    fn frame_is_a_content_envelope() {
        let frame = error_frame("boom");
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        let value: serde_json::Value =
            serde_json::from_str(frame.trim().trim_start_matches("data: ")).expect("json");
        assert_eq!(value["type"], "content");
        assert_eq!(
            value["data"],
            "<div style='text-align:center;padding:20px;'><span style='color:#f5222d;font-weight:bold;font-size:16px'>⚠️ boom</span></div>"
        );
    }

    #[test]
    fn quotes_in_messages_stay_valid_json() {
        let frame = error_frame(r#"bad "gateway" \ path"#);
        let value: serde_json::Value =
            serde_json::from_str(frame.trim().trim_start_matches("data: ")).expect("json");
        assert!(value["data"].as_str().expect("str").contains(r#"bad "gateway" \ path"#));
    }

    #[test]
    fn localized_messages() {
        assert_eq!(
            FailureNotice::ConnectionFailed(String::new()).message(MessageLocale::Zh),
            "连接异常: 未知错误"
        );
        assert_eq!(
            FailureNotice::RequestFailed {
                status: 502,
                body: "bad gateway".into()
            }
            .message(MessageLocale::En),
            "Connection error: request failed 502: bad gateway"
        );
        assert!(
            FailureNotice::SessionExpired
                .message(MessageLocale::Zh)
                .contains("登录已过期")
        );
        assert_eq!("EN".parse::<MessageLocale>(), Ok(MessageLocale::En));
        assert!("fr".parse::<MessageLocale>().is_err());
    }

    #[tokio::test]
    async fn response_is_ok_event_stream_with_one_frame() {
        let response = error_response(&FailureNotice::LoginRequired, MessageLocale::En);
        assert!(response.ok);
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("text/event-stream"));
        let chunks: Vec<_> = response.body.collect().await;
        assert_eq!(chunks.len(), 1);
        let text = String::from_utf8(chunks[0].clone().expect("chunk").to_vec()).expect("utf8");
        assert!(text.contains("You need to sign in"));
    }
}
