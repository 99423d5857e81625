//! HTTP client for thread-based assistant APIs
//!
//! Speaks a minimal REST dialect:
//!
//! - `POST {base}/threads` → `{"id": "..."}`
//! - `POST {base}/threads/{id}/messages` with `{"content": "..."}` →
//!   `{"content": "...", "timestamp": ...}`
//!
//! Transient statuses (429/503/504) and timeouts are retried according to the
//! configured [`RetryConfig`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AssistantClient;
use crate::{
    error::{Error, Result},
    retry::RetryConfig,
    types::{Endpoint, Reply},
};

/// Timeout applied to thread creation
const CREATE_THREAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    #[serde(alias = "thread_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(alias = "text", alias = "response")]
    content: String,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Assistant client over HTTP
pub struct HttpAssistantClient {
    client: reqwest::Client,
    endpoint: Endpoint,
    retry_config: RetryConfig,
}

impl HttpAssistantClient {
    /// Create a client for the given endpoint
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        if endpoint.base_url.is_empty() {
            return Err(Error::InvalidConfig("base_url is empty".to_string()));
        }
        if endpoint.api_key.is_empty() {
            return Err(Error::InvalidApiKey);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.endpoint.api_key)
            .header("accept", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(timeout)
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::status(status.as_u16(), error_message(&text)));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn create_thread(&self) -> Result<String> {
        let url = self.endpoint.threads_url();
        let body = serde_json::json!({});
        let (url, body) = (url.as_str(), &body);
        let value = self
            .retry_config
            .run("create thread", move || {
                self.post_json(url, body, CREATE_THREAD_TIMEOUT)
            })
            .await?;
        parse_thread_id(value)
    }

    async fn send_message(&self, thread_id: &str, text: &str, timeout: Duration) -> Result<Reply> {
        let url = self.endpoint.messages_url(thread_id);
        let body = serde_json::to_value(MessageRequest { content: text })?;
        let (url, body) = (url.as_str(), &body);
        let value = self
            .retry_config
            .run("send message", move || self.post_json(url, body, timeout))
            .await?;
        parse_reply(value)
    }
}

fn parse_thread_id(value: serde_json::Value) -> Result<String> {
    let parsed: ThreadResponse = serde_json::from_value(value)
        .map_err(|e| Error::UnexpectedResponse(format!("thread response: {}", e)))?;
    if parsed.id.is_empty() {
        return Err(Error::UnexpectedResponse("empty thread id".to_string()));
    }
    Ok(parsed.id)
}

fn parse_reply(value: serde_json::Value) -> Result<Reply> {
    let parsed: MessageResponse = serde_json::from_value(value)
        .map_err(|e| Error::UnexpectedResponse(format!("message response: {}", e)))?;
    Ok(Reply {
        content: parsed.content,
        timestamp: parsed
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    })
}

/// Pull a readable message out of an error body, falling back to the raw text
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(m), ..
        }) => m,
        Ok(ErrorBody {
            error: Some(serde_json::Value::String(s)),
            ..
        }) => s,
        Ok(ErrorBody {
            error: Some(serde_json::Value::Object(map)),
            ..
        }) => map
            .get("message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_thread_id() {
        assert_eq!(parse_thread_id(json!({"id": "th_1"})).unwrap(), "th_1");
        assert_eq!(
            parse_thread_id(json!({"thread_id": "th_2"})).unwrap(),
            "th_2"
        );
    }

    #[test]
    fn test_parse_thread_id_rejects_empty() {
        assert!(matches!(
            parse_thread_id(json!({"id": ""})),
            Err(Error::UnexpectedResponse(_))
        ));
        assert!(parse_thread_id(json!({"other": 1})).is_err());
    }

    #[test]
    fn test_parse_reply_with_timestamp() {
        let reply = parse_reply(json!({"content": "hello", "timestamp": 42})).unwrap();
        assert_eq!(reply.content, "hello");
        assert_eq!(reply.timestamp, 42);
    }

    #[test]
    fn test_parse_reply_defaults_timestamp() {
        let reply = parse_reply(json!({"text": "hi"})).unwrap();
        assert_eq!(reply.content, "hi");
        assert!(reply.timestamp > 0);
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(error_message(r#"{"message":"bad key"}"#), "bad key");
        assert_eq!(error_message(r#"{"error":"overloaded"}"#), "overloaded");
        assert_eq!(
            error_message(r#"{"error":{"message":"too many requests"}}"#),
            "too many requests"
        );
        assert_eq!(error_message("  plain text  "), "plain text");
    }

    #[test]
    fn test_new_rejects_missing_key() {
        let result = HttpAssistantClient::new(Endpoint::new("https://x", ""));
        assert!(matches!(result, Err(Error::InvalidApiKey)));
    }

    #[test]
    fn test_new_rejects_missing_base_url() {
        let result = HttpAssistantClient::new(Endpoint::new("", "key"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
