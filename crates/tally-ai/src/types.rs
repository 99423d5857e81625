//! Core types for assistant interactions

use serde::{Deserialize, Serialize};

/// A reply from the assistant to a single message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Assistant text
    pub content: String,
    /// When the reply was produced (unix millis)
    pub timestamp: i64,
}

impl Reply {
    /// Create a reply stamped with the current time
    pub fn now(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Connection settings for a thread-based assistant API
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Base URL, without trailing slash (e.g., "https://assistant.example.com/v1")
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// URL for creating threads
    pub fn threads_url(&self) -> String {
        format!("{}/threads", self.base_url)
    }

    /// URL for posting messages to a thread
    pub fn messages_url(&self, thread_id: &str) -> String {
        format!("{}/threads/{}/messages", self.base_url, thread_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let ep = Endpoint::new("https://api.example.com/v1/", "k");
        assert_eq!(ep.threads_url(), "https://api.example.com/v1/threads");
        assert_eq!(
            ep.messages_url("th_1"),
            "https://api.example.com/v1/threads/th_1/messages"
        );
    }

    #[test]
    fn test_reply_now_has_timestamp() {
        let reply = Reply::now("hi");
        assert_eq!(reply.content, "hi");
        assert!(reply.timestamp > 0);
    }
}
