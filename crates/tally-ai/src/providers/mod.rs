//! Assistant client implementations

pub mod http;

use std::time::Duration;

use async_trait::async_trait;

use crate::{Reply, Result};

/// A thread-based remote assistant.
///
/// A thread holds the server-side conversation; every message sent to it is
/// appended there and answered with a single reply.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Open a new, empty thread and return its identifier
    async fn create_thread(&self) -> Result<String>;

    /// Send `text` on `thread_id` and wait for the assistant's reply
    async fn send_message(&self, thread_id: &str, text: &str, timeout: Duration) -> Result<Reply>;
}

/// Get an API key from the provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| crate::Error::InvalidApiKey)
}
