//! tally-ai: Thread-based assistant client abstraction
//!
//! This crate provides the [`AssistantClient`] trait the conversation core talks
//! to, plus an HTTP implementation with retry on transient failures.

pub mod error;
pub mod providers;
pub mod retry;
pub mod types;

pub use error::{Error, Result};
pub use providers::{AssistantClient, http::HttpAssistantClient};
pub use retry::RetryConfig;
pub use types::*;
