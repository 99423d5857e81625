//! The persisted conversation record

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sent::SentState;
use crate::tier::Tier;
use crate::tokens::{TokenBudget, estimate_tokens};

/// Default remote token ceiling
pub const DEFAULT_TOKEN_LIMIT: u64 = 128_000;

/// Titles longer than this are cut and marked with `...`
pub const TITLE_MAX_CHARS: usize = 50;

const DEFAULT_TITLE: &str = "New conversation";

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Locally generated conversation id: `conv_<unix millis>_<8 hex>`.
///
/// The millis are zero-padded so ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn generate() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("conv_{:013}_{}", now_millis(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        })
    }
}

/// One entry in a conversation's history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Unix millis
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

impl ChatMessage {
    /// A message stamped now, with its token estimate
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            role,
            token_count: Some(estimate_tokens(&content)),
            content,
            timestamp: now_millis(),
        }
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Derive a title from the first user message
pub fn derive_title(text: &str) -> String {
    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(line) = first_line else {
        return DEFAULT_TITLE.to_string();
    };
    if line.chars().count() <= TITLE_MAX_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// A conversation with the remote assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context_sent: bool,
    #[serde(default)]
    pub context_level: Option<Tier>,
    #[serde(flatten)]
    pub sent: SentState,
    #[serde(default)]
    pub token_estimate: u64,
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,
    #[serde(default)]
    pub compaction_count: u32,
    #[serde(default)]
    pub last_compaction_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_token_limit() -> u64 {
    DEFAULT_TOKEN_LIMIT
}

impl Conversation {
    pub fn new(token_limit: u64) -> Self {
        let now = now_millis();
        Self {
            id: ConversationId::generate(),
            thread_id: None,
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            context_sent: false,
            context_level: None,
            sent: SentState::default(),
            token_estimate: 0,
            token_limit,
            compaction_count: 0,
            last_compaction_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Refresh `updated_at`, never moving it backwards
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }

    /// Append a message, counting its tokens. The first user message names
    /// the conversation.
    pub fn push_message(&mut self, message: ChatMessage) {
        let tokens = message
            .token_count
            .unwrap_or_else(|| estimate_tokens(&message.content));
        if message.role == Role::User && !self.messages.iter().any(|m| m.role == Role::User) {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.token_estimate = self.token_estimate.saturating_add(tokens);
        self.touch();
    }

    pub fn budget(&self, warn_at: f64, compact_at: f64) -> TokenBudget {
        TokenBudget {
            estimate: self.token_estimate,
            limit: self.token_limit,
            warn_at,
            compact_at,
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            message_count: self.messages.len(),
            token_estimate: self.token_estimate,
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub message_count: usize,
    pub token_estimate: u64,
    pub updated_at: i64,
}
