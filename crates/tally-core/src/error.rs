//! Error types for tally-core

use thiserror::Error;

use crate::compaction::CompactionPhase;
use crate::sent::Category;

/// Result type alias using tally-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing conversations and context
#[derive(Error, Debug)]
pub enum Error {
    /// Message text was empty or whitespace only
    #[error("Message is empty")]
    EmptyMessage,

    /// No conversation with this id is loaded or persisted
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// A refresh was queued for something never selected or sent
    #[error("Cannot refresh {category} '{id}': it was never selected or sent")]
    InvalidRefresh { category: Category, id: String },

    /// An operation needs a current conversation and there is none
    #[error("No current conversation")]
    NoCurrentConversation,

    /// Another send is still outstanding for this conversation
    #[error("A send is already in flight for conversation {0}")]
    SendInFlight(String),

    /// An error from the assistant client
    #[error(transparent)]
    Remote(#[from] tally_ai::Error),

    /// A compaction step failed; the conversation was left untouched
    #[error("Compaction failed during {phase}: {message}")]
    Compaction {
        phase: CompactionPhase,
        message: String,
    },

    /// Compaction was refused because the history is too short
    #[error("Too few messages to compact: have {have}, need at least {need}")]
    TooFewMessages { have: usize, need: usize },

    /// Loaded state is inconsistent
    #[error("Corrupt conversation state: {0}")]
    CorruptState(String),

    /// The conversation repository failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Filesystem error from a collaborator
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a compaction error for the given phase
    pub fn compaction(phase: CompactionPhase, message: impl Into<String>) -> Self {
        Self::Compaction {
            phase,
            message: message.into(),
        }
    }

    /// Whether this error reports bad input from the caller rather than a failure
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyMessage
                | Error::NotFound(_)
                | Error::InvalidRefresh { .. }
                | Error::NoCurrentConversation
        )
    }

    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Remote(e) => e.is_retryable(),
            Error::SendInFlight(_) => true,
            _ => false,
        }
    }
}
