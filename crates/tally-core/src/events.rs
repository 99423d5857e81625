//! Session event types

use serde::{Deserialize, Serialize};

use crate::compaction::{CompactionPhase, CompactionState};
use crate::conversation::ConversationId;

/// Events emitted while exchanging messages with the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A send is about to go out
    SendStart {
        conversation_id: ConversationId,
        context_sections: Vec<String>,
        estimated_tokens: u64,
    },

    /// The assistant replied and state was committed
    SendEnd {
        conversation_id: ConversationId,
        token_estimate: u64,
    },

    /// The send failed; nothing was committed
    SendFailed {
        conversation_id: ConversationId,
        error: String,
    },

    /// A new remote thread was bound to a conversation
    ThreadBound {
        conversation_id: ConversationId,
        thread_id: String,
    },

    /// Usage crossed the warning threshold
    BudgetWarning {
        conversation_id: ConversationId,
        estimate: u64,
        limit: u64,
    },

    /// Compaction progress
    Compaction(CompactionEvent),
}

/// Compaction progress and outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompactionEvent {
    Start {
        conversation_id: ConversationId,
        message_count: usize,
        token_estimate: u64,
    },

    /// The engine moved to a new state
    State { state: CompactionState },

    End {
        conversation_id: ConversationId,
        messages_before: usize,
        messages_after: usize,
        tokens_before: u64,
        tokens_after: u64,
    },

    Failed {
        conversation_id: ConversationId,
        phase: CompactionPhase,
        error: String,
    },
}
