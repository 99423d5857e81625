//! tally-core: Context window and token budget management
//!
//! This crate decides what project material to send to a remote assistant,
//! at what level of detail, what has already been sent, and when to compact
//! a conversation's history to stay under the assistant's token ceiling.

pub mod collab;
pub mod compaction;
pub mod context;
pub mod conversation;
pub mod error;
pub mod events;
pub mod inflight;
pub mod outline;
pub mod repository;
pub mod sent;
pub mod session;
pub mod store;
pub mod tier;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use collab::{DataCatalog, DataDetail, DataSourceInfo, SkillCatalog, Workspace};
pub use compaction::{
    CompactedHistory, CompactionConfig, CompactionEngine, CompactionPhase, CompactionReport,
    CompactionState,
};
pub use context::{ContextAssembler, ContextDocument, ContextSelection, ContextSource};
pub use conversation::{ChatMessage, Conversation, ConversationId, ConversationSummary, Role};
pub use error::{Error, Result};
pub use events::{CompactionEvent, SessionEvent};
pub use inflight::{InFlight, InFlightGuard};
pub use repository::{ConversationRepository, MemoryRepository};
pub use sent::{Ambient, Category, Delta, ItemStatus, Selection, SentState, SentStateTracker};
pub use session::{ApplyOutcome, ChatSession, Exchange, SessionConfig};
pub use store::{ConversationStore, DeliveredContext};
pub use tier::{FileStat, Tier, TierDecision, TierThresholds, select_tier};
pub use tokens::{BudgetStatus, EstimateMode, TokenBudget, estimate, estimate_tokens};
