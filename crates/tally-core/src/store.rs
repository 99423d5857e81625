//! Conversation store
//!
//! Holds loaded conversations, the current-conversation pointer and the
//! sent-state tracker. Every mutation is applied to a copy, persisted, and
//! only then swapped in, so a failed write leaves memory unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compaction::CompactedHistory;
use crate::conversation::{ChatMessage, Conversation, ConversationId, ConversationSummary, Role};
use crate::error::{Error, Result};
use crate::repository::ConversationRepository;
use crate::sent::{Category, Delta, Selection, SentStateTracker};
use crate::tier::Tier;
use crate::tokens::estimate_messages;

/// Context that reached the remote thread as part of an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredContext {
    pub items: Delta,
    pub level: Tier,
    pub tokens: u64,
}

pub struct ConversationStore {
    repo: Arc<dyn ConversationRepository>,
    conversations: BTreeMap<ConversationId, Conversation>,
    current: Option<ConversationId>,
    tracker: SentStateTracker,
    token_limit: u64,
}

impl ConversationStore {
    /// An empty store with no current conversation
    pub fn new(repo: Arc<dyn ConversationRepository>, token_limit: u64) -> Self {
        Self {
            repo,
            conversations: BTreeMap::new(),
            current: None,
            tracker: SentStateTracker::default(),
            token_limit,
        }
    }

    /// Load every persisted conversation; the most recently updated becomes current
    pub fn open(repo: Arc<dyn ConversationRepository>, token_limit: u64) -> Result<Self> {
        let mut store = Self::new(repo, token_limit);
        for conv in store.repo.load_all()? {
            store.conversations.insert(conv.id.clone(), conv);
        }
        store.current = store.most_recent();
        store.sync_tracker();
        tracing::info!(
            "Opened conversation store: {} conversation(s)",
            store.conversations.len()
        );
        Ok(store)
    }

    pub fn token_limit(&self) -> u64 {
        self.token_limit
    }

    pub fn current_id(&self) -> Option<&ConversationId> {
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref().and_then(|id| self.conversations.get(id))
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn tracker(&self) -> &SentStateTracker {
        &self.tracker
    }

    /// Session-level selection. Not persisted.
    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.tracker.selection
    }

    /// Summaries of all loaded conversations, most recently updated first
    pub fn list(&self) -> Vec<ConversationSummary> {
        let mut out: Vec<ConversationSummary> =
            self.conversations.values().map(Conversation::summary).collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Start a fresh conversation and make it current
    pub fn create_new(&mut self) -> Result<&Conversation> {
        let conv = Conversation::new(self.token_limit);
        self.repo.save(&conv)?;
        let id = conv.id.clone();
        tracing::info!("Created conversation {}", id);
        self.conversations.insert(id.clone(), conv);
        self.current = Some(id.clone());
        self.sync_tracker();
        self.conversations
            .get(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// The current conversation id, creating a conversation if there is none
    pub fn ensure_current(&mut self) -> Result<ConversationId> {
        if let Some(id) = &self.current {
            return Ok(id.clone());
        }
        Ok(self.create_new()?.id.clone())
    }

    fn require_current(&self) -> Result<ConversationId> {
        self.current.clone().ok_or(Error::NoCurrentConversation)
    }

    pub fn switch_to(&mut self, id: &ConversationId) -> Result<()> {
        if !self.conversations.contains_key(id) {
            let conv = self
                .repo
                .load(id)?
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            self.conversations.insert(id.clone(), conv);
        }
        self.current = Some(id.clone());
        self.sync_tracker();
        tracing::info!("Switched to conversation {}", id);
        Ok(())
    }

    /// Remove a conversation. If it was current, the most recently updated
    /// remaining conversation becomes current.
    pub fn delete(&mut self, id: &ConversationId) -> Result<()> {
        if !self.conversations.contains_key(id) && self.repo.load(id)?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.repo.delete(id)?;
        self.conversations.remove(id);
        tracing::info!("Deleted conversation {}", id);

        if self.current.as_ref() == Some(id) {
            self.current = self.most_recent();
            self.sync_tracker();
            if let Some(next) = &self.current {
                tracing::info!("Promoted conversation {} to current", next);
            }
        }
        Ok(())
    }

    /// Append to the current conversation
    pub fn append_message(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        let id = self.require_current()?;
        self.append_message_to(&id, ChatMessage::new(role, content))
    }

    pub fn append_message_to(&mut self, id: &ConversationId, message: ChatMessage) -> Result<()> {
        if message.role == Role::User && message.content.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        self.mutate(id, |conv| {
            conv.push_message(message);
            Ok(())
        })
    }

    /// Add to the current conversation's running estimate
    pub fn add_tokens(&mut self, delta: u64) -> Result<()> {
        let id = self.require_current()?;
        self.add_tokens_to(&id, delta)
    }

    pub fn add_tokens_to(&mut self, id: &ConversationId, delta: u64) -> Result<()> {
        self.mutate(id, |conv| {
            conv.token_estimate = conv.token_estimate.saturating_add(delta);
            Ok(())
        })
    }

    /// Bind a remote thread. A conversation keeps its first thread; only
    /// compaction moves it to another.
    pub fn bind_thread(&mut self, id: &ConversationId, thread_id: &str) -> Result<()> {
        self.mutate(id, |conv| match &conv.thread_id {
            Some(existing) if existing == thread_id => Ok(()),
            Some(existing) => Err(Error::CorruptState(format!(
                "conversation {} is bound to thread {}, refusing rebind to {}",
                conv.id, existing, thread_id
            ))),
            None => {
                conv.thread_id = Some(thread_id.to_string());
                Ok(())
            }
        })
    }

    /// Record a successful delivery: mark items sent, clear their pending refreshes
    pub fn record_delivery(
        &mut self,
        id: &ConversationId,
        delivered: &Delta,
        level: Tier,
    ) -> Result<()> {
        self.mutate(id, |conv| {
            conv.sent.commit(delivered);
            conv.context_sent = true;
            conv.context_level = Some(level);
            Ok(())
        })
    }

    /// Record a completed exchange in one write: the delivered context (if
    /// any) with its token cost, then the messages in order
    pub fn record_exchange(
        &mut self,
        id: &ConversationId,
        context: Option<DeliveredContext>,
        messages: Vec<ChatMessage>,
    ) -> Result<()> {
        self.mutate(id, |conv| {
            if let Some(context) = context {
                conv.sent.commit(&context.items);
                conv.context_sent = true;
                conv.context_level = Some(context.level);
                conv.token_estimate = conv.token_estimate.saturating_add(context.tokens);
            }
            for message in messages {
                conv.push_message(message);
            }
            Ok(())
        })
    }

    /// Queue an item for re-delivery on the current conversation
    pub fn queue_refresh(&mut self, category: Category, item: &str) -> Result<()> {
        let id = self.require_current()?;
        self.tracker.validate_refresh(category, item)?;
        self.mutate(&id, |conv| {
            conv.sent.queue(category, item);
            Ok(())
        })
    }

    /// Swap in compacted history, rebind the thread and recompute the estimate
    pub fn apply_compaction(&mut self, id: &ConversationId, compacted: CompactedHistory) -> Result<()> {
        self.mutate(id, |conv| {
            conv.messages = compacted.messages;
            conv.thread_id = Some(compacted.thread_id);
            conv.token_estimate = estimate_messages(&conv.messages);
            conv.compaction_count += 1;
            conv.last_compaction_at = Some(chrono::Utc::now().timestamp_millis());
            Ok(())
        })
    }

    /// Apply `f` to a copy, persist it, then swap it in
    fn mutate<T>(
        &mut self,
        id: &ConversationId,
        f: impl FnOnce(&mut Conversation) -> Result<T>,
    ) -> Result<T> {
        let existing = self
            .conversations
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut next = existing.clone();
        let out = f(&mut next)?;
        next.touch();
        self.repo.save(&next)?;
        self.conversations.insert(id.clone(), next);
        if self.current.as_ref() == Some(id) {
            self.sync_tracker();
        }
        Ok(out)
    }

    fn most_recent(&self) -> Option<ConversationId> {
        self.conversations
            .values()
            .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
            .map(|c| c.id.clone())
    }

    fn sync_tracker(&mut self) {
        let active = self
            .current
            .as_ref()
            .and_then(|id| self.conversations.get(id))
            .map(|c| (c.sent.clone(), c.token_estimate));
        match active {
            Some((state, estimate)) => self.tracker.restore(state, estimate),
            None => self.tracker.clear(),
        }
    }
}
