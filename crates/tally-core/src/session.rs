//! Chat session: wires selection, assembly, sending and compaction together
//!
//! All methods take `&self`; state lives behind short-lived locks that are
//! never held across a remote call. The only suspension points are the
//! [`AssistantClient`] calls. Sent state, messages and the token estimate are
//! written only after the assistant has replied, so a failed or cancelled
//! send leaves the conversation as it was and a retry recomputes the same
//! delta.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tally_ai::AssistantClient;
use tokio::sync::broadcast;

use crate::collab::{DataCatalog, DataDetail, Empty, SkillCatalog, Workspace};
use crate::compaction::{CompactionConfig, CompactionEngine, CompactionReport, CompactionState};
use crate::context::{ContextAssembler, ContextDocument, ContextSelection, SECTION_SEPARATOR};
use crate::conversation::{ChatMessage, ConversationId, Role};
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::inflight::InFlight;
use crate::sent::Delta;
use crate::store::{ConversationStore, DeliveredContext};
use crate::tier::TierThresholds;
use crate::tokens::{BudgetStatus, TokenBudget};

/// Sent after an applied context document so the assistant only acknowledges it
const APPLY_NOTE: &str = "The sections above are project context for this conversation. \
Acknowledge briefly; no analysis is needed yet.";

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub compaction: CompactionConfig,
    pub tiers: TierThresholds,
    pub data_detail: DataDetail,
    /// Include recent commits with the git section
    pub git_history: bool,
    /// Timeout for each message send
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            compaction: CompactionConfig::default(),
            tiers: TierThresholds::default(),
            data_detail: DataDetail::Full,
            git_history: false,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Result of a successful round trip with the assistant
#[derive(Debug, Clone)]
pub struct Exchange {
    pub conversation_id: ConversationId,
    pub reply: String,
    /// Names of the context sections that went out with the message
    pub context_sections: Vec<String>,
    pub context_tokens: u64,
    /// Usage after the exchange (and after compaction, if it ran)
    pub budget: TokenBudget,
    /// Set when the exchange triggered automatic compaction
    pub compaction: Option<CompactionReport>,
}

/// Outcome of [`ChatSession::apply_context`]
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// Nothing new is selected and no ambient source is enabled
    NothingNew,
    Applied(Exchange),
}

pub struct ChatSession {
    client: Arc<dyn AssistantClient>,
    store: Mutex<ConversationStore>,
    workspace: Arc<dyn Workspace>,
    data: Arc<dyn DataCatalog>,
    skills: Arc<dyn SkillCatalog>,
    config: SessionConfig,
    compactor: CompactionEngine,
    in_flight: InFlight,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(
        client: Arc<dyn AssistantClient>,
        store: ConversationStore,
        workspace: Arc<dyn Workspace>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let compactor = CompactionEngine::new(Arc::clone(&client), config.compaction.clone())
            .with_events(events.clone());
        Self {
            client,
            store: Mutex::new(store),
            workspace,
            data: Arc::new(Empty),
            skills: Arc::new(Empty),
            config,
            compactor,
            in_flight: InFlight::new(),
            events,
        }
    }

    pub fn with_data_catalog(mut self, data: Arc<dyn DataCatalog>) -> Self {
        self.data = data;
        self
    }

    pub fn with_skill_catalog(mut self, skills: Arc<dyn SkillCatalog>) -> Self {
        self.skills = skills;
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Lock the conversation store. Do not hold the guard across an `.await`.
    pub fn store(&self) -> MutexGuard<'_, ConversationStore> {
        self.store.lock()
    }

    pub fn workspace(&self) -> &dyn Workspace {
        self.workspace.as_ref()
    }

    pub fn data_catalog(&self) -> &dyn DataCatalog {
        self.data.as_ref()
    }

    pub fn skill_catalog(&self) -> &dyn SkillCatalog {
        self.skills.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_sending(&self, id: &ConversationId) -> bool {
        self.in_flight.is_active(id)
    }

    pub fn compaction_state(&self) -> CompactionState {
        self.compactor.state()
    }

    /// Usage of the current conversation
    pub fn budget(&self) -> Option<TokenBudget> {
        let store = self.store.lock();
        let compaction = &self.config.compaction;
        store
            .current()
            .map(|c| c.budget(compaction.warn_at, compaction.compact_at))
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn assembler(&self) -> ContextAssembler<'_> {
        ContextAssembler::new(
            self.workspace.as_ref(),
            self.data.as_ref(),
            self.skills.as_ref(),
        )
        .with_thresholds(self.config.tiers)
    }

    fn context_selection(
        &self,
        store: &ConversationStore,
        ambient: bool,
        delta: &Delta,
    ) -> ContextSelection {
        let selection = &store.tracker().selection;
        ContextSelection {
            config: ambient && selection.config,
            session: ambient && selection.session,
            git: ambient && selection.git,
            git_history: self.config.git_history,
            data_sources: delta.data_sources.clone(),
            data_detail: self.config.data_detail,
            skills: delta.skills.clone(),
            files: delta.files.clone(),
        }
    }

    /// What the next [`apply_context`](Self::apply_context) would send
    pub fn preview_context(&self) -> Result<Option<ContextDocument>> {
        let selection = {
            let store = self.store.lock();
            let delta = store.tracker().compute_delta();
            let ambient = store.tracker().selection.has_ambient();
            self.context_selection(&store, ambient, &delta)
        };
        self.assembler().assemble(&selection)
    }

    /// Share the current selection with the assistant without a question.
    ///
    /// Sends ambient sources plus the delta of items not yet delivered. Reports
    /// [`ApplyOutcome::NothingNew`] instead of sending an empty document.
    pub async fn apply_context(&self) -> Result<ApplyOutcome> {
        let id = self.store.lock().ensure_current()?;
        let _guard = self.in_flight.begin(&id)?;

        let selection = {
            let store = self.store.lock();
            let delta = store.tracker().compute_delta();
            let ambient = store.tracker().selection.has_ambient();
            if delta.is_empty() && !ambient {
                return Ok(ApplyOutcome::NothingNew);
            }
            self.context_selection(&store, ambient, &delta)
        };

        let Some(document) = self.assembler().assemble(&selection)? else {
            return Ok(ApplyOutcome::NothingNew);
        };

        let payload = format!("{}{}{}", document.render(), SECTION_SEPARATOR, APPLY_NOTE);
        let sections = document.section_names();
        let reply = self
            .deliver(&id, &sections, &payload, document.estimated_tokens())
            .await?;

        let note = ChatMessage::new(
            Role::System,
            format!("Shared context: {}", sections.join(", ")),
        );
        let ack = ChatMessage::new(Role::Assistant, reply.content.clone()).at(reply.timestamp);
        self.store.lock().record_exchange(
            &id,
            Some(delivered(&document)),
            vec![note, ack],
        )?;
        tracing::info!("Applied {} context section(s) to {}", sections.len(), id);

        let exchange = self.finish(&id, reply.content, &document).await?;
        Ok(ApplyOutcome::Applied(exchange))
    }

    /// Send a user message, attaching pending context when `with_context` is set.
    ///
    /// Ambient sources go out only with the first context of a conversation;
    /// later sends attach just the delta.
    pub async fn send_message(&self, text: &str, with_context: bool) -> Result<Exchange> {
        if text.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        let id = self.store.lock().ensure_current()?;
        let _guard = self.in_flight.begin(&id)?;

        let document = if with_context {
            let selection = {
                let store = self.store.lock();
                let first = !store.get(&id).is_some_and(|c| c.context_sent);
                let delta = store.tracker().compute_delta();
                self.context_selection(&store, first, &delta)
            };
            self.assembler().assemble(&selection)?
        } else {
            None
        };

        let (payload, sections, context_tokens) = match &document {
            Some(doc) => (
                format!("{}{}{}", doc.render(), SECTION_SEPARATOR, text),
                doc.section_names(),
                doc.estimated_tokens(),
            ),
            None => (text.to_string(), Vec::new(), 0),
        };
        let reply = self.deliver(&id, &sections, &payload, context_tokens).await?;

        let user = ChatMessage::new(Role::User, text);
        let assistant = ChatMessage::new(Role::Assistant, reply.content.clone()).at(reply.timestamp);
        self.store.lock().record_exchange(
            &id,
            document.as_ref().map(delivered),
            vec![user, assistant],
        )?;

        match &document {
            Some(doc) => self.finish(&id, reply.content, doc).await,
            None => self.finish_plain(&id, reply.content).await,
        }
    }

    /// Compact the current conversation now
    pub async fn compact(&self) -> Result<CompactionReport> {
        let id = self
            .store
            .lock()
            .current_id()
            .cloned()
            .ok_or(Error::NoCurrentConversation)?;
        let _guard = self.in_flight.begin(&id)?;
        self.compact_conversation(&id).await
    }

    async fn compact_conversation(&self, id: &ConversationId) -> Result<CompactionReport> {
        let conv = self
            .store
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let compacted = self.compactor.compact(&conv).await?;
        let messages_after = compacted.messages.len();

        let mut store = self.store.lock();
        store.apply_compaction(id, compacted)?;
        let tokens_after = store.get(id).map(|c| c.token_estimate).unwrap_or(0);
        Ok(CompactionReport {
            messages_before: conv.messages.len(),
            messages_after,
            tokens_before: conv.token_estimate,
            tokens_after,
        })
    }

    /// Bound thread for `id`, creating one if needed
    async fn ensure_thread(&self, id: &ConversationId) -> Result<String> {
        let (thread, has_history) = {
            let store = self.store.lock();
            let conv = store
                .get(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            (conv.thread_id.clone(), !conv.messages.is_empty())
        };
        if let Some(thread) = thread {
            return Ok(thread);
        }
        if has_history {
            let problem = Error::CorruptState(format!(
                "conversation {} has history but no thread",
                id
            ));
            tracing::warn!("{}; starting a new thread", problem);
        }

        let thread = self.client.create_thread().await?;
        self.store.lock().bind_thread(id, &thread)?;
        tracing::info!("Bound conversation {} to thread {}", id, thread);
        self.emit(SessionEvent::ThreadBound {
            conversation_id: id.clone(),
            thread_id: thread.clone(),
        });
        Ok(thread)
    }

    /// The remote part of a send. Emits start and failure events.
    async fn deliver(
        &self,
        id: &ConversationId,
        sections: &[String],
        payload: &str,
        context_tokens: u64,
    ) -> Result<tally_ai::Reply> {
        self.emit(SessionEvent::SendStart {
            conversation_id: id.clone(),
            context_sections: sections.to_vec(),
            estimated_tokens: context_tokens,
        });

        let result = match self.ensure_thread(id).await {
            Ok(thread) => self
                .client
                .send_message(&thread, payload, self.config.timeout)
                .await
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => Ok(reply),
            Err(e) => {
                tracing::warn!("Send on {} failed: {}", id, e);
                self.emit(SessionEvent::SendFailed {
                    conversation_id: id.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn finish(
        &self,
        id: &ConversationId,
        reply: String,
        document: &ContextDocument,
    ) -> Result<Exchange> {
        let mut exchange = self.finish_plain(id, reply).await?;
        exchange.context_sections = document.section_names();
        exchange.context_tokens = document.estimated_tokens();
        Ok(exchange)
    }

    /// Post-send bookkeeping: events, budget warning and automatic compaction
    async fn finish_plain(&self, id: &ConversationId, reply: String) -> Result<Exchange> {
        let budget = self.budget_of(id)?;
        self.emit(SessionEvent::SendEnd {
            conversation_id: id.clone(),
            token_estimate: budget.estimate,
        });

        let mut compaction = None;
        match budget.status() {
            BudgetStatus::Normal => {}
            BudgetStatus::Warning => {
                tracing::warn!("Conversation {} is at {}", id, budget);
                self.emit(SessionEvent::BudgetWarning {
                    conversation_id: id.clone(),
                    estimate: budget.estimate,
                    limit: budget.limit,
                });
            }
            BudgetStatus::CompactionRecommended => {
                tracing::warn!("Conversation {} is at {}, compaction recommended", id, budget);
                self.emit(SessionEvent::BudgetWarning {
                    conversation_id: id.clone(),
                    estimate: budget.estimate,
                    limit: budget.limit,
                });
                if self.config.compaction.auto {
                    match self.compact_conversation(id).await {
                        Ok(report) => compaction = Some(report),
                        Err(e) => tracing::warn!("Automatic compaction of {} skipped: {}", id, e),
                    }
                }
            }
        }

        Ok(Exchange {
            conversation_id: id.clone(),
            reply,
            context_sections: Vec::new(),
            context_tokens: 0,
            budget: self.budget_of(id)?,
            compaction,
        })
    }

    fn budget_of(&self, id: &ConversationId) -> Result<TokenBudget> {
        let store = self.store.lock();
        let conv = store
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(conv.budget(
            self.config.compaction.warn_at,
            self.config.compaction.compact_at,
        ))
    }
}

fn delivered(document: &ContextDocument) -> DeliveredContext {
    DeliveredContext {
        items: document.delivered(),
        level: document.level(),
        tokens: document.estimated_tokens(),
    }
}
