//! History compaction
//!
//! When a conversation nears the remote token ceiling, the assistant is asked
//! to summarize older turns on the existing thread, a new thread is opened,
//! and the summary plus the most recent turns are replayed into it. The
//! engine never touches the conversation record: it returns a
//! [`CompactedHistory`] that the store applies in one step, so any failure
//! leaves the original conversation exactly as it was.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tally_ai::AssistantClient;
use tokio::sync::broadcast;

use crate::conversation::{ChatMessage, Conversation, Role};
use crate::error::{Error, Result};
use crate::events::{CompactionEvent, SessionEvent};
use crate::sent::{Category, SentState};
use crate::tokens::{BudgetStatus, estimate_messages};

/// Configuration for compaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Usage ratio that triggers a warning
    pub warn_at: f64,
    /// Usage ratio that triggers compaction
    pub compact_at: f64,
    /// Exchanges (user plus assistant pairs) kept verbatim
    pub preserve_recent: usize,
    /// Compact automatically after a send crosses `compact_at`
    pub auto: bool,
    /// Timeout for each remote call made while compacting
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            warn_at: 0.80,
            compact_at: 0.85,
            preserve_recent: 2,
            auto: true,
            timeout: Duration::from_secs(180),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl CompactionConfig {
    /// Number of trailing messages kept verbatim
    pub fn preserved_messages(&self) -> usize {
        self.preserve_recent * 2
    }

    pub fn status(&self, conv: &Conversation) -> BudgetStatus {
        conv.budget(self.warn_at, self.compact_at).status()
    }

    pub fn should_compact(&self, conv: &Conversation) -> bool {
        self.status(conv) == BudgetStatus::CompactionRecommended
    }
}

/// Step of compaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompactionPhase {
    Summarize,
    NewThread,
    Continuation,
}

impl fmt::Display for CompactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompactionPhase::Summarize => "summarize",
            CompactionPhase::NewThread => "new-thread",
            CompactionPhase::Continuation => "continuation",
        })
    }
}

/// Engine state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum CompactionState {
    #[default]
    Idle,
    Summarizing,
    AwaitingNewThread,
    Splicing,
    Failed(CompactionPhase),
}

/// Replacement history produced by a successful compaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactedHistory {
    /// `[continuation, acknowledgment] ++ preserved tail`
    pub messages: Vec<ChatMessage>,
    /// Thread the new history lives on
    pub thread_id: String,
    pub summary: String,
    /// How many messages the summary replaced
    pub summarized_count: usize,
}

/// Outcome of a compaction, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub messages_before: usize,
    pub messages_after: usize,
    pub tokens_before: u64,
    pub tokens_after: u64,
}

/// Split history into the part to summarize and the tail to keep.
///
/// Refuses unless at least one message sits in front of the preserved tail.
pub fn partition(
    messages: &[ChatMessage],
    preserve_recent: usize,
) -> Result<(&[ChatMessage], &[ChatMessage])> {
    let keep = preserve_recent * 2;
    if messages.len() <= keep {
        return Err(Error::TooFewMessages {
            have: messages.len(),
            need: keep + 1,
        });
    }
    Ok(messages.split_at(messages.len() - keep))
}

const SUMMARY_RETAIN: &[&str] = &[
    "Key decisions and the reasoning behind them",
    "Questions that are still unresolved",
    "Important outputs, results and code produced",
    "The next steps we agreed on",
    "Any context needed to continue without re-reading the history",
];

const SUMMARY_OMIT: &[&str] = &[
    "Redundant or superseded material",
    "Intermediate steps that led to a final answer",
    "Verbose tool or command output",
];

const QUOTE_CHARS: usize = 120;

fn quote(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= QUOTE_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(QUOTE_CHARS).collect();
        format!("{}...", cut)
    }
}

/// The summarization request sent on the existing thread. The thread already
/// holds the history, so turns are referenced rather than re-sent.
pub fn summarization_prompt(to_summarize: &[ChatMessage]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Please write a summary of the first {} messages of our conversation",
        to_summarize.len()
    ));
    if let Some(last) = to_summarize.last() {
        out.push_str(&format!(
            ", up to and including the {} message that begins \"{}\"",
            last.role,
            quote(&last.content)
        ));
    }
    out.push_str(". The summary will replace those messages in a new session, so it must stand on its own.\n\nRetain:\n");
    for item in SUMMARY_RETAIN {
        out.push_str(&format!("- {}\n", item));
    }
    out.push_str("\nOmit:\n");
    for item in SUMMARY_OMIT {
        out.push_str(&format!("- {}\n", item));
    }
    out.push_str("\nReply with the summary only.");
    out
}

fn shared_items(sent: &SentState) -> Vec<(Category, Vec<&str>)> {
    Category::ALL
        .iter()
        .map(|c| (*c, sent.sent(*c).iter().map(String::as_str).collect::<Vec<_>>()))
        .filter(|(_, items)| !items.is_empty())
        .collect()
}

/// The first message on the new thread
pub fn continuation_message(summary: &str, preserved: &[ChatMessage], sent: &SentState) -> String {
    let mut out = String::from(
        "This is a continuation of an earlier conversation that was compacted to stay within \
         the context limit. Treat the summary below as established context.\n\n",
    );
    out.push_str("## Summary of the earlier conversation\n\n");
    out.push_str(summary.trim());
    out.push_str("\n\n");

    if !preserved.is_empty() {
        out.push_str("## Most recent messages (verbatim)\n\n");
        for message in preserved {
            out.push_str(&format!("[{}]: {}\n\n", message.role, message.content));
        }
    }

    let shared = shared_items(sent);
    if !shared.is_empty() {
        out.push_str("## Material already shared\n\n");
        for (category, items) in shared {
            out.push_str(&format!("- {}s: {}\n", category, items.join(", ")));
        }
        out.push('\n');
    }

    out.push_str("Please acknowledge briefly. We will continue from here.");
    out
}

/// Runs the summarize, new-thread, continuation sequence
pub struct CompactionEngine {
    client: Arc<dyn AssistantClient>,
    config: CompactionConfig,
    state: Mutex<CompactionState>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl CompactionEngine {
    pub fn new(client: Arc<dyn AssistantClient>, config: CompactionConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(CompactionState::Idle),
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn state(&self) -> CompactionState {
        *self.state.lock()
    }

    fn emit(&self, event: CompactionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(SessionEvent::Compaction(event));
        }
    }

    fn set_state(&self, state: CompactionState) {
        *self.state.lock() = state;
        tracing::debug!("Compaction state: {:?}", state);
        self.emit(CompactionEvent::State { state });
    }

    fn fail(&self, conv: &Conversation, phase: CompactionPhase, message: String) -> Error {
        self.set_state(CompactionState::Failed(phase));
        tracing::warn!("Compaction of {} failed during {}: {}", conv.id, phase, message);
        self.emit(CompactionEvent::Failed {
            conversation_id: conv.id.clone(),
            phase,
            error: message.clone(),
        });
        Error::compaction(phase, message)
    }

    /// Produce compacted history for `conv`. The conversation is only read.
    pub async fn compact(&self, conv: &Conversation) -> Result<CompactedHistory> {
        let (to_summarize, to_preserve) = partition(&conv.messages, self.config.preserve_recent)?;
        let Some(old_thread) = conv.thread_id.as_deref() else {
            return Err(self.fail(
                conv,
                CompactionPhase::Summarize,
                "conversation has no remote thread to summarize".to_string(),
            ));
        };

        tracing::info!(
            "Compacting {}: summarizing {} of {} messages (~{} tokens)",
            conv.id,
            to_summarize.len(),
            conv.messages.len(),
            conv.token_estimate
        );
        self.emit(CompactionEvent::Start {
            conversation_id: conv.id.clone(),
            message_count: conv.messages.len(),
            token_estimate: conv.token_estimate,
        });

        self.set_state(CompactionState::Summarizing);
        let summary = match self
            .client
            .send_message(old_thread, &summarization_prompt(to_summarize), self.config.timeout)
            .await
        {
            Ok(reply) if !reply.content.trim().is_empty() => reply.content,
            Ok(_) => {
                return Err(self.fail(
                    conv,
                    CompactionPhase::Summarize,
                    "assistant returned an empty summary".to_string(),
                ));
            }
            Err(e) => return Err(self.fail(conv, CompactionPhase::Summarize, e.to_string())),
        };

        self.set_state(CompactionState::AwaitingNewThread);
        let new_thread = match self.client.create_thread().await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(conv, CompactionPhase::NewThread, e.to_string())),
        };

        let continuation = continuation_message(&summary, to_preserve, &conv.sent);
        let ack = match self
            .client
            .send_message(&new_thread, &continuation, self.config.timeout)
            .await
        {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(conv, CompactionPhase::Continuation, e.to_string())),
        };

        self.set_state(CompactionState::Splicing);
        let mut messages = Vec::with_capacity(to_preserve.len() + 2);
        messages.push(ChatMessage::new(Role::User, continuation));
        messages.push(ChatMessage::new(Role::Assistant, ack.content).at(ack.timestamp));
        messages.extend(to_preserve.iter().cloned());

        let tokens_after = estimate_messages(&messages);
        self.emit(CompactionEvent::End {
            conversation_id: conv.id.clone(),
            messages_before: conv.messages.len(),
            messages_after: messages.len(),
            tokens_before: conv.token_estimate,
            tokens_after,
        });
        tracing::info!(
            "Compacted {}: {} -> {} messages, ~{} -> ~{} tokens, new thread {}",
            conv.id,
            conv.messages.len(),
            messages.len(),
            conv.token_estimate,
            tokens_after,
            new_thread
        );
        self.set_state(CompactionState::Idle);

        Ok(CompactedHistory {
            messages,
            thread_id: new_thread,
            summary,
            summarized_count: to_summarize.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DEFAULT_TOKEN_LIMIT;
    use crate::testing::MockClient;

    fn conversation(n: usize) -> Conversation {
        let mut conv = Conversation::new(DEFAULT_TOKEN_LIMIT);
        conv.thread_id = Some("th_old".into());
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            conv.push_message(ChatMessage::new(role, format!("message {}", i)));
        }
        conv
    }

    fn engine(client: MockClient) -> (Arc<MockClient>, CompactionEngine) {
        let client = Arc::new(client);
        let engine = CompactionEngine::new(client.clone(), CompactionConfig::default());
        (client, engine)
    }

    #[test]
    fn test_partition_boundaries() {
        let conv = conversation(10);
        let (old, tail) = partition(&conv.messages, 2).unwrap();
        assert_eq!(old.len(), 6);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].content, "message 6");

        let short = conversation(4);
        assert!(matches!(
            partition(&short.messages, 2),
            Err(Error::TooFewMessages { have: 4, need: 5 })
        ));
    }

    #[test]
    fn test_should_compact_thresholds() {
        let config = CompactionConfig::default();
        let mut conv = Conversation::new(1000);
        conv.token_estimate = 800;
        assert_eq!(config.status(&conv), BudgetStatus::Warning);
        assert!(!config.should_compact(&conv));
        conv.token_estimate = 850;
        assert!(config.should_compact(&conv));
    }

    #[test]
    fn test_prompt_lists_retain_and_omit() {
        let conv = conversation(6);
        let prompt = summarization_prompt(&conv.messages[..2]);
        assert!(prompt.contains("first 2 messages"));
        assert!(prompt.contains("\"message 1\""));
        assert!(prompt.contains("Key decisions"));
        assert!(prompt.contains("Verbose tool or command output"));
    }

    #[test]
    fn test_continuation_carries_tail_and_shared_items() {
        let conv = conversation(6);
        let mut sent = SentState::default();
        sent.sent_files.insert("src/lib.rs".into());
        let text = continuation_message("We chose plan B.", &conv.messages[2..], &sent);
        assert!(text.contains("continuation"));
        assert!(text.contains("We chose plan B."));
        assert!(text.contains("[user]: message 4"));
        assert!(text.contains("- files: src/lib.rs"));
        assert!(!text.contains("data sources"));
    }

    #[tokio::test]
    async fn test_compaction_preserves_tail() {
        let conv = conversation(10);
        let before_tail: Vec<String> =
            conv.messages[6..].iter().map(|m| m.content.clone()).collect();
        let (client, engine) = engine(MockClient::new().reply("the summary").reply("understood"));

        let compacted = engine.compact(&conv).await.unwrap();

        assert_eq!(compacted.messages.len(), 6);
        let after_tail: Vec<String> =
            compacted.messages[2..].iter().map(|m| m.content.clone()).collect();
        assert_eq!(after_tail, before_tail);
        assert_eq!(compacted.messages[0].role, Role::User);
        assert!(compacted.messages[0].content.contains("the summary"));
        assert_eq!(compacted.messages[1].content, "understood");
        assert_eq!(compacted.thread_id, "th_1");
        assert_eq!(compacted.summarized_count, 6);
        assert_eq!(engine.state(), CompactionState::Idle);

        // summary requested on the old thread, continuation on the new one
        let sent = client.sent.lock().clone();
        assert_eq!(sent[0].0, "th_old");
        assert_eq!(sent[1].0, "th_1");
    }

    #[tokio::test]
    async fn test_new_thread_failure_leaves_conversation_intact() {
        let conv = conversation(10);
        let snapshot = serde_json::to_string(&conv).unwrap();
        let (_, engine) = engine(
            MockClient::new()
                .reply("summary")
                .fail_thread(tally_ai::Error::status(503, "unavailable")),
        );

        let err = engine.compact(&conv).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Compaction {
                phase: CompactionPhase::NewThread,
                ..
            }
        ));
        assert_eq!(serde_json::to_string(&conv).unwrap(), snapshot);
        assert_eq!(
            engine.state(),
            CompactionState::Failed(CompactionPhase::NewThread)
        );
    }

    #[tokio::test]
    async fn test_empty_summary_is_summarize_failure() {
        let conv = conversation(6);
        let (client, engine) = engine(MockClient::new().reply("   "));
        let err = engine.compact(&conv).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Compaction {
                phase: CompactionPhase::Summarize,
                ..
            }
        ));
        assert_eq!(client.thread_count(), 0);
    }

    #[tokio::test]
    async fn test_continuation_failure_reports_phase() {
        let conv = conversation(6);
        let (_, engine) = engine(
            MockClient::new()
                .reply("summary")
                .fail_reply(tally_ai::Error::Timeout(Duration::from_secs(1))),
        );
        let err = engine.compact(&conv).await.unwrap_err();
        assert!(err.to_string().contains("continuation"));
    }

    #[tokio::test]
    async fn test_too_few_messages_refused_without_remote_calls() {
        let conv = conversation(3);
        let (client, engine) = engine(MockClient::new());
        assert!(matches!(
            engine.compact(&conv).await,
            Err(Error::TooFewMessages { .. })
        ));
        assert!(client.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_events_report_progress() {
        let (tx, mut rx) = broadcast::channel(32);
        let client = Arc::new(MockClient::new().reply("summary").reply("ack"));
        let engine = CompactionEngine::new(client, CompactionConfig::default()).with_events(tx);
        engine.compact(&conversation(8)).await.unwrap();

        let mut states = Vec::new();
        let mut ended = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                SessionEvent::Compaction(CompactionEvent::State { state }) => states.push(state),
                SessionEvent::Compaction(CompactionEvent::End { messages_after, .. }) => {
                    assert_eq!(messages_after, 6);
                    ended = true;
                }
                _ => {}
            }
        }
        assert!(ended);
        assert_eq!(
            states,
            vec![
                CompactionState::Summarizing,
                CompactionState::AwaitingNewThread,
                CompactionState::Splicing,
                CompactionState::Idle,
            ]
        );
    }
}
