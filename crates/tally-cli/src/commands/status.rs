//! /status command - show the current conversation and its token usage

use super::CommandResult;
use tally_core::{BudgetStatus, Category, ChatSession, CompactionState};

use crate::utils::{format_number, format_timestamp};

pub struct StatusCommand;

impl StatusCommand {
    pub fn execute(session: &ChatSession) -> CommandResult {
        let compaction = &session.config().compaction;
        let store = session.store();
        let Some(conv) = store.current() else {
            return CommandResult::Message(
                "No current conversation. Send a message or use /new to start one.".to_string(),
            );
        };

        let mut output = String::from("Conversation\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');

        output.push_str(&format!("ID:         {}\n", conv.id));
        output.push_str(&format!("Title:      {}\n", conv.title));
        output.push_str(&format!(
            "Thread:     {}\n",
            conv.thread_id.as_deref().unwrap_or("(none yet)")
        ));
        output.push_str(&format!("Messages:   {}\n", conv.messages.len()));
        output.push_str(&format!("Updated:    {}\n", format_timestamp(conv.updated_at)));
        output.push('\n');

        let budget = conv.budget(compaction.warn_at, compaction.compact_at);
        output.push_str(&format!("Tokens:     {}\n", budget));
        output.push_str(&format!(
            "Remaining:  {}\n",
            format_number(budget.remaining())
        ));
        match budget.status() {
            BudgetStatus::Normal => {}
            BudgetStatus::Warning => output.push_str("            approaching the limit\n"),
            BudgetStatus::CompactionRecommended => {
                output.push_str("            over the compaction threshold; try /compact\n")
            }
        }
        if conv.compaction_count > 0 {
            output.push_str(&format!(
                "Compacted:  {} time(s), last {}\n",
                conv.compaction_count,
                conv.last_compaction_at
                    .map(format_timestamp)
                    .unwrap_or_else(|| "-".to_string())
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "Context:    {}\n",
            match conv.context_level {
                Some(level) if conv.context_sent => format!("shared ({} tier)", level),
                _ => "not shared yet".to_string(),
            }
        ));
        for category in Category::ALL {
            output.push_str(&format!(
                "  {:<12} {} sent, {} pending refresh\n",
                format!("{}s:", category),
                conv.sent.sent(category).len(),
                conv.sent.pending(category).len(),
            ));
        }

        if session.is_sending(&conv.id) {
            output.push_str("\nA send is in flight.\n");
        }
        match session.compaction_state() {
            CompactionState::Idle => {}
            state => output.push_str(&format!("\nCompaction: {:?}\n", state)),
        }

        CommandResult::Message(output.trim_end().to_string())
    }
}
