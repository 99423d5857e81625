//! /new, /list, /switch and /delete

use super::CommandResult;
use tally_core::{ChatSession, ConversationId, ConversationStore};

use crate::utils::{format_number, format_timestamp, truncate_chars};

const TITLE_COLUMN: usize = 40;

pub struct ConversationCommand;

impl ConversationCommand {
    pub fn new(session: &ChatSession) -> CommandResult {
        let mut store = session.store();
        match store.create_new() {
            Ok(conv) => CommandResult::Message(format!("Started conversation {}", conv.id)),
            Err(e) => CommandResult::Message(format!("Error: {}", e)),
        }
    }

    pub fn list(session: &ChatSession) -> CommandResult {
        let store = session.store();
        let conversations = store.list();
        if conversations.is_empty() {
            return CommandResult::Message("No conversations yet.".to_string());
        }

        let current = store.current_id();
        let mut output = String::from("Conversations:\n");
        for c in conversations {
            let marker = if current == Some(&c.id) { "*" } else { " " };
            output.push_str(&format!(
                "{} {}  {:<width$}  {:>3} msgs  {:>8} tokens  {}\n",
                marker,
                c.id,
                truncate_chars(&c.title, TITLE_COLUMN),
                c.message_count,
                format_number(c.token_estimate),
                format_timestamp(c.updated_at),
                width = TITLE_COLUMN + 3,
            ));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn switch(session: &ChatSession, args: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /switch <id>".to_string());
        }
        let mut store = session.store();
        let id = match resolve_id(&store, args) {
            Ok(id) => id,
            Err(message) => return CommandResult::Message(message),
        };
        match store.switch_to(&id) {
            Ok(()) => {
                let title = store.current().map(|c| c.title.clone()).unwrap_or_default();
                CommandResult::Message(format!("Switched to {} ({})", id, title))
            }
            Err(e) => CommandResult::Message(format!("Error: {}", e)),
        }
    }

    pub fn delete(session: &ChatSession, args: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /delete <id>".to_string());
        }
        let mut store = session.store();
        let id = match resolve_id(&store, args) {
            Ok(id) => id,
            Err(message) => return CommandResult::Message(message),
        };
        if session.is_sending(&id) {
            return CommandResult::Message(format!("Cannot delete {} while a send is in flight", id));
        }
        match store.delete(&id) {
            Ok(()) => {
                let mut message = format!("Deleted {}", id);
                if let Some(current) = store.current_id() {
                    message.push_str(&format!("\nCurrent conversation: {}", current));
                }
                CommandResult::Message(message)
            }
            Err(e) => CommandResult::Message(format!("Error: {}", e)),
        }
    }
}

/// Resolve an exact id or a unique prefix of a loaded conversation's id
fn resolve_id(store: &ConversationStore, arg: &str) -> Result<ConversationId, String> {
    let exact = ConversationId::from(arg);
    if store.get(&exact).is_some() {
        return Ok(exact);
    }

    let mut matches: Vec<ConversationId> = store
        .list()
        .into_iter()
        .map(|c| c.id)
        .filter(|id| id.as_str().starts_with(arg))
        .collect();
    match matches.len() {
        1 => Ok(matches.swap_remove(0)),
        // Not loaded; the store will look in the repository
        0 => Ok(exact),
        n => Err(format!("'{}' matches {} conversations; be more specific", arg, n)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::execute_command;
    use super::super::testing::*;

    #[test]
    fn test_new_list_switch_delete() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        assert_eq!(
            message(execute_command("/list", &session)),
            "No conversations yet."
        );

        let first = session.store().create_new().unwrap().id.clone();
        assert!(message(execute_command("/new", &session)).starts_with("Started conversation"));
        let second = session.store().current_id().cloned().unwrap();
        assert_ne!(first, second);

        let listing = message(execute_command("/list", &session));
        assert!(listing.contains(&format!("* {}", second)));
        assert!(listing.contains(&format!("  {}", first)));

        let text = message(execute_command(&format!("/switch {}", first), &session));
        assert!(text.starts_with("Switched to"));
        assert_eq!(session.store().current_id(), Some(&first));

        let text = message(execute_command(&format!("/delete {}", first), &session));
        assert!(text.contains(&format!("Current conversation: {}", second)));
    }

    #[test]
    fn test_switch_errors() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.store().create_new().unwrap();
        session.store().create_new().unwrap();

        assert_eq!(message(execute_command("/switch", &session)), "Usage: /switch <id>");
        assert!(message(execute_command("/switch conv_", &session)).contains("matches 2"));
        assert!(
            message(execute_command("/switch nope", &session))
                .starts_with("Error: Conversation not found")
        );
    }
}
