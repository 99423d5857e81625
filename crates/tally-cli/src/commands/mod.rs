//! Slash commands for interactive mode

mod context;
mod conversation;
mod status;

pub use context::ContextCommand;
pub use conversation::ConversationCommand;
pub use status::StatusCommand;

use tally_core::ChatSession;

/// Result of executing a slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Share the pending context now
    Apply,
    /// Compact the current conversation
    Compact,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command. Returns `None` for plain input.
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (rest, ""),
    };
    let command = command.to_lowercase();
    let words: Vec<&str> = args.split_whitespace().collect();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "new" | "n" => ConversationCommand::new(session),
        "list" | "l" => ConversationCommand::list(session),
        "switch" => ConversationCommand::switch(session, args),
        "delete" => ConversationCommand::delete(session, args),

        "files" | "f" => ContextCommand::files(session, args),
        "select" | "s" => ContextCommand::select(session, &words),
        "deselect" => ContextCommand::deselect(session, &words),
        "data" => ContextCommand::data(session),
        "use-data" => ContextCommand::use_data(session, &words),
        "skills" => ContextCommand::skills(session),
        "use-skill" => ContextCommand::use_skill(session, &words),
        "ambient" => ContextCommand::ambient(session, &words),
        "refresh" | "r" => ContextCommand::refresh(session, &words),
        "pending" | "p" => ContextCommand::pending(session),

        "apply" | "a" => CommandResult::Apply,
        "compact" => CommandResult::Compact,

        "status" => StatusCommand::execute(session),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?                  Show this help message
  /new, /n                       Start a new conversation
  /list, /l                      List conversations
  /switch <id>                   Switch to a conversation (unique prefix is enough)
  /delete <id>                   Delete a conversation
  /files, /f [glob]              List project files and their status
  /select, /s <glob|path>...     Select files to share
  /deselect <glob|path>...       Deselect files
  /data                          List data sources
  /use-data <name>...            Select data sources to share
  /skills                        List skills
  /use-skill <name>...           Select skills to share
  /ambient [source] [on|off]     Show or toggle config/session/git context
  /refresh, /r <kind> <id>       Re-send a file, data source or skill next time
  /pending, /p                   Show what the next send will attach
  /apply, /a                     Share pending context now
  /compact                       Summarize older history to free tokens
  /status                        Show conversation and token usage
  /quit, /exit, /q               Exit tally

Examples:
  /select src/**/*.rs            Select every Rust file under src
  /refresh file src/main.rs      Send src/main.rs again with the next message
  /ambient git on                Include git status with the first context"#
        .to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tally_ai::{AssistantClient, Reply};
    use tally_core::{ChatSession, ConversationStore, MemoryRepository, SessionConfig};

    use crate::data::CsvCatalog;
    use crate::skills::DirSkillCatalog;
    use crate::workspace::FsWorkspace;

    /// Client that acknowledges everything
    pub struct EchoClient;

    #[async_trait]
    impl AssistantClient for EchoClient {
        async fn create_thread(&self) -> tally_ai::Result<String> {
            Ok("th_test".to_string())
        }

        async fn send_message(
            &self,
            _thread_id: &str,
            _text: &str,
            _timeout: Duration,
        ) -> tally_ai::Result<Reply> {
            Ok(Reply::now("ok"))
        }
    }

    /// A session over a workspace with a few files, data sources and skills
    pub fn session(root: &Path) -> ChatSession {
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::create_dir_all(root.join("skills")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("src/lib.rs"), "pub fn lib() {}\n").unwrap();
        std::fs::write(root.join("README.md"), "# demo\n").unwrap();
        std::fs::write(root.join("data/sales.csv"), "region,total\nnorth,10\n").unwrap();
        std::fs::write(root.join("skills/review.md"), "Review carefully.").unwrap();

        let store = ConversationStore::new(Arc::new(MemoryRepository::new()), 1000);
        ChatSession::new(
            Arc::new(EchoClient),
            store,
            Arc::new(FsWorkspace::new(root, 100).with_global_dir(None)),
            SessionConfig::default(),
        )
        .with_data_catalog(Arc::new(CsvCatalog::new(root.join("data"))))
        .with_skill_catalog(Arc::new(DirSkillCatalog::new(root.join("skills"))))
    }

    pub fn message(result: Option<super::CommandResult>) -> String {
        match result {
            Some(super::CommandResult::Message(text)) => text,
            other => panic!("expected a message, got {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_plain_input_is_not_a_command() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        assert!(execute_command("hello there", &session).is_none());
    }

    #[test]
    fn test_simple_commands() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        assert_eq!(execute_command("/quit", &session), Some(CommandResult::Exit));
        assert_eq!(execute_command("  /APPLY ", &session), Some(CommandResult::Apply));
        assert_eq!(execute_command("/compact", &session), Some(CommandResult::Compact));
        assert_eq!(
            execute_command("/bogus arg", &session),
            Some(CommandResult::Unknown("bogus".to_string()))
        );
        assert!(message(execute_command("/help", &session)).contains("/refresh"));
    }
}
