//! Selecting what to share: files, data sources, skills and ambient sources

use super::CommandResult;
use tally_core::{Ambient, Category, ChatSession, ItemStatus};

use crate::utils::format_number;

/// Files shown by /files before the listing is cut off
const FILES_SHOWN: usize = 200;

const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

pub struct ContextCommand;

impl ContextCommand {
    pub fn files(session: &ChatSession, args: &str) -> CommandResult {
        let mut files = session.workspace().list_project_files();
        if !args.is_empty() {
            let pattern = match glob::Pattern::new(args) {
                Ok(p) => p,
                Err(e) => return CommandResult::Message(format!("Invalid pattern: {}", e)),
            };
            files.retain(|f| pattern.matches_with(f, MATCH_OPTIONS));
        }
        if files.is_empty() {
            return CommandResult::Message("No matching files.".to_string());
        }

        let store = session.store();
        let tracker = store.tracker();
        let mut output = String::new();
        for path in files.iter().take(FILES_SHOWN) {
            output.push_str(&item_line(
                tracker.selection.is_selected(Category::Files, path),
                path,
                tracker.status_of(Category::Files, path),
            ));
        }
        if files.len() > FILES_SHOWN {
            output.push_str(&format!("\n(showing first {} of {} files)", FILES_SHOWN, files.len()));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn select(session: &ChatSession, args: &[&str]) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /select <glob|path>...".to_string());
        }
        let workspace = session.workspace();
        let mut project_files: Option<Vec<String>> = None;
        let mut added = Vec::new();
        let mut missing = Vec::new();

        for arg in args {
            let matched: Vec<String> = if is_glob(arg) {
                let pattern = match glob::Pattern::new(arg) {
                    Ok(p) => p,
                    Err(e) => return CommandResult::Message(format!("Invalid pattern: {}", e)),
                };
                project_files
                    .get_or_insert_with(|| workspace.list_project_files())
                    .iter()
                    .filter(|f| pattern.matches_with(f, MATCH_OPTIONS))
                    .cloned()
                    .collect()
            } else if workspace.file_exists(arg) {
                vec![arg.to_string()]
            } else {
                Vec::new()
            };

            if matched.is_empty() {
                missing.push(*arg);
            }
            let mut store = session.store();
            for path in matched {
                if store.selection_mut().select(Category::Files, path.clone()) {
                    added.push(path);
                }
            }
        }

        let mut output = format!("Selected {} file(s)", added.len());
        for path in &added {
            output.push_str(&format!("\n  + {}", path));
        }
        if !missing.is_empty() {
            output.push_str(&format!("\nNo match for: {}", missing.join(", ")));
        }
        CommandResult::Message(output)
    }

    pub fn deselect(session: &ChatSession, args: &[&str]) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /deselect <glob|path>...".to_string());
        }
        let mut store = session.store();
        let selected: Vec<String> = store.tracker().selection.items(Category::Files).to_vec();

        let mut removed = Vec::new();
        for arg in args {
            let pattern = glob::Pattern::new(arg).ok();
            for path in &selected {
                let hit = path == arg
                    || pattern
                        .as_ref()
                        .is_some_and(|p| p.matches_with(path, MATCH_OPTIONS));
                if hit && store.selection_mut().deselect(Category::Files, path) {
                    removed.push(path.clone());
                }
            }
        }

        let mut output = format!("Deselected {} file(s)", removed.len());
        for path in &removed {
            output.push_str(&format!("\n  - {}", path));
        }
        CommandResult::Message(output)
    }

    pub fn data(session: &ChatSession) -> CommandResult {
        let sources = session.data_catalog().enumerate();
        if sources.is_empty() {
            return CommandResult::Message("No data sources.".to_string());
        }
        let store = session.store();
        let tracker = store.tracker();
        let mut output = String::new();
        for source in sources {
            let label = format!(
                "{} ({} rows x {} cols)",
                source.name,
                format_number(source.row_count as u64),
                source.col_count
            );
            output.push_str(&item_line(
                tracker.selection.is_selected(Category::DataSources, &source.name),
                &label,
                tracker.status_of(Category::DataSources, &source.name),
            ));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn use_data(session: &ChatSession, args: &[&str]) -> CommandResult {
        let known: Vec<String> = session
            .data_catalog()
            .enumerate()
            .into_iter()
            .map(|s| s.name)
            .collect();
        select_named(session, Category::DataSources, &known, args, "/use-data <name>...")
    }

    pub fn skills(session: &ChatSession) -> CommandResult {
        let skills = session.skill_catalog().list();
        if skills.is_empty() {
            return CommandResult::Message("No skills.".to_string());
        }
        let store = session.store();
        let tracker = store.tracker();
        let mut output = String::new();
        for name in skills {
            output.push_str(&item_line(
                tracker.selection.is_selected(Category::Skills, &name),
                &name,
                tracker.status_of(Category::Skills, &name),
            ));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn use_skill(session: &ChatSession, args: &[&str]) -> CommandResult {
        let known = session.skill_catalog().list();
        select_named(session, Category::Skills, &known, args, "/use-skill <name>...")
    }

    pub fn ambient(session: &ChatSession, args: &[&str]) -> CommandResult {
        let mut store = session.store();
        match args {
            [] => {}
            [which, state] => {
                let which: Ambient = match which.parse() {
                    Ok(w) => w,
                    Err(e) => return CommandResult::Message(format!("Error: {}", e)),
                };
                let on = match *state {
                    "on" | "true" | "yes" => true,
                    "off" | "false" | "no" => false,
                    other => {
                        return CommandResult::Message(format!(
                            "Expected on or off, got '{}'",
                            other
                        ));
                    }
                };
                store.selection_mut().set_ambient(which, on);
            }
            _ => {
                return CommandResult::Message(
                    "Usage: /ambient [config|session|git] [on|off]".to_string(),
                );
            }
        }

        let selection = &store.tracker().selection;
        let flag = |on: bool| if on { "on" } else { "off" };
        CommandResult::Message(format!(
            "Ambient context (sent with the first context of a conversation):\n  config:  {}\n  session: {}\n  git:     {}",
            flag(selection.config),
            flag(selection.session),
            flag(selection.git),
        ))
    }

    pub fn refresh(session: &ChatSession, args: &[&str]) -> CommandResult {
        let [kind, id] = args else {
            return CommandResult::Message("Usage: /refresh <file|data|skill> <id>".to_string());
        };
        let category = match parse_category(kind) {
            Some(c) => c,
            None => {
                return CommandResult::Message(format!(
                    "Unknown kind '{}': expected file, data or skill",
                    kind
                ));
            }
        };
        match session.store().queue_refresh(category, id) {
            Ok(()) => CommandResult::Message(format!(
                "Queued {} '{}' to be sent again with the next context",
                category, id
            )),
            Err(e) => CommandResult::Message(format!("Error: {}", e)),
        }
    }

    pub fn pending(session: &ChatSession) -> CommandResult {
        let delta = session.store().tracker().compute_delta();

        let mut output = String::new();
        if delta.is_empty() {
            output.push_str("No new or refreshed items.");
        } else {
            output.push_str("Pending items:");
            for category in Category::ALL {
                for id in delta.get(category) {
                    output.push_str(&format!("\n  {} {}", category, id));
                }
            }
        }

        match session.preview_context() {
            Ok(Some(document)) => {
                output.push_str(&format!(
                    "\n\nNext /apply: {} section(s), ~{} tokens, files at {} tier",
                    document.sections.len(),
                    format_number(document.estimated_tokens()),
                    document.level(),
                ));
                if document.has_files() {
                    output.push_str(&format!(" ({})", document.tier_decision.reason));
                }
            }
            Ok(None) => output.push_str("\n\nNothing to apply."),
            Err(e) => output.push_str(&format!("\n\nCannot assemble context: {}", e)),
        }
        CommandResult::Message(output)
    }
}

fn is_glob(arg: &str) -> bool {
    arg.contains(['*', '?', '['])
}

fn parse_category(kind: &str) -> Option<Category> {
    match kind {
        "file" | "files" => Some(Category::Files),
        "data" | "data-source" => Some(Category::DataSources),
        "skill" | "skills" => Some(Category::Skills),
        _ => None,
    }
}

fn item_line(selected: bool, label: &str, status: ItemStatus) -> String {
    let mark = if selected { "[x]" } else { "[ ]" };
    match status {
        ItemStatus::New => format!("{} {}\n", mark, label),
        status => format!("{} {}  ({})\n", mark, label, status),
    }
}

fn select_named(
    session: &ChatSession,
    category: Category,
    known: &[String],
    args: &[&str],
    usage: &str,
) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Message(format!("Usage: {}", usage));
    }
    let mut store = session.store();
    let mut added = Vec::new();
    let mut unknown = Vec::new();
    for name in args {
        if !known.iter().any(|k| k == name) {
            unknown.push(*name);
        } else if store.selection_mut().select(category, *name) {
            added.push(*name);
        }
    }

    let mut output = format!("Selected {} {}(s)", added.len(), category);
    if !added.is_empty() {
        output.push_str(&format!(": {}", added.join(", ")));
    }
    if !unknown.is_empty() {
        output.push_str(&format!("\nUnknown: {}", unknown.join(", ")));
    }
    CommandResult::Message(output)
}

#[cfg(test)]
mod tests {
    use super::super::execute_command;
    use super::super::testing::*;
    use tally_core::Category;

    #[test]
    fn test_select_by_glob_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        let text = message(execute_command("/select src/*.rs README.md nope.txt", &session));
        assert!(text.starts_with("Selected 3 file(s)"));
        assert!(text.contains("No match for: nope.txt"));
        assert_eq!(
            session.store().tracker().selection.items(Category::Files),
            &["src/lib.rs", "src/main.rs", "README.md"]
        );

        let text = message(execute_command("/select src/main.rs", &session));
        assert!(text.starts_with("Selected 0 file(s)"));
    }

    #[test]
    fn test_deselect_by_glob() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        execute_command("/select src/*.rs README.md", &session);

        let text = message(execute_command("/deselect src/*", &session));
        assert!(text.starts_with("Deselected 2 file(s)"));
        assert_eq!(
            session.store().tracker().selection.items(Category::Files),
            &["README.md"]
        );
    }

    #[test]
    fn test_files_shows_selection() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        execute_command("/select README.md", &session);

        let text = message(execute_command("/files", &session));
        assert!(text.contains("[x] README.md"));
        assert!(text.contains("[ ] src/main.rs"));
        assert_eq!(
            message(execute_command("/files *.toml", &session)),
            "No matching files."
        );
    }

    #[test]
    fn test_data_and_skills() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        assert!(message(execute_command("/data", &session)).contains("[ ] sales (1 rows x 2 cols)"));
        let text = message(execute_command("/use-data sales other", &session));
        assert!(text.starts_with("Selected 1 data source(s): sales"));
        assert!(text.contains("Unknown: other"));
        assert!(message(execute_command("/data", &session)).contains("[x] sales"));

        let text = message(execute_command("/use-skill review", &session));
        assert_eq!(text, "Selected 1 skill(s): review");
        assert!(message(execute_command("/skills", &session)).contains("[x] review"));
    }

    #[test]
    fn test_ambient_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        let text = message(execute_command("/ambient git on", &session));
        assert!(text.contains("git:     on"));
        assert!(session.store().tracker().selection.git);

        let text = message(execute_command("/ambient config off", &session));
        assert!(text.contains("config:  off"));
        assert!(message(execute_command("/ambient vcs on", &session)).starts_with("Error"));
        assert!(message(execute_command("/ambient git maybe", &session)).starts_with("Expected"));
    }

    #[test]
    fn test_refresh_validation() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.store().create_new().unwrap();

        let text = message(execute_command("/refresh file src/main.rs", &session));
        assert!(text.starts_with("Error: Cannot refresh file 'src/main.rs'"));

        execute_command("/select src/main.rs", &session);
        let text = message(execute_command("/refresh file src/main.rs", &session));
        assert!(text.starts_with("Queued file 'src/main.rs'"));
        assert!(
            message(execute_command("/refresh thing x", &session)).starts_with("Unknown kind")
        );
        assert!(message(execute_command("/refresh file", &session)).starts_with("Usage"));
    }

    #[test]
    fn test_pending_lists_delta_and_preview() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        execute_command("/ambient config off", &session);
        execute_command("/ambient session off", &session);

        assert_eq!(
            message(execute_command("/pending", &session)),
            "No new or refreshed items.\n\nNothing to apply."
        );

        execute_command("/select src/main.rs", &session);
        let text = message(execute_command("/pending", &session));
        assert!(text.contains("file src/main.rs"));
        assert!(text.contains("Next /apply: 1 section(s)"));
        assert!(text.contains("files at full tier"));
    }
}
