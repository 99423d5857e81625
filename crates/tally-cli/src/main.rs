//! tally - context-aware assistant chat CLI

mod commands;
mod config;
mod data;
mod repository;
mod skills;
mod utils;
mod workspace;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tally_ai::{Endpoint, HttpAssistantClient};
use tally_core::{
    ApplyOutcome, ChatSession, CompactionEvent, CompactionReport, ConversationId,
    ConversationRepository, ConversationStore, Exchange, SessionEvent,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use commands::CommandResult;
use config::Config;
use repository::JsonFileRepository;

/// tally - chat with an assistant about your project, within a token budget
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Send a single message (with pending context) and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Working directory
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Resume a conversation by ID
    #[arg(long)]
    resume: Option<String>,

    /// List saved conversations
    #[arg(long)]
    conversations: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("tally=debug,tally_core=debug,tally_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = Config::load();
    let repo = Arc::new(JsonFileRepository::open(JsonFileRepository::default_dir())?);

    // List conversations and exit
    if args.conversations {
        return list_conversations(repo.as_ref());
    }

    let Some(api_key) = config.api_key() else {
        eprintln!("Error: No API key configured");
        eprintln!();
        eprintln!("Set your API key with: export {}=your-key", config::API_KEY_ENV);
        eprintln!("Or add it to config file: tally --init-config");
        std::process::exit(1);
    };

    let root = match &args.working_dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        anyhow::bail!("Working directory does not exist: {}", root.display());
    }

    let client = HttpAssistantClient::new(Endpoint::new(config.base_url.clone(), api_key))?;
    let mut store = ConversationStore::open(repo, config.token_limit)?;

    if let Some(ref id) = args.resume {
        if let Err(e) = store.switch_to(&ConversationId::from(id.as_str())) {
            eprintln!("Error resuming conversation: {}", e);
            std::process::exit(1);
        }
    }

    let context = &config.context;
    let data_dir = root.join(context.data_dir.as_deref().unwrap_or("data"));
    let skills_dir = root.join(
        context
            .skills_dir
            .as_deref()
            .unwrap_or(skills::DEFAULT_SKILLS_DIR),
    );
    let session = ChatSession::new(
        Arc::new(client),
        store,
        Arc::new(workspace::FsWorkspace::new(&root, context.max_project_files)),
        config.session_config(),
    )
    .with_data_catalog(Arc::new(data::CsvCatalog::new(data_dir)))
    .with_skill_catalog(Arc::new(skills::DirSkillCatalog::new(skills_dir)));

    let events = spawn_event_printer(session.subscribe());

    let result = match args.command {
        Some(command) => run_command(&session, &command).await,
        None => run_interactive(&session).await,
    };

    events.abort();
    result
}

/// Print progress events to stderr so they don't mix with replies
fn spawn_event_printer(mut receiver: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Event printer skipped {} events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                SessionEvent::BudgetWarning {
                    estimate, limit, ..
                } => {
                    eprintln!(
                        "[Warning: ~{} of {} tokens used]",
                        utils::format_number(estimate),
                        utils::format_number(limit)
                    );
                }
                SessionEvent::Compaction(CompactionEvent::Start { message_count, .. }) => {
                    eprintln!("[Compacting {} messages...]", message_count);
                }
                SessionEvent::Compaction(CompactionEvent::Failed { phase, error, .. }) => {
                    eprintln!("[Compaction failed during {}: {}]", phase, error);
                }
                SessionEvent::SendFailed { error, .. } => {
                    tracing::debug!("Send failed: {}", error);
                }
                _ => {}
            }
        }
    })
}

/// Run a future, giving up if the user presses Ctrl-C.
///
/// Dropping the future abandons the send; nothing is committed until a reply arrives.
async fn interruptible<T>(fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        out = fut => Some(out),
        _ = tokio::signal::ctrl_c() => None,
    }
}

async fn run_command(session: &ChatSession, command: &str) -> anyhow::Result<()> {
    println!("tally> {}", command);
    println!();

    match interruptible(session.send_message(command, true)).await {
        Some(Ok(exchange)) => {
            print_exchange(&exchange);
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => anyhow::bail!("Interrupted"),
    }
}

async fn run_interactive(session: &ChatSession) -> anyhow::Result<()> {
    use std::io::{self, Write};

    // Show minimal startup info (only if TTY)
    if io::IsTerminal::is_terminal(&io::stderr()) {
        match session.store().current() {
            Some(conv) => eprintln!("tally: {} ({})", conv.title, conv.id),
            None => eprintln!("tally: new conversation"),
        }
        eprintln!("Type /help for commands, /quit to exit.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(result) = commands::execute_command(input, session) {
            match result {
                CommandResult::Message(msg) => println!("{}", msg),
                CommandResult::Exit => break,
                CommandResult::Unknown(cmd) => {
                    println!("Unknown command: /{}", cmd);
                    println!("Type /help for available commands.");
                }
                CommandResult::Apply => apply(session).await,
                CommandResult::Compact => compact(session).await,
            }
            println!();
            continue;
        }

        match interruptible(session.send_message(input, true)).await {
            Some(Ok(exchange)) => print_exchange(&exchange),
            Some(Err(e)) => eprintln!("Error: {}", e),
            None => eprintln!("\n[Interrupted; nothing was recorded]"),
        }
        println!();
    }

    Ok(())
}

async fn apply(session: &ChatSession) {
    match interruptible(session.apply_context()).await {
        Some(Ok(ApplyOutcome::Applied(exchange))) => {
            println!(
                "Shared {} section(s), ~{} tokens.",
                exchange.context_sections.len(),
                utils::format_number(exchange.context_tokens)
            );
            print_exchange(&exchange);
        }
        Some(Ok(ApplyOutcome::NothingNew)) => println!("Nothing new to share."),
        Some(Err(e)) => eprintln!("Error: {}", e),
        None => eprintln!("\n[Interrupted; nothing was recorded]"),
    }
}

async fn compact(session: &ChatSession) {
    match interruptible(session.compact()).await {
        Some(Ok(report)) => print_compaction(&report),
        Some(Err(e)) => eprintln!("Error: {}", e),
        None => eprintln!("\n[Interrupted; the conversation was left as it was]"),
    }
}

fn print_exchange(exchange: &Exchange) {
    println!("{}", exchange.reply);
    if !exchange.context_sections.is_empty() {
        println!(
            "[context: {}]",
            utils::truncate_chars(&exchange.context_sections.join(", "), 120)
        );
    }
    println!("[{}]", exchange.budget);
    if let Some(report) = &exchange.compaction {
        print_compaction(report);
    }
}

fn print_compaction(report: &CompactionReport) {
    println!(
        "[Compacted: {} -> {} messages, ~{} -> ~{} tokens]",
        report.messages_before,
        report.messages_after,
        utils::format_number(report.tokens_before),
        utils::format_number(report.tokens_after)
    );
}

fn list_conversations(repo: &JsonFileRepository) -> anyhow::Result<()> {
    let mut conversations = repo.load_all()?;
    if conversations.is_empty() {
        println!("No saved conversations found.");
        println!("Conversations are stored in: {}", repo.dir().display());
        return Ok(());
    }
    conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    println!("Saved conversations:\n");
    println!("{:<32} {:<17} {:<6} {:<10} Title", "ID", "Updated", "Msgs", "Tokens");
    println!("{}", "-".repeat(90));
    for c in conversations {
        println!(
            "{:<32} {:<17} {:<6} {:<10} {}",
            c.id.as_str(),
            utils::format_timestamp(c.updated_at),
            c.messages.len(),
            utils::format_number(c.token_estimate),
            utils::truncate_chars(&c.title, 40)
        );
    }
    println!("\nResume with: tally --resume <conversation-id>");
    Ok(())
}
