//! chatsync CLI Client
//!
//! Interactive terminal chat on top of the chatsync sync core.
//!
//! # Usage
//!
//! ```bash
//! # Chat against a volatile in-process store
//! chatsync
//!
//! # Persist messages in a SQLite file
//! chatsync --endpoint sqlite:///var/lib/chatsync/chat.db
//!
//! # Send one message and exit
//! chatsync --endpoint sqlite://chat.db -m "hello"
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use chatsync_client::{ChatSession, SyncConfig, SyncCore};
use chatsync_core::{Message, SystemClock, MESSAGES_PATH};

/// chatsync Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(author, version, about = "chatsync CLI - realtime chat over a shared message log")]
struct Args {
    /// Backend endpoint (memory://, sqlite://<file>, sqlite::memory:)
    #[arg(short, long, env = "CHATSYNC_ENDPOINT", default_value = "memory://")]
    endpoint: String,

    /// Collection path holding the messages
    #[arg(long, default_value = MESSAGES_PATH)]
    collection: String,

    /// Do not write sample messages into an empty collection
    #[arg(long)]
    no_seed: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHATSYNC_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Send this message and exit
    #[arg(short, long)]
    message: Option<String>,

    /// Quiet mode (no banner)
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = SyncConfig::new(&args.endpoint)
        .with_collection(&args.collection)
        .with_seed(!args.no_seed);
    let core = Arc::new(SyncCore::new(config));

    core.initialize()
        .await
        .with_context(|| format!("Failed to connect to {}", args.endpoint))?;

    // Single message mode
    if let Some(text) = args.message {
        let key = core
            .append_message(&args.collection, &text, &SystemClock)
            .await
            .context("Failed to send message")?;
        println!("{}", key);
        return Ok(());
    }

    if !args.quiet {
        print_banner(&args.endpoint, &args.collection);
    }

    let mut session = ChatSession::start(core.clone(), |messages: &[Message]| render(messages))
        .await
        .context("Failed to load messages")?;

    // rustyline blocks, so it lives on its own thread and forwards lines
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let reader = tokio::task::spawn_blocking(move || read_lines(tx));

    while let Some(line) = rx.recv().await {
        match Command::parse(&line) {
            Command::Help => print_help(),
            Command::List => render(&session.messages()),
            Command::Stats => match core.stats().await {
                Ok(stats) => println!(
                    "{} nodes, {} listeners, {} bytes",
                    stats.node_count, stats.watcher_count, stats.size_bytes
                ),
                Err(e) => eprintln!("{} {}", "Error:".red(), e),
            },
            Command::Clear => print!("\x1B[2J\x1B[1;1H"),
            Command::Quit => break,
            Command::Unknown(command) => {
                eprintln!("{} unknown command {}", "Error:".red(), command);
            }
            Command::Send(text) => {
                if let Err(e) = session.submit(text, &SystemClock).await {
                    // The line stays in history for a retry
                    eprintln!("{} {} (press Up to retry)", "Send failed:".red(), e);
                }
            }
        }
    }

    drop(rx);
    reader.await?;
    session.close();
    core.shutdown();
    Ok(())
}

/// One line of interactive input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Help,
    List,
    Stats,
    Clear,
    Quit,
    Unknown(&'a str),
    Send(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/help" => Command::Help,
            "/list" => Command::List,
            "/stats" => Command::Stats,
            "/clear" => Command::Clear,
            "/quit" | "/exit" => Command::Quit,
            command if command.starts_with('/') => Command::Unknown(command),
            text => Command::Send(text),
        }
    }
}

/// Forward input lines until quit or EOF
fn read_lines(tx: mpsc::UnboundedSender<String>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return;
        }
    };
    let history_path = dirs_next::home_dir()
        .map(|p| p.join(".chatsync_history"))
        .unwrap_or_default();

    let _ = rl.load_history(&history_path);

    loop {
        let prompt = format!("{}> ", "chat".green());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                let quit = Command::parse(line) == Command::Quit;
                if tx.send(line.to_string()).is_err() || quit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
}

fn render(messages: &[Message]) {
    println!("{}", format!("--- {} messages ---", messages.len()).dimmed());
    for (i, message) in messages.iter().enumerate() {
        let row = format!("{}  {}", message.timestamp, message.text);
        if i % 2 == 0 {
            println!("{}", row);
        } else {
            println!("{}", row.bright_black());
        }
    }
}

fn print_banner(endpoint: &str, collection: &str) {
    println!(
        "{}",
        format!(
            r#"
  chatsync {}
  Connected to {} ({})
  Type a message and press Enter; '/help' for commands, '/quit' to exit
"#,
            env!("CARGO_PKG_VERSION"),
            endpoint,
            collection
        )
        .cyan()
    );
}

fn print_help() {
    println!(
        r#"
{}
  <text>                                 Send a message

{}
  /list                                  Show all messages
  /stats                                 Backend statistics
  /clear                                 Clear screen
  /help                                  Show this help
  /quit                                  Exit
"#,
        "Chat".yellow().bold(),
        "Local".yellow().bold(),
    );
}
