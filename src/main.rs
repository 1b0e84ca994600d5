//! BBS terminal client: a retro telnet client in Rust.
//!
//! Usage:
//!   bbs-client [OPTIONS] HOST [PORT]
//!
//! This client:
//! 1. Opens a raw TCP connection to a text-mode BBS
//! 2. Decodes CP437 output and inline ANSI color sequences
//! 3. Word-wraps into a bounded scrollback and prints styled lines
//! 4. Sends typed lines back CRLF-terminated through the CP437 inverse

mod ansi;
mod cp437;
mod lines;
mod render;
mod scrollback;
mod session;
mod store;
mod wrap;

use anyhow::Result;
use clap::Parser;
use session::{Session, SessionConfig, SessionEvent, SessionState, KEEP_ALIVE_PERIOD};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// BBS terminal client: CP437 and ANSI color over raw TCP.
#[derive(Parser, Debug)]
#[command(name = "bbs-client", version, about)]
struct Cli {
    /// BBS hostname or address.
    #[arg(value_name = "HOST")]
    host: String,

    /// TCP port (23 is the classic telnet port).
    #[arg(value_name = "PORT", default_value = "23")]
    port: u16,

    /// Terminal width in columns.
    #[arg(long, default_value = "136")]
    columns: usize,

    /// Scrollback capacity in lines.
    #[arg(long, default_value = "5000")]
    scrollback: usize,

    /// Send a periodic CRLF to hold idle logins open.
    #[arg(long)]
    keep_alive: bool,

    /// Path to the JSON preference store.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    let prefs = match cli.store.clone().or_else(store::default_store_path) {
        Some(path) => store::load_preferences(&store::JsonFileStore::open(path)),
        None => store::Preferences::default(),
    };

    let config = SessionConfig {
        columns: cli.columns,
        scrollback_lines: cli.scrollback,
        keep_alive: (cli.keep_alive || prefs.keep_alive).then_some(KEEP_ALIVE_PERIOD),
    };

    run_session(&cli, config).await
}

/// Main session loop: connect, then shuttle between session events and
/// typed input until the connection ends.
async fn run_session(cli: &Cli, config: SessionConfig) -> Result<()> {
    let (mut session, mut events) = Session::new(config);

    eprintln!("Connecting to {}:{}...", cli.host, cli.port);
    session.connect(&cli.host, cli.port).await?;

    let mut stdout = std::io::stdout();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Line(line)) => render::print_line(&mut stdout, &line)?,
                Some(SessionEvent::State(SessionState::Connected)) => {
                    eprintln!("Connected to {}:{}", cli.host, cli.port);
                }
                Some(SessionEvent::State(SessionState::Disconnected)) => {
                    eprintln!("Disconnected");
                    break;
                }
                Some(SessionEvent::State(SessionState::Connecting)) => {}
                Some(SessionEvent::Error(e)) => eprintln!("Error: {}", e),
                None => break,
            },
            line = input.next_line(), if stdin_open => match line? {
                Some(text) => {
                    if let Err(e) = session.send(&text).await {
                        eprintln!("Send failed: {}", e);
                    }
                }
                None => {
                    // End of input: the user is done with this session.
                    stdin_open = false;
                    session.disconnect();
                }
            },
        }
    }

    Ok(())
}
