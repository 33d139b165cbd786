//! # hammer-console: Operator Consoles
//!
//! Two line-oriented consoles over one terminal session:
//! `hammer-pos` soak-tests the terminal with back-to-back purchases,
//! `pizza-pos` charges, refunds and settles by hand.
//!
//! ## Module Structure
//! ```text
//! hammer_console/
//! ├── lib.rs        ◄─── run(): config, logging, session, event loop
//! ├── cli.rs        ◄─── clap arguments + config overrides
//! ├── console.rs    ◄─── Profile, Command parsing, Console dispatcher
//! ├── render.rs     ◄─── Screen text (status, flows, actions, stats)
//! └── error.rs      ◄─── ConsoleError
//! ```
//!
//! ## Event Loop
//! ```text
//! ┌──────────────┐   lines    ┌────────────────┐
//! │    stdin     │ ─────────► │                │
//! └──────────────┘            │    select!     │ ───► Console ───► stdout
//! ┌──────────────┐  events    │                │
//! │  projector / │ ─────────► │                │
//! │ driver watch │            └────────────────┘
//! └──────────────┘
//! ```
//!
//! All output is written from the loop, so screens never interleave.

pub mod cli;
pub mod console;
pub mod error;
pub mod render;

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::sync::Mutex;

use hammer_core::PersistedSession;
use hammer_harness::{HarnessConfig, LoggingSettings, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use cli::Args;
pub use console::{Command, Console, ConsoleEmitter, ConsoleEvent, Flow, Profile};
pub use error::{ConsoleError, ConsoleResult, ErrorCode};

/// Runs a console until the operator says `bye` or stdin closes.
pub async fn run(profile: Profile, args: Args) -> ConsoleResult<()> {
    let mut config = HarnessConfig::load(args.config.clone())?;
    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;
    info!(app = profile.app_name(), pos_id = %config.terminal.pos_id, "Console starting");

    let persisted = args
        .persisted
        .as_deref()
        .filter(|line| !line.trim().is_empty())
        .map(PersistedSession::parse)
        .transpose()?;

    let (emitter, events_tx, mut events_rx) = console::console_channel();
    let (session, _terminal) = Session::simulated(&config, persisted, emitter)?;

    let stdout = io::stdout();
    let clear_screen = stdout.is_terminal();
    let mut console = Console::new(profile, session, stdout, events_tx, clear_screen);
    console.welcome().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if console.handle_line(&line).await? == Flow::Exit {
                        break;
                    }
                }
                None => {
                    info!("Input closed");
                    break;
                }
            },
            Some(event) = events_rx.recv() => console.on_event(event).await?,
        }
    }

    console.finish().await?;
    info!(app = profile.app_name(), "Console stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// stdout belongs to the operator, so logs go to stderr or, when
/// `logging.file` is set, are appended to that file.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=hammer=trace` - Show trace for hammer crates only
/// - Default: WARN, INFO for hammer crates
fn init_tracing(logging: &LoggingSettings) -> ConsoleResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,hammer=info"));

    let result = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init(),
    };

    result.map_err(|e| ConsoleError::new(ErrorCode::Internal, format!("Logging setup failed: {}", e)))
}
