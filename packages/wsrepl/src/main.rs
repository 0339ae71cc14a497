use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::prelude::*;

use line_editor::{Dictionary, Editor, FileHistory};

mod command;
mod config;
mod connection;
mod error;
mod formatter;
mod keyboard;
mod session;
mod terminal;

use crate::command::macros::MacroRepo;
use crate::command::{Command, Factory};
use crate::config::{FileConfig, WsReplConfig, load_config};
use crate::connection::{ConnectOptions, Connection, WsConnection};
use crate::formatter::JsonFormatter;
use crate::keyboard::KeyboardReader;
use crate::session::Session;
use crate::terminal::TerminalGuard;

#[derive(Parser, Debug)]
#[command(name = "wsrepl")]
#[command(about = "Interactive terminal client for WebSocket servers")]
struct Cli {
    /// WebSocket URL (ws:// or wss://)
    url: String,

    /// Accept invalid TLS certificates and host names
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Send this request as soon as the connection is up
    #[arg(short, long)]
    request: Option<String>,

    /// Append every printed message to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// With --request: wait this many seconds for a response, then exit
    #[arg(short = 't', long, value_name = "SECONDS")]
    wait_timeout: Option<f64>,

    /// Extra handshake header, repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// YAML list of commands to run on start
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Print the handshake and log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Custom data directory (defaults to ~/.wsrepl)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("Error: {e:#}").red());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = WsReplConfig::new(cli.data_dir.clone())?;
    init_logging(&config, cli.verbose)?;

    let file_config: FileConfig = load_config(&config.data_dir)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", config.config_toml_path().display()))?;

    let initial = initial_commands(&cli)?;

    let opts = ConnectOptions {
        url: cli.url.clone(),
        headers: cli.headers.clone(),
        insecure: cli.insecure,
        buffer: file_config.channels.messages,
        verbose: cli.verbose,
    };
    let (connection, messages) = WsConnection::connect(&opts)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.url))?;

    let macros_dir = config.macros_dir(file_config.macros_dir.as_deref());
    let macros = MacroRepo::load_from_dir(&macros_dir, connection.hostname())
        .with_context(|| format!("Failed to load macros from {}", macros_dir.display()))?;
    if !macros.is_empty() {
        info!(count = macros.len(), "macros available");
    }
    let factory = Factory::new(macros);

    let paste_threshold = file_config.editor.paste_threshold();
    let request_history =
        FileHistory::load(config.request_history_path(), file_config.history.request_limit)
            .context("Failed to load request history")?;
    let command_history =
        FileHistory::load(config.command_history_path(), file_config.history.command_limit)
            .context("Failed to load command history")?;
    let request_editor = Editor::new(Box::new(request_history), None, false)
        .with_paste_threshold(paste_threshold);
    let command_editor = Editor::new(
        Box::new(command_history),
        Some(Dictionary::new(factory.verbs())),
        true,
    )
    .with_paste_threshold(paste_threshold);

    let output_file = match &cli.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open output file {}", path.display()))?;
            Some(Box::new(BufWriter::new(file)) as Box<dyn Write + Send>)
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let signals = spawn_signal_watcher(cancel.clone());

    let guard = TerminalGuard::new();
    guard
        .enter_raw_mode()
        .context("Failed to put the terminal into raw mode")?;
    let (keyboard, keys) =
        KeyboardReader::spawn(file_config.channels.keys).context("Failed to start key reader")?;

    let mut session = Session {
        connection: &connection,
        keys,
        messages,
        factory,
        request_editor,
        command_editor,
        formatter: Box::new(JsonFormatter),
        output_file,
        cancel,
    };
    let mut stdout = io::stdout();
    let result = session.run(&mut stdout, initial).await;

    drop(session);
    keyboard.stop();
    connection.close().await;
    signals.abort();
    drop(guard);

    info!("wsrepl exiting");
    result.map_err(anyhow::Error::from)
}

/// Commands queued before the first key press.
fn initial_commands(cli: &Cli) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    if let Some(path) = &cli.input {
        commands.push(Command::InputFile { path: path.clone() });
    }
    if let Some(request) = &cli.request {
        if request.trim().is_empty() {
            return Err(error::Error::EmptyRequest.into());
        }
        commands.push(Command::Send {
            request: request.clone(),
        });
        if let Some(secs) = cli.wait_timeout {
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| error::Error::InvalidTimeout(secs.to_string()))?;
            commands.push(Command::WaitForResp {
                timeout: (!timeout.is_zero()).then_some(timeout),
            });
            commands.push(Command::Exit);
        }
    }
    if commands.is_empty() {
        commands.push(Command::Edit {
            content: String::new(),
        });
    }
    Ok(commands)
}

/// Logs go to a file: the terminal belongs to the editor.
fn init_logging(config: &WsReplConfig, verbose: bool) -> Result<()> {
    tracing::subscriber::set_global_default(log_subscriber(config, verbose)?)
        .context("Failed to install log subscriber")?;
    info!(data_dir = %config.data_dir.display(), "wsrepl starting");
    Ok(())
}

fn log_subscriber(
    config: &WsReplConfig,
    verbose: bool,
) -> Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let default_directive = if verbose {
        "wsrepl=debug,line_editor=debug,info"
    } else {
        "wsrepl=info,line_editor=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let log_path = config.log_path();
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    Ok(tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false),
        )
        .with(env_filter))
}

/// SIGTERM and SIGHUP end the session the same way Exit does.
fn spawn_signal_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let (Ok(mut term), Ok(mut hup)) = (
                signal(SignalKind::terminate()),
                signal(SignalKind::hangup()),
            ) else {
                tracing::warn!("signal handlers unavailable");
                return;
            };
            tokio::select! {
                _ = term.recv() => info!("SIGTERM received"),
                _ = hup.recv() => info!("SIGHUP received"),
            }
        }
        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
        }
        cancel.cancel();
    })
}
