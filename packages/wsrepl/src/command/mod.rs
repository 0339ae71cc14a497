//! Commands and the trampoline that runs them.
//!
//! A command does one step of work and may hand back the next step. One
//! user action (Enter at the idle prompt) can therefore cascade through
//! Edit, Send and PrintMsg without going back to the session loop, and any
//! step failing aborts the rest of the chain.

mod factory;
pub mod macros;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use crossterm::style::Stylize;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use line_editor::{Editor, Key};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use factory::Factory;

use crate::connection::{Connection, Message, MessageType};
use crate::error::{Error, Result};
use crate::formatter::Formatter;

pub const SHOW_CURSOR: &str = "\x1b[?25h";
pub const HIDE_CURSOR: &str = "\x1b[?25l";

/// Moves up onto a marker row and wipes it.
const ERASE_MARKER: &str = "\x1b[A\x1b[2K\r";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the request editor seeded with `content`.
    Edit { content: String },
    Send { request: String },
    PrintMsg { message: Message },
    /// Wait for the next inbound message. `None` waits forever.
    WaitForResp { timeout: Option<Duration> },
    /// Read one command line and run it.
    CmdEdit,
    Sequence(Vec<Command>),
    /// Load a YAML list of command lines.
    InputFile { path: PathBuf },
    Repeat { times: usize, command: Box<Command> },
    Sleep(Duration),
    Exit,
}

/// Everything a command may touch while it executes.
///
/// Borrowed from the session for a single [`run`]; holding `input` is what
/// gives a running editor sole ownership of the key stream.
pub struct ExecutionContext<'a> {
    pub input: &'a mut mpsc::Receiver<Key>,
    pub output: &'a mut dyn Write,
    pub output_file: Option<&'a mut dyn Write>,
    pub formatter: &'a dyn Formatter,
    pub connection: &'a dyn Connection,
    pub messages: &'a mut mpsc::Receiver<Message>,
    pub request_editor: &'a mut Editor,
    pub command_editor: &'a mut Editor,
    pub factory: &'a Factory,
    pub cancel: &'a CancellationToken,
}

/// Executes `command` and every successor it yields.
pub async fn run(command: Command, ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let mut next = Some(command);
    while let Some(command) = next.take() {
        debug!(command = command.name(), "executing");
        next = command.execute(ctx).await?;
    }
    Ok(())
}

// Sequence and Repeat run whole chains from inside execute, so the
// recursion goes through a box.
fn run_nested<'c, 'a: 'c>(
    command: Command,
    ctx: &'c mut ExecutionContext<'a>,
) -> LocalBoxFuture<'c, Result<()>> {
    run(command, ctx).boxed_local()
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Edit { .. } => "edit",
            Self::Send { .. } => "send",
            Self::PrintMsg { .. } => "print",
            Self::WaitForResp { .. } => "wait",
            Self::CmdEdit => "editcmd",
            Self::Sequence(_) => "sequence",
            Self::InputFile { .. } => "input",
            Self::Repeat { .. } => "repeat",
            Self::Sleep(_) => "sleep",
            Self::Exit => "exit",
        }
    }

    /// Runs one step, returning the step that must follow it.
    pub async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<Command>> {
        match self {
            Self::Edit { content } => edit(ctx, content).await,
            Self::Send { request } => {
                let message = ctx.connection.send(request).await?;
                Ok(Some(Self::PrintMsg { message }))
            }
            Self::PrintMsg { message } => {
                print_message(ctx, message)?;
                Ok(None)
            }
            Self::WaitForResp { timeout } => wait_for_response(ctx, *timeout).await,
            Self::CmdEdit => command_edit(ctx).await,
            Self::Sequence(commands) => {
                for command in commands {
                    run_nested(command.clone(), ctx).await?;
                }
                Ok(None)
            }
            Self::InputFile { path } => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read input file {}", path.display()))?;
                let lines: Vec<String> = serde_yaml::from_str(&raw)
                    .with_context(|| format!("Failed to parse input file {}", path.display()))?;
                let commands = lines
                    .iter()
                    .map(|line| ctx.factory.create(line))
                    .collect::<Result<Vec<_>>>()?;
                info!(path = %path.display(), commands = commands.len(), "input file loaded");
                Ok(Some(Self::Sequence(commands)))
            }
            Self::Repeat { times, command } => {
                for _ in 0..*times {
                    run_nested(command.as_ref().clone(), ctx).await?;
                }
                Ok(None)
            }
            Self::Sleep(duration) => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => Err(Error::Interrupted),
                    _ = tokio::time::sleep(*duration) => Ok(None),
                }
            }
            Self::Exit => Err(Error::Interrupted),
        }
    }
}

async fn edit(ctx: &mut ExecutionContext<'_>, content: &str) -> Result<Option<Command>> {
    write!(ctx.output, "{}\n{SHOW_CURSOR}", "→".green())?;
    ctx.output.flush()?;

    let result = ctx
        .request_editor
        .edit(&mut *ctx.input, &mut *ctx.output, ctx.cancel, content)
        .await;

    write!(ctx.output, "{HIDE_CURSOR}{ERASE_MARKER}")?;
    ctx.output.flush()?;

    let request = result?;
    if request.is_empty() {
        return Ok(None);
    }
    Ok(Some(Command::Send { request }))
}

async fn command_edit(ctx: &mut ExecutionContext<'_>) -> Result<Option<Command>> {
    write!(ctx.output, ":\n{SHOW_CURSOR}")?;
    ctx.output.flush()?;

    let result = ctx
        .command_editor
        .edit(&mut *ctx.input, &mut *ctx.output, ctx.cancel, "")
        .await;

    write!(ctx.output, "{HIDE_CURSOR}{ERASE_MARKER}")?;
    ctx.output.flush()?;

    let line = result?;
    if line.is_empty() {
        return Ok(None);
    }
    match ctx.factory.create(&line) {
        Ok(command) => Ok(Some(command)),
        Err(e) => {
            debug!(%line, error = %e, "command rejected");
            writeln!(ctx.output, "{}", format!("Error: {e}").red())?;
            ctx.output.flush()?;
            Ok(None)
        }
    }
}

fn print_message(ctx: &mut ExecutionContext<'_>, message: &Message) -> Result<()> {
    let (marker, plain) = match message.kind {
        MessageType::Request => ("→".green(), "→"),
        MessageType::Response => ("←".red(), "←"),
    };

    let body = ctx.formatter.format_message(message)?;
    writeln!(ctx.output, "{marker} {body}")?;
    ctx.output.flush()?;

    if let Some(file) = ctx.output_file.as_deref_mut() {
        let body = ctx.formatter.format_for_file(message)?;
        writeln!(file, "{plain} {body}")?;
        file.flush()?;
    }
    Ok(())
}

async fn wait_for_response(
    ctx: &mut ExecutionContext<'_>,
    timeout: Option<Duration>,
) -> Result<Option<Command>> {
    let messages = &mut *ctx.messages;
    let cancel = ctx.cancel;

    let received = async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, messages.recv())
                .await
                .map_err(|_| Error::Timeout),
            None => Ok(messages.recv().await),
        }
    };

    let message = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Interrupted),
        received = received => received?,
    };
    match message {
        Some(message) => Ok(Some(Command::PrintMsg { message })),
        None => Err(Error::ConnectionClosed),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Harness;
    use super::*;

    #[tokio::test]
    async fn test_exit_interrupts() {
        let mut h = Harness::new();
        let result = Command::Exit.execute(&mut h.ctx()).await;
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[tokio::test]
    async fn test_send_chains_into_print() {
        let mut h = Harness::new();
        let next = Command::Send { request: "ping".into() }
            .execute(&mut h.ctx())
            .await
            .unwrap();
        assert_eq!(
            next,
            Some(Command::PrintMsg {
                message: Message::request("ping")
            })
        );
        assert_eq!(h.connection.sent(), vec!["ping"]);
    }

    #[tokio::test]
    async fn test_print_writes_marker_and_file_copy() {
        let mut h = Harness::new();
        let message = Message::response(r#"{"a":1}"#);
        run(Command::PrintMsg { message }, &mut h.ctx()).await.unwrap();

        let out = h.output();
        assert!(out.contains('←'));
        assert!(out.contains("\"a\""));
        assert_eq!(h.file(), "← {\n  \"a\": 1\n}\n");
    }

    #[tokio::test]
    async fn test_edit_sends_submitted_request() {
        let mut h = Harness::new();
        h.type_text("hello").await;
        h.press(&[Key::CtrlS]).await;

        run(Command::Edit { content: String::new() }, &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.connection.sent(), vec!["hello"]);
        let out = h.output();
        assert!(out.contains(SHOW_CURSOR));
        assert!(out.contains(HIDE_CURSOR));
        assert!(out.ends_with(" hello\n"));
    }

    #[tokio::test]
    async fn test_edit_cancelled_ends_chain() {
        let mut h = Harness::new();
        h.type_text("draft").await;
        h.press(&[Key::Esc]).await;

        let next = Command::Edit { content: String::new() }
            .execute(&mut h.ctx())
            .await
            .unwrap();
        assert_eq!(next, None);
        assert!(h.connection.sent().is_empty());
    }

    #[tokio::test]
    async fn test_edit_abort_propagates() {
        let mut h = Harness::new();
        h.press(&[Key::CtrlC]).await;
        let result = run(Command::Edit { content: "x".into() }, &mut h.ctx()).await;
        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(h.output().ends_with(&format!("{HIDE_CURSOR}{ERASE_MARKER}")));
    }

    #[tokio::test]
    async fn test_wait_for_response_prints_message() {
        let mut h = Harness::new();
        h.messages.send(Message::response("pong")).await.unwrap();

        run(Command::WaitForResp { timeout: None }, &mut h.ctx())
            .await
            .unwrap();
        assert!(h.output().contains("pong"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_response_times_out() {
        let mut h = Harness::new();
        let result = Command::WaitForResp {
            timeout: Some(Duration::from_secs(2)),
        }
        .execute(&mut h.ctx())
        .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_wait_for_response_connection_closed() {
        let mut h = Harness::new();
        // Dropping the only sender closes the stream.
        let (replacement, _) = mpsc::channel(1);
        h.messages = replacement;
        let result = Command::WaitForResp { timeout: None }
            .execute(&mut h.ctx())
            .await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_wait_observes_cancellation() {
        let mut h = Harness::new();
        h.cancel.cancel();
        let result = Command::WaitForResp { timeout: None }
            .execute(&mut h.ctx())
            .await;
        assert!(matches!(result, Err(Error::Interrupted)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let mut h = Harness::new();
        let next = Command::Sleep(Duration::from_secs(30))
            .execute(&mut h.ctx())
            .await
            .unwrap();
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn test_sequence_runs_each_chain_in_order() {
        let mut h = Harness::new();
        let seq = Command::Sequence(vec![
            Command::Send { request: "a".into() },
            Command::Send { request: "b".into() },
        ]);
        run(seq, &mut h.ctx()).await.unwrap();

        assert_eq!(h.connection.sent(), vec!["a", "b"]);
        let out = h.output();
        assert!(out.find(" a\n").unwrap() < out.find(" b\n").unwrap());
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_error() {
        let mut h = Harness::new();
        let seq = Command::Sequence(vec![
            Command::Send { request: "a".into() },
            Command::Exit,
            Command::Send { request: "b".into() },
        ]);
        let result = run(seq, &mut h.ctx()).await;
        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(h.connection.sent(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_repeat() {
        let mut h = Harness::new();
        let cmd = Command::Repeat {
            times: 3,
            command: Box::new(Command::Send { request: "hi".into() }),
        };
        run(cmd, &mut h.ctx()).await.unwrap();
        assert_eq!(h.connection.sent(), vec!["hi", "hi", "hi"]);
    }

    #[tokio::test]
    async fn test_repeat_zero_is_noop() {
        let mut h = Harness::new();
        let cmd = Command::Repeat {
            times: 0,
            command: Box::new(Command::Exit),
        };
        run(cmd, &mut h.ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_aborts_repeat() {
        let mut h = Harness::new();
        h.connection.fail = true;
        let cmd = Command::Repeat {
            times: 2,
            command: Box::new(Command::Send { request: "hi".into() }),
        };
        assert!(matches!(
            run(cmd, &mut h.ctx()).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_cmd_edit_runs_parsed_command() {
        let mut h = Harness::new();
        h.type_text("send from prompt").await;
        h.press(&[Key::Enter]).await;

        run(Command::CmdEdit, &mut h.ctx()).await.unwrap();
        assert_eq!(h.connection.sent(), vec!["from prompt"]);
    }

    #[tokio::test]
    async fn test_cmd_edit_reports_bad_command() {
        let mut h = Harness::new();
        h.type_text("bogus").await;
        h.press(&[Key::Enter]).await;

        let next = Command::CmdEdit.execute(&mut h.ctx()).await.unwrap();
        assert_eq!(next, None);
        assert!(h.output().contains("unknown command: bogus"));
    }

    #[tokio::test]
    async fn test_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        std::fs::write(&path, "- send one\n- send two\n- wait 1.5\n").unwrap();

        let mut h = Harness::new();
        let next = Command::InputFile { path }.execute(&mut h.ctx()).await.unwrap();
        assert_eq!(
            next,
            Some(Command::Sequence(vec![
                Command::Send { request: "one".into() },
                Command::Send { request: "two".into() },
                Command::WaitForResp {
                    timeout: Some(Duration::from_millis(1500))
                },
            ]))
        );
    }

    #[tokio::test]
    async fn test_input_file_rejects_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        std::fs::write(&path, "- send one\n- sleep soon\n").unwrap();

        let mut h = Harness::new();
        let result = Command::InputFile { path }.execute(&mut h.ctx()).await;
        assert!(matches!(result, Err(Error::InvalidDuration(_))));
    }

    #[tokio::test]
    async fn test_input_file_must_be_a_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        std::fs::write(&path, "send one\n").unwrap();

        let mut h = Harness::new();
        let result = Command::InputFile { path }.execute(&mut h.ctx()).await;
        assert!(matches!(result, Err(Error::Other(_))));
    }

    #[tokio::test]
    async fn test_chains_terminate() {
        // Every non-composite step yields at most two successors before None.
        let mut h = Harness::new();
        h.messages.send(Message::response("r")).await.unwrap();
        for command in [
            Command::Send { request: "x".into() },
            Command::PrintMsg {
                message: Message::request("y"),
            },
            Command::WaitForResp { timeout: None },
            Command::Sleep(Duration::ZERO),
        ] {
            let mut next = Some(command);
            let mut steps = 0;
            while let Some(cmd) = next.take() {
                next = cmd.execute(&mut h.ctx()).await.unwrap();
                steps += 1;
                assert!(steps <= 3);
            }
        }
    }
}
