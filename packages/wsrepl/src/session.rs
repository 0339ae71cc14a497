//! The session loop.
//!
//! One task owns everything mutable: the command queue, both editors and the
//! receiving ends of the key and message channels. Each iteration services
//! exactly one source. Queued commands go first and run to the end of their
//! chain; only when the queue is empty does the loop wait on cancellation,
//! keys and socket messages.

use std::collections::VecDeque;
use std::io::Write;

use crossterm::style::Stylize;
use line_editor::{Editor, Key};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{self, Command, ExecutionContext, Factory, HIDE_CURSOR, SHOW_CURSOR};
use crate::connection::{Connection, Message};
use crate::error::{Error, Result};
use crate::formatter::Formatter;

pub struct Session<'s> {
    pub connection: &'s dyn Connection,
    pub keys: mpsc::Receiver<Key>,
    pub messages: mpsc::Receiver<Message>,
    pub factory: Factory,
    pub request_editor: Editor,
    pub command_editor: Editor,
    pub formatter: Box<dyn Formatter>,
    pub output_file: Option<Box<dyn Write + Send>>,
    pub cancel: CancellationToken,
}

impl Session<'_> {
    /// Runs until a command fails, an input closes, or the user exits.
    ///
    /// A user exit (or cancellation) is `Ok`. Teardown runs in every case.
    pub async fn run(&mut self, output: &mut dyn Write, initial: Vec<Command>) -> Result<()> {
        write!(output, "{HIDE_CURSOR}")?;
        output.flush()?;
        info!(host = self.connection.hostname(), queued = initial.len(), "session started");

        let result = self.event_loop(output, initial.into()).await;
        self.teardown(output);

        match result {
            Err(e) if e.is_interrupted() => {
                info!("session ended by user");
                Ok(())
            }
            Err(e) => {
                warn!("session failed: {}", e);
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    async fn event_loop(
        &mut self,
        output: &mut dyn Write,
        mut queue: VecDeque<Command>,
    ) -> Result<()> {
        loop {
            if let Some(command) = queue.pop_front() {
                let mut ctx = ExecutionContext {
                    input: &mut self.keys,
                    output: &mut *output,
                    output_file: self.output_file.as_deref_mut().map(|f| f as &mut dyn Write),
                    formatter: self.formatter.as_ref(),
                    connection: self.connection,
                    messages: &mut self.messages,
                    request_editor: &mut self.request_editor,
                    command_editor: &mut self.command_editor,
                    factory: &self.factory,
                    cancel: &self.cancel,
                };
                command::run(command, &mut ctx).await?;
                continue;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Err(Error::Interrupted),

                key = self.keys.recv() => match key {
                    None => return Err(Error::StreamClosed),
                    Some(Key::Esc | Key::CtrlC | Key::CtrlD) => queue.push_back(Command::Exit),
                    Some(Key::Enter) => queue.push_back(Command::Edit {
                        content: String::new(),
                    }),
                    Some(Key::Char(':')) => queue.push_back(Command::CmdEdit),
                    Some(key) => trace!(?key, "idle key ignored"),
                },

                message = self.messages.recv() => match message {
                    None => return Err(Error::ConnectionClosed),
                    Some(message) => queue.push_back(Command::PrintMsg { message }),
                },
            }
        }
    }

    fn teardown(&mut self, output: &mut dyn Write) {
        let _ = write!(output, "{SHOW_CURSOR}");

        let histories = [
            ("request", &mut self.request_editor),
            ("command", &mut self.command_editor),
        ];
        for (name, editor) in histories {
            match editor.history_mut().flush() {
                Ok(()) => debug!(name, "history saved"),
                Err(e) => {
                    warn!(name, "history flush failed: {}", e);
                    let line = format!("Failed to save {name} history: {e}");
                    let _ = writeln!(output, "{}", line.red());
                }
            }
        }

        if let Some(file) = self.output_file.as_mut() {
            if let Err(e) = file.flush() {
                warn!("output file flush failed: {}", e);
            }
        }
        let _ = output.flush();
    }
}
