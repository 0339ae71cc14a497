use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::Command;
use super::macros::{MAX_MACRO_DEPTH, MacroRepo};
use crate::connection::{Message, MessageType};
use crate::error::{Error, Result};

/// Built-in verbs. They win over macros of the same name.
pub const VERBS: &[&str] = &[
    "exit", "edit", "editcmd", "send", "print", "wait", "repeat", "sleep", "input",
];

/// Parses command lines into [`Command`]s.
#[derive(Debug, Default)]
pub struct Factory {
    macros: MacroRepo,
}

impl Factory {
    pub fn new(macros: MacroRepo) -> Self {
        Self { macros }
    }

    /// Every word that may start a command line.
    pub fn verbs(&self) -> impl Iterator<Item = &str> {
        VERBS.iter().copied().chain(self.macros.names())
    }

    pub fn create(&self, line: &str) -> Result<Command> {
        self.create_at_depth(line, 0)
    }

    fn create_at_depth(&self, line: &str, depth: usize) -> Result<Command> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::EmptyCommand);
        }
        let (verb, rest) = split_first(line);

        match verb {
            "exit" => Ok(Command::Exit),
            "edit" => Ok(Command::Edit {
                content: rest.to_string(),
            }),
            "editcmd" => Ok(Command::CmdEdit),
            "send" if rest.is_empty() => Err(Error::EmptyRequest),
            "send" => Ok(Command::Send {
                request: rest.to_string(),
            }),
            "print" => {
                let (kind, data) = split_first(rest);
                if kind.is_empty() {
                    return Err(Error::EmptyRequest);
                }
                let kind = MessageType::parse(kind)?;
                if data.is_empty() {
                    return Err(Error::EmptyRequest);
                }
                Ok(Command::PrintMsg {
                    message: Message {
                        kind,
                        data: data.to_string(),
                    },
                })
            }
            "wait" if rest.is_empty() => Ok(Command::WaitForResp { timeout: None }),
            "wait" => {
                let timeout =
                    parse_seconds(rest).ok_or_else(|| Error::InvalidTimeout(rest.to_string()))?;
                Ok(Command::WaitForResp {
                    timeout: (!timeout.is_zero()).then_some(timeout),
                })
            }
            "repeat" => {
                let (count, sub) = split_first(rest);
                let times = count
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidRepeatCount(count.to_string()))?;
                let command = self.create_at_depth(sub, depth)?;
                Ok(Command::Repeat {
                    times,
                    command: Box::new(command),
                })
            }
            "sleep" => parse_seconds(rest)
                .map(Command::Sleep)
                .ok_or_else(|| Error::InvalidDuration(rest.to_string())),
            "input" if rest.is_empty() => Err(Error::EmptyCommand),
            "input" => Ok(Command::InputFile {
                path: PathBuf::from(rest),
            }),
            name => self.expand_macro(name, rest, depth),
        }
    }

    fn expand_macro(&self, name: &str, rest: &str, depth: usize) -> Result<Command> {
        let Some(templates) = self.macros.get(name) else {
            return Err(Error::UnknownCommand(name.to_string()));
        };
        if depth >= MAX_MACRO_DEPTH {
            return Err(Error::MacroDepthExceeded(MAX_MACRO_DEPTH));
        }

        let args: Vec<&str> = rest.split_whitespace().collect();
        debug!(name, args = args.len(), depth, "expanding macro");

        let mut commands = templates
            .iter()
            .map(|template| {
                let line = template.render(name, &args)?;
                self.create_at_depth(&line, depth + 1)
            })
            .collect::<Result<Vec<_>>>()?;

        match commands.len() {
            0 => Err(Error::EmptyMacro(name.to_string())),
            1 => Ok(commands.remove(0)),
            _ => Ok(Command::Sequence(commands)),
        }
    }
}

/// Splits at the first run of whitespace. Both halves come back trimmed.
fn split_first(s: &str) -> (&str, &str) {
    match s.trim().split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s.trim(), ""),
    }
}

/// Non-negative decimal seconds.
fn parse_seconds(s: &str) -> Option<Duration> {
    let secs = s.parse::<f64>().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}
