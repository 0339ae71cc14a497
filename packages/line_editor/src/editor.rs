use std::io::{self, Write};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::BELL;
use crate::content::Content;
use crate::dictionary::Dictionary;
use crate::error::EditError;
use crate::history::History;
use crate::keys::Key;
use crate::picker;

/// Keys arriving faster than this are treated as pasted input.
pub const PASTE_THRESHOLD: Duration = Duration::from_micros(250);

/// Interprets key events as edits of a single [`Content`] buffer.
///
/// In multi-line mode Enter submits unless the previous glyph is a backslash
/// (continuation: the backslash becomes a newline) or the key is part of a
/// paste burst. Ctrl+S always submits.
pub struct Editor {
    content: Content,
    history: Box<dyn History>,
    dictionary: Option<Dictionary>,
    single_line: bool,
    last_key: Option<Instant>,
    paste_threshold: Duration,
}

impl Editor {
    /// Without a dictionary, Tab completes from the history's word index.
    pub fn new(history: Box<dyn History>, dictionary: Option<Dictionary>, single_line: bool) -> Self {
        Self {
            content: Content::new(),
            history,
            dictionary,
            single_line,
            last_key: None,
            paste_threshold: PASTE_THRESHOLD,
        }
    }

    pub fn with_paste_threshold(mut self, threshold: Duration) -> Self {
        self.paste_threshold = threshold;
        self
    }

    pub fn history_mut(&mut self) -> &mut dyn History {
        self.history.as_mut()
    }

    /// Runs one edit session seeded with `initial`.
    ///
    /// Returns the trimmed request on submit, an empty string when the user
    /// cancels with Esc, and [`EditError::Interrupted`] on Ctrl+C / Ctrl+D or
    /// cancellation. The buffer is erased from the screen in every case.
    pub async fn edit<W: Write + ?Sized>(
        &mut self,
        input: &mut mpsc::Receiver<Key>,
        output: &mut W,
        cancel: &CancellationToken,
        initial: &str,
    ) -> Result<String, EditError> {
        self.history.reset_position();
        let diff = self.content.replace_text(initial);
        emit(output, &diff)?;

        loop {
            let key = tokio::select! {
                _ = cancel.cancelled() => {
                    let diff = self.content.clear();
                    emit(output, &diff)?;
                    return Err(EditError::Interrupted);
                }
                key = input.recv() => key,
            };
            let Some(key) = key else {
                return Err(EditError::StreamClosed);
            };

            let now = Instant::now();
            let pasting = self
                .last_key
                .is_some_and(|last| now.duration_since(last) < self.paste_threshold);
            self.last_key = Some(now);
            trace!(?key, pasting, "editor key");

            let diff = match key {
                Key::CtrlC | Key::CtrlD => {
                    let diff = self.content.clear();
                    emit(output, &diff)?;
                    return Err(EditError::Interrupted);
                }
                Key::CtrlS => return self.submit(output),
                Key::Esc => {
                    let diff = self.content.clear();
                    emit(output, &diff)?;
                    return Ok(String::new());
                }
                Key::Alt('b') => self.content.move_to_prev_word(),
                Key::Alt('f') => self.content.move_to_next_word(),
                Key::Alt('d') => self.content.delete_to_next_word(),
                Key::Alt(_) => continue,
                Key::AltBackspace => self.content.delete_to_prev_word(),
                Key::CtrlU => self.content.clear(),
                Key::Space => self.content.insert_symbol(' '),
                Key::Char(ch) => self.content.insert_symbol(ch),
                Key::Enter if self.single_line => return self.submit(output),
                Key::Enter => {
                    if self.content.prev_symbol() == Some('\\') {
                        let mut diff = self.content.remove_prev_symbol();
                        diff.push_str(&self.content.insert_symbol('\n'));
                        diff
                    } else if pasting {
                        self.content.insert_symbol('\n')
                    } else {
                        return self.submit(output);
                    }
                }
                Key::Backspace => self.content.remove_prev_symbol(),
                Key::Delete => self.content.remove_next_symbol(),
                Key::Left => self.content.move_position_left(),
                Key::Right => self.content.move_position_right(),
                Key::Up => match self.history.prev_request() {
                    Some(request) => self.content.replace_text(&request),
                    None => BELL.to_string(),
                },
                Key::Down => match self.history.next_request() {
                    Some(request) => self.content.replace_text(&request),
                    None => BELL.to_string(),
                },
                Key::Tab => self.complete(),
                Key::Home => self.content.move_to_row_start(),
                Key::End => self.content.move_to_row_end(),
                Key::CtrlR => self.search_history(input, output, cancel).await?,
            };

            emit(output, &diff)?;
        }
    }

    fn submit<W: Write + ?Sized>(&mut self, output: &mut W) -> Result<String, EditError> {
        let request = self.content.to_request();
        let diff = self.content.clear();
        emit(output, &diff)?;
        if !request.is_empty() {
            self.history.add_request(&request);
        }
        Ok(request)
    }

    fn complete(&mut self) -> String {
        if self.content.is_empty() {
            return String::new();
        }
        let prefix = self.content.word_before_cursor();
        if prefix.is_empty() {
            return String::new();
        }

        let completion = match &self.dictionary {
            Some(dictionary) => dictionary.search(&prefix),
            None => self.history.search(&prefix),
        };
        let Some(word) = completion else {
            return String::new();
        };

        word.chars()
            .skip(prefix.chars().count())
            .map(|ch| self.content.insert_symbol(ch))
            .collect()
    }

    /// Swaps the buffer for the fuzzy picker; an aborted pick restores it.
    async fn search_history<W: Write + ?Sized>(
        &mut self,
        input: &mut mpsc::Receiver<Key>,
        output: &mut W,
        cancel: &CancellationToken,
    ) -> Result<String, EditError> {
        let previous = self.content.to_string();
        let diff = self.content.clear();
        emit(output, &diff)?;

        let restored = match picker::pick(self.history.as_ref(), input, output, cancel).await {
            Ok(picked) if !picked.is_empty() => picked,
            Ok(_) => previous,
            Err(EditError::Interrupted) if !cancel.is_cancelled() => previous,
            Err(e) => return Err(e),
        };
        Ok(self.content.replace_text(&restored))
    }
}

fn emit<W: Write + ?Sized>(output: &mut W, diff: &str) -> io::Result<()> {
    if diff.is_empty() {
        return Ok(());
    }
    output.write_all(diff.as_bytes())?;
    output.flush()
}
