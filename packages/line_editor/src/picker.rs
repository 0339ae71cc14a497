//! Fuzzy history picker overlay.
//!
//! Runs its own key loop over the same stream the editor uses; the two never
//! read it at the same time.

use std::io::Write;

use crossterm::style::Stylize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::EditError;
use crate::fuzzy::FuzzyMatch;
use crate::history::History;
use crate::keys::Key;

/// Maximum number of matches shown at once.
pub const MAX_ROWS: usize = 10;

const DEFAULT_WIDTH: usize = 80;

const QUERY_LABEL: &str = "search:";

struct Picker<'h> {
    history: &'h dyn History,
    query: String,
    selected: usize,
    matches: Vec<FuzzyMatch>,
    rendered_rows: usize,
    width: usize,
}

impl<'h> Picker<'h> {
    fn new(history: &'h dyn History, width: usize) -> Self {
        Self {
            history,
            query: String::new(),
            selected: 0,
            matches: Vec::new(),
            rendered_rows: 0,
            width,
        }
    }

    fn visible(&self) -> usize {
        self.matches.len().min(MAX_ROWS)
    }

    /// Re-queries the history; selection goes back to the best match.
    fn refresh(&mut self) -> String {
        self.matches = self.history.fuzzy_search(&self.query);
        self.selected = 0;
        self.redraw()
    }

    fn select_prev(&mut self) -> String {
        self.selected = self.selected.saturating_sub(1);
        self.redraw()
    }

    fn select_next(&mut self) -> String {
        if self.selected + 1 < self.visible() {
            self.selected += 1;
        }
        self.redraw()
    }

    fn picked(&self) -> String {
        self.matches
            .get(self.selected)
            .map(|m| m.request.clone())
            .unwrap_or_default()
    }

    /// Erases the overlay; the terminal cursor is on its last row.
    fn clear(&mut self) -> String {
        let mut out = String::new();
        if self.rendered_rows == 0 {
            return out;
        }
        for _ in 1..self.rendered_rows {
            out.push_str("\x1b[2K\x1b[A");
        }
        out.push_str("\x1b[2K\r");
        self.rendered_rows = 0;
        out
    }

    fn redraw(&mut self) -> String {
        let mut out = self.clear();
        let mut rows = Vec::with_capacity(MAX_ROWS + 2);

        for (i, m) in self.matches.iter().take(MAX_ROWS).enumerate() {
            rows.push(self.render_match(m, i == self.selected));
        }
        if self.matches.is_empty() {
            rows.push("No matches".dim().to_string());
        } else if self.matches.len() > MAX_ROWS {
            rows.push(format!("+{} more", self.matches.len() - MAX_ROWS).dim().to_string());
        }
        rows.push(self.render_query());

        self.rendered_rows = rows.len();
        out.push_str(&rows.join("\n"));
        out
    }

    /// The query row never wraps: a long query scrolls to keep its tail.
    fn render_query(&self) -> String {
        let limit = self.width.saturating_sub(QUERY_LABEL.len() + 1).max(1);
        let len = self.query.chars().count();
        let tail: String = self.query.chars().skip(len.saturating_sub(limit)).collect();
        format!("{} {tail}", QUERY_LABEL.bold())
    }

    fn render_match(&self, m: &FuzzyMatch, selected: bool) -> String {
        let limit = self.width.saturating_sub(3);
        // Entries are shown on one row each.
        let glyphs = m
            .request
            .chars()
            .map(|c| if c == '\n' { '↵' } else { c })
            .take(limit);

        if selected {
            let row: String = glyphs.collect();
            return format!("> {row}").reverse().to_string();
        }

        let mut row = String::from("  ");
        for (i, c) in glyphs.enumerate() {
            if m.positions.contains(&i) {
                row.push_str(&c.bold().to_string());
            } else {
                row.push(c);
            }
        }
        row
    }
}

/// Lets the user pick a history entry by fuzzy query.
///
/// Returns the picked request, or an empty string when nothing matched.
/// Esc, Ctrl+C, Ctrl+D and cancellation abort with [`EditError::Interrupted`].
/// The overlay is always erased before returning.
pub async fn pick<W: Write + ?Sized>(
    history: &dyn History,
    input: &mut mpsc::Receiver<Key>,
    output: &mut W,
    cancel: &CancellationToken,
) -> Result<String, EditError> {
    let width = crossterm::terminal::size().map_or(DEFAULT_WIDTH, |(cols, _)| cols as usize);
    let mut picker = Picker::new(history, width);

    output.write_all(picker.refresh().as_bytes())?;
    output.flush()?;

    loop {
        let key = tokio::select! {
            _ = cancel.cancelled() => {
                output.write_all(picker.clear().as_bytes())?;
                output.flush()?;
                return Err(EditError::Interrupted);
            }
            key = input.recv() => key,
        };
        let Some(key) = key else {
            output.write_all(picker.clear().as_bytes())?;
            output.flush()?;
            return Err(EditError::StreamClosed);
        };

        let diff = match key {
            Key::Esc | Key::CtrlC | Key::CtrlD => {
                output.write_all(picker.clear().as_bytes())?;
                output.flush()?;
                return Err(EditError::Interrupted);
            }
            Key::Enter => {
                let picked = picker.picked();
                debug!(query = %picker.query, "history entry picked");
                output.write_all(picker.clear().as_bytes())?;
                output.flush()?;
                return Ok(picked);
            }
            Key::Up => picker.select_prev(),
            Key::Down => picker.select_next(),
            Key::Backspace => {
                picker.query.pop();
                picker.refresh()
            }
            Key::CtrlU => {
                picker.query.clear();
                picker.refresh()
            }
            Key::Space => {
                picker.query.push(' ');
                picker.refresh()
            }
            Key::Char(c) => {
                picker.query.push(c);
                picker.refresh()
            }
            _ => continue,
        };

        output.write_all(diff.as_bytes())?;
        output.flush()?;
    }
}
