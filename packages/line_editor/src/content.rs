//! Editable codepoint buffer.
//!
//! Every mutating operation returns the escape sequence that updates the
//! terminal from the previous buffer state to the new one. The buffer is
//! assumed to be drawn from column 0 of the row the cursor started on, with
//! `\n` translated to CR LF by the terminal (`ONLCR`) and single-width glyphs.

use std::fmt::{self, Write};

const CLEAR_LINE: &str = "\x1b[2K";
const CURSOR_UP: &str = "\x1b[A";
const BACKSPACE: char = '\x08';

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    text: Vec<char>,
    pos: usize,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor position as a codepoint index.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The submission value: the buffer with surrounding whitespace trimmed.
    pub fn to_request(&self) -> String {
        self.to_string().trim().to_string()
    }

    pub fn prev_symbol(&self) -> Option<char> {
        self.pos.checked_sub(1).map(|i| self.text[i])
    }

    /// The run of word characters immediately before the cursor.
    pub fn word_before_cursor(&self) -> String {
        let start = self.text[..self.pos]
            .iter()
            .rposition(|&c| !is_word_char(c))
            .map_or(0, |i| i + 1);
        self.slice(start, self.pos)
    }

    pub fn insert_symbol(&mut self, ch: char) -> String {
        let at_end = self.pos == self.text.len();
        self.text.insert(self.pos, ch);
        self.pos += 1;

        if at_end {
            return ch.to_string();
        }

        if ch == '\n' {
            // The row that was split is the one above the cursor now.
            let split_row = self.row_index(self.pos) - 1;
            return self.render_rows_from(split_row, 0);
        }

        let tail = self.slice(self.pos, self.row_end(self.pos));
        let back = tail.chars().count();
        let mut out = String::with_capacity(tail.len() + 8);
        out.push(ch);
        out.push_str(&tail);
        if back > 0 {
            let _ = write!(out, "\x1b[{back}D");
        }
        out
    }

    pub fn remove_prev_symbol(&mut self) -> String {
        if self.pos == 0 {
            return String::new();
        }
        self.pos -= 1;
        let removed = self.text.remove(self.pos);
        if removed != '\n' {
            return self.redraw_row();
        }

        // Cursor sat at column 0 of the row below the merged one.
        let merged_row = self.row_index(self.pos);
        format!("{CURSOR_UP}{}", self.render_rows_from(merged_row, 1))
    }

    pub fn remove_next_symbol(&mut self) -> String {
        if self.pos == self.text.len() {
            return String::new();
        }
        let removed = self.text.remove(self.pos);
        if removed != '\n' {
            return self.redraw_row();
        }
        self.render_rows_from(self.row_index(self.pos), 1)
    }

    pub fn move_position_left(&mut self) -> String {
        if self.pos == 0 {
            return String::new();
        }
        self.pos -= 1;
        if self.text[self.pos] == '\n' {
            // No way to backspace across rows: go up and reprint the row.
            let start = self.row_start(self.pos);
            return format!("{CURSOR_UP}\r{}", self.slice(start, self.pos));
        }
        BACKSPACE.to_string()
    }

    pub fn move_position_right(&mut self) -> String {
        if self.pos == self.text.len() {
            return String::new();
        }
        let ch = self.text[self.pos];
        self.pos += 1;
        ch.to_string()
    }

    pub fn move_to_prev_word(&mut self) -> String {
        let mut out = String::new();
        while self.pos > 0 && !is_word_char(self.text[self.pos - 1]) {
            out.push_str(&self.move_position_left());
        }
        while self.pos > 0 && is_word_char(self.text[self.pos - 1]) {
            out.push_str(&self.move_position_left());
        }
        out
    }

    pub fn move_to_next_word(&mut self) -> String {
        let mut out = String::new();
        while self.pos < self.text.len() && !is_word_char(self.text[self.pos]) {
            out.push_str(&self.move_position_right());
        }
        while self.pos < self.text.len() && is_word_char(self.text[self.pos]) {
            out.push_str(&self.move_position_right());
        }
        out
    }

    pub fn delete_to_prev_word(&mut self) -> String {
        let mut out = String::new();
        while self.pos > 0 && !is_word_char(self.text[self.pos - 1]) {
            out.push_str(&self.remove_prev_symbol());
        }
        while self.pos > 0 && is_word_char(self.text[self.pos - 1]) {
            out.push_str(&self.remove_prev_symbol());
        }
        out
    }

    pub fn delete_to_next_word(&mut self) -> String {
        let mut out = String::new();
        while self.pos < self.text.len() && !is_word_char(self.text[self.pos]) {
            out.push_str(&self.remove_next_symbol());
        }
        while self.pos < self.text.len() && is_word_char(self.text[self.pos]) {
            out.push_str(&self.remove_next_symbol());
        }
        out
    }

    pub fn move_to_row_start(&mut self) -> String {
        self.pos = self.row_start(self.pos);
        "\r".to_string()
    }

    pub fn move_to_row_end(&mut self) -> String {
        let end = self.row_end(self.pos);
        let passed = self.slice(self.pos, end);
        self.pos = end;
        passed
    }

    /// Moves to the end of the buffer by re-emitting everything after the cursor.
    pub fn move_to_end(&mut self) -> String {
        let passed = self.slice(self.pos, self.text.len());
        self.pos = self.text.len();
        passed
    }

    pub fn replace_text(&mut self, text: &str) -> String {
        let mut out = self.clear();
        self.text = text.chars().collect();
        self.pos = self.text.len();
        out.push_str(text);
        out
    }

    pub fn clear(&mut self) -> String {
        let mut out = self.move_to_end();
        let rows_above = self.text.iter().filter(|&&c| c == '\n').count();
        for _ in 0..rows_above {
            out.push_str(CLEAR_LINE);
            out.push_str(CURSOR_UP);
        }
        out.push_str(CLEAR_LINE);
        out.push('\r');

        self.text.clear();
        self.pos = 0;
        out
    }

    fn slice(&self, from: usize, to: usize) -> String {
        self.text[from..to].iter().collect()
    }

    fn row_start(&self, pos: usize) -> usize {
        self.text[..pos]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |i| i + 1)
    }

    fn row_end(&self, pos: usize) -> usize {
        self.text[pos..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.text.len(), |i| pos + i)
    }

    fn row_index(&self, pos: usize) -> usize {
        self.text[..pos].iter().filter(|&&c| c == '\n').count()
    }

    /// Rewrites the cursor's row and parks the cursor back on `pos`.
    fn redraw_row(&self) -> String {
        let start = self.row_start(self.pos);
        let end = self.row_end(self.pos);
        format!(
            "{CLEAR_LINE}\r{}\r{}",
            self.slice(start, end),
            self.slice(start, self.pos)
        )
    }

    /// Rewrites every row from `first_row` (where the terminal cursor is) to
    /// the end, blanks `stale_rows` rows below the last one, then moves back
    /// up to the cursor.
    fn render_rows_from(&self, first_row: usize, stale_rows: usize) -> String {
        let rows: Vec<&[char]> = self.text.split(|&c| c == '\n').collect();
        let mut out = String::new();

        for (i, row) in rows.iter().enumerate().skip(first_row) {
            if i > first_row {
                out.push('\n');
            }
            out.push_str(CLEAR_LINE);
            out.push('\r');
            out.extend(row.iter());
        }
        for _ in 0..stale_rows {
            out.push('\n');
            out.push_str(CLEAR_LINE);
        }

        let last_row = rows.len() - 1 + stale_rows;
        let up = last_row - self.row_index(self.pos);
        if up > 0 {
            let _ = write!(out, "\x1b[{up}A");
        }
        out.push('\r');
        out.push_str(&self.slice(self.row_start(self.pos), self.pos));
        out
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.text.iter().try_for_each(|c| f.write_char(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str, pos: usize) -> Content {
        Content {
            text: text.chars().collect(),
            pos,
        }
    }

    #[test]
    fn test_insert_at_end_emits_only_glyph() {
        let mut c = Content::new();
        assert_eq!(c.insert_symbol('a'), "a");
        assert_eq!(c.insert_symbol('\n'), "\n");
        assert_eq!(c.to_string(), "a\n");
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn test_insert_mid_row() {
        let mut c = content("held", 3);
        assert_eq!(c.insert_symbol('l'), "ld\x1b[1D");
        assert_eq!(c.to_string(), "helld");
        assert_eq!(c.position(), 4);
    }

    #[test]
    fn test_insert_newline_mid_buffer() {
        let mut c = content("ab\ncd", 1);
        let out = c.insert_symbol('\n');
        assert_eq!(c.to_string(), "a\nb\ncd");
        assert_eq!(c.position(), 2);
        assert_eq!(
            out,
            "\x1b[2K\ra\n\x1b[2K\rb\n\x1b[2K\rcd\x1b[1A\r"
        );
    }

    #[test]
    fn test_remove_prev_symbol_redraws_row() {
        let mut c = content("hello world", 6);
        assert_eq!(c.remove_prev_symbol(), "\x1b[2K\rhelloworld\rhello");
        assert_eq!(c.to_string(), "helloworld");
        assert_eq!(c.position(), 5);
    }

    #[test]
    fn test_remove_prev_newline_merges_rows() {
        let mut c = content("ab\ncd\nef", 3);
        let out = c.remove_prev_symbol();
        assert_eq!(c.to_string(), "abcd\nef");
        assert_eq!(c.position(), 2);
        assert_eq!(
            out,
            "\x1b[A\x1b[2K\rabcd\n\x1b[2K\ref\n\x1b[2K\x1b[2A\rab"
        );
    }

    #[test]
    fn test_remove_next_newline_merges_rows() {
        let mut c = content("ab\ncd", 2);
        let out = c.remove_next_symbol();
        assert_eq!(c.to_string(), "abcd");
        assert_eq!(out, "\x1b[2K\rabcd\n\x1b[2K\x1b[1A\rab");
    }

    #[test]
    fn test_remove_at_bounds_is_noop() {
        let mut c = content("ab", 0);
        assert_eq!(c.remove_prev_symbol(), "");
        c.pos = 2;
        assert_eq!(c.remove_next_symbol(), "");
        assert_eq!(c.to_string(), "ab");
    }

    #[test]
    fn test_move_across_newline() {
        let mut c = content("ab\ncd", 3);
        assert_eq!(c.move_position_left(), "\x1b[A\rab");
        assert_eq!(c.position(), 2);
        assert_eq!(c.move_position_right(), "\n");
        assert_eq!(c.position(), 3);
        assert_eq!(c.move_position_left(), "\x1b[A\rab");
        assert_eq!(c.move_position_left(), "\x08");
    }

    #[test]
    fn test_word_motion() {
        let mut c = content("foo bar-baz", 11);
        c.move_to_prev_word();
        assert_eq!(c.position(), 8);
        c.move_to_prev_word();
        assert_eq!(c.position(), 4);
        c.move_to_next_word();
        assert_eq!(c.position(), 7);
        c.move_to_next_word();
        assert_eq!(c.position(), 11);
    }

    #[test]
    fn test_delete_words() {
        let mut c = content("foo bar baz", 7);
        c.delete_to_prev_word();
        assert_eq!(c.to_string(), "foo  baz");
        assert_eq!(c.position(), 4);
        c.delete_to_next_word();
        assert_eq!(c.to_string(), "foo ");
    }

    #[test]
    fn test_row_start_and_end() {
        let mut c = content("ab\ncde", 4);
        assert_eq!(c.move_to_row_start(), "\r");
        assert_eq!(c.position(), 3);
        assert_eq!(c.move_to_row_end(), "cde");
        assert_eq!(c.position(), 6);
    }

    #[test]
    fn test_clear_erases_every_row() {
        let mut c = content("a\nb\nc", 0);
        let out = c.clear();
        assert_eq!(
            out,
            "a\nb\nc\x1b[2K\x1b[A\x1b[2K\x1b[A\x1b[2K\r"
        );
        assert!(c.is_empty());
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn test_replace_text() {
        let mut c = content("old", 3);
        let out = c.replace_text("new");
        assert!(out.ends_with("\x1b[2K\rnew"));
        assert_eq!(c.to_string(), "new");
        assert_eq!(c.position(), 3);
    }

    #[test]
    fn test_to_request_and_prev_symbol() {
        let c = content("  {\"a\": 1}\n ", 3);
        assert_eq!(c.to_request(), "{\"a\": 1}");
        assert_eq!(c.prev_symbol(), Some('{'));
        assert_eq!(Content::new().prev_symbol(), None);
    }

    #[test]
    fn test_multibyte_indexing() {
        let mut c = Content::new();
        for ch in "héllo".chars() {
            c.insert_symbol(ch);
        }
        c.move_position_left();
        c.move_position_left();
        c.move_position_left();
        assert_eq!(c.remove_prev_symbol(), "\x1b[2K\rhllo\rh");
        assert_eq!(c.to_string(), "hllo");
    }

    #[test]
    fn test_word_before_cursor() {
        let c = content("send hel", 8);
        assert_eq!(c.word_before_cursor(), "hel");
        let c = content("send ", 5);
        assert_eq!(c.word_before_cursor(), "");
    }
}
