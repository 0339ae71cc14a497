//! Request history: traversal for Up/Down, word index for completion,
//! fuzzy ranking for Ctrl+R, and a line-oriented on-disk format.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dictionary::Dictionary;
use crate::fuzzy::{self, FuzzyMatch};

/// History contract consumed by the editor and the fuzzy picker.
pub trait History: Send {
    /// Appends a request unless it repeats the most recent one, and resets
    /// the traversal position past the end.
    fn add_request(&mut self, request: &str);

    /// Steps back one entry; `None` at the oldest entry.
    fn prev_request(&mut self) -> Option<String>;

    /// Steps forward one entry; `None` once past the newest entry.
    fn next_request(&mut self) -> Option<String>;

    fn reset_position(&mut self);

    /// Prefix completion over the words of past requests.
    fn search(&self, prefix: &str) -> Option<String>;

    /// Ranked matches, best first.
    fn fuzzy_search(&self, query: &str) -> Vec<FuzzyMatch>;

    /// Persists the history. Callers report failures rather than abort on them.
    fn flush(&mut self) -> io::Result<()>;
}

/// History kept in memory and persisted to a newline-delimited file.
///
/// Embedded newlines are stored as the two characters `\n`; only the most
/// recent `limit` entries are written.
#[derive(Debug)]
pub struct FileHistory {
    path: Option<PathBuf>,
    limit: usize,
    requests: Vec<String>,
    pos: usize,
    words: Dictionary,
}

impl FileHistory {
    /// History that is never written to disk.
    pub fn in_memory(limit: usize) -> Self {
        Self {
            path: None,
            limit,
            requests: Vec::new(),
            pos: 0,
            words: Dictionary::default(),
        }
    }

    /// Loads `path`; a missing file is an empty history.
    pub fn load(path: impl AsRef<Path>, limit: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut history = Self::in_memory(limit);

        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                for request in decode(&raw) {
                    history.words.add_words(&request);
                    history.requests.push(request);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        debug!(path = %path.display(), entries = history.requests.len(), "history loaded");
        history.path = Some(path);
        history.pos = history.requests.len();
        Ok(history)
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl History for FileHistory {
    fn add_request(&mut self, request: &str) {
        if self.requests.last().map(String::as_str) != Some(request) {
            self.words.add_words(request);
            self.requests.push(request.to_string());
        }
        self.reset_position();
    }

    fn prev_request(&mut self) -> Option<String> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        self.requests.get(self.pos).cloned()
    }

    fn next_request(&mut self) -> Option<String> {
        if self.pos + 1 >= self.requests.len() {
            self.pos = self.requests.len();
            return None;
        }
        self.pos += 1;
        self.requests.get(self.pos).cloned()
    }

    fn reset_position(&mut self) {
        self.pos = self.requests.len();
    }

    fn search(&self, prefix: &str) -> Option<String> {
        self.words.search(prefix)
    }

    fn fuzzy_search(&self, query: &str) -> Vec<FuzzyMatch> {
        fuzzy::rank(query, self.requests.iter().rev().map(String::as_str))
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let skip = self.requests.len().saturating_sub(self.limit);
        std::fs::write(path, encode(&self.requests[skip..]))?;
        debug!(path = %path.display(), entries = self.requests.len() - skip, "history flushed");
        Ok(())
    }
}

/// Serializes requests one per line. Backslashes are doubled and embedded
/// newlines become backslash-n, so JSON escapes survive a reload.
pub fn encode(requests: &[String]) -> String {
    let mut out = String::new();
    for request in requests {
        for ch in request.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                ch => out.push(ch),
            }
        }
        out.push('\n');
    }
    out
}

pub fn decode(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.is_empty())
        .map(unescape_line)
        .collect()
}

fn unescape_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            // Unknown or trailing escapes are kept as written.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
