//! Line Editor - interactive request editing for raw-mode terminals
//!
//! The editing surface is a codepoint buffer whose every mutation returns the
//! escape sequence that brings the terminal in sync with it. Nothing here
//! repaints the whole screen; callers write each returned diff verbatim.
//!
//! # Example
//!
//! ```no_run
//! use line_editor::{Editor, FileHistory, Key};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let history = FileHistory::load("/tmp/history", 100).unwrap();
//!     let mut editor = Editor::new(Box::new(history), None, false);
//!
//!     let (tx, mut rx) = mpsc::channel(64);
//!     tx.send(Key::Char('h')).await.unwrap();
//!     tx.send(Key::Char('i')).await.unwrap();
//!     tx.send(Key::CtrlS).await.unwrap();
//!
//!     let mut out = Vec::new();
//!     let cancel = CancellationToken::new();
//!     let request = editor.edit(&mut rx, &mut out, &cancel, "").await.unwrap();
//!     assert_eq!(request, "hi");
//! }
//! ```

pub mod content;
mod dictionary;
pub mod editor;
mod error;
pub mod fuzzy;
pub mod history;
mod keys;
pub mod picker;

pub use content::Content;
pub use dictionary::Dictionary;
pub use editor::Editor;
pub use error::EditError;
pub use fuzzy::FuzzyMatch;
pub use history::{FileHistory, History};
pub use keys::Key;

/// Terminal bell, written when a key has nothing to act on.
pub const BELL: &str = "\x07";
