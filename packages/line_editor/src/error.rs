use std::io;

/// Ways an interactive edit can end without producing a value.
///
/// A cancelled edit (bare Esc) is not an error: it returns an empty string.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// The user aborted (Ctrl+C / Ctrl+D) or the session was cancelled.
    #[error("interrupted")]
    Interrupted,

    /// The key stream ended while an edit was in progress.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}
