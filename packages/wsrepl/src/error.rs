use line_editor::EditError;
use tokio_tungstenite::tungstenite;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// User-initiated shutdown. Not a failure.
    #[error("interrupted")]
    Interrupted,

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("empty request")]
    EmptyRequest,

    #[error("empty command")]
    EmptyCommand,

    #[error("macro {0} has no commands")]
    EmptyMacro(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid repeat count: {0}")]
    InvalidRepeatCount(String),

    #[error("duplicate macro: {0}")]
    DuplicateMacro(String),

    #[error("unsupported macro version: {0}")]
    UnsupportedMacroVersion(String),

    #[error("invalid macro template {template:?}: {reason}")]
    InvalidMacroTemplate { template: String, reason: String },

    #[error("macro {name} expects argument {index}")]
    MissingMacroArg { name: String, index: usize },

    #[error("macro expansion deeper than {0} levels")]
    MacroDepthExceeded(usize),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Transport(#[from] tungstenite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True for the intentional unwind that ends a session cleanly.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<EditError> for Error {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Interrupted => Self::Interrupted,
            EditError::StreamClosed => Self::StreamClosed,
            EditError::Io(e) => Self::Io(e),
        }
    }
}
