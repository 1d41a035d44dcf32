//! Decoding errors for framed control messages

use thiserror::Error;

/// A frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Unexpected end of message at byte {offset} (needed {needed} more)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("String starting at byte {0} has no NUL terminator")]
    UnterminatedString(usize),

    #[error("String starting at byte {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    #[error("Unknown message class {0}")]
    UnknownClass(i32),

    #[error("Unknown {class} selector '{selector}'")]
    UnknownSelector {
        class: &'static str,
        selector: String,
    },

    #[error("Selection does not start with '#' (found '{0}')")]
    MissingSentinel(String),
}

/// Result type for frame decoding
pub type FrameResult<T> = Result<T, FrameError>;
