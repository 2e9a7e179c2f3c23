//! Error types for soundstage

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SoundError {
    /// A device line could not be acquired.
    #[error("Audio resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// The operation is not valid in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The line was closed while it was being written to or drained.
    #[error("Line closed")]
    LineClosed,

    #[error("Audio device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, SoundError>;
