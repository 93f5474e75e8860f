//! Error types for movdemux-media.

use std::io;
use thiserror::Error;

/// Result type for movdemux-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for movdemux-media operations.
///
/// Data-quality problems in the sample tables (non-positive durations, bad
/// chunk runs, implausible fixed sizes) are repaired with a warning and never
/// surface here. Everything below aborts the operation that raised it.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Atom tree nested deeper than the walker allows.
    #[error("Atom {atom} nested too deeply (depth {depth}, max {max})")]
    AtomTooDeep { atom: String, depth: usize, max: usize },

    /// A box that may appear only once per scope appeared again.
    #[error("Duplicate {0} atom")]
    DuplicateAtom(&'static str),

    /// Unsupported feature or codec.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Buffer too small for operation.
    #[error("Buffer underflow: need {need} bytes, have {have}")]
    BufferUnderflow { need: usize, have: usize },

    /// Streaming call made before a successful header read.
    #[error("Demuxer not initialized")]
    NotInitialized,

    /// `read` called without a preceding `peek`.
    #[error("No packet pending; call peek before read")]
    NoPendingPacket,
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
