//! Errors produced while parsing, validating or writing a history file.

use thiserror::Error;

/// Errors at the history-file codec / weave-reconstruction layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not an SCCS history file: {detail}")]
    NotAnSccsHistoryFile { detail: String },

    #[error("not an SCCS history file name: {0}")]
    NotAnSccsHistoryFileName(String),

    #[error("unexpected end of file while reading history file")]
    UnexpectedEof,

    #[error("stored checksum {stored:04x} does not match computed checksum {computed:04x}")]
    ChecksumMismatch { stored: u16, computed: u16 },

    #[error("sequence {0} is referenced but has no delta record")]
    DanglingSequence(u32),

    #[error("body control region for sequence {0} was never closed")]
    UnterminatedRegion(u32),

    #[error("body control region close for sequence {0} does not match any open region")]
    MismatchedClose(u32),

    #[error("malformed history file line: {0}")]
    Malformed(String),

    #[error("body would not be representable as text: {0}")]
    BodyIsBinary(String),

    #[error("refusing to mutate {0}: it has hard links, which would corrupt other names for the same inode")]
    FileHasHardLinks(std::path::PathBuf),

    #[error("invalid flag value for -{letter}: {value}")]
    InvalidFlagValue { letter: char, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid integer in history file: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

pub type Result<T> = std::result::Result<T, Error>;
