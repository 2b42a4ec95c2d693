//! Errors from file-name derivation and lock acquisition.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0:?} is not an SCCS history file name (must start with \"s.\")")]
    NotAnSccsHistoryFileName(PathBuf),

    #[error("{0:?} is already locked by another process")]
    LockHeld(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
