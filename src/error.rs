//! Error types for shroud.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for shroud.
#[derive(Error, Debug)]
pub enum ShroudError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),

    #[error("invalid task string {0:?}: expected 'ACTION,FILEPATH[,KEY]'")]
    InvalidTask(String),

    #[error("unknown task action {0:?}: expected 'encrypt' or 'decrypt'")]
    UnknownAction(String),

    #[error("invalid queue namespace {0:?}: must be non-empty, without '/' or NUL")]
    InvalidNamespace(String),

    #[error("invalid secret key for {}", .0.display())]
    KeyMismatch(PathBuf),

    #[error("decryption requires a secret key for {} (lock file present)", .0.display())]
    KeyRequired(PathBuf),

    #[error("environment key file {}: {}", path.display(), reason)]
    EnvKey { path: PathBuf, reason: String },

    #[error("unreadable lock file {}", .0.display())]
    InvalidLock(PathBuf),
}

/// Result type alias for shroud operations.
pub type Result<T> = std::result::Result<T, ShroudError>;
