//! Task encoding for the shared queue.
//!
//! Tasks cross the process boundary as comma-delimited ASCII strings:
//! `ACTION,FILEPATH,KEY` with a trailing comma when no key is supplied, plus
//! the fixed stop sentinel. Paths must not contain commas.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, ShroudError};

/// Sentinel payload telling exactly one worker to stop consuming.
pub(crate) const STOP_SENTINEL: &str = "STOP_WORKER_SIGNAL";

/// File transform to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Encrypt,
    Decrypt,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ShroudError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "encrypt" => Ok(Self::Encrypt),
            "decrypt" => Ok(Self::Decrypt),
            other => Err(ShroudError::UnknownAction(other.to_string())),
        }
    }
}

/// A queue entry. Immutable once constructed; ownership moves to the queue
/// at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Transform one file. An empty key means "use the environment key".
    Work {
        action: Action,
        path: PathBuf,
        key: String,
    },
    /// Stop the worker that dequeues this entry.
    Stop,
}

impl Task {
    pub fn work(action: Action, path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self::Work {
            action,
            path: path.into(),
            key: key.into(),
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> String {
        match self {
            Self::Work { action, path, key } => {
                format!("{},{},{}", action, path.display(), key)
            }
            Self::Stop => format!("{STOP_SENTINEL},"),
        }
    }

    /// Deserialize from the wire format.
    ///
    /// The stop sentinel is matched by prefix. A non-sentinel string without
    /// a comma is a format error; a missing key field decodes as empty.
    pub fn decode(line: &str) -> Result<Self> {
        if line.starts_with(STOP_SENTINEL) {
            return Ok(Self::Stop);
        }
        let Some((action, rest)) = line.split_once(',') else {
            return Err(ShroudError::InvalidTask(line.to_string()));
        };
        let (path, key) = match rest.split_once(',') {
            Some((path, key)) => (path, key),
            None => (rest, ""),
        };
        Ok(Self::Work {
            action: action.parse()?,
            path: PathBuf::from(path),
            key: key.to_string(),
        })
    }
}
