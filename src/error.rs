//! Error types for the file tail library.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Validation codes reported when a session is constructed with bad options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Missing or empty file name.
    Filename,
    /// Invalid steady-state poll interval.
    PollInterval,
    /// Invalid retry interval used while the file is missing.
    PollRetry,
    /// Invalid failure ceiling.
    MaxPollFailures,
    /// Invalid read stream options.
    ReadStreamOpts,
    /// Negative or non-integer start position.
    StartPos,
}

impl ErrorCode {
    /// The stable string form of the code, e.g. `EFILENAME`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Filename => "EFILENAME",
            ErrorCode::PollInterval => "EPOLLINTERVAL",
            ErrorCode::PollRetry => "EPOLLRETRY",
            ErrorCode::MaxPollFailures => "EMAXPOLLFAIL",
            ErrorCode::ReadStreamOpts => "EREADSTREAMOPTS",
            ErrorCode::StartPos => "ESTARTPOS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for file tail operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors not attributable to a specific session step.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// Malformed configuration document.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// An option failed validation at construction time.
    #[error("Invalid option ({code}): {message}")]
    InvalidOption { code: ErrorCode, message: String },

    /// The file could not be opened when the session started.
    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stat failed with something other than "not found". Fatal.
    #[error("Failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file stayed missing for too many consecutive polls. Fatal.
    #[error("File {} could not be found after {attempts} poll attempts", .path.display())]
    PollFailed { path: PathBuf, attempts: u32 },

    /// Reading a known byte range failed. Recoverable.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called on a session that is already running.
    #[error("Tail session already started")]
    AlreadyStarted,

    /// `start()` was called after `quit()`.
    #[error("Tail session has quit")]
    Quit,
}

impl Error {
    pub(crate) fn invalid(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::InvalidOption {
            code,
            message: message.into(),
        }
    }

    /// Returns the validation code string for construction errors.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::InvalidOption { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Whether this error ends the session when delivered as an event.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Read { .. })
    }
}

/// A convenient Result type for file tail operations.
pub type Result<T> = std::result::Result<T, Error>;
