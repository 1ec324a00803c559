//! Timer creation error types

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Reasons the create ioctl did not yield a usable timer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// The kernel rejected the request
    #[error("ioctl failed: {0}")]
    Rejected(Errno),

    /// The ioctl returned a descriptor that can't be used
    #[error("invalid descriptor {0}")]
    InvalidDescriptor(i32),

    /// The kernel never wrote an id back into the request record
    #[error("timer id left unresolved ({0})")]
    UnresolvedId(i32),
}

/// Errors that can occur while creating the userspace-driven timer
///
/// Both variants are fatal for a harness run.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The timer control node could not be opened
    #[error("Can't open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The timer subsystem refused the request or returned garbage
    #[error("Can't create the timer: {0}")]
    Create(#[from] CreateFailure),
}

impl TimerError {
    /// Short name of the failed stage, used in diagnostics
    pub fn stage(&self) -> &'static str {
        match self {
            TimerError::Open { .. } => "open",
            TimerError::Create(_) => "create",
        }
    }
}

/// Result type for timer operations
pub type TimerResult<T> = Result<T, TimerError>;
