//! Error types for the PTY engine boundary.
//!
//! Failures are values crossing the component boundary, never panics.
//! Internal plumbing (persistence I/O) uses `anyhow` with context instead.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by [`crate::pty::PtyEngine`] operations.
#[derive(Debug, Error)]
pub enum PtyError {
    /// A terminal with this id is already registered.
    #[error("terminal {0} already exists")]
    AlreadyExists(String),

    /// No terminal with this id is registered.
    #[error("terminal {0} not found")]
    NotFound(String),

    /// The shell child process could not be spawned.
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    /// An I/O error on the PTY master.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PtyError {
    /// Whether this error is the idempotent-tolerable "unknown id" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PtyError::NotFound(_))
    }
}

// The command surface serializes errors as plain messages.
impl Serialize for PtyError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
