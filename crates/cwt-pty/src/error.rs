use thiserror::Error;

/// Errors from PTY sessions and the session registry.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("failed to spawn session: {0}")]
    Spawn(String),

    #[error("session is closed")]
    Closed,

    #[error("session already started")]
    AlreadyStarted,

    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("PTY resize failed: {0}")]
    Resize(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
}
