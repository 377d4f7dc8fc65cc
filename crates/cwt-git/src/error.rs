use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },

    #[error("git binary not found on PATH. Please install git: https://git-scm.com/downloads")]
    NotInstalled,
}
