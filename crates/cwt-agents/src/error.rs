use std::path::PathBuf;

use cwt_git::GitError;
use cwt_state::{AgentStatus, StateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{} is not a git repository", .0.display())]
    NotARepo(PathBuf),

    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("invalid branch name {branch:?}: {reason}")]
    InvalidBranchName { branch: String, reason: String },

    #[error("agent {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("merge of {id} failed: {message}")]
    MergeFailed { id: String, message: String },
}
