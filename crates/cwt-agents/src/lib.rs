//! cwt-agents: isolated agent branches and their lifecycle.
//!
//! Each agent gets its own branch checked out in its own git worktree under
//! the repository. [`AgentManager`] creates, tracks, inspects, merges and
//! removes them, persisting every change through `cwt-state`.

pub mod error;
pub mod id;
pub mod manager;
mod rollback;

pub use cwt_git::DiffStat;
pub use cwt_state::{Agent, AgentStatus, MergeRecord};
pub use error::AgentError;
pub use id::{branch_name, generate_id, slugify, validate_branch_name};
pub use manager::{AgentManager, ManagerConfig, MergeOutcome};
