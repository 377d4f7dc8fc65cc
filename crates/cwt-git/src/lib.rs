//! cwt-git: thin wrappers over the `git` binary.
//!
//! Every call shells out to `git` in a given repository and maps a non-zero
//! exit to [`GitError::Failed`] carrying git's own message.

mod command;
pub mod branches;
pub mod error;
pub mod merge;
pub mod worktrees;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture;

pub use branches::{
    branch_exists, checkout, current_branch, delete_branch, find_git_binary, head_commit,
    merge_base, show_toplevel,
};
pub use error::GitError;
pub use merge::{diff, diff_stat, log_oneline, merge_no_ff, merge_tree_has_conflicts, DiffStat};
pub use worktrees::{create_worktree, list_worktrees, remove_worktree, WorktreeInfo};
