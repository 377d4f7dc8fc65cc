use std::path::PathBuf;

/// Undoes a half-finished `create_branch` unless disarmed.
///
/// Armed right after the worktree exists; dropping it armed removes the
/// worktree and force-deletes the branch. Failures are only logged.
pub(crate) struct Rollback {
    repo_root: PathBuf,
    worktree: PathBuf,
    branch: String,
    armed: bool,
}

impl Rollback {
    pub(crate) fn new(repo_root: PathBuf, worktree: PathBuf, branch: String) -> Self {
        Self {
            repo_root,
            worktree,
            branch,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::warn!("rolling back worktree {}", self.worktree.display());
        if let Err(e) = cwt_git::remove_worktree(&self.repo_root, &self.worktree, true) {
            log::warn!("rollback: failed to remove worktree {}: {e}", self.worktree.display());
        }
        if let Err(e) = cwt_git::delete_branch(&self.repo_root, &self.branch, true) {
            log::warn!("rollback: failed to delete branch {}: {e}", self.branch);
        }
    }
}
