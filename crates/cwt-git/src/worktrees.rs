use std::path::Path;

use crate::command::git;
use crate::error::GitError;

#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: String,
    pub head: String,
    pub branch: Option<String>,
}

/// Create a worktree at `worktree_path` on a new branch starting at `start`.
pub fn create_worktree(
    repo_path: &Path,
    worktree_path: &Path,
    branch: &str,
    start: &str,
) -> Result<(), GitError> {
    let path = worktree_path.to_string_lossy();
    git(repo_path, &["worktree", "add", "-b", branch, &*path, start]).map(|_| ())
}

/// List all worktrees for a repository.
pub fn list_worktrees(repo_path: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
    let stdout = git(repo_path, &["worktree", "list", "--porcelain"])?;
    Ok(parse_worktree_list(&stdout))
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            worktrees.extend(current.take());
            current = Some(WorktreeInfo {
                path: path.to_string(),
                head: String::new(),
                branch: None,
            });
        } else if let Some(entry) = current.as_mut() {
            if let Some(head) = line.strip_prefix("HEAD ") {
                entry.head = head.to_string();
            } else if let Some(branch) = line.strip_prefix("branch ") {
                entry.branch = Some(
                    branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch)
                        .to_string(),
                );
            }
        }
    }
    worktrees.extend(current);
    worktrees
}

/// Remove a worktree. `force` also discards uncommitted changes in it.
pub fn remove_worktree(repo_path: &Path, worktree_path: &Path, force: bool) -> Result<(), GitError> {
    let path = worktree_path.to_string_lossy();
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(&*path);
    git(repo_path, &args).map(|_| ())
}
