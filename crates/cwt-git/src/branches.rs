use std::path::{Path, PathBuf};
use std::process::Command;

use crate::command::git;
use crate::error::GitError;

/// Check that `git` is available on PATH and return its location.
pub fn find_git_binary() -> Result<String, GitError> {
    let output = Command::new("which").arg("git").output()?;
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || path.is_empty() {
        return Err(GitError::NotInstalled);
    }
    Ok(path)
}

/// Top-level directory of the work tree containing `path`.
pub fn show_toplevel(path: &Path) -> Result<PathBuf, GitError> {
    git(path, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

pub fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool, GitError> {
    let refname = format!("refs/heads/{branch}");
    let output = crate::command::raw(repo_path, &["show-ref", "--verify", "--quiet", refname.as_str()])?;
    Ok(output.status.success())
}

/// Name of the checked-out branch (`HEAD` when detached).
pub fn current_branch(repo_path: &Path) -> Result<String, GitError> {
    git(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// Full SHA of the given revision.
pub fn head_commit(repo_path: &Path, rev: &str) -> Result<String, GitError> {
    git(repo_path, &["rev-parse", rev])
}

pub fn merge_base(repo_path: &Path, branch_a: &str, branch_b: &str) -> Result<String, GitError> {
    git(repo_path, &["merge-base", branch_a, branch_b])
}

/// Delete a local branch. `force` deletes even with unmerged commits.
pub fn delete_branch(repo_path: &Path, branch: &str, force: bool) -> Result<(), GitError> {
    let flag = if force { "-D" } else { "-d" };
    git(repo_path, &["branch", flag, branch]).map(|_| ())
}

pub fn checkout(repo_path: &Path, rev: &str) -> Result<(), GitError> {
    git(repo_path, &["checkout", rev]).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::TempRepo;

    #[test]
    fn reports_current_branch_and_head() {
        let repo = TempRepo::new();
        assert_eq!(current_branch(repo.path()).unwrap(), "main");
        let head = head_commit(repo.path(), "HEAD").unwrap();
        assert_eq!(head.len(), 40);
        assert_eq!(show_toplevel(repo.path()).unwrap(), repo.path());
    }

    #[test]
    fn branch_lifecycle() {
        let repo = TempRepo::new();
        assert!(!branch_exists(repo.path(), "feature").unwrap());

        repo.git(&["branch", "feature"]);
        assert!(branch_exists(repo.path(), "feature").unwrap());
        assert_eq!(
            merge_base(repo.path(), "main", "feature").unwrap(),
            head_commit(repo.path(), "main").unwrap()
        );

        delete_branch(repo.path(), "feature", false).unwrap();
        assert!(!branch_exists(repo.path(), "feature").unwrap());
    }

    #[test]
    fn unmerged_branch_needs_force() {
        let repo = TempRepo::new();
        repo.git(&["checkout", "-q", "-b", "side"]);
        repo.commit_file("side.txt", "side\n", "side work");
        checkout(repo.path(), "main").unwrap();

        let err = delete_branch(repo.path(), "side", false).unwrap_err();
        assert!(matches!(err, GitError::Failed { .. }));
        delete_branch(repo.path(), "side", true).unwrap();
    }

    #[test]
    fn failure_carries_git_message() {
        let repo = TempRepo::new();
        match checkout(repo.path(), "no-such-branch") {
            Err(GitError::Failed { args, stderr }) => {
                assert_eq!(args, "checkout no-such-branch");
                assert!(!stderr.is_empty());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
