use std::path::Path;

use crate::command::{failure, git, raw};
use crate::error::GitError;

/// Marker git writes around conflicting hunks.
const CONFLICT_MARKER: &str = "<<<<<<<";

/// Summary line of `git diff --shortstat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStat {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl DiffStat {
    /// Parse e.g. ` 2 files changed, 10 insertions(+), 3 deletions(-)`.
    pub fn parse(line: &str) -> Self {
        let mut stat = DiffStat::default();
        for part in line.split(',') {
            let part = part.trim();
            let Some((count, rest)) = part.split_once(' ') else {
                continue;
            };
            let Ok(count) = count.parse::<u32>() else {
                continue;
            };
            if rest.starts_with("file") {
                stat.files_changed = count;
            } else if rest.starts_with("insertion") {
                stat.insertions = count;
            } else if rest.starts_with("deletion") {
                stat.deletions = count;
            }
        }
        stat
    }

    pub fn is_empty(&self) -> bool {
        self.files_changed == 0
    }
}

/// Changes on `branch` since it diverged from `base` (three-dot diff).
pub fn diff(repo_path: &Path, base: &str, branch: &str) -> Result<String, GitError> {
    git(repo_path, &["diff", &format!("{base}...{branch}")])
}

pub fn diff_stat(repo_path: &Path, base: &str, branch: &str) -> Result<DiffStat, GitError> {
    let line = git(repo_path, &["diff", "--shortstat", &format!("{base}...{branch}")])?;
    Ok(DiffStat::parse(&line))
}

/// One line per commit on `branch` that is not on `base`.
pub fn log_oneline(repo_path: &Path, base: &str, branch: &str) -> Result<String, GitError> {
    git(repo_path, &["log", "--oneline", &format!("{base}..{branch}")])
}

/// Dry-run three-way merge of `ours` and `theirs` over `merge_base`.
///
/// Uses the trivial `merge-tree` mode, which writes nothing to refs, the
/// index or any work tree. Returns true when the result has conflict hunks.
/// This mode exits 0 even when it finds conflicts, so any other exit status
/// is an error.
pub fn merge_tree_has_conflicts(
    repo_path: &Path,
    merge_base: &str,
    ours: &str,
    theirs: &str,
) -> Result<bool, GitError> {
    let args = ["merge-tree", merge_base, ours, theirs];
    let output = raw(repo_path, &args)?;
    if !output.status.success() {
        return Err(failure(&args, &output));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.contains(CONFLICT_MARKER))
}

/// `git merge --no-ff -m <message> <branch>` into the checked-out branch.
pub fn merge_no_ff(repo_path: &Path, branch: &str, message: &str) -> Result<(), GitError> {
    git(repo_path, &["merge", "--no-ff", "-m", message, branch]).map(|_| ())
}
