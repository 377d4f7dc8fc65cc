//! Throwaway git repositories for tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A fresh repository on `main` with one commit and a local identity.
pub struct TempRepo {
    _dir: TempDir,
    path: PathBuf,
}

impl TempRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().canonicalize().expect("canonicalize temp dir");
        let repo = Self { _dir: dir, path };

        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "cwt test"]);
        repo.git(&["config", "user.email", "cwt@example.com"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.commit_file("README.md", "hello\n", "initial");
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run git in the repository root, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        run_in(&self.path, args)
    }

    /// Write `name` in the repository root and commit it.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) {
        commit_file_in(&self.path, name, contents, message);
    }
}

impl Default for TempRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Write and commit a file inside any work tree (e.g. an agent worktree).
pub fn commit_file_in(work_tree: &Path, name: &str, contents: &str, message: &str) {
    std::fs::write(work_tree.join(name), contents).expect("write file");
    run_in(work_tree, &["add", name]);
    run_in(work_tree, &["commit", "-q", "-m", message]);
}

fn run_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
