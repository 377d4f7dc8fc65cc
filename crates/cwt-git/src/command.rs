use std::path::Path;
use std::process::{Command, Output};

use crate::error::GitError;

/// Run `git <args>` in `repo_path` and return trimmed stdout.
pub(crate) fn git(repo_path: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = raw(repo_path, args)?;
    if !output.status.success() {
        return Err(failure(args, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run git and hand back the raw output regardless of exit status.
pub(crate) fn raw(repo_path: &Path, args: &[&str]) -> Result<Output, GitError> {
    log::debug!("git {} (in {})", args.join(" "), repo_path.display());
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()?;
    Ok(output)
}

pub(crate) fn failure(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    GitError::Failed {
        args: args.join(" "),
        stderr,
    }
}
