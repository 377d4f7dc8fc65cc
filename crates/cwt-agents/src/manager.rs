use std::path::{Path, PathBuf};

use chrono::Utc;
use cwt_git::{DiffStat, GitError};
use cwt_state::{Agent, AgentStatus, MergeRecord, State, DEFAULT_WORKTREE_DIR};

use crate::error::AgentError;
use crate::id::{branch_name, generate_unique_id, validate_branch_name};
use crate::rollback::Rollback;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Leading component of generated agent IDs and their branch names.
    pub id_prefix: String,
    /// Worktree directory, relative to the repository root. Only used when
    /// no state file exists yet.
    pub worktree_dir: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            id_prefix: "cwt".to_string(),
            worktree_dir: DEFAULT_WORKTREE_DIR.to_string(),
        }
    }
}

/// Result reported back by whoever resolved a merge outside cwt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged {
        merge_commit: String,
        conflicts_resolved: u32,
        conflicts_escalated: u32,
    },
    NeedsManualResolution,
}

/// Owns the persisted state of one repository.
///
/// Every mutation builds the next state on a copy, saves it, and only then
/// swaps it in, so a failed save leaves memory matching disk.
pub struct AgentManager {
    repo_root: PathBuf,
    config: ManagerConfig,
    state: State,
}

impl AgentManager {
    pub fn open(repo_root: impl Into<PathBuf>, config: ManagerConfig) -> Result<Self, AgentError> {
        let repo_root = repo_root.into();
        if !repo_root.join(".git").exists() {
            return Err(AgentError::NotARepo(repo_root));
        }

        let fresh = !State::file_path(&repo_root).exists();
        let mut state = State::load(&repo_root)?;
        if fresh {
            state.worktree_dir = config.worktree_dir.clone();
        }
        state.repo_root = repo_root.clone();

        log::info!(
            "opened {} with {} tracked agent(s)",
            repo_root.display(),
            state.agents.len()
        );
        Ok(Self {
            repo_root,
            config,
            state,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn worktrees_root(&self) -> PathBuf {
        self.state.worktrees_root()
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.state.get_agent(id)
    }

    pub fn list_agents(&self) -> Vec<&Agent> {
        self.state.list_agents()
    }

    pub fn list_by_status(&self, status: AgentStatus) -> Vec<&Agent> {
        self.state.list_by_status(status)
    }

    pub fn merge_history(&self) -> &[MergeRecord] {
        &self.state.merge_history
    }

    /// Create a branch and worktree for `task` and start tracking it as running.
    pub fn create_branch(&mut self, task: &str) -> Result<Agent, AgentError> {
        let id = generate_unique_id(&self.config.id_prefix, |candidate| {
            self.state.agents.contains_key(candidate)
        });
        let branch = branch_name(&self.config.id_prefix, &id, task);
        validate_branch_name(&branch).map_err(|reason| AgentError::InvalidBranchName {
            branch: branch.clone(),
            reason,
        })?;

        let base_branch = cwt_git::current_branch(&self.repo_root)?;
        let base_commit = cwt_git::head_commit(&self.repo_root, "HEAD")?;
        let worktree = self.worktrees_root().join(&id);

        cwt_git::create_worktree(&self.repo_root, &worktree, &branch, &base_commit)?;
        let rollback = Rollback::new(self.repo_root.clone(), worktree.clone(), branch.clone());

        let agent = Agent {
            id: id.clone(),
            branch,
            worktree,
            task: task.to_string(),
            status: AgentStatus::Running,
            base_branch,
            base_commit,
            created_at: Utc::now(),
            merged_at: None,
        };

        let mut next = self.state.clone();
        next.add_agent(agent.clone());
        self.persist(next)?;
        rollback.disarm();

        log::info!("created agent {id} on {}", agent.branch);
        Ok(agent)
    }

    /// Remove the worktree and branch, then forget the agent.
    ///
    /// Git cleanup is best effort; only an unknown ID or a failed save is
    /// reported.
    pub fn remove_branch(&mut self, id: &str) -> Result<(), AgentError> {
        let agent = self.agent(id)?.clone();

        if let Err(e) = cwt_git::remove_worktree(&self.repo_root, &agent.worktree, false) {
            log::debug!("worktree remove failed ({e}), retrying with --force");
            if let Err(e) = cwt_git::remove_worktree(&self.repo_root, &agent.worktree, true) {
                log::warn!("failed to remove worktree {}: {e}", agent.worktree.display());
            }
        }
        if let Err(e) = cwt_git::delete_branch(&self.repo_root, &agent.branch, false) {
            log::debug!("branch -d failed ({e}), retrying with -D");
            if let Err(e) = cwt_git::delete_branch(&self.repo_root, &agent.branch, true) {
                log::warn!("failed to delete branch {}: {e}", agent.branch);
            }
        }

        let mut next = self.state.clone();
        next.remove_agent(id);
        self.persist(next)?;

        log::info!("removed agent {id}");
        Ok(())
    }

    pub fn diff(&self, id: &str) -> Result<String, AgentError> {
        let agent = self.agent(id)?;
        Ok(cwt_git::diff(&self.repo_root, &agent.base_branch, &agent.branch)?)
    }

    pub fn diff_stat(&self, id: &str) -> Result<DiffStat, AgentError> {
        let agent = self.agent(id)?;
        Ok(cwt_git::diff_stat(&self.repo_root, &agent.base_branch, &agent.branch)?)
    }

    pub fn commit_log(&self, id: &str) -> Result<String, AgentError> {
        let agent = self.agent(id)?;
        Ok(cwt_git::log_oneline(&self.repo_root, &agent.base_branch, &agent.branch)?)
    }

    /// Whether merging the agent's branch into its base would conflict.
    ///
    /// Advisory: nothing stops the base from moving before the real merge.
    pub fn has_conflicts(&self, id: &str) -> Result<bool, AgentError> {
        let agent = self.agent(id)?;
        let base = cwt_git::merge_base(&self.repo_root, &agent.base_branch, &agent.branch)?;
        Ok(cwt_git::merge_tree_has_conflicts(
            &self.repo_root,
            &base,
            &agent.base_branch,
            &agent.branch,
        )?)
    }

    /// Merge the agent's branch into its base with a merge commit.
    ///
    /// On a git failure the agent stays `merging` and the repository is left
    /// as git left it, for an outside resolver to finish and report through
    /// [`record_merge_outcome`](Self::record_merge_outcome). Calling `merge`
    /// again on a `merging` agent retries it.
    pub fn merge(&mut self, id: &str) -> Result<(), AgentError> {
        let agent = self.agent(id)?.clone();
        if agent.status != AgentStatus::Merging {
            self.set_status(id, AgentStatus::Merging)?;
        }

        let merge_failed = |e: GitError| AgentError::MergeFailed {
            id: id.to_string(),
            message: e.to_string(),
        };
        cwt_git::checkout(&self.repo_root, &agent.base_branch).map_err(merge_failed)?;
        let message = format!("Merge {}: {}", agent.id, agent.task);
        cwt_git::merge_no_ff(&self.repo_root, &agent.branch, &message).map_err(merge_failed)?;

        let merge_commit = cwt_git::head_commit(&self.repo_root, "HEAD")?;
        self.finish_merge(id, merge_commit, 0, 0)?;
        log::info!("merged agent {id} into {}", agent.base_branch);
        Ok(())
    }

    /// Accept the result of a merge resolved outside cwt.
    pub fn record_merge_outcome(&mut self, id: &str, outcome: MergeOutcome) -> Result<(), AgentError> {
        let from = self.agent(id)?.status;
        let to = match outcome {
            MergeOutcome::Merged { .. } => AgentStatus::Merged,
            MergeOutcome::NeedsManualResolution => AgentStatus::Failed,
        };
        if from != AgentStatus::Merging {
            return Err(AgentError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        match outcome {
            MergeOutcome::Merged {
                merge_commit,
                conflicts_resolved,
                conflicts_escalated,
            } => self.finish_merge(id, merge_commit, conflicts_resolved, conflicts_escalated),
            MergeOutcome::NeedsManualResolution => {
                log::warn!("agent {id} needs manual merge resolution");
                self.set_status(id, AgentStatus::Failed)
            }
        }
    }

    /// Move an agent to `status` if the lifecycle allows it, and persist.
    pub fn set_status(&mut self, id: &str, status: AgentStatus) -> Result<(), AgentError> {
        self.transition(id, status, |_| {})
    }

    fn finish_merge(
        &mut self,
        id: &str,
        merge_commit: String,
        conflicts_resolved: u32,
        conflicts_escalated: u32,
    ) -> Result<(), AgentError> {
        let now = Utc::now();
        self.transition(id, AgentStatus::Merged, |next| {
            if let Some(agent) = next.get_agent_mut(id) {
                agent.merged_at = Some(now);
            }
            next.push_merge_record(MergeRecord {
                agent_id: id.to_string(),
                merged_at: now,
                merge_commit,
                conflicts_resolved,
                conflicts_escalated,
            });
        })
    }

    fn transition(
        &mut self,
        id: &str,
        to: AgentStatus,
        apply: impl FnOnce(&mut State),
    ) -> Result<(), AgentError> {
        let from = self.agent(id)?.status;
        if !from.can_transition_to(to) {
            return Err(AgentError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        let mut next = self.state.clone();
        if let Some(agent) = next.get_agent_mut(id) {
            agent.status = to;
        }
        apply(&mut next);
        self.persist(next)?;
        log::debug!("agent {id}: {from} -> {to}");
        Ok(())
    }

    fn persist(&mut self, next: State) -> Result<(), AgentError> {
        next.save()?;
        self.state = next;
        Ok(())
    }

    fn agent(&self, id: &str) -> Result<&Agent, AgentError> {
        self.state
            .get_agent(id)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwt_git::fixture::{commit_file_in, TempRepo};
    use std::fs;

    fn open(repo: &TempRepo) -> AgentManager {
        AgentManager::open(repo.path(), ManagerConfig::default()).unwrap()
    }

    /// Make the next save fail by putting a plain file where `.cwt/` goes.
    fn break_state_dir(repo: &TempRepo) {
        let dir = repo.path().join(".cwt");
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "blocked").unwrap();
    }

    #[test]
    fn open_rejects_non_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentManager::open(dir.path(), ManagerConfig::default()).err().unwrap();
        assert!(matches!(err, AgentError::NotARepo(_)));
    }

    #[test]
    fn create_branch_sets_up_worktree_and_state() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);

        let agent = mgr.create_branch("Fix the login bug").unwrap();

        assert!(agent.id.starts_with("cwt-"));
        assert_eq!(agent.branch, format!("cwt/{}/fix-the-login-bug", agent.id));
        assert_eq!(agent.worktree, repo.path().join(".worktrees").join(&agent.id));
        assert_eq!(agent.status, AgentStatus::Running);
        assert_eq!(agent.base_branch, "main");
        assert_eq!(agent.base_commit, repo.git(&["rev-parse", "HEAD"]));
        assert!(agent.worktree.join("README.md").exists());
        assert!(cwt_git::branch_exists(repo.path(), &agent.branch).unwrap());
        let listed = cwt_git::list_worktrees(repo.path()).unwrap();
        assert!(listed
            .iter()
            .any(|wt| wt.branch.as_deref() == Some(agent.branch.as_str())));

        let reopened = open(&repo);
        assert_eq!(reopened.get_agent(&agent.id), Some(&agent));
    }

    #[test]
    fn branch_prefix_follows_id_prefix() {
        let repo = TempRepo::new();
        let config = ManagerConfig {
            id_prefix: "agent".to_string(),
            ..ManagerConfig::default()
        };
        let mut mgr = AgentManager::open(repo.path(), config).unwrap();

        let agent = mgr.create_branch("Fix login").unwrap();

        assert!(agent.id.starts_with("agent-"));
        assert_eq!(agent.branch, format!("agent/{}/fix-login", agent.id));
        assert!(cwt_git::branch_exists(repo.path(), &agent.branch).unwrap());
    }

    #[test]
    fn create_then_remove_leaves_nothing_behind() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("temporary").unwrap();
        fs::write(agent.worktree.join("scratch.txt"), "untracked").unwrap();

        mgr.remove_branch(&agent.id).unwrap();

        assert!(mgr.get_agent(&agent.id).is_none());
        assert!(!agent.worktree.exists());
        assert!(!cwt_git::branch_exists(repo.path(), &agent.branch).unwrap());
        let worktrees = cwt_git::list_worktrees(repo.path()).unwrap();
        assert_eq!(worktrees.len(), 1, "only the main work tree remains");
        assert!(open(&repo).get_agent(&agent.id).is_none());
    }

    #[test]
    fn removing_twice_is_not_found() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("once").unwrap();

        mgr.remove_branch(&agent.id).unwrap();
        let err = mgr.remove_branch(&agent.id).unwrap_err();
        assert!(matches!(err, AgentError::NotFound(id) if id == agent.id));
    }

    #[test]
    fn failed_save_rolls_back_created_worktree() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        mgr.create_branch("first").unwrap();
        break_state_dir(&repo);

        let err = mgr.create_branch("second").unwrap_err();
        assert!(matches!(err, AgentError::State(_)));
        assert_eq!(mgr.list_agents().len(), 1);

        let branches = repo.git(&["branch", "--list", "cwt/*/second"]);
        assert!(branches.is_empty(), "leftover branch: {branches}");
        let leftover: Vec<_> = fs::read_dir(repo.path().join(".worktrees"))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(leftover.len(), 1);
    }

    #[test]
    fn diff_log_and_stat_show_agent_work() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("add notes").unwrap();
        commit_file_in(&agent.worktree, "notes.txt", "one\ntwo\n", "add notes file");

        let diff = mgr.diff(&agent.id).unwrap();
        assert!(diff.contains("notes.txt"));
        assert!(diff.contains("+two"));

        let log = mgr.commit_log(&agent.id).unwrap();
        assert!(log.contains("add notes file"));
        assert_eq!(log.lines().count(), 1);

        let stat = mgr.diff_stat(&agent.id).unwrap();
        assert_eq!(stat.files_changed, 1);
        assert_eq!(stat.insertions, 2);

        assert!(matches!(mgr.diff("nope"), Err(AgentError::NotFound(_))));
    }

    #[test]
    fn conflict_check_detects_same_line_edits() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("edit readme").unwrap();
        commit_file_in(&agent.worktree, "README.md", "agent version\n", "agent edit");
        repo.commit_file("README.md", "main version\n", "main edit");

        let head_before = repo.git(&["rev-parse", "HEAD"]);
        assert!(mgr.has_conflicts(&agent.id).unwrap());
        assert_eq!(repo.git(&["rev-parse", "HEAD"]), head_before);
        assert!(repo.git(&["status", "--porcelain", "--untracked-files=no"]).is_empty());
    }

    #[test]
    fn conflict_check_passes_disjoint_files() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("separate file").unwrap();
        commit_file_in(&agent.worktree, "agent.txt", "agent\n", "agent file");
        repo.commit_file("main.txt", "main\n", "main file");

        assert!(!mgr.has_conflicts(&agent.id).unwrap());
    }

    #[test]
    fn merge_records_commit_and_history() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("feature").unwrap();
        commit_file_in(&agent.worktree, "feature.txt", "done\n", "feature work");
        mgr.set_status(&agent.id, AgentStatus::Completed).unwrap();

        mgr.merge(&agent.id).unwrap();

        let merged = mgr.get_agent(&agent.id).unwrap();
        assert_eq!(merged.status, AgentStatus::Merged);
        assert!(merged.merged_at.is_some());
        assert!(repo.path().join("feature.txt").exists());

        let history = mgr.merge_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].agent_id, agent.id);
        assert_eq!(history[0].merge_commit, repo.git(&["rev-parse", "HEAD"]));
        assert_eq!(history[0].conflicts_resolved, 0);
        let subject = repo.git(&["log", "-1", "--format=%s"]);
        assert_eq!(subject, format!("Merge {}: feature", agent.id));
    }

    #[test]
    fn merge_without_changes_still_completes() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("nothing to do").unwrap();

        mgr.merge(&agent.id).unwrap();

        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Merged);
        assert!(!mgr.merge_history()[0].merge_commit.is_empty());
    }

    #[test]
    fn conflicting_merge_stays_merging_until_outcome_reported() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("clash").unwrap();
        commit_file_in(&agent.worktree, "README.md", "agent\n", "agent edit");
        repo.commit_file("README.md", "main\n", "main edit");

        let err = mgr.merge(&agent.id).unwrap_err();
        assert!(matches!(err, AgentError::MergeFailed { .. }));
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Merging);
        assert_eq!(
            open(&repo).get_agent(&agent.id).unwrap().status,
            AgentStatus::Merging
        );

        mgr.record_merge_outcome(&agent.id, MergeOutcome::NeedsManualResolution)
            .unwrap();
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Failed);
        assert!(mgr.merge_history().is_empty());
    }

    #[test]
    fn failed_merge_can_be_retried() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("retry").unwrap();
        commit_file_in(&agent.worktree, "README.md", "agent\n", "agent edit");
        fs::write(repo.path().join("README.md"), "local edit\n").unwrap();

        let err = mgr.merge(&agent.id).unwrap_err();
        assert!(matches!(err, AgentError::MergeFailed { .. }));
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Merging);

        repo.git(&["checkout", "--", "README.md"]);
        mgr.merge(&agent.id).unwrap();

        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Merged);
        assert_eq!(fs::read_to_string(repo.path().join("README.md")).unwrap(), "agent\n");
        assert_eq!(mgr.merge_history().len(), 1);
    }

    #[test]
    fn external_merge_outcome_is_recorded() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("resolved elsewhere").unwrap();
        mgr.set_status(&agent.id, AgentStatus::Merging).unwrap();

        mgr.record_merge_outcome(
            &agent.id,
            MergeOutcome::Merged {
                merge_commit: "feedface".to_string(),
                conflicts_resolved: 3,
                conflicts_escalated: 1,
            },
        )
        .unwrap();

        let store = open(&repo);
        let record = &store.merge_history()[0];
        assert_eq!(record.merge_commit, "feedface");
        assert_eq!(record.conflicts_resolved, 3);
        assert_eq!(record.conflicts_escalated, 1);
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Merged);
    }

    #[test]
    fn outcome_requires_merging_status() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("not yet").unwrap();

        let err = mgr
            .record_merge_outcome(&agent.id, MergeOutcome::NeedsManualResolution)
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Running);
    }

    #[test]
    fn invalid_transitions_are_rejected_and_not_persisted() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("lifecycle").unwrap();

        assert!(matches!(
            mgr.set_status(&agent.id, AgentStatus::Merged),
            Err(AgentError::InvalidTransition { .. })
        ));
        assert!(matches!(
            mgr.set_status(&agent.id, AgentStatus::Pending),
            Err(AgentError::InvalidTransition { .. })
        ));

        mgr.set_status(&agent.id, AgentStatus::Failed).unwrap();
        assert!(mgr.set_status(&agent.id, AgentStatus::Running).is_err());
        assert_eq!(
            open(&repo).get_agent(&agent.id).unwrap().status,
            AgentStatus::Failed
        );
    }

    #[test]
    fn failed_save_keeps_memory_equal_to_disk() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let agent = mgr.create_branch("persist").unwrap();
        break_state_dir(&repo);

        let err = mgr.set_status(&agent.id, AgentStatus::Completed).unwrap_err();
        assert!(matches!(err, AgentError::State(_)));
        assert_eq!(mgr.get_agent(&agent.id).unwrap().status, AgentStatus::Running);

        assert!(mgr.remove_branch(&agent.id).is_err());
        assert!(mgr.get_agent(&agent.id).is_some());
    }

    #[test]
    fn listing_by_status() {
        let repo = TempRepo::new();
        let mut mgr = open(&repo);
        let a = mgr.create_branch("a").unwrap();
        let b = mgr.create_branch("b").unwrap();
        mgr.set_status(&b.id, AgentStatus::Completed).unwrap();

        assert_eq!(mgr.list_agents().len(), 2);
        let running: Vec<&str> = mgr
            .list_by_status(AgentStatus::Running)
            .iter()
            .map(|x| x.id.as_str())
            .collect();
        assert_eq!(running, vec![a.id.as_str()]);
        assert_eq!(mgr.worktrees_root(), repo.path().join(".worktrees"));
    }
}
