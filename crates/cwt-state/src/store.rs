use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::status::AgentStatus;

/// Schema tag written into every state file.
pub const STATE_VERSION: &str = "1.0";

/// Default directory, relative to the repository root, holding worktrees.
pub const DEFAULT_WORKTREE_DIR: &str = ".worktrees";

/// One tracked agent: a branch, its worktree and the task it works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub branch: String,
    pub worktree: PathBuf,
    pub task: String,
    pub status: AgentStatus,
    pub base_branch: String,
    pub base_commit: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

/// A completed merge. Appended once, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecord {
    pub agent_id: String,
    pub merged_at: DateTime<Utc>,
    pub merge_commit: String,
    pub conflicts_resolved: u32,
    pub conflicts_escalated: u32,
}

/// Everything cwt remembers about a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub version: String,
    pub repo_root: PathBuf,
    pub worktree_dir: String,
    #[serde(default)]
    pub agents: BTreeMap<String, Agent>,
    #[serde(default)]
    pub merge_history: Vec<MergeRecord>,
}

impl State {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            repo_root: repo_root.into(),
            worktree_dir: DEFAULT_WORKTREE_DIR.to_string(),
            agents: BTreeMap::new(),
            merge_history: Vec::new(),
        }
    }

    /// Location of the state file: `<repo_root>/.cwt/state.json`.
    pub fn file_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".cwt").join("state.json")
    }

    /// Load state for `repo_root`, or a fresh empty state if none was saved.
    pub fn load(repo_root: &Path) -> Result<Self, StateError> {
        let path = Self::file_path(repo_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("no state at {}, starting fresh", path.display());
                return Ok(Self::new(repo_root));
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        serde_json::from_str(&content).map_err(|source| StateError::Corrupt { path, source })
    }

    /// Write the whole state atomically.
    ///
    /// The JSON goes to a temp file next to the target which is then renamed
    /// over it, so a failed save leaves the previous file intact.
    pub fn save(&self) -> Result<(), StateError> {
        let path = Self::file_path(&self.repo_root);
        let json = serde_json::to_vec_pretty(self)?;
        let persist_err = |source| StateError::Persist {
            path: path.clone(),
            source,
        };

        let dir = path
            .parent()
            .ok_or_else(|| persist_err(std::io::Error::from(ErrorKind::InvalidInput)))?;
        fs::create_dir_all(dir).map_err(persist_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&path).map_err(|e| persist_err(e.error))?;
        Ok(())
    }

    pub fn add_agent(&mut self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    pub fn remove_agent(&mut self, id: &str) -> Option<Agent> {
        self.agents.remove(id)
    }

    /// All agents, oldest first.
    pub fn list_agents(&self) -> Vec<&Agent> {
        let mut agents: Vec<&Agent> = self.agents.values().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        agents
    }

    pub fn list_by_status(&self, status: AgentStatus) -> Vec<&Agent> {
        self.list_agents()
            .into_iter()
            .filter(|a| a.status == status)
            .collect()
    }

    pub fn push_merge_record(&mut self, record: MergeRecord) {
        self.merge_history.push(record);
    }

    /// Absolute directory that holds agent worktrees.
    pub fn worktrees_root(&self) -> PathBuf {
        self.repo_root.join(&self.worktree_dir)
    }
}
