use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use cwt_agents::{Agent, AgentManager, AgentStatus, DiffStat};
use cwt_pty::{PtyError, SessionRegistry};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::keys::key_to_bytes;

/// Session id of the tab running at the repository root.
pub const MAIN_TAB: &str = "main";

/// Rows taken by the tab bar and the status line.
const CHROME_ROWS: u16 = 2;

const TAB_TITLE_LEN: usize = 15;

pub struct Tab {
    pub id: String,
    pub title: String,
    pub agent: Option<Agent>,
}

pub enum InputMode {
    Normal,
    /// Typing the task for a new agent.
    Task { buffer: String },
}

pub struct App {
    pub tabs: Vec<Tab>,
    pub active: usize,
    pub input: InputMode,
    /// Last message shown in the status line.
    pub message: Option<String>,
    pub should_quit: bool,
    registry: SessionRegistry,
    manager: Mutex<AgentManager>,
    notify: Option<mpsc::Receiver<String>>,
    /// Diff stat of the active agent tab, refreshed on tab switch.
    stat: Option<DiffStat>,
    rows: u16,
    cols: u16,
}

impl App {
    /// Open the repository, start the main tab and reopen unfinished agents.
    pub fn new(repo_root: &Path, config: &Config, rows: u16, cols: u16) -> Result<Self> {
        let manager = AgentManager::open(repo_root, config.manager_config())
            .with_context(|| format!("Failed to open agent state in {}", repo_root.display()))?;
        let pane_rows = rows.saturating_sub(CHROME_ROWS).max(1);
        let registry = SessionRegistry::new(config.session_options(pane_rows, cols));
        let notify = registry.subscribe();

        registry
            .spawn(MAIN_TAB, repo_root, "Main")
            .with_context(|| format!("Failed to start {}", config.command))?;

        let mut app = Self {
            tabs: vec![Tab {
                id: MAIN_TAB.to_string(),
                title: "Main".to_string(),
                agent: None,
            }],
            active: 0,
            input: InputMode::Normal,
            message: None,
            should_quit: false,
            registry,
            manager: Mutex::new(manager),
            notify,
            stat: None,
            rows,
            cols,
        };

        if config.restore_agents {
            app.restore_agents();
        }
        Ok(app)
    }

    fn manager(&self) -> MutexGuard<'_, AgentManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give every agent that still has work in its worktree a tab again.
    /// Exited agents come back `completed` and interrupted merges `merging`,
    /// so they can still be merged or closed.
    fn restore_agents(&mut self) {
        let unfinished: Vec<Agent> = self
            .manager()
            .list_agents()
            .into_iter()
            .filter(|agent| {
                matches!(
                    agent.status,
                    AgentStatus::Running | AgentStatus::Completed | AgentStatus::Merging
                )
            })
            .cloned()
            .collect();

        for agent in unfinished {
            match self.registry.spawn(&agent.id, &agent.worktree, &agent.task) {
                Ok(_) => {
                    log::info!("restored session for {} ({})", agent.id, agent.status);
                    self.tabs.push(Tab::for_agent(agent));
                }
                Err(e) => {
                    log::warn!("could not restore {}: {e}", agent.id);
                    if let Err(e) = self.manager().set_status(&agent.id, AgentStatus::Failed) {
                        log::warn!("could not mark {} failed: {e}", agent.id);
                    }
                }
            }
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn active_tab(&self) -> &Tab {
        &self.tabs[self.active]
    }

    pub fn active_stat(&self) -> Option<&DiffStat> {
        self.stat.as_ref()
    }

    /// Rows and columns available to the session pane.
    pub fn pane_size(&self) -> (u16, u16) {
        (self.rows.saturating_sub(CHROME_ROWS).max(1), self.cols)
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.rows = rows;
        self.cols = cols;
        let (pane_rows, pane_cols) = self.pane_size();
        self.registry.resize_all(pane_rows, pane_cols);
    }

    /// Drain output notifications and react to sessions that ended.
    /// Returns true when anything changed on screen.
    pub fn tick(&mut self) -> bool {
        let mut dirty = false;
        if let Some(rx) = self.notify.as_mut() {
            while rx.try_recv().is_ok() {
                dirty = true;
            }
        }
        self.mark_exited_agents();
        dirty
    }

    /// Agents whose program has exited count as completed.
    fn mark_exited_agents(&mut self) {
        let exited: Vec<String> = self
            .tabs
            .iter()
            .filter_map(|tab| tab.agent.as_ref())
            .filter(|agent| agent.status == AgentStatus::Running)
            .filter(|agent| {
                self.registry
                    .get(&agent.id)
                    .is_some_and(|session| !session.is_running())
            })
            .map(|agent| agent.id.clone())
            .collect();

        for id in exited {
            let result = self.manager().set_status(&id, AgentStatus::Completed);
            match result {
                Ok(()) => log::info!("agent {id} exited, marked completed"),
                Err(e) => log::warn!("could not mark {id} completed: {e}"),
            }
            self.sync_tab(&id);
        }
    }

    /// Refresh a tab's cached agent record from the manager.
    fn sync_tab(&mut self, id: &str) {
        let agent = self.manager().get_agent(id).cloned();
        if let Some(tab) = self.tabs.iter_mut().find(|t| t.id == id) {
            tab.agent = agent;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let result = match self.input {
            InputMode::Task { .. } => self.handle_task_key(key),
            InputMode::Normal => self.handle_normal_key(key),
        };
        if let Err(e) = result {
            log::warn!("{e:#}");
            self.message = Some(format!("{e:#}"));
        }
    }

    fn handle_task_key(&mut self, key: KeyEvent) -> Result<()> {
        let InputMode::Task { buffer } = &mut self.input else {
            return Ok(());
        };
        match key.code {
            KeyCode::Enter => {
                let task = buffer.trim().to_string();
                self.input = InputMode::Normal;
                if !task.is_empty() {
                    self.create_agent(&task)?;
                }
            }
            KeyCode::Esc => self.input = InputMode::Normal,
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => buffer.push(c),
            _ => {}
        }
        Ok(())
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<()> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('n') => {
                    self.input = InputMode::Task {
                        buffer: String::new(),
                    };
                    return Ok(());
                }
                KeyCode::Char('b') => {
                    self.select(self.active.saturating_sub(1));
                    return Ok(());
                }
                KeyCode::Char('f') => {
                    self.select((self.active + 1).min(self.tabs.len() - 1));
                    return Ok(());
                }
                KeyCode::Char('w') => return self.close_active(),
                KeyCode::Char('g') => return self.merge_active(),
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    return Ok(());
                }
                _ => {}
            }
        }
        self.forward_key(key)
    }

    /// Pasted text goes into the task prompt, or to the active session as a
    /// bracketed paste.
    pub fn paste(&mut self, text: &str) {
        if let InputMode::Task { buffer } = &mut self.input {
            buffer.extend(text.chars().filter(|c| !c.is_control()));
            return;
        }
        let data = format!("\x1b[200~{text}\x1b[201~");
        let id = &self.tabs[self.active].id;
        if let Err(e) = self.registry.write(id, data.as_bytes()) {
            log::debug!("paste into {id} dropped: {e}");
        }
    }

    fn forward_key(&mut self, key: KeyEvent) -> Result<()> {
        let bytes = key_to_bytes(key);
        if bytes.is_empty() {
            return Ok(());
        }
        let id = &self.tabs[self.active].id;
        match self.registry.write(id, &bytes) {
            Ok(_) | Err(PtyError::Closed) => Ok(()),
            Err(e) => Err(e).context("Failed to send input"),
        }
    }

    pub fn select(&mut self, index: usize) {
        if index >= self.tabs.len() {
            return;
        }
        self.active = index;
        self.stat = self.tabs[index]
            .agent
            .as_ref()
            .and_then(|agent| match self.manager().diff_stat(&agent.id) {
                Ok(stat) => Some(stat),
                Err(e) => {
                    log::debug!("no diff stat for {}: {e}", agent.id);
                    None
                }
            });
    }

    /// Create an agent for `task`, start its session and focus its tab.
    pub fn create_agent(&mut self, task: &str) -> Result<()> {
        let agent = self
            .manager()
            .create_branch(task)
            .context("Failed to create agent")?;

        if let Err(e) = self.registry.spawn(&agent.id, &agent.worktree, &agent.task) {
            if let Err(e) = self.manager().remove_branch(&agent.id) {
                log::warn!("could not clean up {} after failed start: {e}", agent.id);
            }
            return Err(e).context("Failed to start session");
        }

        self.message = Some(format!("Created {} on {}", agent.id, agent.branch));
        self.tabs.push(Tab::for_agent(agent));
        self.select(self.tabs.len() - 1);
        Ok(())
    }

    /// Close the active agent tab: stop its session and remove its branch.
    pub fn close_active(&mut self) -> Result<()> {
        let Some(agent) = self.tabs[self.active].agent.clone() else {
            self.message = Some("The main tab cannot be closed".to_string());
            return Ok(());
        };

        self.kill_session(&agent.id);
        let removed = self.manager().remove_branch(&agent.id);
        if let Err(e) = removed {
            self.sync_tab(&agent.id);
            return Err(e).context("Failed to remove agent");
        }
        self.drop_active_tab();
        self.message = Some(format!("Removed {}", agent.id));
        Ok(())
    }

    /// Merge the active agent into its base branch and close its tab.
    ///
    /// Refuses when the conflict check finds conflicts, so the repository is
    /// never left mid-merge by a keystroke.
    pub fn merge_active(&mut self) -> Result<()> {
        let Some(agent) = self.tabs[self.active].agent.clone() else {
            self.message = Some("The main tab cannot be merged".to_string());
            return Ok(());
        };

        let conflicts = self
            .manager()
            .has_conflicts(&agent.id)
            .context("Failed to check for conflicts")?;
        if conflicts {
            self.message = Some(format!(
                "{} conflicts with {}; resolve before merging",
                agent.branch, agent.base_branch
            ));
            return Ok(());
        }

        // A failed merge can still have moved the agent to `merging`.
        let merged = self.manager().merge(&agent.id);
        if let Err(e) = merged {
            self.sync_tab(&agent.id);
            return Err(e).context("Merge failed");
        }
        self.kill_session(&agent.id);
        self.drop_active_tab();
        self.message = Some(format!("Merged {} into {}", agent.id, agent.base_branch));
        Ok(())
    }

    fn kill_session(&self, id: &str) {
        match self.registry.kill(id) {
            Ok(()) | Err(PtyError::NotFound(_)) => {}
            Err(e) => log::warn!("failed to stop session {id}: {e}"),
        }
    }

    fn drop_active_tab(&mut self) {
        self.tabs.remove(self.active);
        self.select(self.active.min(self.tabs.len() - 1));
    }

    pub fn shutdown(&self) {
        self.registry.stop_all();
    }
}

impl Tab {
    fn for_agent(agent: Agent) -> Self {
        Self {
            id: agent.id.clone(),
            title: truncate(&agent.task, TAB_TITLE_LEN),
            agent: Some(agent),
        }
    }
}

/// Shorten `s` to at most `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
