use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked agent branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Merging,
    Merged,
    Failed,
}

const VALID_TRANSITIONS: &[(AgentStatus, &[AgentStatus])] = &[
    (
        AgentStatus::Pending,
        &[AgentStatus::Running, AgentStatus::Failed],
    ),
    (
        AgentStatus::Running,
        &[
            AgentStatus::Completed,
            AgentStatus::Merging,
            AgentStatus::Failed,
        ],
    ),
    (
        AgentStatus::Completed,
        &[AgentStatus::Merging, AgentStatus::Failed],
    ),
    (
        AgentStatus::Merging,
        &[AgentStatus::Merged, AgentStatus::Failed],
    ),
    (AgentStatus::Merged, &[]),
    (AgentStatus::Failed, &[]),
];

impl AgentStatus {
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        VALID_TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .is_some_and(|(_, allowed)| allowed.contains(&next))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStatus::Merged | AgentStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Pending => "pending",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Merging => "merging",
            AgentStatus::Merged => "merged",
            AgentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
