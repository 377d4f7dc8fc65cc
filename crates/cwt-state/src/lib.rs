//! cwt-state: the per-repository state file.
//!
//! One JSON document at `<repo>/.cwt/state.json` records every tracked agent
//! and the merge history. It is loaded whole and rewritten whole.

pub mod error;
pub mod status;
pub mod store;

pub use error::StateError;
pub use status::AgentStatus;
pub use store::{Agent, MergeRecord, State, DEFAULT_WORKTREE_DIR, STATE_VERSION};
