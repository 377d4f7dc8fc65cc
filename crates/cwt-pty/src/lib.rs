//! cwt-pty: PTY sessions and the session registry for cwt.
//!
//! This crate sits between the PTY (the interactive program) and the VT
//! model (screen state). It reads program output on a per-session thread,
//! feeds it into the model, and writes user input back.
//!
//! - [`PtyHandle`]: low-level spawn, resize and teardown.
//! - [`TerminalSession`]: a `PtyHandle` plus a terminal model and read loop.
//! - [`SessionRegistry`]: id-keyed map of live sessions, one per tab.

use std::sync::{Mutex, MutexGuard};

pub mod error;
pub mod pty;
mod reader;
pub mod registry;
pub mod session;

pub use error::PtyError;
pub use pty::{PtyHandle, SpawnSpec};
pub use registry::SessionRegistry;
pub use session::{SessionOptions, TerminalSession};

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
