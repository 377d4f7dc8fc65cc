//! cwt-vt: terminal-state model for cwt sessions.
//!
//! Wraps `alacritty_terminal` behind the [`TerminalModel`] trait. A session
//! feeds PTY output in with [`TerminalModel::feed`] and the view layer reads
//! owned [`ScreenSnapshot`]s back out.

pub mod cell;
pub mod model;
pub mod screen;
pub mod terminal;

pub use cell::{CellFlags, Rgb, StyledCell};
pub use model::TerminalModel;
pub use screen::{CursorShape, CursorState, ScreenSnapshot};
pub use terminal::{VtTerminal, DEFAULT_SCROLLBACK};
