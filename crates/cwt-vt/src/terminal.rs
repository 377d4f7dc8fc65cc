use std::sync::{Arc, Mutex};

use alacritty_terminal::event::{Event, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line};
use alacritty_terminal::term::{Config, Term};
use alacritty_terminal::vte::ansi;

use crate::cell::StyledCell;
use crate::model::TerminalModel;
use crate::screen::{cells_to_text, convert_cell, convert_cursor_shape, CursorState, ScreenSnapshot};

/// Default number of history lines kept above the screen.
pub const DEFAULT_SCROLLBACK: usize = 1_000;

#[derive(Default)]
struct EventState {
    title: Option<String>,
    pty_writes: Vec<String>,
}

/// Captures the terminal events we care about.
///
/// `Term` owns its listener, so the state lives behind an `Arc<Mutex<_>>`
/// that `VtTerminal` shares.
#[derive(Clone, Default)]
pub struct EventProxy {
    state: Arc<Mutex<EventState>>,
}

impl EventProxy {
    fn with_state<R>(&self, f: impl FnOnce(&mut EventState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl EventListener for EventProxy {
    fn send_event(&self, event: Event) {
        self.with_state(|state| match event {
            Event::Title(title) => state.title = Some(title),
            Event::ResetTitle => state.title = None,
            Event::PtyWrite(data) => state.pty_writes.push(data),
            _ => {}
        });
    }
}

struct TermSize {
    columns: usize,
    screen_lines: usize,
}

impl TermSize {
    fn new(rows: u16, cols: u16) -> Self {
        Self {
            columns: cols.max(1) as usize,
            screen_lines: rows.max(1) as usize,
        }
    }
}

impl Dimensions for TermSize {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn columns(&self) -> usize {
        self.columns
    }
}

/// Terminal emulator backed by `alacritty_terminal`.
pub struct VtTerminal {
    term: Term<EventProxy>,
    parser: ansi::Processor,
    events: EventProxy,
}

impl VtTerminal {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self::with_scrollback(rows, cols, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(rows: u16, cols: u16, scrollback: usize) -> Self {
        let config = Config {
            scrolling_history: scrollback,
            ..Config::default()
        };
        let events = EventProxy::default();
        let term = Term::new(config, &TermSize::new(rows, cols), events.clone());

        Self {
            term,
            parser: ansi::Processor::new(),
            events,
        }
    }

    pub fn rows(&self) -> u16 {
        self.term.screen_lines() as u16
    }

    pub fn cols(&self) -> u16 {
        self.term.columns() as u16
    }

    pub fn cursor(&self) -> CursorState {
        let content = self.term.renderable_content();
        let cursor = &content.cursor;
        CursorState {
            row: cursor.point.line.0.max(0) as u16,
            col: cursor.point.column.0 as u16,
            shape: convert_cursor_shape(cursor.shape),
            visible: cursor.shape != ansi::CursorShape::Hidden,
        }
    }

    /// Number of lines currently held in history.
    pub fn history_len(&self) -> usize {
        self.term.grid().history_size()
    }

    fn line_cells(&self, line: Line) -> Vec<StyledCell> {
        let grid = self.term.grid();
        let colors = self.term.colors();
        (0..self.term.columns())
            .map(|col| convert_cell(&grid[line][Column(col)], colors))
            .collect()
    }
}

impl TerminalModel for VtTerminal {
    fn feed(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.term, bytes);
    }

    fn resize(&mut self, rows: u16, cols: u16) {
        self.term.resize(TermSize::new(rows, cols));
    }

    fn snapshot(&self) -> ScreenSnapshot {
        let rows = (0..self.term.screen_lines())
            .map(|row| self.line_cells(Line(row as i32)))
            .collect();
        ScreenSnapshot {
            rows,
            cursor: self.cursor(),
        }
    }

    fn scrollback(&self, lines: usize) -> Vec<String> {
        let take = lines.min(self.history_len());
        (1..=take)
            .rev()
            .map(|back| cells_to_text(&self.line_cells(Line(-(back as i32)))))
            .collect()
    }

    fn take_write_backs(&mut self) -> Vec<String> {
        self.events.with_state(|state| std::mem::take(&mut state.pty_writes))
    }

    fn title(&self) -> Option<String> {
        self.events.with_state(|state| state.title.clone())
    }
}
