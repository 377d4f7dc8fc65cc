use crate::screen::ScreenSnapshot;

/// An escape-sequence interpreter that reconstructs a terminal screen.
///
/// Sessions only talk to their screen state through this trait, so a
/// different emulator can be dropped in without touching the PTY plumbing.
pub trait TerminalModel: Send + 'static {
    /// Apply raw bytes read from the PTY, in arrival order.
    fn feed(&mut self, bytes: &[u8]);

    fn resize(&mut self, rows: u16, cols: u16);

    fn snapshot(&self) -> ScreenSnapshot;

    /// Rendered text of the visible screen.
    fn contents(&self) -> String {
        self.snapshot().text()
    }

    /// Up to `lines` of history above the visible screen, oldest first.
    fn scrollback(&self, lines: usize) -> Vec<String>;

    /// Bytes the emulator wants written back to the child, e.g. replies to
    /// cursor position queries. Draining clears the queue.
    fn take_write_backs(&mut self) -> Vec<String>;

    /// Window title set through OSC sequences.
    fn title(&self) -> Option<String>;
}
