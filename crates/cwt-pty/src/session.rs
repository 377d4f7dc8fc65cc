use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cwt_vt::{ScreenSnapshot, TerminalModel, VtTerminal, DEFAULT_SCROLLBACK};
use tokio::sync::mpsc;

use crate::error::PtyError;
use crate::lock;
use crate::pty::{PtyHandle, SpawnSpec};
use crate::reader::{ReadLoop, SharedWriter};

/// Program and geometry used when starting sessions.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub program: String,
    pub args: Vec<String>,
    pub rows: u16,
    pub cols: u16,
    pub scrollback: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: Vec::new(),
            rows: 24,
            cols: 80,
            scrollback: DEFAULT_SCROLLBACK,
        }
    }
}

/// One interactive program running on a PTY, with its emulated screen.
///
/// All methods take `&self`; the session is shared as `Arc<TerminalSession>`
/// between the registry, the UI and its own read loop.
pub struct TerminalSession<M: TerminalModel = VtTerminal> {
    id: String,
    workdir: PathBuf,
    label: String,
    program: String,
    args: Vec<String>,
    size: Mutex<(u16, u16)>,
    model: Arc<Mutex<M>>,
    writer: SharedWriter,
    pty: Mutex<Option<PtyHandle>>,
    read_thread: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    alive: Arc<AtomicBool>,
    exit_code: Mutex<Option<u32>>,
    notify: Option<mpsc::Sender<String>>,
}

impl TerminalSession<VtTerminal> {
    pub fn new(
        id: impl Into<String>,
        workdir: impl Into<PathBuf>,
        label: impl Into<String>,
        options: &SessionOptions,
    ) -> Self {
        let model = VtTerminal::with_scrollback(options.rows, options.cols, options.scrollback);
        Self::with_model(id, workdir, label, options, model)
    }
}

impl<M: TerminalModel> TerminalSession<M> {
    /// Build a session around a caller-supplied terminal model.
    pub fn with_model(
        id: impl Into<String>,
        workdir: impl Into<PathBuf>,
        label: impl Into<String>,
        options: &SessionOptions,
        model: M,
    ) -> Self {
        Self {
            id: id.into(),
            workdir: workdir.into(),
            label: label.into(),
            program: options.program.clone(),
            args: options.args.clone(),
            size: Mutex::new((options.rows, options.cols)),
            model: Arc::new(Mutex::new(model)),
            writer: Arc::new(Mutex::new(None)),
            pty: Mutex::new(None),
            read_thread: Mutex::new(None),
            started: AtomicBool::new(false),
            alive: Arc::new(AtomicBool::new(false)),
            exit_code: Mutex::new(None),
            notify: None,
        }
    }

    /// Send the session id on `tx` whenever new output has been applied.
    pub fn with_notifier(mut self, tx: mpsc::Sender<String>) -> Self {
        self.notify = Some(tx);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current (rows, cols).
    pub fn size(&self) -> (u16, u16) {
        *lock(&self.size)
    }

    /// Spawn the program on a fresh PTY and start the read loop.
    pub fn start(&self) -> Result<(), PtyError> {
        let mut pty_slot = lock(&self.pty);
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PtyError::AlreadyStarted);
        }

        let (rows, cols) = self.size();
        let spec = SpawnSpec {
            program: &self.program,
            args: &self.args,
            cwd: &self.workdir,
            rows,
            cols,
        };
        let mut handle = match PtyHandle::spawn(&spec) {
            Ok(handle) => handle,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (Some(reader), Some(writer)) = (handle.take_reader(), handle.take_writer()) else {
            self.started.store(false, Ordering::SeqCst);
            return Err(PtyError::Spawn("PTY streams unavailable".to_string()));
        };
        lock(&self.model).resize(rows, cols);
        *lock(&self.writer) = Some(writer);
        self.alive.store(true, Ordering::SeqCst);

        let read_loop = ReadLoop {
            session_id: self.id.clone(),
            reader,
            model: Arc::clone(&self.model),
            writer: Arc::clone(&self.writer),
            alive: Arc::clone(&self.alive),
            notify: self.notify.clone(),
        };
        match read_loop.spawn() {
            Ok(thread) => *lock(&self.read_thread) = Some(thread),
            Err(e) => {
                self.alive.store(false, Ordering::SeqCst);
                lock(&self.writer).take();
                handle.close();
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        log::info!(
            "session {} started: {} in {} (pid {:?})",
            self.id,
            self.program,
            self.workdir.display(),
            handle.process_id()
        );
        *pty_slot = Some(handle);
        Ok(())
    }

    /// Forward input bytes to the child. Writes are applied in call order.
    pub fn write(&self, data: &[u8]) -> Result<usize, PtyError> {
        let mut writer = lock(&self.writer);
        let w = writer.as_mut().ok_or(PtyError::Closed)?;
        w.write_all(data)?;
        w.flush()?;
        Ok(data.len())
    }

    /// Resize the model and the PTY. Before `start` only the stored size
    /// changes.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        *lock(&self.size) = (rows, cols);

        let pty = lock(&self.pty);
        if let Some(handle) = pty.as_ref() {
            lock(&self.model).resize(rows, cols);
            handle.resize(rows, cols)?;
        }
        Ok(())
    }

    /// Rendered text of the visible screen as of the last applied read.
    pub fn output(&self) -> String {
        lock(&self.model).contents()
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        lock(&self.model).snapshot()
    }

    pub fn scrollback(&self, lines: usize) -> Vec<String> {
        lock(&self.model).scrollback(lines)
    }

    pub fn title(&self) -> Option<String> {
        lock(&self.model).title()
    }

    /// Close the PTY and kill the child. Stopping twice is fine.
    pub fn stop(&self) -> Result<(), PtyError> {
        // The PTY goes first: a write blocked on a child that stopped
        // reading holds the writer lock until the child is gone.
        let handle = lock(&self.pty).take();
        if let Some(mut handle) = handle {
            if let Some(code) = handle.try_wait() {
                *lock(&self.exit_code) = Some(code);
            }
            handle.close();
            log::info!("session {} stopped", self.id);
        }
        lock(&self.writer).take();
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True once the read loop has drained the PTY and exited, or was never
    /// started.
    pub fn output_closed(&self) -> bool {
        lock(&self.read_thread)
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// True between a successful `start` and the end of the read loop (or
    /// `stop`).
    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Exit status of the child once it has been reaped.
    pub fn exit_code(&self) -> Option<u32> {
        let mut cached = lock(&self.exit_code);
        if cached.is_none() {
            if let Some(handle) = lock(&self.pty).as_mut() {
                *cached = handle.try_wait();
            }
        }
        *cached
    }
}

impl<M: TerminalModel> Drop for TerminalSession<M> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
