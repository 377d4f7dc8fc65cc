use std::io::{Read, Write};
use std::path::Path;

#[cfg(unix)]
use nix::sys::signal::{kill, killpg, Signal};
#[cfg(target_os = "linux")]
use nix::unistd::getsid;
#[cfg(unix)]
use nix::unistd::Pid;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

use crate::error::PtyError;

/// What to run inside a new PTY.
#[derive(Debug, Clone)]
pub struct SpawnSpec<'a> {
    pub program: &'a str,
    pub args: &'a [String],
    pub cwd: &'a Path,
    pub rows: u16,
    pub cols: u16,
}

/// Owns the PTY master and the child attached to its slave side.
///
/// The reader and writer are handed out once so the blocking read can live
/// on its own thread while writes go through the session.
pub struct PtyHandle {
    master: Option<Box<dyn MasterPty + Send>>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    /// The child leads its own session, so this is also the session id.
    /// Cleared once the session has been torn down.
    leader: Option<u32>,
}

impl PtyHandle {
    /// Open a PTY of the given size and spawn `spec.program` on it.
    ///
    /// The child runs in `spec.cwd` with a full-color `TERM`.
    pub fn spawn(spec: &SpawnSpec<'_>) -> Result<Self, PtyError> {
        let pair = native_pty_system()
            .openpty(pty_size(spec.rows, spec.cols))
            .map_err(|e| PtyError::Spawn(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(spec.program);
        cmd.args(spec.args);
        cmd.cwd(spec.cwd);
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(format!("{}: {e}", spec.program)))?;
        // The slave side belongs to the child now; keeping our copy open
        // would stop the reader from ever seeing EOF.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Spawn(format!("failed to clone reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Spawn(format!("failed to take writer: {e}")))?;

        let leader = child.process_id();
        Ok(Self {
            master: Some(pair.master),
            reader: Some(reader),
            writer: Some(writer),
            child,
            leader,
        })
    }

    /// Take the output side for a dedicated read loop.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Take the input side.
    pub fn take_writer(&mut self) -> Option<Box<dyn Write + Send>> {
        self.writer.take()
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        match &self.master {
            Some(master) => master
                .resize(pty_size(rows, cols))
                .map_err(|e| PtyError::Resize(e.to_string())),
            None => Err(PtyError::Closed),
        }
    }

    /// Exit code of the child, if it has exited.
    pub fn try_wait(&mut self) -> Option<u32> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code()),
            _ => None,
        }
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Close the master and kill the child along with everything else
    /// still attached to its terminal. Safe to call more than once.
    ///
    /// The read loop holds its own copy of the master, so it only sees the
    /// end of output once no process has the slave open. Background jobs
    /// and tool subprocesses of the child would otherwise keep it open.
    pub fn close(&mut self) {
        self.writer.take();
        self.master.take();
        let leader = self.leader.take();

        #[cfg(unix)]
        if let Some(pid) = leader {
            signal_session(pid, Signal::SIGHUP);
        }
        if self.try_wait().is_none() {
            if let Err(e) = self.child.kill() {
                log::debug!("kill on PTY child failed: {e}");
            }
        }
        #[cfg(unix)]
        if let Some(pid) = leader {
            signal_session(pid, Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        let _ = leader;
    }
}

/// Send `signal` to the process group led by `leader` and to every other
/// process in its session. Interactive shells put each background job in a
/// process group of its own, so the group alone is not enough.
#[cfg(unix)]
fn signal_session(leader: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(leader) else {
        return;
    };
    let sid = Pid::from_raw(raw);
    if let Err(e) = killpg(sid, signal) {
        log::debug!("{signal} to process group {sid}: {e}");
    }
    for pid in session_members(sid) {
        if let Err(e) = kill(pid, signal) {
            log::debug!("{signal} to {pid} in session {sid}: {e}");
        }
    }
}

#[cfg(target_os = "linux")]
fn session_members(sid: Pid) -> Vec<Pid> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .map(Pid::from_raw)
        .filter(|&pid| pid != sid && getsid(Some(pid)).is_ok_and(|s| s == sid))
        .collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn session_members(_sid: Pid) -> Vec<Pid> {
    Vec::new()
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
