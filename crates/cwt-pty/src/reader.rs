//! Per-session read loop that drains PTY output into the terminal model.
//!
//! PTY reads block, so each session gets a dedicated OS thread. The reader
//! is owned by the thread rather than the session, which keeps the model
//! lock free between reads for `output()` and snapshot callers.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cwt_vt::TerminalModel;
use tokio::sync::mpsc;

use crate::error::PtyError;
use crate::lock;

pub(crate) type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

pub(crate) struct ReadLoop<M> {
    pub session_id: String,
    pub reader: Box<dyn Read + Send>,
    pub model: Arc<Mutex<M>>,
    pub writer: SharedWriter,
    pub alive: Arc<AtomicBool>,
    pub notify: Option<mpsc::Sender<String>>,
}

impl<M: TerminalModel> ReadLoop<M> {
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>, PtyError> {
        let handle = std::thread::Builder::new()
            .name(format!("pty-io-{}", self.session_id))
            .spawn(move || self.run())?;
        Ok(handle)
    }

    fn run(mut self) {
        let mut buf = [0u8; 65536];

        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    log::debug!("session {}: PTY read ended: {e}", self.session_id);
                    break;
                }
            };

            let write_backs = {
                let mut model = lock(&self.model);
                model.feed(&buf[..n]);
                model.take_write_backs()
            };
            if !write_backs.is_empty() {
                self.write_back(&write_backs);
            }

            if let Some(tx) = &self.notify {
                // Full means a redraw is already pending.
                let _ = tx.try_send(self.session_id.clone());
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        if let Some(tx) = &self.notify {
            let _ = tx.try_send(self.session_id.clone());
        }
        log::info!("session {} output closed", self.session_id);
    }

    fn write_back(&self, data: &[String]) {
        let mut writer = lock(&self.writer);
        if let Some(w) = writer.as_mut() {
            for chunk in data {
                if let Err(e) = w.write_all(chunk.as_bytes()).and_then(|()| w.flush()) {
                    log::debug!("session {}: write-back failed: {e}", self.session_id);
                    return;
                }
            }
        }
    }
}
