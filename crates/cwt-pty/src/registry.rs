use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::PtyError;
use crate::lock;
use crate::session::{SessionOptions, TerminalSession};

/// Capacity of the output-ready channel. Extra notifications are dropped;
/// the consumer redraws from the latest screen anyway.
const NOTIFY_CAPACITY: usize = 64;

/// Live sessions keyed by id, one per UI tab.
///
/// Every lookup, insert and delete happens under the one map lock, so
/// concurrent `spawn`s of the same id cannot both succeed.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<TerminalSession>>>,
    options: Mutex<SessionOptions>,
    notify_tx: mpsc::Sender<String>,
    notify_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl SessionRegistry {
    pub fn new(options: SessionOptions) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CAPACITY);
        Self {
            sessions: Mutex::new(HashMap::new()),
            options: Mutex::new(options),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        }
    }

    /// Take the receiver of output-ready notifications. Only the first
    /// caller gets it.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<String>> {
        lock(&self.notify_rx).take()
    }

    /// Start a session for `id` in `workdir` and register it.
    pub fn spawn(
        &self,
        id: &str,
        workdir: impl Into<PathBuf>,
        label: &str,
    ) -> Result<Arc<TerminalSession>, PtyError> {
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(id) {
            return Err(PtyError::AlreadyExists(id.to_string()));
        }

        let options = lock(&self.options).clone();
        let session = TerminalSession::new(id, workdir, label, &options)
            .with_notifier(self.notify_tx.clone());
        session.start()?;

        let session = Arc::new(session);
        sessions.insert(id.to_string(), Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<TerminalSession>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Write input to the session registered as `id`.
    pub fn write(&self, id: &str, data: &[u8]) -> Result<usize, PtyError> {
        let session = self
            .get(id)
            .ok_or_else(|| PtyError::NotFound(id.to_string()))?;
        session.write(data)
    }

    /// Stop and deregister a session.
    pub fn kill(&self, id: &str) -> Result<(), PtyError> {
        let mut sessions = lock(&self.sessions);
        let session = sessions
            .get(id)
            .ok_or_else(|| PtyError::NotFound(id.to_string()))?;
        session.stop()?;
        sessions.remove(id);
        Ok(())
    }

    /// Resize every live session. New sessions also start at this size.
    pub fn resize_all(&self, rows: u16, cols: u16) {
        {
            let mut options = lock(&self.options);
            options.rows = rows;
            options.cols = cols;
        }
        for session in lock(&self.sessions).values() {
            if let Err(e) = session.resize(rows, cols) {
                log::warn!("resize of session {} failed: {e}", session.id());
            }
        }
    }

    /// Stop and deregister every session.
    pub fn stop_all(&self) {
        let drained: Vec<(String, Arc<TerminalSession>)> =
            lock(&self.sessions).drain().collect();
        for (id, session) in drained {
            if let Err(e) = session.stop() {
                log::warn!("stopping session {id} failed: {e}");
            }
        }
    }

    pub fn count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionOptions {
            program: "/bin/sh".to_string(),
            ..SessionOptions::default()
        })
    }

    #[test]
    fn spawn_and_list() {
        let reg = registry();
        reg.spawn("b", "/", "second").unwrap();
        reg.spawn("a", "/", "first").unwrap();

        assert_eq!(reg.count(), 2);
        assert_eq!(reg.list(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reg.get("a").unwrap().label(), "first");
        reg.stop_all();
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let reg = registry();
        reg.spawn("dup", "/", "").unwrap();
        assert!(matches!(
            reg.spawn("dup", "/", ""),
            Err(PtyError::AlreadyExists(id)) if id == "dup"
        ));
        assert_eq!(reg.count(), 1);
        reg.stop_all();
    }

    #[test]
    fn failed_spawn_registers_nothing() {
        let reg = SessionRegistry::new(SessionOptions {
            program: "/no/such/cwt-program".to_string(),
            ..SessionOptions::default()
        });
        assert!(matches!(reg.spawn("x", "/", ""), Err(PtyError::Spawn(_))));
        assert_eq!(reg.count(), 0);
        assert!(reg.get("x").is_none());
    }

    #[test]
    fn kill_removes_and_second_kill_is_not_found() {
        let reg = registry();
        let session = reg.spawn("k", "/", "").unwrap();

        reg.kill("k").unwrap();
        assert!(reg.get("k").is_none());
        assert!(!session.is_running());
        assert!(matches!(reg.kill("k"), Err(PtyError::NotFound(_))));
    }

    #[test]
    fn write_to_unknown_session_is_not_found() {
        let reg = registry();
        assert!(matches!(reg.write("ghost", b"x"), Err(PtyError::NotFound(_))));
    }

    #[test]
    fn resize_all_applies_to_live_and_future_sessions() {
        let reg = registry();
        let first = reg.spawn("one", "/", "").unwrap();
        reg.resize_all(30, 100);
        let second = reg.spawn("two", "/", "").unwrap();

        assert_eq!(first.size(), (30, 100));
        assert_eq!(second.size(), (30, 100));
        assert_eq!(first.snapshot().width(), 100);
        reg.stop_all();
    }

    #[test]
    fn stop_all_empties_the_registry() {
        let reg = registry();
        let a = reg.spawn("a", "/", "").unwrap();
        let b = reg.spawn("b", "/", "").unwrap();

        reg.stop_all();
        assert_eq!(reg.count(), 0);
        assert!(!a.is_running());
        assert!(!b.is_running());
    }

    #[test]
    fn concurrent_spawns_of_one_id_admit_exactly_one() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || reg.spawn("race", "/", "").is_ok())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(reg.count(), 1);
        reg.stop_all();
    }

    #[test]
    fn registry_write_reaches_session() {
        let reg = registry();
        reg.spawn("w", "/", "").unwrap();
        let mut rx = reg.subscribe().unwrap();
        assert!(reg.subscribe().is_none());

        reg.write("w", b"echo reg_$((2+3))\n").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let session = reg.get("w").unwrap();
        while !session.output().contains("reg_5") && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        assert!(session.output().contains("reg_5"));
        assert!(rx.try_recv().is_ok());
        reg.stop_all();
    }
}
