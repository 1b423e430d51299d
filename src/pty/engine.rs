//! PTY process lifecycle and I/O plumbing.
//!
//! Owns the OS-level shell processes. Each PTY gets a dedicated blocking
//! reader thread feeding a bounded channel; a per-session dispatch task on
//! the shared runtime forwards chunks to the session's output sink. Within a
//! terminal id, chunk order is preserved and chunks are delivered exactly
//! once; nothing is ordered across terminal ids.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::cwd;
use super::pool::{OutputRouter, PoolEntry};
use crate::config;
use crate::error::PtyError;

/// Shell binaries `$SHELL` may name, matched by basename wherever they are
/// installed. Anything else is replaced by [`DEFAULT_SHELL`] rather than
/// exec'd blindly.
#[cfg(unix)]
const KNOWN_SHELLS: &[&str] = &["sh", "bash", "zsh", "fish", "dash", "ksh", "tcsh", "csh"];

/// Fallback when `$SHELL` is unset or fails validation.
#[cfg(unix)]
const DEFAULT_SHELL: &str = "/bin/bash";

#[cfg(unix)]
fn shell_basename_is_known(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| KNOWN_SHELLS.contains(&name))
        .unwrap_or(false)
}

/// A `$SHELL` value is accepted when it is an absolute path to an existing
/// file whose basename names a known shell, either directly or after
/// resolving symlinks (a Debian `/bin/sh` -> `dash` for example).
#[cfg(unix)]
fn shell_is_permitted(shell: &str) -> bool {
    let path = Path::new(shell);
    if !path.is_absolute() || !path.exists() {
        return false;
    }
    if shell_basename_is_known(path) {
        return true;
    }
    std::fs::canonicalize(path)
        .map(|resolved| shell_basename_is_known(&resolved))
        .unwrap_or(false)
}

/// The shell command to spawn, from `$SHELL` with validation.
#[cfg(unix)]
fn validated_shell() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if shell_is_permitted(&shell) => shell,
        Ok(shell) => {
            warn!(rejected = %shell, fallback = DEFAULT_SHELL, "SHELL failed validation");
            DEFAULT_SHELL.to_string()
        }
        Err(_) => DEFAULT_SHELL.to_string(),
    }
}

#[cfg(windows)]
fn validated_shell() -> String {
    std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
}

/// Builds the ` cd '<dir>' && clear` line written into an adopted or freshly
/// seeded terminal. The leading space keeps it out of shell history
/// (HISTCONTROL=ignorespace / HIST_IGNORE_SPACE).
pub fn cd_command(dir: &str) -> String {
    let escaped = dir.replace('\'', "'\\''");
    format!(" cd '{escaped}' && clear\n")
}

/// Receives a session's output chunks, in order, exactly once, with
/// arbitrary chunk boundaries.
pub trait OutputSink: Send + 'static {
    fn on_chunk(&mut self, bytes: &[u8]);
}

/// Published when a PTY's child terminates.
#[derive(Clone, Debug, Serialize)]
pub struct TerminalExit {
    pub terminal_id: String,
    /// None when the PTY died without a usable status (read failure).
    pub exit_code: Option<i32>,
}

type ChildSlot = Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>;

struct PtySession {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: ChildSlot,
    reader: Option<thread::JoinHandle<()>>,
}

enum ReaderEvent {
    Chunk(Vec<u8>),
    Exit(Option<i32>),
}

/// Registry of live PTYs plus the warm pool.
pub struct PtyEngine {
    sessions: Mutex<HashMap<String, PtySession>>,
    pool: Mutex<Vec<PoolEntry>>,
    pool_target: AtomicUsize,
    pool_filling: AtomicBool,
    exit_tx: broadcast::Sender<TerminalExit>,
}

impl Default for PtyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyEngine {
    pub fn new() -> Self {
        let (exit_tx, _) = broadcast::channel(256);
        Self {
            sessions: Mutex::new(HashMap::new()),
            pool: Mutex::new(Vec::new()),
            pool_target: AtomicUsize::new(0),
            pool_filling: AtomicBool::new(false),
            exit_tx,
        }
    }

    /// Subscribe to child-exit events.
    pub fn subscribe_exits(&self) -> broadcast::Receiver<TerminalExit> {
        self.exit_tx.subscribe()
    }

    /// Number of live sessions (diagnostics).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    /// Spawns (or adopts from the pool) a PTY under `terminal_id` and begins
    /// forwarding output to `sink`. Returns once the spawn is acknowledged.
    pub async fn create(
        &self,
        terminal_id: &str,
        cwd: Option<&str>,
        cols: u16,
        rows: u16,
        sink: Box<dyn OutputSink>,
    ) -> Result<(), PtyError> {
        if self.sessions.lock().contains_key(terminal_id) {
            return Err(PtyError::AlreadyExists(terminal_id.to_string()));
        }

        let requested_cwd = cwd.filter(|dir| !dir.is_empty());

        // Try the pool first - even with a cwd we can cd into it.
        let pooled = self.pool.lock().pop();
        if let Some(mut entry) = pooled {
            entry
                .router
                .lock()
                .assign(terminal_id, sink, requested_cwd.is_none());
            let _ = entry.master.resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            });
            if let Some(dir) = requested_cwd {
                let line = cd_command(dir);
                if let Err(error) = entry
                    .writer
                    .write_all(line.as_bytes())
                    .and_then(|_| entry.writer.flush())
                {
                    trace!(terminal = terminal_id, %error, "cd into adopted PTY failed");
                }
            }
            let session = PtySession {
                master: entry.master,
                writer: entry.writer,
                child: entry.child,
                reader: entry.reader,
            };
            self.sessions
                .lock()
                .insert(terminal_id.to_string(), session);
            info!(terminal = terminal_id, "adopted pooled PTY");
            return Ok(());
        }

        self.spawn_fresh(terminal_id, requested_cwd, cols, rows, sink)
    }

    fn spawn_fresh(
        &self,
        terminal_id: &str,
        cwd: Option<&str>,
        cols: u16,
        rows: u16,
        sink: Box<dyn OutputSink>,
    ) -> Result<(), PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let shell = validated_shell();
        let mut cmd = CommandBuilder::new(&shell);
        cmd.env("TERM", "xterm-256color");
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let child: ChildSlot = Arc::new(Mutex::new(Some(child)));
        let router = Arc::new(Mutex::new(OutputRouter::streaming(terminal_id, sink)));
        let reader_handle =
            spawn_reader_pipeline(reader, Arc::clone(&child), router, self.exit_tx.clone());

        let session = PtySession {
            master: pair.master,
            writer,
            child,
            reader: Some(reader_handle),
        };
        self.sessions
            .lock()
            .insert(terminal_id.to_string(), session);
        info!(terminal = terminal_id, shell = %shell, "spawned PTY");
        Ok(())
    }

    /// Queues bytes to the PTY master. Writes to a dead PTY fail silently;
    /// the session will soon be destroyed by its exit event.
    pub async fn write(&self, terminal_id: &str, bytes: &[u8]) -> Result<(), PtyError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(terminal_id)
            .ok_or_else(|| PtyError::NotFound(terminal_id.to_string()))?;
        if let Err(error) = session
            .writer
            .write_all(bytes)
            .and_then(|_| session.writer.flush())
        {
            trace!(terminal = terminal_id, %error, "write to dead PTY dropped");
        }
        Ok(())
    }

    /// Applies a window-size change to the PTY.
    pub async fn resize(&self, terminal_id: &str, cols: u16, rows: u16) -> Result<(), PtyError> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(terminal_id)
            .ok_or_else(|| PtyError::NotFound(terminal_id.to_string()))?;
        if let Err(error) = session.master.resize(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }) {
            warn!(terminal = terminal_id, %error, "PTY resize failed");
        }
        Ok(())
    }

    /// Terminates the PTY: SIGTERM, a 100 ms grace period, then a hard kill;
    /// the reader thread is joined and the registry entry removed.
    pub async fn close(&self, terminal_id: &str) -> Result<(), PtyError> {
        let session = self
            .sessions
            .lock()
            .remove(terminal_id)
            .ok_or_else(|| PtyError::NotFound(terminal_id.to_string()))?;
        debug!(terminal = terminal_id, "closing PTY");
        let _ = tokio::task::spawn_blocking(move || shutdown_session(session)).await;
        Ok(())
    }

    /// Best-effort current working directory of the PTY's child process.
    pub async fn get_cwd(&self, terminal_id: &str) -> Result<Option<String>, PtyError> {
        let pid = {
            let sessions = self.sessions.lock();
            let session = sessions
                .get(terminal_id)
                .ok_or_else(|| PtyError::NotFound(terminal_id.to_string()))?;
            let guard = session.child.lock();
            guard.as_ref().and_then(|child| child.process_id())
        };
        match pid {
            Some(pid) => Ok(tokio::task::spawn_blocking(move || cwd::cwd_of_pid(pid))
                .await
                .unwrap_or(None)),
            None => Ok(None),
        }
    }

    /// Tops the warm pool up to `count` pre-spawned PTYs (capped at
    /// [`config::pty::MAX_POOL_SIZE`]) in the background. Idempotent.
    pub fn warm_pool(self: &Arc<Self>, count: usize) {
        self.pool_target
            .store(count.min(config::pty::MAX_POOL_SIZE), Ordering::Relaxed);
        self.top_up_pool();
    }

    /// Re-fills the pool to its previous target after an adoption.
    pub fn refresh_pool(self: &Arc<Self>) {
        self.top_up_pool();
    }

    fn top_up_pool(self: &Arc<Self>) {
        if self
            .pool_filling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let engine = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            loop {
                let target = engine.pool_target.load(Ordering::Relaxed);
                if engine.pool.lock().len() >= target {
                    break;
                }
                if let Err(error) = engine.spawn_to_pool() {
                    // The pool is best-effort; creation falls back to
                    // direct spawn when it runs dry.
                    warn!(%error, "warm pool spawn failed");
                    break;
                }
            }
            engine.pool_filling.store(false, Ordering::Release);
        });
    }

    pub(crate) fn spawn_to_pool(&self) -> Result<(), PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config::terminal::DEFAULT_ROWS,
                cols: config::terminal::DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(validated_shell());
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let child: ChildSlot = Arc::new(Mutex::new(Some(child)));
        let router = Arc::new(Mutex::new(OutputRouter::buffering()));
        let reader_handle = spawn_reader_pipeline(
            reader,
            Arc::clone(&child),
            Arc::clone(&router),
            self.exit_tx.clone(),
        );

        self.pool.lock().push(PoolEntry {
            master: pair.master,
            writer,
            child,
            router,
            reader: Some(reader_handle),
        });
        debug!("pre-spawned PTY into warm pool");
        Ok(())
    }

    /// Closes every live PTY and drains the pool. Readers are joined within
    /// the shutdown budget; stragglers die with their killed children.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        info!(sessions = ids.len(), "shutting down PTY engine");
        for id in ids {
            // Each close gets a bounded join budget; a straggling reader's
            // child has already been SIGKILL-ed by the close ladder.
            let _ = tokio::time::timeout(config::pty::SHUTDOWN_JOIN_BUDGET, self.close(&id)).await;
        }
        let entries: Vec<PoolEntry> = self.pool.lock().drain(..).collect();
        let _ = tokio::task::spawn_blocking(move || {
            for mut entry in entries {
                terminate_child(&entry.child);
                if let Some(reader) = entry.reader.take() {
                    let _ = reader.join();
                }
            }
        })
        .await;
    }
}

/// Starts the blocking reader thread and its dispatch task. The thread feeds
/// a bounded channel; when the channel is full the thread blocks, pushing
/// backpressure into the kernel PTY buffer.
fn spawn_reader_pipeline(
    mut reader: Box<dyn Read + Send>,
    child: ChildSlot,
    router: Arc<Mutex<OutputRouter>>,
    exit_tx: broadcast::Sender<TerminalExit>,
) -> thread::JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<ReaderEvent>(config::pty::OUTPUT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ReaderEvent::Chunk(bytes) => router.lock().route(&bytes),
                ReaderEvent::Exit(exit_code) => {
                    let assigned = router.lock().assigned_id.clone();
                    if let Some(terminal_id) = assigned {
                        debug!(terminal = %terminal_id, ?exit_code, "PTY exited");
                        let _ = exit_tx.send(TerminalExit {
                            terminal_id,
                            exit_code,
                        });
                    }
                    break;
                }
            }
        }
    });

    thread::spawn(move || {
        let mut buf = [0u8; config::pty::READ_BUF_SIZE];
        let mut read_failed = false;
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(ReaderEvent::Chunk(buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(_) => {
                    read_failed = true;
                    break;
                }
            }
        }
        let exit_code = {
            let mut guard = child.lock();
            if read_failed {
                // A broken master means the PTY is unusable; make sure the
                // child is gone and report an unknown status.
                if let Some(child) = guard.as_mut() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                None
            } else {
                guard
                    .as_mut()
                    .and_then(|child| child.wait().ok())
                    .map(|status| status.exit_code() as i32)
            }
        };
        let _ = tx.blocking_send(ReaderEvent::Exit(exit_code));
    })
}

fn shutdown_session(mut session: PtySession) {
    terminate_child(&session.child);
    if let Some(reader) = session.reader.take() {
        let _ = reader.join();
    }
}

/// SIGTERM, grace, SIGKILL on unix; a non-unix target goes straight to
/// kill. Leaves final reaping to the reader thread's `wait` so the exit
/// status still reaches the exit channel.
fn terminate_child(slot: &ChildSlot) {
    let mut guard = slot.lock();
    let Some(child) = guard.as_mut() else {
        return;
    };
    #[cfg(unix)]
    {
        if let Some(pid) = child.process_id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
        let deadline = Instant::now() + config::pty::CLOSE_GRACE;
        loop {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
    let _ = child.kill();
}
