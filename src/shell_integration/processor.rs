//! Per-session shell-integration processing.
//!
//! Sits between the PTY engine and the emulator: every output chunk passes
//! through here. The processor strips OSC 7770 sequences, drives the
//! session's run status, forwards cleaned bytes to the output batcher, and
//! watches for unhooked sub-shells (a `preexec` with no matching `precmd`,
//! as happens after `ssh`) so hooks can be transparently re-injected.
//!
//! Status transitions derived from a chunk are delivered before the cleaned
//! bytes of that chunk reach the emulator.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::batcher::{EmulatorSink, OutputBatcher};
use super::hooks;
use super::osc::{self, OscEvent};
use crate::config::timing;
use crate::pty::PtyEngine;
use crate::workspace::RunStatus;

/// Receives status transitions derived from the OSC stream.
pub trait StatusSink: Send + Sync + 'static {
    fn status_changed(&self, terminal_id: &str, status: RunStatus, exit_code: Option<i32>);
}

/// Fire-and-forget writer back into the PTY (hook injection path).
pub trait PtyWriter: Send + Sync + 'static {
    fn write(&self, terminal_id: &str, bytes: Vec<u8>);
}

impl PtyWriter for Arc<PtyEngine> {
    fn write(&self, terminal_id: &str, bytes: Vec<u8>) {
        let engine = Arc::clone(self);
        let terminal_id = terminal_id.to_string();
        tokio::spawn(async move {
            let _ = PtyEngine::write(&engine, &terminal_id, &bytes).await;
        });
    }
}

struct DetectorState {
    partial: VecDeque<u8>,
    status: RunStatus,
    last_preexec: Option<Instant>,
    awaiting_osc: bool,
    reinject_attempts: u32,
    reinject_attempted: bool,
    quiet_timer: Option<JoinHandle<()>>,
    enter_timer: Option<JoinHandle<()>>,
    verify_timer: Option<JoinHandle<()>>,
}

impl DetectorState {
    fn new() -> Self {
        Self {
            partial: VecDeque::new(),
            status: RunStatus::Done,
            last_preexec: None,
            awaiting_osc: false,
            reinject_attempts: 0,
            reinject_attempted: false,
            quiet_timer: None,
            enter_timer: None,
            verify_timer: None,
        }
    }

    /// A command has been running long enough that sub-shell detection
    /// applies.
    fn running_long_enough(&self) -> bool {
        self.status == RunStatus::Running
            && self
                .last_preexec
                .is_some_and(|at| at.elapsed() >= timing::SUBSHELL_MIN_RUNNING)
    }

    fn cancel_timers(&mut self) {
        for timer in [
            self.quiet_timer.take(),
            self.enter_timer.take(),
            self.verify_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
    }

    /// Any OSC proves hooks are alive: cancel all pending detection and
    /// reset the re-injection guard.
    fn on_osc_received(&mut self) {
        self.cancel_timers();
        self.awaiting_osc = false;
        self.reinject_attempts = 0;
        self.reinject_attempted = false;
    }
}

struct ProcessorInner {
    terminal_id: String,
    writer: Arc<dyn PtyWriter>,
    status_sink: Arc<dyn StatusSink>,
    batcher: OutputBatcher,
    state: Mutex<DetectorState>,
}

/// Shell-integration processor for one terminal session. Cheap to clone;
/// clones share state.
#[derive(Clone)]
pub struct SessionProcessor {
    inner: Arc<ProcessorInner>,
}

impl SessionProcessor {
    pub fn new(
        terminal_id: &str,
        writer: Arc<dyn PtyWriter>,
        status_sink: Arc<dyn StatusSink>,
        emulator: Arc<dyn EmulatorSink>,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                terminal_id: terminal_id.to_string(),
                writer,
                status_sink,
                batcher: OutputBatcher::new(terminal_id, emulator),
                state: Mutex::new(DetectorState::new()),
            }),
        }
    }

    /// Feed one raw PTY output chunk through the processor.
    pub fn on_chunk(&self, bytes: &[u8]) {
        let inner = &self.inner;
        let mut transitions = Vec::new();
        {
            let mut state = inner.state.lock();
            let outcome = osc::scan(&mut state.partial, bytes);

            if outcome.events.is_empty() {
                if state.running_long_enough() && osc::ends_with_prompt(&outcome.cleaned) {
                    Self::arm_quiet_timer(inner, &mut state);
                }
            } else {
                state.on_osc_received();
                for event in &outcome.events {
                    match *event {
                        OscEvent::Preexec => {
                            state.status = RunStatus::Running;
                            state.last_preexec = Some(Instant::now());
                            transitions.push((RunStatus::Running, None));
                        }
                        OscEvent::Precmd { exit_code } => {
                            let status = if exit_code == 0 {
                                RunStatus::Done
                            } else {
                                RunStatus::Error
                            };
                            state.status = status;
                            transitions.push((status, Some(exit_code)));
                        }
                    }
                }
            }

            // Status first, bytes second: drop the lock, notify, then batch.
            drop(state);
            for (status, exit_code) in transitions {
                inner
                    .status_sink
                    .status_changed(&inner.terminal_id, status, exit_code);
            }
            inner.batcher.push(&outcome.cleaned);
        }
    }

    /// Signal that the user pressed Enter. While a command appears to be
    /// running with stale hooks, a missing OSC response within the wait
    /// window triggers re-injection.
    pub fn on_enter_pressed(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if !state.running_long_enough() || state.awaiting_osc {
            return;
        }
        state.awaiting_osc = true;
        if let Some(timer) = state.enter_timer.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(inner);
        state.enter_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timing::ENTER_WAIT).await;
            if let Some(inner) = weak.upgrade() {
                debug!(terminal = %inner.terminal_id, "no OSC after Enter; sub-shell suspected");
                Self::attempt_reinjection(&inner);
            }
        }));
    }

    /// Write the initial hook installation into a freshly spawned shell.
    pub async fn inject_hooks(&self) {
        let [quiet, script, restore] = hooks::initial_injection_steps();
        let inner = &self.inner;
        inner.writer.write(&inner.terminal_id, quiet.into_bytes());
        tokio::time::sleep(timing::INJECT_ECHO_DELAY).await;
        inner.writer.write(&inner.terminal_id, script.into_bytes());
        inner.writer.write(&inner.terminal_id, restore.into_bytes());
        debug!(terminal = %inner.terminal_id, "installed shell hooks");
    }

    /// Current status as seen by the processor (diagnostics and tests).
    pub fn status(&self) -> RunStatus {
        self.inner.state.lock().status
    }

    /// Stop timers and flush the batcher.
    pub fn dispose(&self) {
        self.inner.state.lock().cancel_timers();
        self.inner.batcher.dispose();
    }

    fn arm_quiet_timer(inner: &Arc<ProcessorInner>, state: &mut DetectorState) {
        if let Some(timer) = state.quiet_timer.take() {
            timer.abort();
        }
        let weak = Arc::downgrade(inner);
        state.quiet_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timing::QUIET_DEBOUNCE).await;
            if let Some(inner) = weak.upgrade() {
                debug!(terminal = %inner.terminal_id, "quiet prompt with no OSC; sub-shell suspected");
                Self::attempt_reinjection(&inner);
            }
        }));
    }

    /// Re-inject hooks into a suspected unhooked sub-shell, capped per
    /// active command and verified by waiting for any OSC.
    fn attempt_reinjection(inner: &Arc<ProcessorInner>) {
        {
            let mut state = inner.state.lock();
            if state.reinject_attempted
                || state.reinject_attempts >= timing::MAX_REINJECT_ATTEMPTS
            {
                return;
            }
            state.reinject_attempted = true;
            state.reinject_attempts += 1;
            info!(
                terminal = %inner.terminal_id,
                attempt = state.reinject_attempts,
                "re-injecting shell hooks"
            );

            if let Some(timer) = state.verify_timer.take() {
                timer.abort();
            }
            let weak = Arc::downgrade(inner);
            state.verify_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(timing::REINJECT_VERIFY).await;
                if let Some(inner) = weak.upgrade() {
                    // No OSC confirmed the hooks; allow another trigger.
                    inner.state.lock().reinject_attempted = false;
                }
            }));
        }
        inner.batcher.push(hooks::REINJECT_NOTICE.as_bytes());
        inner.writer.write(
            &inner.terminal_id,
            hooks::reinjection_payload().into_bytes(),
        );
    }
}

impl crate::pty::OutputSink for SessionProcessor {
    fn on_chunk(&mut self, bytes: &[u8]) {
        SessionProcessor::on_chunk(self, bytes)
    }
}
