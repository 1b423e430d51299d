//! Emulator-bound output coalescing.
//!
//! PTY output can arrive in many small chunks per frame; feeding each one to
//! the emulator individually wastes render passes. The batcher accumulates
//! bytes and flushes once per animation tick (~16 ms) as a single bulk
//! write. Batches never span session ids - one batcher per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config;

/// The emulator-facing byte sink (the xterm widget boundary).
pub trait EmulatorSink: Send + Sync + 'static {
    fn write_bytes(&self, terminal_id: &str, bytes: &[u8]);
}

struct BatcherShared {
    terminal_id: String,
    sink: Arc<dyn EmulatorSink>,
    pending: Mutex<Vec<u8>>,
    disposed: AtomicBool,
}

impl BatcherShared {
    fn flush(&self) {
        let buffered = std::mem::take(&mut *self.pending.lock());
        if !buffered.is_empty() {
            self.sink.write_bytes(&self.terminal_id, &buffered);
        }
    }
}

/// Per-session write coalescer in front of an [`EmulatorSink`].
pub struct OutputBatcher {
    shared: Arc<BatcherShared>,
    flusher: JoinHandle<()>,
}

impl OutputBatcher {
    pub fn new(terminal_id: &str, sink: Arc<dyn EmulatorSink>) -> Self {
        let shared = Arc::new(BatcherShared {
            terminal_id: terminal_id.to_string(),
            sink,
            pending: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });
        let flusher = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                let mut ticker = tokio::time::interval(config::timing::BATCH_FLUSH_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    shared.flush();
                }
            }
        });
        Self { shared, flusher }
    }

    /// Queues bytes for the next flush. Bytes pushed after disposal are
    /// dropped.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() || self.shared.disposed.load(Ordering::Acquire) {
            return;
        }
        self.shared.pending.lock().extend_from_slice(bytes);
    }

    /// Stops the flusher and performs one final synchronous flush.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.flusher.abort();
        self.shared.flush();
    }
}

impl Drop for OutputBatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}
