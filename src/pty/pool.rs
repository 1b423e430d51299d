//! Warm pool plumbing: output routing for pre-spawned PTYs.
//!
//! A pooled PTY runs a shell before any terminal claims it, so its output
//! has nowhere to go yet. The router buffers those bytes and switches to
//! streaming once the PTY is adopted under a real terminal id.

use std::io::Write;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use portable_pty::{Child, MasterPty};

use super::engine::OutputSink;

/// Where a PTY's output currently goes.
pub(crate) enum OutputMode {
    /// PTY is pooled; buffer all output until assigned.
    Buffering(Vec<u8>),
    /// PTY is assigned to a real terminal; stream to its sink.
    Streaming(Box<dyn OutputSink>),
}

/// Routes reader output either into the buffer or to the adopted sink.
pub(crate) struct OutputRouter {
    pub mode: OutputMode,
    /// Set on adoption; exit events are only published for assigned PTYs.
    pub assigned_id: Option<String>,
}

impl OutputRouter {
    pub fn buffering() -> Self {
        Self {
            mode: OutputMode::Buffering(Vec::with_capacity(4096)),
            assigned_id: None,
        }
    }

    pub fn streaming(terminal_id: &str, sink: Box<dyn OutputSink>) -> Self {
        Self {
            mode: OutputMode::Streaming(sink),
            assigned_id: Some(terminal_id.to_string()),
        }
    }

    pub fn route(&mut self, bytes: &[u8]) {
        match &mut self.mode {
            OutputMode::Buffering(buffer) => buffer.extend_from_slice(bytes),
            OutputMode::Streaming(sink) => sink.on_chunk(bytes),
        }
    }

    /// Switches a pooled router to streaming. When `replay` is set, any
    /// buffered output (the initial prompt) is delivered to the sink first;
    /// otherwise the buffer is discarded because the adopter is about to
    /// `cd && clear` anyway.
    pub fn assign(&mut self, terminal_id: &str, mut sink: Box<dyn OutputSink>, replay: bool) {
        if replay {
            if let OutputMode::Buffering(buffer) = &self.mode {
                if !buffer.is_empty() {
                    sink.on_chunk(buffer);
                }
            }
        }
        self.mode = OutputMode::Streaming(sink);
        self.assigned_id = Some(terminal_id.to_string());
    }
}

/// A pre-spawned PTY waiting to be adopted.
pub(crate) struct PoolEntry {
    pub master: Box<dyn MasterPty + Send>,
    pub writer: Box<dyn Write + Send>,
    pub child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>,
    pub router: Arc<Mutex<OutputRouter>>,
    pub reader: Option<thread::JoinHandle<()>>,
}
