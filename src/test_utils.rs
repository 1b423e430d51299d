//! Test utilities for Dispatcher.
//!
//! Shared mock sinks for unit tests across the PTY and shell-integration
//! modules. Only compiled when running tests.

#![cfg(test)]

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use crate::pty::OutputSink;
use crate::shell_integration::EmulatorSink;

/// Engine-facing output sink that forwards every chunk over an mpsc channel
/// so tests can block on it with a timeout.
pub struct CollectingSink(pub Sender<Vec<u8>>);

impl OutputSink for CollectingSink {
    fn on_chunk(&mut self, bytes: &[u8]) {
        let _ = self.0.send(bytes.to_vec());
    }
}

/// Emulator stand-in that records every flushed write.
#[derive(Default)]
pub struct RecordingEmulator {
    writes: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingEmulator {
    /// Every `(terminal_id, bytes)` write, in flush order.
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Concatenated bytes flushed for one terminal, as lossy text.
    pub fn text_for(&self, terminal_id: &str) -> String {
        let writes = self.writes.lock().unwrap();
        let bytes: Vec<u8> = writes
            .iter()
            .filter(|(id, _)| id == terminal_id)
            .flat_map(|(_, chunk)| chunk.iter().copied())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl EmulatorSink for RecordingEmulator {
    fn write_bytes(&self, terminal_id: &str, bytes: &[u8]) {
        self.writes
            .lock()
            .unwrap()
            .push((terminal_id.to_string(), bytes.to_vec()));
    }
}
