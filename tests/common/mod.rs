//! Shared test utilities for integration tests.
//!
//! This module provides common helpers, fixtures, and mock structures
//! that are shared across integration tests.

// Allow unused items - they are available for future tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatcher::controller::WorkspaceController;
use dispatcher::shell_integration::EmulatorSink;
use dispatcher::{PtyEngine, Workspace};

// Re-exports for convenience
pub use tempfile::{tempdir, TempDir};

/// Default timeout for async operations against real PTYs.
pub const PTY_TIMEOUT: Duration = Duration::from_secs(10);

/// Short timeout for fast operations
pub const SHORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Emulator stand-in that records cleaned bytes per terminal id.
#[derive(Default)]
pub struct RecordingEmulator {
    streams: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingEmulator {
    pub fn text_for(&self, terminal_id: &str) -> String {
        let streams = self.streams.lock().unwrap();
        streams
            .get(terminal_id)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }
}

impl EmulatorSink for RecordingEmulator {
    fn write_bytes(&self, terminal_id: &str, bytes: &[u8]) {
        self.streams
            .lock()
            .unwrap()
            .entry(terminal_id.to_string())
            .or_default()
            .extend_from_slice(bytes);
    }
}

/// A controller wired to a real PTY engine, a recording emulator, and a
/// temp storage directory that cleans itself up.
pub struct TestRig {
    pub controller: Arc<WorkspaceController>,
    pub emulator: Arc<RecordingEmulator>,
    pub storage: TempDir,
}

impl TestRig {
    pub fn new() -> Self {
        let storage = tempdir().expect("temp storage dir");
        let emulator = Arc::new(RecordingEmulator::default());
        let controller = WorkspaceController::with_storage_dir(
            Workspace::new(),
            Arc::new(PtyEngine::new()),
            emulator.clone(),
            Some(storage.path().to_path_buf()),
        );
        Self {
            controller,
            emulator,
            storage,
        }
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
