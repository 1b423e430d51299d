//! Shell-integration stream processing.
//!
//! Turns a raw PTY byte stream into a cleaned stream for the emulator plus a
//! per-session status side-channel, driven by a tiny private OSC protocol
//! emitted by injected shell hooks. Also detects unhooked sub-shells (after
//! `ssh`, `et`, `mosh`) and re-injects the hooks.

pub mod batcher;
pub mod hooks;
pub mod osc;
pub mod processor;

pub use batcher::{EmulatorSink, OutputBatcher};
pub use osc::{OscEvent, ScanOutcome};
pub use processor::{PtyWriter, SessionProcessor, StatusSink};
