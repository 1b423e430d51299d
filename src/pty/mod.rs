//! PTY engine: process lifecycle, I/O plumbing, warm pool, cwd
//! introspection. Pure system code; no knowledge of projects or layouts.

mod cwd;
mod engine;
mod pool;

pub use engine::{cd_command, OutputSink, PtyEngine, TerminalExit};
