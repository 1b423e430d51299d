//! Dispatcher - the core engine of a desktop terminal multiplexer.
//!
//! Three components compose the core, leaves first:
//!
//! - [`pty`] - PTY process lifecycle, I/O plumbing, warm pool, and cwd
//!   introspection. Pure system code.
//! - [`shell_integration`] - a per-session byte-stream filter between the
//!   PTY engine and the emulator: OSC 7770 status tracking, hook
//!   (re-)injection, output batching.
//! - [`workspace`] - projects, tabs, split layouts, and terminal sessions:
//!   three coupled stores with strict invariants, plus cross-project tab
//!   cycling.
//!
//! [`controller::WorkspaceController`] wires them together for the embedding
//! GUI shell; [`persistence`] restores and flushes workspace structure
//! across restarts. The GUI itself, the terminal emulator, and the durable
//! store substrate are external collaborators.

pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod pty;
pub mod shell_integration;
pub mod test_utils;
pub mod workspace;

pub use controller::WorkspaceController;
pub use error::PtyError;
pub use logging::init_logging;
pub use pty::{PtyEngine, TerminalExit};
pub use workspace::Workspace;
