//! Centralized configuration constants for Dispatcher.
//!
//! This module provides compile-time constants for the PTY engine, shell
//! integration timers, and persistence limits. These are organized by
//! component for maintainability.

/// Terminal display configuration.
pub mod terminal {
    /// Default font size in points.
    pub const DEFAULT_FONT_SIZE: u32 = 13;
    /// Minimum allowed font size.
    pub const MIN_FONT_SIZE: u32 = 8;
    /// Maximum allowed font size.
    pub const MAX_FONT_SIZE: u32 = 32;
    /// Default PTY width in columns.
    pub const DEFAULT_COLS: u16 = 80;
    /// Default PTY height in rows.
    pub const DEFAULT_ROWS: u16 = 24;
}

/// PTY engine configuration.
pub mod pty {
    use std::time::Duration;

    /// Read buffer size for PTY reader threads.
    pub const READ_BUF_SIZE: usize = 4096;
    /// Capacity of the per-session reader-to-dispatch channel. When full,
    /// the reader thread blocks, applying backpressure to the child process
    /// through the kernel PTY buffer.
    pub const OUTPUT_CHANNEL_CAPACITY: usize = 64;
    /// Maximum number of pre-spawned PTYs kept warm.
    pub const MAX_POOL_SIZE: usize = 3;
    /// Grace period between SIGTERM and SIGKILL when closing a PTY.
    pub const CLOSE_GRACE: Duration = Duration::from_millis(100);
    /// Per-reader join budget during engine shutdown.
    pub const SHUTDOWN_JOIN_BUDGET: Duration = Duration::from_millis(500);
}

/// Shell integration timing configuration.
pub mod timing {
    use std::time::Duration;

    /// Delay between `stty -echo` and the hook script during initial injection.
    pub const INJECT_ECHO_DELAY: Duration = Duration::from_millis(100);
    /// Minimum time a command must have been running before sub-shell
    /// detection is considered at all.
    pub const SUBSHELL_MIN_RUNNING: Duration = Duration::from_secs(2);
    /// Quiet-output debounce before re-injection is attempted.
    pub const QUIET_DEBOUNCE: Duration = Duration::from_millis(1500);
    /// How long to wait for an OSC after the user pressed Enter.
    pub const ENTER_WAIT: Duration = Duration::from_millis(500);
    /// How long a re-injection attempt waits for a confirming OSC.
    pub const REINJECT_VERIFY: Duration = Duration::from_secs(3);
    /// Maximum re-injection attempts per active command.
    pub const MAX_REINJECT_ATTEMPTS: u32 = 3;
    /// Emulator-bound output batching cadence (one animation tick).
    pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_millis(16);
}

/// Persistence configuration.
pub mod persistence {
    /// Maximum size of a persisted record file we are willing to read.
    pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
    /// Directory name under the platform config dir.
    pub const APP_DIR: &str = "dispatcher";
    /// Record key for the projects store.
    pub const PROJECTS_KEY: &str = "dispatcher-projects";
    /// Record key for the terminals store.
    pub const TERMINALS_KEY: &str = "dispatcher-terminals";
    /// Record key for the layouts store.
    pub const LAYOUTS_KEY: &str = "dispatcher-layouts";
    /// Record key for the font size setting.
    pub const FONT_SIZE_KEY: &str = "dispatcher-font-size";
}
