//! Best-effort working-directory introspection for PTY child processes.
//!
//! Returns `None` on any failure; introspection problems are never surfaced
//! as errors. Callers treat `None` as "no cwd known" and continue.

/// Resolve the current working directory of a process.
#[cfg(target_os = "linux")]
pub fn cwd_of_pid(pid: u32) -> Option<String> {
    std::fs::read_link(format!("/proc/{pid}/cwd"))
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

/// Resolve the current working directory of a process.
///
/// macOS has no procfs; `lsof -Fn` prints the cwd vnode as an `n`-prefixed
/// field line.
#[cfg(target_os = "macos")]
pub fn cwd_of_pid(pid: u32) -> Option<String> {
    let output = std::process::Command::new("lsof")
        .args(["-a", "-p", &pid.to_string(), "-d", "cwd", "-Fn"])
        .output()
        .ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .map(str::to_string)
}

/// Resolve the current working directory of a process.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn cwd_of_pid(pid: u32) -> Option<String> {
    let _ = pid;
    None
}
