//! Terminal session store.
//!
//! One [`TerminalSession`] per live PTY. Sessions are freely created without
//! a corresponding sidebar tree node - that is how split panes exist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide counter for default terminal titles.
static TERMINAL_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_default_title() -> String {
    let n = TERMINAL_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("Terminal {n}")
}

/// Run-state of a session, derived from shell integration and exit events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Done,
    Error,
}

/// A terminal session bound to a live PTY.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    pub status: RunStatus,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// All terminal sessions plus the focused terminal id.
///
/// Insertion order is tracked explicitly so the active-terminal fallback on
/// removal ("last remaining key") is deterministic.
#[derive(Clone, Debug, Default)]
pub struct TerminalStore {
    pub sessions: HashMap<String, TerminalSession>,
    order: Vec<String>,
    pub active_terminal_id: Option<String>,
}

impl TerminalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session and focuses it. Missing titles are auto-assigned as
    /// `Terminal <N>` from a process-wide counter. Aborts on duplicate id.
    pub fn add_session(&mut self, id: &str, title: Option<String>, cwd: Option<String>) -> bool {
        if self.sessions.contains_key(id) {
            return false;
        }
        let session = TerminalSession {
            id: id.to_string(),
            title: title.unwrap_or_else(next_default_title),
            notes: String::new(),
            status: RunStatus::Running,
            exit_code: None,
            cwd,
        };
        self.sessions.insert(id.to_string(), session);
        self.order.push(id.to_string());
        self.active_terminal_id = Some(id.to_string());
        true
    }

    /// Removes a session. If it was active, focus falls back to the last
    /// remaining session in insertion order, else to none.
    pub fn remove_session(&mut self, id: &str) -> Option<TerminalSession> {
        let removed = self.sessions.remove(id)?;
        self.order.retain(|s| s != id);
        if self.active_terminal_id.as_deref() == Some(id) {
            self.active_terminal_id = self.order.last().cloned();
        }
        Some(removed)
    }

    /// Sets the focused terminal. Aborts if the id does not exist.
    pub fn set_active_terminal(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if !self.sessions.contains_key(id) => false,
            _ => {
                self.active_terminal_id = id.map(str::to_string);
                true
            }
        }
    }

    pub fn update_status(&mut self, id: &str, status: RunStatus, exit_code: Option<i32>) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.status = status;
                session.exit_code = exit_code;
                true
            }
            None => false,
        }
    }

    pub fn update_title(&mut self, id: &str, title: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.title = title.to_string();
                true
            }
            None => false,
        }
    }

    pub fn update_notes(&mut self, id: &str, notes: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.notes = notes.to_string();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Session ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Rebuilds the store from restored sessions (persistence load path).
    /// Restored order follows the given sequence.
    pub fn restore(sessions: Vec<TerminalSession>, active_terminal_id: Option<String>) -> Self {
        let order: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
        let map = sessions.into_iter().map(|s| (s.id.clone(), s)).collect();
        let mut store = Self {
            sessions: map,
            order,
            active_terminal_id: None,
        };
        if let Some(id) = active_terminal_id {
            if store.sessions.contains_key(&id) {
                store.active_terminal_id = Some(id);
            }
        }
        store
    }
}
