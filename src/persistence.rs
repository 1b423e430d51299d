//! Workspace persistence.
//!
//! Three independent JSON records (projects, terminals, layouts) plus the
//! font size setting, each stored under the platform config directory.
//! Saves are opportunistic full rewrites; nothing here is crash-consistent
//! by design. Loss or corruption of a record is non-fatal - the app launches
//! into the first-run flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::persistence as cfg;
use crate::config::terminal::{DEFAULT_FONT_SIZE, MAX_FONT_SIZE, MIN_FONT_SIZE};
use crate::workspace::{
    LayoutNode, LayoutStore, Project, ProjectStore, RunStatus, TerminalSession, TerminalStore,
    TreeNode, Workspace,
};

/// Persisted shape of the projects store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsRecord {
    pub projects: HashMap<String, Project>,
    pub nodes: HashMap<String, TreeNode>,
    #[serde(default)]
    pub active_project_id: Option<String>,
    #[serde(default)]
    pub project_order: Vec<String>,
}

/// Persisted shape of the terminals store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalsRecord {
    pub sessions: HashMap<String, TerminalSession>,
    #[serde(default)]
    pub active_terminal_id: Option<String>,
}

/// Persisted shape of the layouts store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutsRecord {
    pub layouts: HashMap<String, LayoutNode>,
}

/// Persisted font size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSizeRecord {
    pub font_size: u32,
}

impl Default for FontSizeRecord {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// Get the storage directory (cross-platform).
/// - Linux: `~/.config/dispatcher/`
/// - macOS: `~/Library/Application Support/dispatcher/`
/// - Windows: `C:\Users\<user>\AppData\Roaming\dispatcher\`
fn storage_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(cfg::APP_DIR))
}

fn record_file(base: &Path, key: &str) -> PathBuf {
    let stem = key.strip_prefix("dispatcher-").unwrap_or(key);
    base.join(format!("{stem}.json"))
}

fn load_record<T: DeserializeOwned + Default>(base: &Path, key: &str) -> T {
    let path = record_file(base, key);

    // Check file size before reading (corrupted-store protection).
    let metadata = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {key} metadata: {e}");
            }
            return T::default();
        }
    };
    if metadata.len() > cfg::MAX_FILE_SIZE {
        warn!(
            "Record {key} too large ({} bytes, max {}), ignoring",
            metadata.len(),
            cfg::MAX_FILE_SIZE
        );
        return T::default();
    }

    let json = match std::fs::read_to_string(&path) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to read {key}: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse {key}: {e}");
            T::default()
        }
    }
}

fn save_record<T: Serialize>(base: &Path, key: &str, value: &T) -> Result<()> {
    std::fs::create_dir_all(base)
        .with_context(|| format!("Failed to create storage directory {base:?}"))?;
    let path = record_file(base, key);
    let json = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {path:?}"))?;
    Ok(())
}

// ========== Projects ==========

fn projects_from_record(record: ProjectsRecord) -> ProjectStore {
    let mut order: Vec<String> = record
        .project_order
        .into_iter()
        .filter(|id| record.projects.contains_key(id))
        .collect();
    // Backfill projects missing from the stored order.
    for id in record.projects.keys() {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }
    let active = record
        .active_project_id
        .filter(|id| record.projects.contains_key(id));
    ProjectStore {
        projects: record.projects,
        nodes: record.nodes,
        active_project_id: active,
        project_order: order,
    }
}

pub fn load_projects_from(base: &Path) -> ProjectStore {
    projects_from_record(load_record(base, cfg::PROJECTS_KEY))
}

pub fn save_projects_to(base: &Path, store: &ProjectStore) -> Result<()> {
    let record = ProjectsRecord {
        projects: store.projects.clone(),
        nodes: store.nodes.clone(),
        active_project_id: store.active_project_id.clone(),
        project_order: store.project_order.clone(),
    };
    save_record(base, cfg::PROJECTS_KEY, &record)
}

// ========== Terminals ==========

fn terminals_from_record(record: TerminalsRecord) -> TerminalStore {
    // PTYs do not survive restart: every restored session is settled.
    let sessions: Vec<TerminalSession> = record
        .sessions
        .into_values()
        .map(|mut session| {
            session.status = RunStatus::Done;
            session.exit_code = None;
            session
        })
        .collect();
    TerminalStore::restore(sessions, record.active_terminal_id)
}

pub fn load_terminals_from(base: &Path) -> TerminalStore {
    terminals_from_record(load_record(base, cfg::TERMINALS_KEY))
}

pub fn save_terminals_to(base: &Path, store: &TerminalStore) -> Result<()> {
    let record = TerminalsRecord {
        sessions: store.sessions.clone(),
        active_terminal_id: store.active_terminal_id.clone(),
    };
    save_record(base, cfg::TERMINALS_KEY, &record)
}

// ========== Layouts ==========

pub fn load_layouts_from(base: &Path) -> LayoutStore {
    let record: LayoutsRecord = load_record(base, cfg::LAYOUTS_KEY);
    LayoutStore {
        layouts: record.layouts,
    }
}

pub fn save_layouts_to(base: &Path, store: &LayoutStore) -> Result<()> {
    let record = LayoutsRecord {
        layouts: store.layouts.clone(),
    };
    save_record(base, cfg::LAYOUTS_KEY, &record)
}

// ========== Font size ==========

fn clamp_font_size(size: u32) -> u32 {
    size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

pub fn load_font_size_from(base: &Path) -> u32 {
    let record: FontSizeRecord = load_record(base, cfg::FONT_SIZE_KEY);
    clamp_font_size(record.font_size)
}

pub fn save_font_size_to(base: &Path, size: u32) -> Result<()> {
    let record = FontSizeRecord {
        font_size: clamp_font_size(size),
    };
    save_record(base, cfg::FONT_SIZE_KEY, &record)
}

/// The reset value is always the default, independent of what is on disk.
pub fn reset_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

// ========== Whole workspace ==========

pub fn load_workspace_from(base: &Path) -> Workspace {
    Workspace::from_parts(
        load_projects_from(base),
        load_terminals_from(base),
        load_layouts_from(base),
    )
}

pub fn save_workspace_to(base: &Path, workspace: &Workspace) -> Result<()> {
    save_projects_to(base, &workspace.projects)?;
    save_terminals_to(base, &workspace.terminals)?;
    save_layouts_to(base, &workspace.layouts)?;
    Ok(())
}

/// Load the workspace from the default platform location.
pub fn load_workspace() -> Workspace {
    match storage_dir() {
        Some(base) => load_workspace_from(&base),
        None => Workspace::new(),
    }
}

/// Save the workspace to the default platform location.
pub fn save_workspace(workspace: &Workspace) -> Result<()> {
    let base = storage_dir().context("Could not determine config directory")?;
    save_workspace_to(&base, workspace)
}
