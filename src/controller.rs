//! Glue between the workspace stores and the PTY engine.
//!
//! The controller owns the singletons: the workspace (behind a mutex that is
//! never held across an await), the PTY engine, and one shell-integration
//! processor per live terminal. Composite workspace operations mutate the
//! stores first, then drive PTY side effects, rolling the stores back when a
//! spawn fails. Workspace state is flushed to disk opportunistically after
//! every mutation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::PtyError;
use crate::persistence;
use crate::pty::{cd_command, PtyEngine};
use crate::shell_integration::{EmulatorSink, SessionProcessor, StatusSink};
use crate::workspace::{
    ClosePaneOutcome, CloseManyOutcome, CycleDirection, NewTerminal, RunStatus, SplitDirection,
    SplitOutcome, Workspace,
};

/// Applies OSC-derived status transitions to the terminal store.
struct StoreStatusSink {
    workspace: Arc<Mutex<Workspace>>,
}

impl StatusSink for StoreStatusSink {
    fn status_changed(&self, terminal_id: &str, status: RunStatus, exit_code: Option<i32>) {
        self.workspace
            .lock()
            .terminals
            .update_status(terminal_id, status, exit_code);
    }
}

/// Coordinates the workspace, the PTY engine, and per-session processors.
pub struct WorkspaceController {
    workspace: Arc<Mutex<Workspace>>,
    engine: Arc<PtyEngine>,
    emulator: Arc<dyn EmulatorSink>,
    processors: Mutex<HashMap<String, SessionProcessor>>,
    /// Overrides the platform storage location (tests, portable installs).
    storage_dir: Option<std::path::PathBuf>,
}

impl WorkspaceController {
    /// Wires up the controller and starts the exit-event listener.
    pub fn new(
        workspace: Workspace,
        engine: Arc<PtyEngine>,
        emulator: Arc<dyn EmulatorSink>,
    ) -> Arc<Self> {
        Self::with_storage_dir(workspace, engine, emulator, None)
    }

    /// Like [`Self::new`] but persisting into an explicit directory.
    pub fn with_storage_dir(
        workspace: Workspace,
        engine: Arc<PtyEngine>,
        emulator: Arc<dyn EmulatorSink>,
        storage_dir: Option<std::path::PathBuf>,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            workspace: Arc::new(Mutex::new(workspace)),
            engine,
            emulator,
            processors: Mutex::new(HashMap::new()),
            storage_dir,
        });
        controller.spawn_exit_listener();
        controller
    }

    /// Read-only access to the workspace for rendering. The closure must not
    /// call back into the controller.
    pub fn with_workspace<R>(&self, f: impl FnOnce(&Workspace) -> R) -> R {
        f(&self.workspace.lock())
    }

    pub fn engine(&self) -> &Arc<PtyEngine> {
        &self.engine
    }

    fn spawn_exit_listener(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let mut exits = self.engine.subscribe_exits();
        tokio::spawn(async move {
            loop {
                let exit = match exits.recv().await {
                    Ok(exit) => exit,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "exit events lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let status = match exit.exit_code {
                    Some(0) => RunStatus::Done,
                    // A missing code means the PTY died underneath us.
                    Some(_) | None => RunStatus::Error,
                };
                controller.workspace.lock().terminals.update_status(
                    &exit.terminal_id,
                    status,
                    exit.exit_code,
                );
                if let Some(processor) = controller.processors.lock().remove(&exit.terminal_id) {
                    processor.dispose();
                }
                debug!(terminal = %exit.terminal_id, ?status, "session settled by exit event");
                controller.flush();
            }
        });
    }

    /// Persist the workspace, tolerating storage loss.
    fn flush(&self) {
        let snapshot = self.workspace.lock().clone();
        let result = match &self.storage_dir {
            Some(base) => persistence::save_workspace_to(base, &snapshot),
            None => persistence::save_workspace(&snapshot),
        };
        if let Err(error) = result {
            warn!(%error, "workspace flush failed");
        }
    }

    /// Spawn a PTY for `terminal_id` and route its output through a fresh
    /// shell-integration processor.
    async fn attach(
        &self,
        terminal_id: &str,
        cwd: Option<&str>,
        cols: u16,
        rows: u16,
    ) -> Result<(), PtyError> {
        let processor = SessionProcessor::new(
            terminal_id,
            Arc::new(Arc::clone(&self.engine)),
            Arc::new(StoreStatusSink {
                workspace: Arc::clone(&self.workspace),
            }),
            Arc::clone(&self.emulator),
        );
        self.engine
            .create(terminal_id, cwd, cols, rows, Box::new(processor.clone()))
            .await?;
        self.processors
            .lock()
            .insert(terminal_id.to_string(), processor.clone());
        tokio::spawn(async move {
            processor.inject_hooks().await;
        });
        // The spawn may have adopted a pooled PTY; top the pool back up.
        self.engine.refresh_pool();
        Ok(())
    }

    /// Once the source pane's cwd resolves, `cd` the target pane into it.
    fn seed_cwd_from(self: &Arc<Self>, source: String, target: String) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Ok(Some(dir)) = engine.get_cwd(&source).await {
                let _ = engine.write(&target, cd_command(&dir).as_bytes()).await;
            }
        });
    }

    // ========== Composite operations ==========

    /// Create a project with its first terminal.
    pub async fn open_project(
        self: &Arc<Self>,
        name: &str,
        cwd: &str,
        cols: u16,
        rows: u16,
    ) -> Result<NewTerminal, PtyError> {
        let created = self
            .workspace
            .lock()
            .create_project_with_terminal(name, cwd)
            .ok_or_else(|| PtyError::SpawnFailed("workspace rejected project".to_string()))?;
        match self.attach(&created.terminal_id, Some(cwd), cols, rows).await {
            Ok(()) => {
                info!(project = %created.project_id, "opened project");
                self.flush();
                Ok(created)
            }
            Err(error) => {
                self.workspace.lock().undo_create_terminal(&created);
                Err(error)
            }
        }
    }

    /// Create a new tab in an existing project.
    pub async fn open_terminal(
        self: &Arc<Self>,
        project_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<NewTerminal, PtyError> {
        let (created, project_cwd) = {
            let mut ws = self.workspace.lock();
            let created = ws
                .create_terminal_in_project(project_id)
                .ok_or_else(|| PtyError::NotFound(project_id.to_string()))?;
            let cwd = ws.projects.projects[project_id].cwd.clone();
            (created, cwd)
        };
        match self
            .attach(&created.terminal_id, Some(&project_cwd), cols, rows)
            .await
        {
            Ok(()) => {
                if let Some(source) = created.cwd_source.clone() {
                    self.seed_cwd_from(source, created.terminal_id.clone());
                }
                self.flush();
                Ok(created)
            }
            Err(error) => {
                self.workspace.lock().undo_create_terminal(&created);
                Err(error)
            }
        }
    }

    /// Split the pane holding `source_terminal_id`.
    pub async fn split_pane(
        self: &Arc<Self>,
        source_terminal_id: &str,
        direction: SplitDirection,
        cols: u16,
        rows: u16,
    ) -> Result<SplitOutcome, PtyError> {
        let split = self
            .workspace
            .lock()
            .split_pane(source_terminal_id, direction)
            .ok_or_else(|| PtyError::NotFound(source_terminal_id.to_string()))?;
        match self.attach(&split.new_terminal_id, None, cols, rows).await {
            Ok(()) => {
                self.seed_cwd_from(
                    split.source_terminal_id.clone(),
                    split.new_terminal_id.clone(),
                );
                self.flush();
                Ok(split)
            }
            Err(error) => {
                self.workspace.lock().undo_split_pane(&split);
                Err(error)
            }
        }
    }

    /// Close a single pane (and its PTY).
    pub async fn close_pane(&self, terminal_id: &str) -> Result<ClosePaneOutcome, PtyError> {
        let outcome = self
            .workspace
            .lock()
            .close_pane(terminal_id)
            .ok_or_else(|| PtyError::NotFound(terminal_id.to_string()))?;
        self.release_terminal(terminal_id).await;
        self.flush();
        Ok(outcome)
    }

    /// Delete a tab from the sidebar, closing every pane in its layout.
    pub async fn delete_tab(&self, node_id: &str) -> Result<CloseManyOutcome, PtyError> {
        let outcome = self
            .workspace
            .lock()
            .delete_tab(node_id)
            .ok_or_else(|| PtyError::NotFound(node_id.to_string()))?;
        for terminal_id in &outcome.closed_terminal_ids {
            self.release_terminal(terminal_id).await;
        }
        self.flush();
        Ok(outcome)
    }

    /// Delete a project and everything in it.
    pub async fn delete_project(&self, project_id: &str) -> Result<CloseManyOutcome, PtyError> {
        let outcome = self
            .workspace
            .lock()
            .delete_project(project_id)
            .ok_or_else(|| PtyError::NotFound(project_id.to_string()))?;
        for terminal_id in &outcome.closed_terminal_ids {
            self.release_terminal(terminal_id).await;
        }
        self.flush();
        Ok(outcome)
    }

    async fn release_terminal(&self, terminal_id: &str) {
        if let Some(processor) = self.processors.lock().remove(terminal_id) {
            processor.dispose();
        }
        match self.engine.close(terminal_id).await {
            Ok(()) => {}
            // Unknown id is fine: the PTY may already be gone via its exit
            // event.
            Err(error) if error.is_not_found() => {}
            Err(error) => warn!(terminal = terminal_id, %error, "PTY close failed"),
        }
    }

    /// Move a tab's tree node to another project.
    pub fn move_terminal(&self, node_id: &str, target_project_id: &str) -> bool {
        let moved = self
            .workspace
            .lock()
            .move_terminal_to_project(node_id, target_project_id);
        if moved {
            self.flush();
        }
        moved
    }

    /// Cycle focus across tabs of all expanded projects.
    pub fn cycle_tab(&self, direction: CycleDirection) -> Option<(String, String)> {
        let result = self.workspace.lock().cycle_tab(direction);
        if result.is_some() {
            self.flush();
        }
        result
    }

    /// Focus a terminal (or clear focus).
    pub fn focus_terminal(&self, terminal_id: Option<&str>) -> bool {
        let changed = self.workspace.lock().focus_terminal(terminal_id);
        if changed {
            self.flush();
        }
        changed
    }

    // ========== Terminal I/O passthrough ==========

    /// Write user keystrokes to a pane. Enter keypresses also feed the
    /// unhooked-sub-shell detector.
    pub async fn write_input(&self, terminal_id: &str, bytes: &[u8]) -> Result<(), PtyError> {
        if bytes.contains(&b'\r') || bytes.contains(&b'\n') {
            let processor = self.processors.lock().get(terminal_id).cloned();
            if let Some(processor) = processor {
                processor.on_enter_pressed();
            }
        }
        self.engine.write(terminal_id, bytes).await
    }

    pub async fn resize_terminal(
        &self,
        terminal_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), PtyError> {
        self.engine.resize(terminal_id, cols, rows).await
    }

    pub async fn terminal_cwd(&self, terminal_id: &str) -> Result<Option<String>, PtyError> {
        self.engine.get_cwd(terminal_id).await
    }

    /// Keep `count` PTYs pre-spawned for imperceptible new-tab latency.
    pub fn warm_pool(&self, count: usize) {
        self.engine.warm_pool(count);
    }

    /// Flush state and tear down every PTY.
    pub async fn shutdown(&self) {
        info!("shutting down workspace controller");
        self.flush();
        let processors: Vec<SessionProcessor> =
            self.processors.lock().drain().map(|(_, p)| p).collect();
        for processor in processors {
            processor.dispose();
        }
        self.engine.shutdown().await;
    }
}
