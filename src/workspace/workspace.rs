//! The workspace: three coupled stores plus the operations that mutate them
//! atomically.
//!
//! Composite operations here perform only the store mutations; PTY side
//! effects (spawning, closing, cwd follow-ups) are driven by
//! [`crate::controller::WorkspaceController`], which consumes the outcome
//! values returned from these methods.
//!
//! All mutations happen on one logical thread; the controller guards the
//! workspace with a mutex that is never held across an await point.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use uuid::Uuid;

use super::layout::{LayoutStore, SplitDirection};
use super::project::{ProjectStore, TreeNode};
use super::terminals::TerminalStore;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Direction for cross-project tab cycling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleDirection {
    Forward,
    Backward,
}

/// Result of creating a terminal (tab) somewhere in the workspace.
#[derive(Clone, Debug)]
pub struct NewTerminal {
    pub project_id: String,
    pub node_id: String,
    pub terminal_id: String,
    /// An existing terminal in the same project whose cwd should seed the
    /// new one, if any.
    pub cwd_source: Option<String>,
}

/// Result of splitting a pane.
#[derive(Clone, Debug)]
pub struct SplitOutcome {
    pub layout_key: String,
    pub new_terminal_id: String,
    pub source_terminal_id: String,
}

/// Result of closing a single pane.
#[derive(Clone, Debug, Default)]
pub struct ClosePaneOutcome {
    pub closed_terminal_id: String,
    /// When the tab root was closed with siblings remaining, the layout was
    /// re-keyed under this surviving leaf.
    pub rekeyed_to: Option<String>,
    /// The tab's tree node was removed (last pane in the tab).
    pub removed_node_id: Option<String>,
    /// The project was removed because its root group emptied.
    pub removed_project_id: Option<String>,
}

/// Result of deleting a tab or a project from the sidebar.
#[derive(Clone, Debug, Default)]
pub struct CloseManyOutcome {
    pub closed_terminal_ids: Vec<String>,
}

/// The three stores plus focus bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct Workspace {
    pub projects: ProjectStore,
    pub terminals: TerminalStore,
    pub layouts: LayoutStore,
    /// Per tab root: the pane that last held focus inside that tab.
    last_focused_pane: HashMap<String, String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassembles a workspace from individually persisted stores.
    pub fn from_parts(
        projects: ProjectStore,
        terminals: TerminalStore,
        layouts: LayoutStore,
    ) -> Self {
        Self {
            projects,
            terminals,
            layouts,
            last_focused_pane: HashMap::new(),
        }
    }

    // ========== Focus ==========

    /// Sets the focused terminal and maintains the last-focused-pane map.
    pub fn focus_terminal(&mut self, id: Option<&str>) -> bool {
        if !self.terminals.set_active_terminal(id) {
            return false;
        }
        if let Some(id) = id {
            self.record_focus(id);
        }
        true
    }

    fn record_focus(&mut self, id: &str) {
        if let Some(key) = self.layouts.find_key_for_terminal(id) {
            self.last_focused_pane.insert(key, id.to_string());
        }
    }

    /// Drops every last-focused entry pointing at a closed pane, so cycling
    /// back can never restore a ghost.
    fn purge_last_focused(&mut self, closed_id: &str) {
        self.last_focused_pane.retain(|_, v| v != closed_id);
    }

    #[cfg(test)]
    pub(crate) fn last_focused(&self, tab_root: &str) -> Option<&str> {
        self.last_focused_pane.get(tab_root).map(String::as_str)
    }

    // ========== Composite operations ==========

    /// Adds a project, its root group, one tab node, one session, and one
    /// layout.
    pub fn create_project_with_terminal(&mut self, name: &str, cwd: &str) -> Option<NewTerminal> {
        let project_id = new_id();
        let root_group_id = new_id();
        if !self
            .projects
            .add_project(&project_id, name, cwd, &root_group_id)
        {
            return None;
        }
        match self.add_tab(&project_id) {
            Some(created) => Some(created),
            None => {
                self.projects.remove_project(&project_id);
                None
            }
        }
    }

    /// Adds a tab node, session, and layout to an existing project.
    pub fn create_terminal_in_project(&mut self, project_id: &str) -> Option<NewTerminal> {
        self.projects.projects.contains_key(project_id).then_some(())?;
        self.add_tab(project_id)
    }

    fn add_tab(&mut self, project_id: &str) -> Option<NewTerminal> {
        let root_group_id = self.projects.projects[project_id].root_group_id.clone();
        let cwd_source = self
            .projects
            .children_of(&root_group_id)
            .iter()
            .rev()
            .find_map(|child| match self.projects.nodes.get(child) {
                Some(TreeNode::Terminal { terminal_id, .. })
                    if self.terminals.contains(terminal_id) =>
                {
                    Some(terminal_id.clone())
                }
                _ => None,
            });

        let node_id = new_id();
        let terminal_id = new_id();
        if !self.terminals.add_session(&terminal_id, None, None) {
            return None;
        }
        let title = self.terminals.sessions[&terminal_id].title.clone();
        if !self.layouts.init_layout(&terminal_id, &terminal_id) {
            self.terminals.remove_session(&terminal_id);
            return None;
        }
        self.projects.add_node(TreeNode::Terminal {
            id: node_id.clone(),
            name: title,
            terminal_id: terminal_id.clone(),
            parent_id: root_group_id.clone(),
        });
        self.projects.add_child_to_node(&root_group_id, &node_id);
        self.record_focus(&terminal_id);

        debug!(project = project_id, terminal = %terminal_id, "created tab");
        Some(NewTerminal {
            project_id: project_id.to_string(),
            node_id,
            terminal_id,
            cwd_source,
        })
    }

    /// Rolls back the store changes of a tab creation whose PTY spawn failed.
    pub fn undo_create_terminal(&mut self, created: &NewTerminal) {
        self.layouts.remove_layout(&created.terminal_id);
        self.terminals.remove_session(&created.terminal_id);
        self.projects.remove_node(&created.node_id);
        self.purge_last_focused(&created.terminal_id);
        self.last_focused_pane.remove(&created.terminal_id);
        // A project created solely for this terminal goes with it.
        if let Some(project) = self.projects.projects.get(&created.project_id) {
            if self.projects.children_of(&project.root_group_id).is_empty() {
                self.projects.remove_project(&created.project_id);
            }
        }
    }

    /// Splits the pane holding `source_terminal_id`; the new pane gets a
    /// session and a layout leaf but no sidebar node.
    pub fn split_pane(
        &mut self,
        source_terminal_id: &str,
        direction: SplitDirection,
    ) -> Option<SplitOutcome> {
        self.terminals.contains(source_terminal_id).then_some(())?;
        let key = self.layouts.find_key_for_terminal(source_terminal_id)?;
        let new_terminal_id = new_id();
        if !self.terminals.add_session(&new_terminal_id, None, None) {
            return None;
        }
        if !self
            .layouts
            .split_terminal(&key, source_terminal_id, &new_terminal_id, direction)
        {
            self.terminals.remove_session(&new_terminal_id);
            return None;
        }
        self.record_focus(&new_terminal_id);
        debug!(key = %key, pane = %new_terminal_id, "split pane");
        Some(SplitOutcome {
            layout_key: key,
            new_terminal_id,
            source_terminal_id: source_terminal_id.to_string(),
        })
    }

    /// Rolls back a split whose PTY spawn failed.
    pub fn undo_split_pane(&mut self, split: &SplitOutcome) {
        self.layouts
            .remove_terminal(&split.layout_key, &split.new_terminal_id);
        self.terminals.remove_session(&split.new_terminal_id);
        self.purge_last_focused(&split.new_terminal_id);
    }

    /// Closes one pane. Handles tab-root re-keying, sibling focus, tab node
    /// removal, and empty-project cleanup.
    pub fn close_pane(&mut self, terminal_id: &str) -> Option<ClosePaneOutcome> {
        let key = self.layouts.find_key_for_terminal(terminal_id)?;
        let was_active = self.terminals.active_terminal_id.as_deref() == Some(terminal_id);
        let sibling = self
            .layouts
            .layouts
            .get(&key)
            .and_then(|root| root.sibling_terminal_id(terminal_id));

        let mut outcome = ClosePaneOutcome {
            closed_terminal_id: terminal_id.to_string(),
            ..Default::default()
        };

        if terminal_id == key {
            if sibling.is_some() {
                // Tab root with siblings: remove the root leaf, then re-key
                // the remaining tree under a surviving leaf and rewrite the
                // sidebar node to match.
                self.layouts.remove_terminal(&key, terminal_id);
                let new_key = self
                    .layouts
                    .layouts
                    .get(&key)
                    .map(|root| root.terminal_ids()[0].clone())
                    .expect("siblings remain after root removal");
                self.layouts.rekey(&key, &new_key);
                self.projects.rebind_terminal_node(&key, &new_key);
                if let Some(last) = self.last_focused_pane.remove(&key) {
                    if last != terminal_id {
                        self.last_focused_pane.insert(new_key.clone(), last);
                    }
                }
                outcome.rekeyed_to = Some(new_key);
            } else {
                // Sole pane in the tab: the whole tab goes away.
                self.layouts.remove_terminal(&key, terminal_id);
                self.last_focused_pane.remove(&key);
                if let Some(node) = self.projects.find_terminal_node(terminal_id) {
                    let node_id = node.id().to_string();
                    let group_id = node.parent_id().map(str::to_string);
                    self.projects.remove_node(&node_id);
                    outcome.removed_node_id = Some(node_id);
                    if let Some(group_id) = group_id {
                        outcome.removed_project_id = self.remove_project_if_empty(&group_id);
                    }
                }
            }
        } else {
            self.layouts.remove_terminal(&key, terminal_id);
        }

        self.terminals.remove_session(terminal_id);
        self.purge_last_focused(terminal_id);

        if was_active {
            if let Some(sibling) = sibling {
                self.focus_terminal(Some(&sibling));
            }
        }

        debug!(terminal = terminal_id, rekeyed = ?outcome.rekeyed_to, "closed pane");
        Some(outcome)
    }

    fn remove_project_if_empty(&mut self, root_group_id: &str) -> Option<String> {
        let project_id = self
            .projects
            .projects
            .values()
            .find(|p| p.root_group_id == root_group_id)
            .map(|p| p.id.clone())?;
        if self.projects.children_of(root_group_id).is_empty() {
            self.projects.remove_project(&project_id);
            Some(project_id)
        } else {
            None
        }
    }

    /// Deletes a tab from the sidebar: every pane in its layout, the layout
    /// entry, and the tree node.
    pub fn delete_tab(&mut self, node_id: &str) -> Option<CloseManyOutcome> {
        let key = match self.projects.nodes.get(node_id)? {
            TreeNode::Terminal { terminal_id, .. } => terminal_id.clone(),
            TreeNode::Group { .. } => return None,
        };
        let closed = self
            .layouts
            .layouts
            .get(&key)
            .map(|root| root.terminal_ids())
            .unwrap_or_default();
        self.layouts.remove_layout(&key);
        self.last_focused_pane.remove(&key);
        for terminal_id in &closed {
            self.terminals.remove_session(terminal_id);
            self.purge_last_focused(terminal_id);
        }
        self.projects.remove_node(node_id);
        debug!(node = node_id, panes = closed.len(), "deleted tab");
        Some(CloseManyOutcome {
            closed_terminal_ids: closed,
        })
    }

    /// Deletes a project: every tab layout, every session, every tree node,
    /// then the project itself.
    pub fn delete_project(&mut self, project_id: &str) -> Option<CloseManyOutcome> {
        let root_group_id = self
            .projects
            .projects
            .get(project_id)?
            .root_group_id
            .clone();
        let mut closed = Vec::new();
        for child in self.projects.children_of(&root_group_id) {
            if let Some(outcome) = self.delete_tab(&child) {
                closed.extend(outcome.closed_terminal_ids);
            } else {
                self.projects.remove_node(&child);
            }
        }
        self.projects.remove_project(project_id);
        Some(CloseManyOutcome {
            closed_terminal_ids: closed,
        })
    }

    /// Moves a tab's tree node into another project. Sessions and layouts
    /// are untouched; layouts are keyed by terminal id, not by project.
    pub fn move_terminal_to_project(&mut self, node_id: &str, target_project_id: &str) -> bool {
        let Some(target) = self.projects.projects.get(target_project_id) else {
            return false;
        };
        let target_group = target.root_group_id.clone();
        if !matches!(
            self.projects.nodes.get(node_id),
            Some(TreeNode::Terminal { .. })
        ) {
            return false;
        }
        self.projects.move_node(node_id, &target_group)
    }

    // ========== Tab cycling ==========

    /// Cycles focus across tabs of all expanded projects, in sidebar order.
    /// Returns the `(project_id, terminal_id)` that received focus, or None
    /// when there are fewer than two tabs.
    pub fn cycle_tab(&mut self, direction: CycleDirection) -> Option<(String, String)> {
        let entries = self.cycle_entries();
        let n = entries.len();
        if n < 2 {
            return None;
        }

        let current = self.current_cycle_index(&entries);
        let next = match direction {
            CycleDirection::Forward => match current {
                None => 0,
                Some(i) => (i + 1) % n,
            },
            CycleDirection::Backward => match current {
                None => n - 1,
                Some(i) => (i + n - 1) % n,
            },
        };

        let (project_id, tab_root) = entries[next].clone();
        self.projects.set_active_project(Some(&project_id));
        let target = self
            .last_focused_pane
            .get(&tab_root)
            .filter(|pane| self.terminals.contains(pane.as_str()))
            .cloned()
            .unwrap_or_else(|| tab_root.clone());
        self.focus_terminal(Some(&target));
        Some((project_id, target))
    }

    /// Flat ordered list of (project, tab root) entries eligible for cycling.
    fn cycle_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        for project_id in &self.projects.project_order {
            let Some(project) = self.projects.projects.get(project_id) else {
                continue;
            };
            if !project.expanded {
                continue;
            }
            for child in self.projects.children_of(&project.root_group_id) {
                if let Some(TreeNode::Terminal { terminal_id, .. }) = self.projects.nodes.get(&child)
                {
                    if self.terminals.contains(terminal_id) {
                        entries.push((project_id.clone(), terminal_id.clone()));
                    }
                }
            }
        }
        entries
    }

    fn current_cycle_index(&self, entries: &[(String, String)]) -> Option<usize> {
        let active = self.terminals.active_terminal_id.as_deref()?;
        if let Some(i) = entries.iter().position(|(_, tid)| tid == active) {
            return Some(i);
        }
        let key = self.layouts.find_key_for_terminal(active)?;
        entries.iter().position(|(_, tid)| *tid == key)
    }

    // ========== Invariant checking ==========

    /// Verifies the cross-store invariants. Used by tests and debug builds;
    /// operations are written to preserve these rather than repair them.
    pub fn check_invariants(&self) -> Result<(), String> {
        // Every tree-terminal node keys a layout containing its terminal.
        for node in self.projects.nodes.values() {
            if let TreeNode::Terminal { terminal_id, .. } = node {
                let layout = self
                    .layouts
                    .layouts
                    .get(terminal_id)
                    .ok_or_else(|| format!("tab {terminal_id} has no layout entry"))?;
                if !layout.contains_terminal(terminal_id) {
                    return Err(format!("layout {terminal_id} lacks its own key leaf"));
                }
            }
        }
        // Every leaf references an existing session; no terminal appears in
        // two trees.
        let mut seen = HashSet::new();
        for (key, root) in &self.layouts.layouts {
            let ids = root.terminal_ids();
            if ids.is_empty() {
                return Err(format!("layout {key} is empty"));
            }
            for id in ids {
                if !self.terminals.contains(&id) {
                    return Err(format!("leaf {id} has no session"));
                }
                if !seen.insert(id.clone()) {
                    return Err(format!("terminal {id} appears in two layouts"));
                }
            }
        }
        // Active ids reference existing entities.
        if let Some(active) = &self.terminals.active_terminal_id {
            if !self.terminals.contains(active) {
                return Err(format!("active terminal {active} has no session"));
            }
        }
        if let Some(active) = &self.projects.active_project_id {
            if !self.projects.projects.contains_key(active) {
                return Err(format!("active project {active} does not exist"));
            }
        }
        // projectOrder is a permutation of project keys.
        let order: HashSet<_> = self.projects.project_order.iter().collect();
        if order.len() != self.projects.project_order.len()
            || order.len() != self.projects.projects.len()
            || !self.projects.projects.keys().all(|k| order.contains(k))
        {
            return Err("projectOrder is not a permutation of projects".to_string());
        }
        // Group children are unique and correctly parented.
        for node in self.projects.nodes.values() {
            if let TreeNode::Group { id, children, .. } = node {
                let unique: HashSet<_> = children.iter().collect();
                if unique.len() != children.len() {
                    return Err(format!("group {id} has duplicate children"));
                }
                for child in children {
                    let child_node = self
                        .projects
                        .nodes
                        .get(child)
                        .ok_or_else(|| format!("group {id} references missing node {child}"))?;
                    if child_node.parent_id() != Some(id.as_str()) {
                        return Err(format!("node {child} parent does not match group {id}"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workspace_with_project(tabs: usize) -> (Workspace, String, Vec<NewTerminal>) {
        let mut ws = Workspace::new();
        let first = ws
            .create_project_with_terminal("proj", "/tmp")
            .expect("create project");
        let project_id = first.project_id.clone();
        let mut created = vec![first];
        for _ in 1..tabs {
            created.push(ws.create_terminal_in_project(&project_id).expect("add tab"));
        }
        ws.check_invariants().unwrap();
        (ws, project_id, created)
    }

    #[test]
    fn test_create_project_with_terminal_wires_all_stores() {
        let (ws, project_id, created) = workspace_with_project(1);
        let tid = &created[0].terminal_id;
        assert!(ws.terminals.contains(tid));
        assert!(ws.layouts.layouts.contains_key(tid));
        assert_eq!(ws.projects.active_project_id.as_deref(), Some(project_id.as_str()));
        assert_eq!(ws.terminals.active_terminal_id.as_deref(), Some(tid.as_str()));
    }

    #[test]
    fn test_second_tab_reports_cwd_source() {
        let (_, _, created) = workspace_with_project(2);
        assert_eq!(
            created[1].cwd_source.as_deref(),
            Some(created[0].terminal_id.as_str())
        );
    }

    #[test]
    fn test_undo_create_terminal_removes_everything() {
        let (mut ws, _, created) = workspace_with_project(1);
        ws.undo_create_terminal(&created[0]);
        assert!(ws.terminals.sessions.is_empty());
        assert!(ws.layouts.layouts.is_empty());
        assert!(ws.projects.projects.is_empty());
    }

    #[test]
    fn test_split_pane_creates_session_without_tree_node() {
        let (mut ws, _, created) = workspace_with_project(1);
        let nodes_before = ws.projects.nodes.len();
        let split = ws
            .split_pane(&created[0].terminal_id, SplitDirection::Vertical)
            .expect("split");
        assert!(ws.terminals.contains(&split.new_terminal_id));
        assert_eq!(ws.projects.nodes.len(), nodes_before);
        assert_eq!(
            ws.layouts.layouts[&split.layout_key].terminal_ids().len(),
            2
        );
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_close_split_pane_restores_layout() {
        let (mut ws, _, created) = workspace_with_project(1);
        let tid = created[0].terminal_id.clone();
        let split = ws.split_pane(&tid, SplitDirection::Horizontal).unwrap();
        let outcome = ws.close_pane(&split.new_terminal_id).expect("close");
        assert_eq!(outcome.rekeyed_to, None);
        assert_eq!(ws.layouts.layouts[&tid].terminal_ids(), vec![tid.clone()]);
        // Closed pane was active; its sibling takes focus.
        assert_eq!(ws.terminals.active_terminal_id.as_deref(), Some(tid.as_str()));
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_close_tab_root_with_siblings_rekeys() {
        // Scenario: split a single tab (root t1) with pane s, then close t1.
        let (mut ws, _, created) = workspace_with_project(1);
        let t1 = created[0].terminal_id.clone();
        let split = ws.split_pane(&t1, SplitDirection::Vertical).unwrap();
        let s = split.new_terminal_id.clone();

        let outcome = ws.close_pane(&t1).expect("close root");
        assert_eq!(outcome.rekeyed_to.as_deref(), Some(s.as_str()));
        assert!(!ws.layouts.layouts.contains_key(&t1));
        assert_eq!(ws.layouts.layouts[&s].terminal_ids(), vec![s.clone()]);
        // The sidebar node follows the new key.
        match ws.projects.find_terminal_node(&s) {
            Some(TreeNode::Terminal { terminal_id, .. }) => assert_eq!(terminal_id, &s),
            other => panic!("expected rebound terminal node, got {other:?}"),
        }
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_close_last_pane_in_last_project_clears_all_actives() {
        let (mut ws, project_id, created) = workspace_with_project(1);
        let outcome = ws.close_pane(&created[0].terminal_id).expect("close");
        assert_eq!(outcome.removed_project_id.as_deref(), Some(project_id.as_str()));
        assert_eq!(ws.terminals.active_terminal_id, None);
        assert_eq!(ws.projects.active_project_id, None);
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_tab_closes_every_pane() {
        let (mut ws, _, created) = workspace_with_project(2);
        let t1 = created[0].terminal_id.clone();
        let split = ws.split_pane(&t1, SplitDirection::Vertical).unwrap();
        let outcome = ws.delete_tab(&created[0].node_id).expect("delete tab");
        let mut closed = outcome.closed_terminal_ids.clone();
        closed.sort();
        let mut expected = vec![t1.clone(), split.new_terminal_id.clone()];
        expected.sort();
        assert_eq!(closed, expected);
        assert!(!ws.layouts.layouts.contains_key(&t1));
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_project_closes_all_tabs() {
        let (mut ws, project_id, created) = workspace_with_project(3);
        let outcome = ws.delete_project(&project_id).expect("delete project");
        assert_eq!(outcome.closed_terminal_ids.len(), created.len());
        assert!(ws.projects.projects.is_empty());
        assert!(ws.layouts.layouts.is_empty());
        assert!(ws.terminals.sessions.is_empty());
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_move_terminal_preserves_session_and_layout() {
        // Scenario: terminal t in p1 (with split s); move the tab node to p2.
        let (mut ws, _, created) = workspace_with_project(1);
        let t = created[0].terminal_id.clone();
        ws.split_pane(&t, SplitDirection::Horizontal).unwrap();
        let second = ws.create_project_with_terminal("p2", "/tmp").unwrap();

        assert!(ws.move_terminal_to_project(&created[0].node_id, &second.project_id));
        assert_eq!(ws.layouts.layouts[&t].terminal_ids().len(), 2);
        assert!(ws.terminals.contains(&t));
        let p1_group = ws.projects.projects[&created[0].project_id]
            .root_group_id
            .clone();
        let p2_group = ws.projects.projects[&second.project_id]
            .root_group_id
            .clone();
        assert!(!ws.projects.children_of(&p1_group).contains(&created[0].node_id));
        assert!(ws.projects.children_of(&p2_group).contains(&created[0].node_id));
        ws.check_invariants().unwrap();
    }

    // ==================== Cycling ====================

    #[test]
    fn test_cycle_forward_in_one_project() {
        let (mut ws, project_id, created) = workspace_with_project(3);
        let tids: Vec<String> = created.iter().map(|c| c.terminal_id.clone()).collect();
        ws.focus_terminal(Some(&tids[0]));

        for expected in [&tids[1], &tids[2], &tids[0]] {
            let (pid, tid) = ws.cycle_tab(CycleDirection::Forward).expect("cycle");
            assert_eq!(pid, project_id);
            assert_eq!(&tid, expected);
        }
    }

    #[test]
    fn test_cycle_skips_collapsed_projects() {
        let mut ws = Workspace::new();
        let t1 = ws.create_project_with_terminal("p1", "/a").unwrap();
        let t2 = ws.create_project_with_terminal("p2", "/b").unwrap();
        let t3 = ws.create_project_with_terminal("p3", "/c").unwrap();
        ws.projects.toggle_project_expanded(&t2.project_id);
        ws.projects.set_active_project(Some(&t1.project_id));
        ws.focus_terminal(Some(&t1.terminal_id));

        let (pid, tid) = ws.cycle_tab(CycleDirection::Forward).expect("cycle");
        assert_eq!(pid, t3.project_id);
        assert_eq!(tid, t3.terminal_id);
        assert_eq!(ws.projects.active_project_id.as_deref(), Some(t3.project_id.as_str()));
    }

    #[test]
    fn test_cycle_restores_last_focused_pane() {
        // Scenario: tabs [t1, t2]; split t1 into s; focus s; cycle forward to
        // t2; cycle backward lands on s, not t1.
        let (mut ws, _, created) = workspace_with_project(2);
        let t1 = created[0].terminal_id.clone();
        let t2 = created[1].terminal_id.clone();
        let s = ws
            .split_pane(&t1, SplitDirection::Vertical)
            .unwrap()
            .new_terminal_id;
        ws.focus_terminal(Some(&s));

        let (_, tid) = ws.cycle_tab(CycleDirection::Forward).expect("cycle");
        assert_eq!(tid, t2);
        let (_, tid) = ws.cycle_tab(CycleDirection::Backward).expect("cycle");
        assert_eq!(tid, s);
    }

    #[test]
    fn test_cycle_does_not_restore_closed_pane() {
        // The stale-restore case: close s while focused elsewhere; cycling
        // back must fall back to the tab root instead of the ghost pane.
        let (mut ws, _, created) = workspace_with_project(2);
        let t1 = created[0].terminal_id.clone();
        let t2 = created[1].terminal_id.clone();
        let s = ws
            .split_pane(&t1, SplitDirection::Vertical)
            .unwrap()
            .new_terminal_id;
        ws.focus_terminal(Some(&s));
        ws.cycle_tab(CycleDirection::Forward).unwrap();
        assert_eq!(ws.terminals.active_terminal_id.as_deref(), Some(t2.as_str()));

        ws.close_pane(&s).unwrap();
        let (_, tid) = ws.cycle_tab(CycleDirection::Backward).expect("cycle");
        assert_eq!(tid, t1);
        ws.check_invariants().unwrap();
    }

    #[test]
    fn test_cycle_noop_with_single_tab() {
        let (mut ws, _, _) = workspace_with_project(1);
        assert_eq!(ws.cycle_tab(CycleDirection::Forward), None);
    }

    #[test]
    fn test_cycle_resolves_split_focus_to_tab_root_index() {
        // Active terminal is a split pane; its tab's position anchors the cycle.
        let (mut ws, _, created) = workspace_with_project(3);
        let t1 = created[0].terminal_id.clone();
        let s = ws
            .split_pane(&t1, SplitDirection::Horizontal)
            .unwrap()
            .new_terminal_id;
        ws.focus_terminal(Some(&s));

        let (_, tid) = ws.cycle_tab(CycleDirection::Forward).expect("cycle");
        assert_eq!(tid, created[1].terminal_id);
    }

    #[test]
    fn test_close_pane_purges_last_focused_entry() {
        let (mut ws, _, created) = workspace_with_project(1);
        let t1 = created[0].terminal_id.clone();
        let s = ws
            .split_pane(&t1, SplitDirection::Vertical)
            .unwrap()
            .new_terminal_id;
        ws.focus_terminal(Some(&s));
        assert_eq!(ws.last_focused(&t1), Some(s.as_str()));

        ws.focus_terminal(Some(&t1));
        ws.focus_terminal(Some(&s));
        ws.close_pane(&s).unwrap();
        assert_ne!(ws.last_focused(&t1), Some(s.as_str()));
    }
}
