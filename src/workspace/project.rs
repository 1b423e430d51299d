//! Projects and the sidebar tree.
//!
//! Projects own exactly one root group node; tabs are tree-terminal nodes
//! under that group. Nodes reference children and parents by id and are
//! owned by the `nodes` arena, which keeps the structure serializable and
//! cycle-free.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where to place an entry relative to a reorder target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

/// A project in the sidebar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Initial working directory for new terminals in this project.
    pub cwd: String,
    pub root_group_id: String,
    pub expanded: bool,
}

/// A node in the sidebar tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum TreeNode {
    Group {
        id: String,
        name: String,
        /// Ordered child node ids. No duplicates.
        children: Vec<String>,
        parent_id: Option<String>,
    },
    Terminal {
        id: String,
        name: String,
        /// The tab root terminal id; doubles as the layout-map key.
        terminal_id: String,
        parent_id: String,
    },
}

impl TreeNode {
    pub fn id(&self) -> &str {
        match self {
            TreeNode::Group { id, .. } | TreeNode::Terminal { id, .. } => id,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        match self {
            TreeNode::Group { parent_id, .. } => parent_id.as_deref(),
            TreeNode::Terminal { parent_id, .. } => Some(parent_id),
        }
    }

    fn set_parent(&mut self, new_parent: &str) {
        match self {
            TreeNode::Group { parent_id, .. } => *parent_id = Some(new_parent.to_string()),
            TreeNode::Terminal { parent_id, .. } => *parent_id = new_parent.to_string(),
        }
    }
}

/// Projects, tree nodes, the active project, and the sidebar ordering.
#[derive(Clone, Debug, Default)]
pub struct ProjectStore {
    pub projects: HashMap<String, Project>,
    pub nodes: HashMap<String, TreeNode>,
    pub active_project_id: Option<String>,
    pub project_order: Vec<String>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a project along with its root group node. The project becomes
    /// active if nothing was active before.
    pub fn add_project(&mut self, id: &str, name: &str, cwd: &str, root_group_id: &str) -> bool {
        if self.projects.contains_key(id) || self.nodes.contains_key(root_group_id) {
            return false;
        }
        self.nodes.insert(
            root_group_id.to_string(),
            TreeNode::Group {
                id: root_group_id.to_string(),
                name: name.to_string(),
                children: Vec::new(),
                parent_id: None,
            },
        );
        self.projects.insert(
            id.to_string(),
            Project {
                id: id.to_string(),
                name: name.to_string(),
                cwd: cwd.to_string(),
                root_group_id: root_group_id.to_string(),
                expanded: true,
            },
        );
        self.project_order.push(id.to_string());
        if self.active_project_id.is_none() {
            self.active_project_id = Some(id.to_string());
        }
        true
    }

    /// Removes a project and its root group node. The active project falls
    /// back to the first remaining project, else none.
    pub fn remove_project(&mut self, id: &str) -> Option<Project> {
        let project = self.projects.remove(id)?;
        self.nodes.remove(&project.root_group_id);
        self.project_order.retain(|p| p != id);
        if self.active_project_id.as_deref() == Some(id) {
            self.active_project_id = self.project_order.first().cloned();
        }
        Some(project)
    }

    pub fn rename_project(&mut self, id: &str, name: &str) -> bool {
        match self.projects.get_mut(id) {
            Some(project) => {
                project.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Sets the active project. Aborts if the id does not exist.
    pub fn set_active_project(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if !self.projects.contains_key(id) => false,
            _ => {
                self.active_project_id = id.map(str::to_string);
                true
            }
        }
    }

    pub fn toggle_project_expanded(&mut self, id: &str) -> bool {
        match self.projects.get_mut(id) {
            Some(project) => {
                project.expanded = !project.expanded;
                true
            }
            None => false,
        }
    }

    /// Moves `id` before or after `target` in the sidebar order.
    /// Reordering a project relative to itself is a no-op.
    pub fn reorder_project(&mut self, id: &str, target: &str, position: Position) -> bool {
        if id == target {
            return true;
        }
        if !self.projects.contains_key(id) || !self.projects.contains_key(target) {
            return false;
        }
        self.project_order.retain(|p| p != id);
        let Some(idx) = self.project_order.iter().position(|p| p == target) else {
            // target vanished from the order; restore and abort
            self.project_order.push(id.to_string());
            return false;
        };
        let at = match position {
            Position::Before => idx,
            Position::After => idx + 1,
        };
        self.project_order.insert(at, id.to_string());
        true
    }

    /// Moves `child_id` before or after `target_child_id` within a group's
    /// children. Reordering a child relative to itself is a no-op.
    pub fn reorder_child(
        &mut self,
        parent_node_id: &str,
        child_id: &str,
        target_child_id: &str,
        position: Position,
    ) -> bool {
        if child_id == target_child_id {
            return true;
        }
        let Some(TreeNode::Group { children, .. }) = self.nodes.get_mut(parent_node_id) else {
            return false;
        };
        if !children.iter().any(|c| c == child_id) || !children.iter().any(|c| c == target_child_id)
        {
            return false;
        }
        children.retain(|c| c != child_id);
        let idx = children
            .iter()
            .position(|c| c == target_child_id)
            .expect("target child present after retain");
        let at = match position {
            Position::Before => idx,
            Position::After => idx + 1,
        };
        children.insert(at, child_id.to_string());
        true
    }

    /// Inserts a node into the arena. Aborts on duplicate id.
    pub fn add_node(&mut self, node: TreeNode) -> bool {
        if self.nodes.contains_key(node.id()) {
            return false;
        }
        self.nodes.insert(node.id().to_string(), node);
        true
    }

    /// Removes a node from the arena and detaches it from its parent's
    /// children list.
    pub fn remove_node(&mut self, id: &str) -> Option<TreeNode> {
        let node = self.nodes.remove(id)?;
        if let Some(parent_id) = node.parent_id().map(str::to_string) {
            if let Some(TreeNode::Group { children, .. }) = self.nodes.get_mut(&parent_id) {
                children.retain(|c| c != id);
            }
        }
        Some(node)
    }

    /// Appends `child_id` to a group's children and reparents the child.
    /// Idempotent: a child already present is left in place.
    pub fn add_child_to_node(&mut self, parent_node_id: &str, child_id: &str) -> bool {
        if !self.nodes.contains_key(child_id) {
            return false;
        }
        match self.nodes.get_mut(parent_node_id) {
            Some(TreeNode::Group { children, .. }) => {
                if !children.iter().any(|c| c == child_id) {
                    children.push(child_id.to_string());
                }
            }
            _ => return false,
        }
        self.nodes
            .get_mut(child_id)
            .expect("child checked above")
            .set_parent(parent_node_id);
        true
    }

    pub fn remove_child_from_node(&mut self, parent_node_id: &str, child_id: &str) -> bool {
        match self.nodes.get_mut(parent_node_id) {
            Some(TreeNode::Group { children, .. }) => {
                children.retain(|c| c != child_id);
                true
            }
            _ => false,
        }
    }

    /// Detaches a node from its current parent, appends it under
    /// `new_parent_id`, and reparents it, atomically.
    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        if !matches!(self.nodes.get(new_parent_id), Some(TreeNode::Group { .. })) {
            warn!(node = id, parent = new_parent_id, "move target is not a group");
            return false;
        }
        let old_parent = self.nodes[id].parent_id().map(str::to_string);
        if let Some(old_parent) = old_parent {
            if let Some(TreeNode::Group { children, .. }) = self.nodes.get_mut(&old_parent) {
                children.retain(|c| c != id);
            }
        }
        if let Some(TreeNode::Group { children, .. }) = self.nodes.get_mut(new_parent_id) {
            children.push(id.to_string());
        }
        self.nodes
            .get_mut(id)
            .expect("node checked above")
            .set_parent(new_parent_id);
        true
    }

    /// Ordered child ids of a group, or empty when the node is missing or
    /// not a group.
    pub fn children_of(&self, node_id: &str) -> Vec<String> {
        match self.nodes.get(node_id) {
            Some(TreeNode::Group { children, .. }) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// Finds the tree-terminal node bound to a tab root terminal id.
    pub fn find_terminal_node(&self, terminal_id: &str) -> Option<&TreeNode> {
        self.nodes.values().find(
            |node| matches!(node, TreeNode::Terminal { terminal_id: t, .. } if t == terminal_id),
        )
    }

    /// Rebinds the tree-terminal node currently pointing at `old_terminal_id`
    /// to `new_terminal_id` (tab-root re-key after a root pane close).
    pub fn rebind_terminal_node(&mut self, old_terminal_id: &str, new_terminal_id: &str) -> bool {
        for node in self.nodes.values_mut() {
            if let TreeNode::Terminal { terminal_id, .. } = node {
                if terminal_id == old_terminal_id {
                    *terminal_id = new_terminal_id.to_string();
                    return true;
                }
            }
        }
        false
    }
}
