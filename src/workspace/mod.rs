//! Workspace state model.
//!
//! Three logically separate stores, each individually persistable, plus the
//! composite operations that keep them consistent:
//!
//! - [`project::ProjectStore`] - projects and the sidebar tree
//! - [`terminals::TerminalStore`] - terminal sessions and focus
//! - [`layout::LayoutStore`] - per-tab binary split trees
//!
//! [`workspace::Workspace`] ties them together and owns the cross-store
//! operations (create, split, close, move, cycle).

pub mod layout;
pub mod project;
pub mod terminals;
#[allow(clippy::module_inception)]
pub mod workspace;

pub use layout::{LayoutNode, LayoutStore, SplitDirection};
pub use project::{Position, Project, ProjectStore, TreeNode};
pub use terminals::{RunStatus, TerminalSession, TerminalStore};
pub use workspace::{
    ClosePaneOutcome, CloseManyOutcome, CycleDirection, NewTerminal, SplitOutcome, Workspace,
};
