//! Split layouts for tab panes.
//!
//! Each tab owns a binary tree of panes. Leaves hold terminal ids; internal
//! nodes are splits. The tree for a tab is stored in [`LayoutStore`] keyed by
//! the tab root's terminal id.
//!
//! # Structure
//!
//! ```text
//! Split (Horizontal)
//! ├── Leaf (terminal a)
//! └── Split (Vertical)
//!     ├── Leaf (terminal b)
//!     └── Leaf (terminal c)
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower clamp bound for split ratios.
pub const MIN_RATIO: f32 = 0.1;
/// Upper clamp bound for split ratios.
pub const MAX_RATIO: f32 = 0.9;

/// Direction of a split between two panes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    /// Side-by-side (left | right)
    Horizontal,
    /// Stacked (top / bottom)
    Vertical,
}

/// A layout tree node - either a leaf (a pane bound to a terminal) or a
/// split with two children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LayoutNode {
    Leaf {
        node_id: String,
        terminal_id: String,
    },
    Split {
        node_id: String,
        direction: SplitDirection,
        /// Share of the first child, clamped to [0.1, 0.9].
        ratio: f32,
        first: Box<LayoutNode>,
        second: Box<LayoutNode>,
    },
}

impl LayoutNode {
    /// Creates a new leaf node bound to a terminal.
    pub fn new_leaf(terminal_id: impl Into<String>) -> Self {
        Self::Leaf {
            node_id: Uuid::new_v4().to_string(),
            terminal_id: terminal_id.into(),
        }
    }

    /// In-order enumeration of leaf terminal ids, left to right.
    pub fn terminal_ids(&self) -> Vec<String> {
        match self {
            LayoutNode::Leaf { terminal_id, .. } => vec![terminal_id.clone()],
            LayoutNode::Split { first, second, .. } => {
                let mut ids = first.terminal_ids();
                ids.extend(second.terminal_ids());
                ids
            }
        }
    }

    /// Whether any leaf in this tree is bound to `terminal_id`.
    pub fn contains_terminal(&self, terminal_id: &str) -> bool {
        match self {
            LayoutNode::Leaf { terminal_id: t, .. } => t == terminal_id,
            LayoutNode::Split { first, second, .. } => {
                first.contains_terminal(terminal_id) || second.contains_terminal(terminal_id)
            }
        }
    }

    /// Splits the leaf bound to `target` into a split node whose first child
    /// is the original leaf and whose second child is a new leaf bound to
    /// `new_terminal_id`. Returns false if no such leaf exists.
    pub fn split_at_terminal(
        &mut self,
        target: &str,
        new_terminal_id: &str,
        direction: SplitDirection,
    ) -> bool {
        match self {
            LayoutNode::Leaf { terminal_id, .. } => {
                if terminal_id != target {
                    return false;
                }
                let old = self.clone();
                *self = LayoutNode::Split {
                    node_id: Uuid::new_v4().to_string(),
                    direction,
                    ratio: 0.5,
                    first: Box::new(old),
                    second: Box::new(LayoutNode::new_leaf(new_terminal_id)),
                };
                true
            }
            LayoutNode::Split { first, second, .. } => {
                first.split_at_terminal(target, new_terminal_id, direction)
                    || second.split_at_terminal(target, new_terminal_id, direction)
            }
        }
    }

    /// Removes the leaf bound to `target`, promoting its sibling into the
    /// parent's position. Returns false if no such leaf exists below a split
    /// (a root-level leaf cannot remove itself; the store handles that case).
    pub fn remove_terminal(&mut self, target: &str) -> bool {
        let replacement = match self {
            LayoutNode::Leaf { .. } => return false,
            LayoutNode::Split { first, second, .. } => {
                if matches!(first.as_ref(), LayoutNode::Leaf { terminal_id, .. } if terminal_id == target)
                {
                    Some(second.clone())
                } else if matches!(second.as_ref(), LayoutNode::Leaf { terminal_id, .. } if terminal_id == target)
                {
                    Some(first.clone())
                } else {
                    None
                }
            }
        };

        if let Some(replacement) = replacement {
            *self = *replacement;
            return true;
        }

        match self {
            LayoutNode::Leaf { .. } => false,
            LayoutNode::Split { first, second, .. } => {
                first.remove_terminal(target) || second.remove_terminal(target)
            }
        }
    }

    /// Sets the ratio of the split identified by `split_node_id`, clamped
    /// to [0.1, 0.9]. Returns false if no such split exists.
    pub fn set_ratio(&mut self, split_node_id: &str, new_ratio: f32) -> bool {
        match self {
            LayoutNode::Leaf { .. } => false,
            LayoutNode::Split {
                node_id,
                ratio,
                first,
                second,
                ..
            } => {
                if node_id == split_node_id {
                    *ratio = new_ratio.clamp(MIN_RATIO, MAX_RATIO);
                    true
                } else {
                    first.set_ratio(split_node_id, new_ratio)
                        || second.set_ratio(split_node_id, new_ratio)
                }
            }
        }
    }

    /// Returns the nearest other leaf to `target`:
    /// the first leaf of the opposite subtree when `target` sits directly
    /// under this split, otherwise recursing into the subtree containing it.
    pub fn sibling_terminal_id(&self, target: &str) -> Option<String> {
        match self {
            LayoutNode::Leaf { .. } => None,
            LayoutNode::Split { first, second, .. } => {
                if matches!(first.as_ref(), LayoutNode::Leaf { terminal_id, .. } if terminal_id == target)
                {
                    return second.terminal_ids().first().cloned();
                }
                if matches!(second.as_ref(), LayoutNode::Leaf { terminal_id, .. } if terminal_id == target)
                {
                    return first.terminal_ids().last().cloned();
                }
                if first.contains_terminal(target) {
                    first.sibling_terminal_id(target)
                } else if second.contains_terminal(target) {
                    second.sibling_terminal_id(target)
                } else {
                    None
                }
            }
        }
    }
}

/// All layout trees, keyed by the tab root terminal id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayoutStore {
    pub layouts: HashMap<String, LayoutNode>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layout whose key and sole leaf are the same terminal id.
    /// Aborts (returns false) if the key already exists or the terminal
    /// already appears in another layout.
    pub fn init_layout(&mut self, key: &str, terminal_id: &str) -> bool {
        if self.layouts.contains_key(key) || self.find_key_for_terminal(terminal_id).is_some() {
            return false;
        }
        self.layouts
            .insert(key.to_string(), LayoutNode::new_leaf(terminal_id));
        true
    }

    /// Splits the pane bound to `target` inside the layout at `key`.
    /// No-op on a missing key; aborts if `new_terminal_id` already appears
    /// in any layout (a terminal belongs to at most one tree).
    pub fn split_terminal(
        &mut self,
        key: &str,
        target: &str,
        new_terminal_id: &str,
        direction: SplitDirection,
    ) -> bool {
        if self.find_key_for_terminal(new_terminal_id).is_some() {
            return false;
        }
        match self.layouts.get_mut(key) {
            Some(root) => root.split_at_terminal(target, new_terminal_id, direction),
            None => false,
        }
    }

    /// Removes the pane bound to `terminal_id` from the layout at `key`,
    /// collapsing its parent split. Removing the last leaf deletes the
    /// layout entry entirely.
    pub fn remove_terminal(&mut self, key: &str, terminal_id: &str) -> bool {
        let Some(root) = self.layouts.get_mut(key) else {
            return false;
        };
        match root {
            LayoutNode::Leaf { terminal_id: t, .. } if t == terminal_id => {
                self.layouts.remove(key);
                true
            }
            _ => root.remove_terminal(terminal_id),
        }
    }

    /// Sets a split ratio inside the layout at `key`.
    pub fn set_ratio(&mut self, key: &str, split_node_id: &str, ratio: f32) -> bool {
        match self.layouts.get_mut(key) {
            Some(root) => root.set_ratio(split_node_id, ratio),
            None => false,
        }
    }

    /// Deletes an entire layout entry.
    pub fn remove_layout(&mut self, key: &str) -> Option<LayoutNode> {
        self.layouts.remove(key)
    }

    /// Moves the layout stored at `old_key` to `new_key`. Used when a tab
    /// root pane is closed and a surviving leaf takes over its key.
    pub fn rekey(&mut self, old_key: &str, new_key: &str) -> bool {
        if self.layouts.contains_key(new_key) {
            return false;
        }
        match self.layouts.remove(old_key) {
            Some(root) => {
                self.layouts.insert(new_key.to_string(), root);
                true
            }
            None => false,
        }
    }

    /// Returns `terminal_id` itself when it is a layout key, otherwise the
    /// key of the first layout whose tree contains it.
    pub fn find_key_for_terminal(&self, terminal_id: &str) -> Option<String> {
        if self.layouts.contains_key(terminal_id) {
            return Some(terminal_id.to_string());
        }
        self.layouts
            .iter()
            .find(|(_, root)| root.contains_terminal(terminal_id))
            .map(|(key, _)| key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn store_with_single(key: &str) -> LayoutStore {
        let mut store = LayoutStore::new();
        assert!(store.init_layout(key, key));
        store
    }

    // ==================== Tree Tests ====================

    #[test]
    fn test_leaf_terminal_ids() {
        let leaf = LayoutNode::new_leaf("t1");
        assert_eq!(leaf.terminal_ids(), vec!["t1".to_string()]);
    }

    #[test]
    fn test_split_inserts_new_leaf_after_target() {
        let mut root = LayoutNode::new_leaf("t1");
        assert!(root.split_at_terminal("t1", "s1", SplitDirection::Vertical));
        assert_eq!(
            root.terminal_ids(),
            vec!["t1".to_string(), "s1".to_string()]
        );
    }

    #[test]
    fn test_split_missing_target_is_noop() {
        let mut root = LayoutNode::new_leaf("t1");
        assert!(!root.split_at_terminal("nope", "s1", SplitDirection::Horizontal));
        assert_eq!(root.terminal_ids(), vec!["t1".to_string()]);
    }

    #[test]
    fn test_split_then_remove_restores_original() {
        let mut root = LayoutNode::new_leaf("t1");
        let before = root.clone();
        assert!(root.split_at_terminal("t1", "s1", SplitDirection::Horizontal));
        assert!(root.remove_terminal("s1"));
        assert_eq!(root, before);
    }

    #[test]
    fn test_remove_promotes_sibling_subtree() {
        let mut root = LayoutNode::new_leaf("a");
        root.split_at_terminal("a", "b", SplitDirection::Horizontal);
        root.split_at_terminal("b", "c", SplitDirection::Vertical);
        // a | (b / c) - removing a promotes the whole b/c split
        assert!(root.remove_terminal("a"));
        assert_eq!(root.terminal_ids(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test_case(0.0, 0.1 ; "clamped to lower bound")]
    #[test_case(1.0, 0.9 ; "clamped to upper bound")]
    #[test_case(0.3, 0.3 ; "in range untouched")]
    fn test_set_ratio_clamps(input: f32, expected: f32) {
        let mut root = LayoutNode::new_leaf("a");
        root.split_at_terminal("a", "b", SplitDirection::Horizontal);
        let split_id = match &root {
            LayoutNode::Split { node_id, .. } => node_id.clone(),
            _ => unreachable!(),
        };
        assert!(root.set_ratio(&split_id, input));
        match &root {
            LayoutNode::Split { ratio, .. } => assert_eq!(*ratio, expected),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_sibling_of_first_is_first_leaf_of_second() {
        let mut root = LayoutNode::new_leaf("a");
        root.split_at_terminal("a", "b", SplitDirection::Horizontal);
        root.split_at_terminal("b", "c", SplitDirection::Vertical);
        // a | (b / c)
        assert_eq!(root.sibling_terminal_id("a"), Some("b".to_string()));
    }

    #[test]
    fn test_sibling_of_second_is_last_leaf_of_first() {
        let mut root = LayoutNode::new_leaf("a");
        root.split_at_terminal("a", "b", SplitDirection::Horizontal);
        root.split_at_terminal("a", "c", SplitDirection::Vertical);
        // (a / c) | b - b's sibling is c, the last leaf of the first subtree
        assert_eq!(root.sibling_terminal_id("b"), Some("c".to_string()));
    }

    #[test]
    fn test_sibling_recurses_into_containing_subtree() {
        let mut root = LayoutNode::new_leaf("a");
        root.split_at_terminal("a", "b", SplitDirection::Horizontal);
        root.split_at_terminal("b", "c", SplitDirection::Vertical);
        assert_eq!(root.sibling_terminal_id("c"), Some("b".to_string()));
    }

    // ==================== Store Tests ====================

    #[test]
    fn test_init_layout_key_equals_sole_leaf() {
        let store = store_with_single("t1");
        assert_eq!(store.layouts["t1"].terminal_ids(), vec!["t1".to_string()]);
    }

    #[test]
    fn test_init_layout_duplicate_key_aborts() {
        let mut store = store_with_single("t1");
        assert!(!store.init_layout("t1", "t1"));
        assert_eq!(store.layouts.len(), 1);
    }

    #[test]
    fn test_split_on_missing_key_is_noop() {
        let mut store = store_with_single("t1");
        assert!(!store.split_terminal("missing", "t1", "s1", SplitDirection::Vertical));
    }

    #[test]
    fn test_split_rejects_terminal_already_in_another_layout() {
        let mut store = store_with_single("t1");
        store.init_layout("t2", "t2");
        assert!(!store.split_terminal("t1", "t1", "t2", SplitDirection::Vertical));
    }

    #[test]
    fn test_remove_last_leaf_deletes_entry() {
        let mut store = store_with_single("t1");
        assert!(store.remove_terminal("t1", "t1"));
        assert!(store.layouts.is_empty());
    }

    #[test]
    fn test_remove_collapses_split() {
        let mut store = store_with_single("t1");
        store.split_terminal("t1", "t1", "s1", SplitDirection::Horizontal);
        assert!(store.remove_terminal("t1", "s1"));
        assert_eq!(store.layouts["t1"].terminal_ids(), vec!["t1".to_string()]);
    }

    #[test]
    fn test_rekey_moves_tree() {
        let mut store = store_with_single("t1");
        store.split_terminal("t1", "t1", "s1", SplitDirection::Horizontal);
        store.remove_terminal("t1", "t1");
        assert!(store.rekey("t1", "s1"));
        assert!(store.layouts.contains_key("s1"));
        assert!(!store.layouts.contains_key("t1"));
    }

    #[test]
    fn test_find_key_direct_and_by_scan() {
        let mut store = store_with_single("t1");
        store.split_terminal("t1", "t1", "s1", SplitDirection::Vertical);
        assert_eq!(store.find_key_for_terminal("t1"), Some("t1".to_string()));
        assert_eq!(store.find_key_for_terminal("s1"), Some("t1".to_string()));
        assert_eq!(store.find_key_for_terminal("zz"), None);
    }

    // ==================== Property Tests ====================

    proptest! {
        /// Splitting adds exactly the new terminal to the leaf enumeration.
        #[test]
        fn prop_split_adds_one_leaf(extra in proptest::collection::vec("[a-z]{4}", 0..6)) {
            let mut root = LayoutNode::new_leaf("root");
            let mut expected = vec!["root".to_string()];
            for (i, name) in extra.iter().enumerate() {
                let id = format!("{name}{i}");
                let target = expected[i % expected.len()].clone();
                let dir = if i % 2 == 0 { SplitDirection::Horizontal } else { SplitDirection::Vertical };
                prop_assume!(!expected.contains(&id));
                prop_assert!(root.split_at_terminal(&target, &id, dir));
                let pos = expected.iter().position(|t| t == &target).unwrap();
                expected.insert(pos + 1, id);
            }
            let mut got = root.terminal_ids();
            let mut want = expected;
            got.sort();
            want.sort();
            prop_assert_eq!(got, want);
        }

        /// split followed by removing the new pane is the identity.
        #[test]
        fn prop_split_remove_roundtrip(n in 1usize..6, pick in 0usize..6) {
            let mut root = LayoutNode::new_leaf("t0");
            for i in 1..n {
                let target = format!("t{}", i - 1);
                root.split_at_terminal(&target, &format!("t{i}"), SplitDirection::Horizontal);
            }
            let before = root.clone();
            let target = format!("t{}", pick % n);
            prop_assert!(root.split_at_terminal(&target, "fresh", SplitDirection::Vertical));
            prop_assert!(root.remove_terminal("fresh"));
            prop_assert_eq!(root, before);
        }
    }
}
