// discedit/src/history.rs
//! Bounded undo/redo over structural edits of a [`DiscTree`].
//!
//! Removed and replaced subtrees are detached, not freed, while an entry can still bring
//! them back. They are purged once their entry falls off the history.

use std::collections::VecDeque;

use log::debug;

use crate::tree::{DiscTree, NodeId};

/// Default number of undoable edits kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One reversible change to the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    /// A file, folder or imported directory was added, possibly replacing a file.
    Added {
        node: NodeId,
        index: usize,
        replaced: Option<(NodeId, usize)>,
        description: String,
    },
    Removed {
        node: NodeId,
        index: usize,
        description: String,
    },
    Renamed {
        node: NodeId,
        old_name: String,
        new_name: String,
    },
}

impl Edit {
    pub fn description(&self) -> String {
        match self {
            Edit::Added { description, .. } | Edit::Removed { description, .. } => {
                description.clone()
            }
            Edit::Renamed {
                old_name, new_name, ..
            } => format!("Rename '{}' to '{}'", old_name, new_name),
        }
    }

    fn undo(&self, tree: &mut DiscTree) -> bool {
        match self {
            Edit::Added {
                node,
                index,
                replaced,
                ..
            } => {
                if tree.detach(*node).is_none() {
                    return false;
                }
                if let Some((old, old_index)) = replaced {
                    if !tree.reattach(*old, *old_index) {
                        tree.reattach(*node, *index);
                        return false;
                    }
                }
                true
            }
            Edit::Removed { node, index, .. } => tree.reattach(*node, *index),
            Edit::Renamed { node, old_name, .. } => tree.rename(*node, old_name),
        }
    }

    fn redo(&self, tree: &mut DiscTree) -> bool {
        match self {
            Edit::Added {
                node,
                index,
                replaced,
                ..
            } => {
                if let Some((old, _)) = replaced {
                    if tree.detach(*old).is_none() {
                        return false;
                    }
                }
                tree.reattach(*node, *index)
            }
            Edit::Removed { node, .. } => tree.detach(*node).is_some(),
            Edit::Renamed { node, new_name, .. } => tree.rename(*node, new_name),
        }
    }

    /// Subtrees this entry keeps alive while it sits on the undo stack.
    fn held_when_done(&self) -> Vec<NodeId> {
        match self {
            Edit::Added {
                replaced: Some((old, _)),
                ..
            } => vec![*old],
            Edit::Removed { node, .. } => vec![*node],
            _ => Vec::new(),
        }
    }

    /// Subtrees this entry keeps alive while it sits on the redo stack.
    fn held_when_undone(&self) -> Vec<NodeId> {
        match self {
            Edit::Added { node, .. } => vec![*node],
            _ => Vec::new(),
        }
    }
}

/// Undo and redo stacks with a fixed capacity.
#[derive(Clone, Debug)]
pub struct EditHistory {
    undo: VecDeque<Edit>,
    redo: Vec<Edit>,
    limit: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl EditHistory {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records an edit that has already been applied to `tree`.
    ///
    /// Clears the redo stack and drops the oldest entry beyond the limit.
    pub fn record(&mut self, tree: &mut DiscTree, edit: Edit) {
        debug!("Recorded: {}", edit.description());
        for undone in self.redo.drain(..) {
            for node in undone.held_when_undone() {
                tree.purge(node);
            }
        }
        self.undo.push_back(edit);
        while self.undo.len() > self.limit {
            if let Some(oldest) = self.undo.pop_front() {
                for node in oldest.held_when_done() {
                    tree.purge(node);
                }
            }
        }
    }

    /// Reverts the most recent edit. Returns its description, or `None` if there was
    /// nothing to undo or the tree no longer allows it.
    pub fn undo(&mut self, tree: &mut DiscTree) -> Option<String> {
        let edit = self.undo.pop_back()?;
        if !edit.undo(tree) {
            debug!("Cannot undo: {}", edit.description());
            self.undo.push_back(edit);
            return None;
        }
        let description = edit.description();
        debug!("Undone: {}", description);
        self.redo.push(edit);
        Some(description)
    }

    pub fn redo(&mut self, tree: &mut DiscTree) -> Option<String> {
        let edit = self.redo.pop()?;
        if !edit.redo(tree) {
            debug!("Cannot redo: {}", edit.description());
            self.redo.push(edit);
            return None;
        }
        let description = edit.description();
        debug!("Redone: {}", description);
        self.undo.push_back(edit);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo.back().map(Edit::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo.last().map(Edit::description)
    }

    /// Drops every entry; used when the tree itself is being replaced.
    pub(crate) fn reset(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
