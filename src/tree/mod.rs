// discedit/src/tree/mod.rs
//! The virtual disc tree.
//!
//! Nodes live in an arena owned by [`DiscTree`]; a directory owns its children through
//! their [`NodeId`]s and every child keeps a non-owning handle back to its parent. The
//! root has no parent, so upward walks terminate at `None`.

pub mod node;
pub mod origin;

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use time::OffsetDateTime;

pub use self::node::{DiscNode, NodeId, NodeKind, is_valid_name, names_match};
pub use self::origin::DataOrigin;

/// Name of the root directory.
pub const ROOT_NAME: &str = "/";

/// An editable disc tree with a single root directory.
///
/// Slots of removed nodes stay in the arena as `None` so that handles are never reused.
/// The arena only grows for the lifetime of one tree; opening an image or starting a new
/// one replaces the whole tree.
#[derive(Clone, Debug)]
pub struct DiscTree {
    nodes: Vec<Option<DiscNode>>,
    root: NodeId,
    modified: bool,
    volume_source: Option<PathBuf>,
}

impl Default for DiscTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscTree {
    /// Creates a tree holding only an empty root directory.
    pub fn new() -> Self {
        let root = DiscNode::directory(ROOT_NAME, OffsetDateTime::now_utc(), None);
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
            modified: false,
            volume_source: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&DiscNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut DiscNode> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_directory(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(DiscNode::is_directory)
    }

    /// Children of a directory in insertion order. Empty for files and dead handles.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(DiscNode::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(DiscNode::parent)
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// The ISO image that volume-resident nodes read from.
    pub fn volume_source(&self) -> Option<&Path> {
        self.volume_source.as_deref()
    }

    pub(crate) fn set_volume_source(&mut self, path: Option<PathBuf>) {
        self.volume_source = path;
    }

    /// Finds a child of `parent` by name.
    pub fn find_child(&self, parent: NodeId, name: &str, case_insensitive: bool) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&child| {
            self.get(child).is_some_and(|node| {
                if case_insensitive {
                    names_match(&node.name, name)
                } else {
                    node.name == name
                }
            })
        })
    }

    /// Appends a new directory stamped with the current time.
    ///
    /// Returns `None` without touching the tree if `parent` is not a directory or a sibling
    /// already uses the name.
    pub fn insert_directory(&mut self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.insert_directory_at(parent, name, OffsetDateTime::now_utc())
    }

    /// Like [`insert_directory`](Self::insert_directory) with an explicit timestamp.
    pub fn insert_directory_at(
        &mut self,
        parent: NodeId,
        name: &str,
        mtime: OffsetDateTime,
    ) -> Option<NodeId> {
        if !self.is_directory(parent) || !is_valid_name(name) {
            warn!("Rejected directory '{}': invalid name or target", name);
            return None;
        }
        if self.find_child(parent, name, true).is_some() {
            warn!(
                "Folder '{}' already exists in '{}'",
                name,
                self.node_path(parent)
            );
            return None;
        }
        let id = self.attach(parent, DiscNode::directory(name, mtime, Some(parent)));
        debug!("Added folder {}", self.node_path(id));
        Some(id)
    }

    /// Appends a new file node, replacing an existing file sibling of the same name.
    ///
    /// A directory sibling with the same name is never replaced; the insert is rejected.
    pub fn insert_file(
        &mut self,
        parent: NodeId,
        name: &str,
        origin: DataOrigin,
        size: u64,
        mtime: OffsetDateTime,
    ) -> Option<NodeId> {
        if !self.is_directory(parent) || !is_valid_name(name) {
            warn!("Rejected file '{}': invalid name or target", name);
            return None;
        }
        if let Some(existing) = self.find_child(parent, name, true) {
            if self.is_directory(existing) {
                warn!(
                    "Cannot overwrite folder '{}' with a file",
                    self.node_path(existing)
                );
                return None;
            }
            debug!("Replacing file {}", self.node_path(existing));
            self.detach_and_free(existing);
        }
        let id = self.attach(parent, DiscNode::file(name, origin, size, mtime, parent));
        debug!("Added file {} ({} bytes)", self.node_path(id), size);
        Some(id)
    }

    /// Detaches `node` and frees its whole subtree.
    ///
    /// Returns `false` for the root, dead handles and parentless nodes.
    pub fn remove(&mut self, node: NodeId) -> bool {
        if node == self.root || self.parent(node).is_none() {
            warn!("Cannot remove root node or node with no parent.");
            return false;
        }
        debug!("Removing {}", self.node_path(node));
        self.detach_and_free(node)
    }

    /// Renames a non-root node, keeping sibling names unique.
    pub fn rename(&mut self, node: NodeId, new_name: &str) -> bool {
        let Some(parent) = self.parent(node) else {
            return false;
        };
        if !is_valid_name(new_name) {
            return false;
        }
        if let Some(other) = self.find_child(parent, new_name, true) {
            if other != node {
                warn!(
                    "Cannot rename to '{}': name is taken in '{}'",
                    new_name,
                    self.node_path(parent)
                );
                return false;
            }
        }
        match self.get_mut(node) {
            Some(entry) if entry.name == new_name => true,
            Some(entry) => {
                entry.name = new_name.to_string();
                self.modified = true;
                true
            }
            None => false,
        }
    }

    /// `true` if `node` is alive and linked to the root through its parents.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            let Some(parent) = self.parent(current) else {
                return current == self.root;
            };
            if !self.children(parent).contains(&current) {
                return false;
            }
            current = parent;
        }
    }

    /// Unlinks a non-root node from its parent, keeping the subtree alive in the arena.
    ///
    /// Returns the position it held among its siblings.
    pub(crate) fn detach(&mut self, node: NodeId) -> Option<usize> {
        if node == self.root {
            return None;
        }
        let parent = self.parent(node)?;
        let children = self.get_mut(parent).and_then(DiscNode::children_mut)?;
        let index = children.iter().position(|&child| child == node)?;
        children.remove(index);
        self.modified = true;
        Some(index)
    }

    /// Links a detached node back under its parent at `index` (clamped to the end).
    ///
    /// Fails if the node is already linked, the parent is gone, or a sibling took the name.
    pub(crate) fn reattach(&mut self, node: NodeId, index: usize) -> bool {
        let Some(entry) = self.get(node) else {
            return false;
        };
        let Some(parent) = entry.parent else {
            return false;
        };
        if !self.is_directory(parent) || self.children(parent).contains(&node) {
            return false;
        }
        if self.find_child(parent, &entry.name, true).is_some() {
            warn!(
                "Cannot restore '{}': name is taken in '{}'",
                entry.name,
                self.node_path(parent)
            );
            return false;
        }
        if let Some(children) = self.get_mut(parent).and_then(DiscNode::children_mut) {
            let index = index.min(children.len());
            children.insert(index, node);
        }
        self.modified = true;
        true
    }

    /// Frees a detached subtree. Linked nodes are left alone.
    pub(crate) fn purge(&mut self, node: NodeId) {
        if !self.contains(node) || self.is_attached(node) {
            return;
        }
        self.free_subtree(node);
    }

    pub(crate) fn set_size(&mut self, node: NodeId, size: u64) {
        if let Some(entry) = self.get_mut(node) {
            if !entry.is_directory() {
                entry.size = size;
            }
        }
    }

    /// Absolute `/`-separated path of a node. The root is `/`.
    pub fn node_path(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            let Some(entry) = self.get(id) else { break };
            if entry.parent.is_some() {
                parts.push(entry.name.as_str());
            }
            current = entry.parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Resolves an absolute path, matching each segment case-insensitively.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(self.root, |current, segment| {
                self.find_child(current, segment, true)
            })
    }

    /// Pre-order listing of every node under `node` with its depth below it.
    pub fn descendants(&self, node: NodeId) -> Vec<(NodeId, usize)> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = self
            .children(node)
            .iter()
            .rev()
            .map(|&child| (child, 1))
            .collect();
        while let Some((id, depth)) = stack.pop() {
            out.push((id, depth));
            stack.extend(self.children(id).iter().rev().map(|&child| (child, depth + 1)));
        }
        out
    }

    pub fn descendant_count(&self, node: NodeId) -> usize {
        self.descendants(node).len()
    }

    /// Sum of file sizes at and below `node`.
    pub fn total_size(&self, node: NodeId) -> u64 {
        let own = self.get(node).map_or(0, DiscNode::size);
        own + self
            .descendants(node)
            .iter()
            .filter_map(|(id, _)| self.get(*id))
            .map(DiscNode::size)
            .sum::<u64>()
    }

    /// Opens a streaming reader over a file node's bytes, whatever their origin.
    pub fn open_data(&self, node: NodeId) -> io::Result<Box<dyn Read + '_>> {
        let entry = self.file_entry(node)?;
        let origin = entry.origin().ok_or_else(|| not_a_file(entry))?;
        origin.open(entry.size, self.volume_source())
    }

    /// Reads a file node's bytes into memory.
    pub fn read_data(&self, node: NodeId) -> io::Result<Vec<u8>> {
        let entry = self.file_entry(node)?;
        let origin = entry.origin().ok_or_else(|| not_a_file(entry))?;
        origin.read_all(entry.size, self.volume_source())
    }

    fn file_entry(&self, node: NodeId) -> io::Result<&DiscNode> {
        self.get(node).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("Node {:?} does not exist", node))
        })
    }

    fn attach(&mut self, parent: NodeId, node: DiscNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        if let Some(children) = self.get_mut(parent).and_then(DiscNode::children_mut) {
            children.push(id);
        }
        self.modified = true;
        id
    }

    fn detach_and_free(&mut self, node: NodeId) -> bool {
        if self.detach(node).is_none() {
            warn!("Node {:?} not found in its parent's children list.", node);
            return false;
        }
        self.free_subtree(node);
        true
    }

    fn free_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(freed) = self.nodes.get_mut(id.0).and_then(Option::take) {
                stack.extend_from_slice(freed.children());
            }
        }
    }
}

fn not_a_file(node: &DiscNode) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("'{}' is a directory, not a file", node.name()),
    )
}
