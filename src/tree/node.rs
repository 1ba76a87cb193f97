// discedit/src/tree/node.rs
use time::OffsetDateTime;

use crate::tree::origin::DataOrigin;

/// Stable handle to a node inside a [`DiscTree`](crate::tree::DiscTree).
///
/// Handles are never reused, so a handle to a removed node stays dead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Directory or file payload of a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Directory { children: Vec<NodeId> },
    File { origin: DataOrigin },
}

/// A single file or directory entry in the disc tree.
#[derive(Clone, Debug)]
pub struct DiscNode {
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) mtime: OffsetDateTime,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

impl DiscNode {
    pub(crate) fn directory(name: &str, mtime: OffsetDateTime, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            mtime,
            parent,
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
        }
    }

    pub(crate) fn file(
        name: &str,
        origin: DataOrigin,
        size: u64,
        mtime: OffsetDateTime,
        parent: NodeId,
    ) -> Self {
        Self {
            name: name.to_string(),
            size,
            mtime,
            parent: Some(parent),
            kind: NodeKind::File { origin },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// Byte length of a file; always 0 for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> OffsetDateTime {
        self.mtime
    }

    /// The containing directory. `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn origin(&self) -> Option<&DataOrigin> {
        match &self.kind {
            NodeKind::File { origin } => Some(origin),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }
}

/// Case-insensitive name comparison used for sibling uniqueness.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// A display name must be a single, non-empty path segment.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}
