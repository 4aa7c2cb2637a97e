//! Commit candidates
//!
//! A [`DataTreeCandidate`] is the diff between the committed tree a
//! modification was prepared against and the tree that results from applying
//! it. It is produced once by [`DataTree::prepare`](crate::DataTree::prepare),
//! then read by change resolution and installed by
//! [`DataTree::commit`](crate::DataTree::commit).

use std::sync::Arc;
use treestore_core::{DataNode, PathArgument, TreePath};

/// How a candidate node changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModificationType {
    /// Nothing changed here or below
    Unmodified,
    /// Replaced (or created) by a write
    Write,
    /// Merged into
    Merge,
    /// Removed
    Delete,
    /// Only descendants changed
    SubtreeModified,
}

/// One node of the candidate tree
#[derive(Debug, Clone)]
pub struct CandidateNode {
    pub(crate) identifier: Option<PathArgument>,
    pub(crate) kind: ModificationType,
    pub(crate) before: Option<Arc<DataNode>>,
    pub(crate) after: Option<Arc<DataNode>>,
    pub(crate) children: Vec<CandidateNode>,
}

impl CandidateNode {
    /// Argument of this node within its parent; None for the root
    pub fn identifier(&self) -> Option<&PathArgument> {
        self.identifier.as_ref()
    }

    /// Modification kind
    pub fn kind(&self) -> ModificationType {
        self.kind
    }

    /// Data before the change
    pub fn before(&self) -> Option<&Arc<DataNode>> {
        self.before.as_ref()
    }

    /// Data after the change
    pub fn after(&self) -> Option<&Arc<DataNode>> {
        self.after.as_ref()
    }

    /// Modified children
    ///
    /// Only populated for [`ModificationType::SubtreeModified`]; write, merge
    /// and delete nodes carry their full before/after data instead.
    pub fn children(&self) -> &[CandidateNode] {
        &self.children
    }

    /// Modified child by argument
    pub fn child(&self, arg: &PathArgument) -> Option<&CandidateNode> {
        self.children
            .iter()
            .find(|c| c.identifier.as_ref() == Some(arg))
    }
}

/// Diff ready to be committed
#[derive(Debug, Clone)]
pub struct DataTreeCandidate {
    pub(crate) root_path: TreePath,
    pub(crate) root: CandidateNode,
    pub(crate) base_version: u64,
}

impl DataTreeCandidate {
    /// Path of the candidate root (the tree root)
    pub fn root_path(&self) -> &TreePath {
        &self.root_path
    }

    /// Root candidate node
    pub fn root(&self) -> &CandidateNode {
        &self.root
    }

    /// Tree version the candidate was prepared against
    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Whether the candidate changes nothing
    pub fn is_unmodified(&self) -> bool {
        self.root.kind == ModificationType::Unmodified
    }

    /// Find the candidate node at `path`, if it was modified
    pub fn node(&self, path: &TreePath) -> Option<&CandidateNode> {
        let mut node = &self.root;
        for arg in path.args() {
            node = node.child(arg)?;
        }
        Some(node)
    }
}
