//! Immutable tree snapshots
//!
//! A snapshot is an `Arc` to a root node plus the tree version it was taken
//! at. Taking one is O(1); nodes are never mutated once published, so a
//! snapshot stays valid no matter what commits after it.

use crate::modification::DataTreeModification;
use std::sync::Arc;
use treestore_core::{DataNode, PathArgument, TreePath};

/// Point-in-time view of the data tree
///
/// # Example
///
/// ```
/// use treestore_core::TreePath;
/// use treestore_storage::DataTree;
///
/// let tree = DataTree::new();
/// let snapshot = tree.snapshot();
/// assert_eq!(snapshot.version(), 0);
/// assert!(snapshot.read(&TreePath::root()).is_some());
/// assert!(snapshot.read(&"/missing".parse().unwrap()).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DataTreeSnapshot {
    root: Arc<DataNode>,
    version: u64,
}

impl DataTreeSnapshot {
    pub(crate) fn new(root: Arc<DataNode>, version: u64) -> Self {
        DataTreeSnapshot { root, version }
    }

    /// Root node
    pub fn root(&self) -> &Arc<DataNode> {
        &self.root
    }

    /// Version of the committed tree this snapshot derives from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Read the node at `path`
    pub fn read(&self, path: &TreePath) -> Option<Arc<DataNode>> {
        self.root.descendant(path.args())
    }

    /// Whether a node exists at `path`
    pub fn exists(&self, path: &TreePath) -> bool {
        self.read(path).is_some()
    }

    /// Start a modification on top of this snapshot
    pub fn new_modification(&self) -> DataTreeModification {
        DataTreeModification::new(self.clone())
    }

    /// Every node matching `pattern`, expanding wildcard arguments
    ///
    /// Results are ordered by path.
    pub fn find_matching(&self, pattern: &TreePath) -> Vec<(TreePath, Arc<DataNode>)> {
        let mut found = Vec::new();
        collect_matching(
            &self.root,
            pattern.args(),
            &mut TreePath::root(),
            &mut found,
        );
        found
    }
}

fn collect_matching(
    node: &Arc<DataNode>,
    pattern: &[PathArgument],
    path: &mut TreePath,
    found: &mut Vec<(TreePath, Arc<DataNode>)>,
) {
    let (first, rest) = match pattern.split_first() {
        Some(split) => split,
        None => {
            found.push((path.clone(), Arc::clone(node)));
            return;
        }
    };

    let children = match node.children() {
        Some(children) => children,
        None => return,
    };

    if first.is_wildcard() {
        for (arg, child) in children.iter().filter(|(arg, _)| first.matches(arg)) {
            path.push(arg.clone());
            collect_matching(child, rest, path, found);
            path.pop();
        }
    } else if let Some(child) = children.get(first) {
        path.push(first.clone());
        collect_matching(child, rest, path, found);
        path.pop();
    }
}
