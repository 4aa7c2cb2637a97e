//! Write overlay on top of a snapshot
//!
//! A [`DataTreeModification`] records operations in a tree of
//! [`ModifiedNode`]s that mirrors the paths touched, and keeps an eagerly
//! materialized post-write view used for reads and for chaining the next
//! transaction. The operation tree is what validation and `prepare` replay
//! against the live tree; the view is never applied directly.
//!
//! Operation tree invariants:
//! - ancestors of a modified node carry `Touch`
//! - `Write`, `Merge` and `Delete` nodes have no children; an operation below
//!   one of them folds it into a `Write` of the resulting subtree

use crate::snapshot::DataTreeSnapshot;
use std::collections::BTreeMap;
use std::sync::Arc;
use treestore_core::{DataNode, PathArgument, StoreError, StoreResult, TreePath};

/// Operation recorded for one node
#[derive(Debug, Clone, Default)]
pub(crate) enum LogicalOperation {
    /// Nothing recorded
    #[default]
    Unchanged,
    /// Some descendant is modified
    Touch,
    /// Replace with the given subtree
    Write(Arc<DataNode>),
    /// Merge the given subtree into whatever is current
    Merge(Arc<DataNode>),
    /// Remove
    Delete,
}

/// Node of the operation tree
#[derive(Debug, Clone, Default)]
pub(crate) struct ModifiedNode {
    pub(crate) operation: LogicalOperation,
    pub(crate) children: BTreeMap<PathArgument, ModifiedNode>,
}

impl ModifiedNode {
    fn child_mut(&mut self, arg: &PathArgument) -> &mut ModifiedNode {
        self.children.entry(arg.clone()).or_default()
    }

    fn set_write(&mut self, data: Option<Arc<DataNode>>) {
        self.operation = match data {
            Some(data) => LogicalOperation::Write(data),
            None => LogicalOperation::Delete,
        };
        self.children.clear();
    }

    /// Walk to the target, marking ancestors as touched, then run `op`
    ///
    /// `view` is the post-operation view at this node.
    fn record<F>(&mut self, args: &[PathArgument], view: Option<&Arc<DataNode>>, op: F)
    where
        F: FnOnce(&mut ModifiedNode, Option<&Arc<DataNode>>),
    {
        let (first, rest) = match args.split_first() {
            Some(split) => split,
            None => return op(self, view),
        };

        let folded = matches!(
            self.operation,
            LogicalOperation::Write(_) | LogicalOperation::Merge(_) | LogicalOperation::Delete
        );
        if folded {
            self.set_write(view.cloned());
            return;
        }

        self.operation = LogicalOperation::Touch;
        let child_view = view.and_then(|v| v.child(first));
        self.child_mut(first).record(rest, child_view, op);
    }

    fn record_merge(&mut self, data: &Arc<DataNode>, result: Option<&Arc<DataNode>>) {
        match &self.operation {
            LogicalOperation::Unchanged => {
                self.operation = LogicalOperation::Merge(Arc::clone(data));
            }
            LogicalOperation::Touch => match data.children() {
                Some(children) => {
                    for (arg, child) in children {
                        let child_result = result.and_then(|r| r.child(arg));
                        self.child_mut(arg).record_merge(child, child_result);
                    }
                }
                None => self.set_write(result.cloned()),
            },
            LogicalOperation::Merge(previous) => {
                self.operation = LogicalOperation::Merge(DataNode::merge(previous, data));
            }
            LogicalOperation::Write(_) | LogicalOperation::Delete => {
                self.set_write(result.cloned());
            }
        }
    }

    /// Whether anything at all was recorded
    pub(crate) fn is_unchanged(&self) -> bool {
        matches!(self.operation, LogicalOperation::Unchanged)
    }
}

/// A set of pending changes against a base snapshot
///
/// Exclusively owned by one transaction. After [`ready`](Self::ready) it is
/// sealed and only readable.
///
/// # Example
///
/// ```
/// use treestore_core::{DataNode, TreePath};
/// use treestore_storage::DataTree;
///
/// let tree = DataTree::new();
/// let mut modification = tree.snapshot().new_modification();
/// let path: TreePath = "/a".parse().unwrap();
///
/// modification.write(&path, DataNode::leaf(1)).unwrap();
/// assert_eq!(*modification.read(&path).unwrap(), DataNode::leaf(1));
///
/// // Not visible in the tree until committed
/// assert!(tree.snapshot().read(&path).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DataTreeModification {
    base: DataTreeSnapshot,
    pub(crate) root: ModifiedNode,
    view: Arc<DataNode>,
    sealed: bool,
}

impl DataTreeModification {
    pub(crate) fn new(base: DataTreeSnapshot) -> Self {
        let view = Arc::clone(base.root());
        DataTreeModification {
            base,
            root: ModifiedNode::default(),
            view,
            sealed: false,
        }
    }

    /// Snapshot this modification was started from
    pub fn base(&self) -> &DataTreeSnapshot {
        &self.base
    }

    /// Whether the modification has been sealed
    pub fn is_ready(&self) -> bool {
        self.sealed
    }

    /// Whether no operation has been recorded
    pub fn is_empty(&self) -> bool {
        self.root.is_unchanged()
    }

    /// Read through the modification
    pub fn read(&self, path: &TreePath) -> Option<Arc<DataNode>> {
        self.view.descendant(path.args())
    }

    /// Whether a node exists in the modified view
    pub fn exists(&self, path: &TreePath) -> bool {
        self.read(path).is_some()
    }

    /// The post-write view as a snapshot
    ///
    /// Carries the base version: it is a speculative state, not a committed one.
    pub fn snapshot(&self) -> DataTreeSnapshot {
        DataTreeSnapshot::new(Arc::clone(&self.view), self.base.version())
    }

    /// Replace the subtree at `path`
    ///
    /// # Errors
    ///
    /// - IllegalState if the modification is sealed
    /// - IllegalArgument if the path has a wildcard, the parent does not
    ///   exist or is a leaf, or a leaf is written at the root
    pub fn write(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        let data = data.into();
        self.check_writable(path)?;
        if path.is_root() && !data.is_container() {
            return Err(StoreError::illegal_argument(
                "root node must be a container",
            ));
        }

        self.view = self.rebuild_view(path, Some(Arc::clone(&data)))?;
        let view = Arc::clone(&self.view);
        self.root.record(path.args(), Some(&view), move |node, _| {
            node.set_write(Some(data))
        });
        Ok(())
    }

    /// Merge `data` into the subtree at `path`
    ///
    /// Containers are merged child by child; leaves are replaced.
    ///
    /// # Errors
    ///
    /// Same conditions as [`write`](Self::write).
    pub fn merge(&mut self, path: &TreePath, data: impl Into<Arc<DataNode>>) -> StoreResult<()> {
        let data = data.into();
        self.check_writable(path)?;
        if path.is_root() && !data.is_container() {
            return Err(StoreError::illegal_argument(
                "root node must be a container",
            ));
        }

        let merged = match self.read(path) {
            Some(existing) => DataNode::merge(&existing, &data),
            None => Arc::clone(&data),
        };
        self.view = self.rebuild_view(path, Some(merged))?;
        let view = Arc::clone(&self.view);
        self.root.record(path.args(), Some(&view), move |node, result| {
            node.record_merge(&data, result)
        });
        Ok(())
    }

    /// Remove the subtree at `path`
    ///
    /// Deleting a node that does not exist is a no-op.
    ///
    /// # Errors
    ///
    /// - IllegalState if the modification is sealed
    /// - IllegalArgument for the root path or a wildcard path
    pub fn delete(&mut self, path: &TreePath) -> StoreResult<()> {
        self.check_open()?;
        check_concrete(path)?;
        if path.is_root() {
            return Err(StoreError::illegal_argument("cannot delete the root node"));
        }
        if !self.exists(path) {
            return Ok(());
        }

        self.view = self.rebuild_view(path, None)?;
        let view = Arc::clone(&self.view);
        self.root
            .record(path.args(), Some(&view), |node, _| node.set_write(None));
        Ok(())
    }

    /// Seal the modification; later writes fail with IllegalState
    pub fn ready(&mut self) {
        self.sealed = true;
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.sealed {
            Err(StoreError::illegal_state("modification is sealed"))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, path: &TreePath) -> StoreResult<()> {
        self.check_open()?;
        check_concrete(path)?;
        let parent = match path.parent() {
            Some(parent) => parent,
            None => return Ok(()),
        };
        match self.read(&parent) {
            Some(node) if node.is_container() => Ok(()),
            Some(_) => Err(StoreError::illegal_argument(format!(
                "parent {} of {} is a leaf",
                parent, path
            ))),
            None => Err(StoreError::illegal_argument(format!(
                "parent {} of {} does not exist",
                parent, path
            ))),
        }
    }

    fn rebuild_view(
        &self,
        path: &TreePath,
        node: Option<Arc<DataNode>>,
    ) -> StoreResult<Arc<DataNode>> {
        self.view.with_descendant(path.args(), node).ok_or_else(|| {
            StoreError::illegal_argument(format!("path {} is not reachable", path))
        })
    }
}

fn check_concrete(path: &TreePath) -> StoreResult<()> {
    if path.contains_wildcard() {
        Err(StoreError::illegal_argument(format!(
            "wildcard not allowed in data path {}",
            path
        )))
    } else {
        Ok(())
    }
}
