//! Change events delivered to listeners

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use treestore_core::{DataNode, TreePath};

/// Depth of change a listener is interested in
///
/// Relative to the registered path:
/// - `Base`: the node itself, or any change beneath it reported as an update
///   of the node
/// - `One`: the node and its immediate children
/// - `Subtree`: any descendant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataChangeScope {
    /// The registered node only
    Base,
    /// The registered node and direct children
    One,
    /// Everything beneath the registered node
    Subtree,
}

impl fmt::Display for DataChangeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataChangeScope::Base => write!(f, "BASE"),
            DataChangeScope::One => write!(f, "ONE"),
            DataChangeScope::Subtree => write!(f, "SUBTREE"),
        }
    }
}

/// Before/after pair of an updated node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUpdate {
    /// Data before the commit
    pub before: Arc<DataNode>,
    /// Data after the commit
    pub after: Arc<DataNode>,
}

/// Immutable description of what a commit changed, as seen by one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChangeEvent {
    scope: DataChangeScope,
    created: BTreeMap<TreePath, Arc<DataNode>>,
    updated: BTreeMap<TreePath, DataUpdate>,
    removed: BTreeMap<TreePath, Arc<DataNode>>,
    original_subtree: Option<Arc<DataNode>>,
    updated_subtree: Option<Arc<DataNode>>,
}

impl DataChangeEvent {
    /// Start building an event of the given scope
    pub fn builder(scope: DataChangeScope) -> DataChangeEventBuilder {
        DataChangeEventBuilder::new(scope)
    }

    /// Scope of the event
    pub fn scope(&self) -> DataChangeScope {
        self.scope
    }

    /// Nodes that did not exist before the commit
    pub fn created(&self) -> &BTreeMap<TreePath, Arc<DataNode>> {
        &self.created
    }

    /// Nodes that existed before and after and changed
    pub fn updated(&self) -> &BTreeMap<TreePath, DataUpdate> {
        &self.updated
    }

    /// Nodes that existed before and are gone, with their last data
    pub fn removed(&self) -> &BTreeMap<TreePath, Arc<DataNode>> {
        &self.removed
    }

    /// Paths of removed nodes
    pub fn removed_paths(&self) -> impl Iterator<Item = &TreePath> {
        self.removed.keys()
    }

    /// Data before the commit for any path the event mentions
    pub fn original_data(&self, path: &TreePath) -> Option<&Arc<DataNode>> {
        self.removed
            .get(path)
            .or_else(|| self.updated.get(path).map(|u| &u.before))
    }

    /// Data at the registration's node before the commit
    pub fn original_subtree(&self) -> Option<&Arc<DataNode>> {
        self.original_subtree.as_ref()
    }

    /// Data at the registration's node after the commit
    pub fn updated_subtree(&self) -> Option<&Arc<DataNode>> {
        self.updated_subtree.as_ref()
    }

    /// Whether the event mentions no paths at all
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Total number of paths mentioned
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.removed.len()
    }
}

/// Incrementally assembles a [`DataChangeEvent`]
#[derive(Debug, Clone)]
pub struct DataChangeEventBuilder {
    scope: DataChangeScope,
    created: BTreeMap<TreePath, Arc<DataNode>>,
    updated: BTreeMap<TreePath, DataUpdate>,
    removed: BTreeMap<TreePath, Arc<DataNode>>,
    before: Option<Arc<DataNode>>,
    after: Option<Arc<DataNode>>,
}

impl DataChangeEventBuilder {
    /// Empty builder
    pub fn new(scope: DataChangeScope) -> Self {
        DataChangeEventBuilder {
            scope,
            created: BTreeMap::new(),
            updated: BTreeMap::new(),
            removed: BTreeMap::new(),
            before: None,
            after: None,
        }
    }

    /// Scope of the event being built
    pub fn scope(&self) -> DataChangeScope {
        self.scope
    }

    /// Record a created node
    pub fn add_created(&mut self, path: TreePath, data: Arc<DataNode>) -> &mut Self {
        self.created.insert(path, data);
        self
    }

    /// Record an updated node
    pub fn add_updated(
        &mut self,
        path: TreePath,
        before: Arc<DataNode>,
        after: Arc<DataNode>,
    ) -> &mut Self {
        self.updated.insert(path, DataUpdate { before, after });
        self
    }

    /// Record a removed node with its last data
    pub fn add_removed(&mut self, path: TreePath, data: Arc<DataNode>) -> &mut Self {
        self.removed.insert(path, data);
        self
    }

    /// Set the original subtree
    pub fn set_before(&mut self, before: Option<Arc<DataNode>>) -> &mut Self {
        self.before = before;
        self
    }

    /// Set the updated subtree
    pub fn set_after(&mut self, after: Option<Arc<DataNode>>) -> &mut Self {
        self.after = after;
        self
    }

    /// Fold every path of `event` into this builder
    ///
    /// Subtrees and scope of the builder are left alone.
    pub fn merge(&mut self, event: &DataChangeEvent) -> &mut Self {
        self.created
            .extend(event.created.iter().map(|(p, d)| (p.clone(), Arc::clone(d))));
        self.updated
            .extend(event.updated.iter().map(|(p, u)| (p.clone(), u.clone())));
        self.removed
            .extend(event.removed.iter().map(|(p, d)| (p.clone(), Arc::clone(d))));
        self
    }

    /// Whether no paths have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Finish the event
    pub fn build(self) -> DataChangeEvent {
        DataChangeEvent {
            scope: self.scope,
            created: self.created,
            updated: self.updated,
            removed: self.removed,
            original_subtree: self.before,
            updated_subtree: self.after,
        }
    }
}
