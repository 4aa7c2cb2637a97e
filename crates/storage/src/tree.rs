//! The shared, versioned data tree
//!
//! `DataTree` owns the committed root. Readers take O(1) snapshots under a
//! read lock; `commit` swaps the root under the write lock. Callers are
//! expected to serialize `commit` externally (the store's critical section);
//! the version check in `commit` catches any candidate prepared against a
//! root that has since been replaced.

use crate::candidate::{CandidateNode, DataTreeCandidate, ModificationType};
use crate::modification::{DataTreeModification, LogicalOperation, ModifiedNode};
use crate::snapshot::DataTreeSnapshot;
use crate::validation::{
    check_conflicts, check_schema, AcceptAll, SchemaValidator, ValidationResult,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};
use treestore_core::{DataNode, PathArgument, StoreError, StoreResult, TreePath};

struct TreeState {
    root: Arc<DataNode>,
    version: u64,
}

/// Copy-on-write data tree
pub struct DataTree {
    state: RwLock<TreeState>,
    validator: Arc<dyn SchemaValidator>,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DataTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTree")
            .field("version", &self.version())
            .finish()
    }
}

impl DataTree {
    /// Create an empty tree (root is an empty container, version 0)
    pub fn new() -> Self {
        Self::with_validator(Arc::new(AcceptAll))
    }

    /// Create an empty tree with a schema hook
    pub fn with_validator(validator: Arc<dyn SchemaValidator>) -> Self {
        DataTree {
            state: RwLock::new(TreeState {
                root: Arc::new(DataNode::empty_container()),
                version: 0,
            }),
            validator,
        }
    }

    /// Current committed version
    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Take a snapshot of the committed tree
    pub fn snapshot(&self) -> DataTreeSnapshot {
        let state = self.state.read();
        DataTreeSnapshot::new(Arc::clone(&state.root), state.version)
    }

    /// Check a sealed modification against the committed tree
    ///
    /// # Errors
    ///
    /// - IllegalState if the modification has not been sealed
    /// - Conflict if another commit changed a path this modification depends on
    /// - ValidationFailed if the schema hook rejects written data
    pub fn validate(&self, modification: &DataTreeModification) -> StoreResult<()> {
        if !modification.is_ready() {
            return Err(StoreError::illegal_state(
                "modification must be sealed before validation",
            ));
        }

        self.check_conflicts_at(modification, &self.snapshot())?;
        check_schema(&modification.root, &mut TreePath::root(), self.validator.as_ref())
    }

    /// Apply a sealed modification to the committed tree, producing a candidate
    ///
    /// Conflicts are checked again against the root the candidate is built
    /// on, so a commit that landed after `validate` is never overwritten.
    /// The committed tree itself is not changed.
    ///
    /// # Errors
    ///
    /// - IllegalState if the modification has not been sealed
    /// - Conflict if another commit changed a path this modification depends on
    pub fn prepare(&self, modification: &DataTreeModification) -> StoreResult<DataTreeCandidate> {
        if !modification.is_ready() {
            return Err(StoreError::illegal_state(
                "modification must be sealed before prepare",
            ));
        }

        let current = self.snapshot();
        self.check_conflicts_at(modification, &current)?;
        let root = prepare_node(
            &modification.root,
            None,
            Some(current.root()),
            &mut TreePath::root(),
        )?;
        if root.after.is_none() {
            return Err(StoreError::unexpected("candidate would remove the root node"));
        }

        debug!(
            target: "treestore::tree",
            base_version = current.version(),
            kind = ?root.kind,
            "Prepared candidate"
        );
        Ok(DataTreeCandidate {
            root_path: TreePath::root(),
            root,
            base_version: current.version(),
        })
    }

    fn check_conflicts_at(
        &self,
        modification: &DataTreeModification,
        current: &DataTreeSnapshot,
    ) -> StoreResult<()> {
        let mut result = ValidationResult::ok();
        check_conflicts(
            &modification.root,
            &mut TreePath::root(),
            Some(modification.base().root()),
            Some(current.root()),
            &mut result,
        );
        if result.is_valid() {
            return Ok(());
        }
        warn!(
            target: "treestore::tree",
            conflicts = result.conflict_count(),
            base_version = modification.base().version(),
            current_version = current.version(),
            "Modification conflicts with committed state"
        );
        result.into_result()
    }

    /// Install a candidate as the committed tree
    ///
    /// Returns the new version.
    ///
    /// # Errors
    ///
    /// Conflict if another candidate was committed after this one was prepared.
    pub fn commit(&self, candidate: &DataTreeCandidate) -> StoreResult<u64> {
        let after = candidate
            .root
            .after
            .as_ref()
            .ok_or_else(|| StoreError::unexpected("candidate has no root data"))?;

        let mut state = self.state.write();
        if state.version != candidate.base_version {
            return Err(StoreError::conflict(
                candidate.root_path.clone(),
                format!(
                    "data tree moved to version {} after candidate was prepared at {}",
                    state.version, candidate.base_version
                ),
            ));
        }
        state.root = Arc::clone(after);
        state.version += 1;

        debug!(target: "treestore::tree", version = state.version, "Committed candidate");
        Ok(state.version)
    }
}

fn prepare_node(
    node: &ModifiedNode,
    identifier: Option<PathArgument>,
    before: Option<&Arc<DataNode>>,
    path: &mut TreePath,
) -> StoreResult<CandidateNode> {
    let mut children = Vec::new();
    let (kind, after) = match &node.operation {
        LogicalOperation::Unchanged => (ModificationType::Unmodified, before.cloned()),
        LogicalOperation::Write(data) => (ModificationType::Write, Some(Arc::clone(data))),
        LogicalOperation::Merge(data) => {
            let merged = match before {
                Some(current) => DataNode::merge(current, data),
                None => Arc::clone(data),
            };
            (ModificationType::Merge, Some(merged))
        }
        LogicalOperation::Delete => (ModificationType::Delete, None),
        LogicalOperation::Touch => {
            let current = before.filter(|b| b.is_container()).ok_or_else(|| {
                StoreError::conflict(path.clone(), "node was deleted by another transaction")
            })?;
            let mut rebuilt = current.children().cloned().unwrap_or_default();
            for (arg, child) in &node.children {
                path.push(arg.clone());
                let prepared = prepare_node(child, Some(arg.clone()), current.child(arg), path)?;
                path.pop();

                match &prepared.after {
                    Some(data) => {
                        rebuilt.insert(arg.clone(), Arc::clone(data));
                    }
                    None => {
                        rebuilt.remove(arg);
                    }
                }
                if prepared.kind != ModificationType::Unmodified {
                    children.push(prepared);
                }
            }

            if children.is_empty() {
                (ModificationType::Unmodified, before.cloned())
            } else {
                (
                    ModificationType::SubtreeModified,
                    Some(Arc::new(DataNode::Container(rebuilt))),
                )
            }
        }
    };

    let kind = if before.is_none() && after.is_none() {
        ModificationType::Unmodified
    } else {
        kind
    };

    Ok(CandidateNode {
        identifier,
        kind,
        before: before.cloned(),
        after,
        children,
    })
}
