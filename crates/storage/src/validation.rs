//! Modification validation
//!
//! Conflict detection is first-committer-wins. Each recorded operation is
//! checked against the node it was based on and the node currently committed:
//! - Write and Delete require the current node to be the one the base saw
//! - Merge only conflicts on the children it actually merges into
//! - Touch (an ancestor of a change) requires the node to still exist as a
//!   container
//!
//! Nodes are compared by pointer first and by value second, so a concurrent
//! commit that rewrote a subtree with identical data does not conflict.

use crate::modification::{LogicalOperation, ModifiedNode};
use std::sync::Arc;
use treestore_core::{DataNode, StoreError, StoreResult, TreePath};

/// Types of conflicts found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Node existed in the base snapshot but was deleted since
    DeletedByOther {
        /// Conflicting path
        path: TreePath,
    },
    /// Node was absent in the base snapshot but was created since
    CreatedByOther {
        /// Conflicting path
        path: TreePath,
    },
    /// Node was replaced with different data since the base snapshot
    ModifiedByOther {
        /// Conflicting path
        path: TreePath,
    },
}

impl ConflictType {
    fn classify(
        path: TreePath,
        original: Option<&Arc<DataNode>>,
        current: Option<&Arc<DataNode>>,
    ) -> Self {
        match (original, current) {
            (Some(_), None) => ConflictType::DeletedByOther { path },
            (None, Some(_)) => ConflictType::CreatedByOther { path },
            _ => ConflictType::ModifiedByOther { path },
        }
    }

    /// Conflicting path
    pub fn path(&self) -> &TreePath {
        match self {
            ConflictType::DeletedByOther { path }
            | ConflictType::CreatedByOther { path }
            | ConflictType::ModifiedByOther { path } => path,
        }
    }

    /// Human-readable description
    pub fn message(&self) -> &'static str {
        match self {
            ConflictType::DeletedByOther { .. } => "node was deleted by another transaction",
            ConflictType::CreatedByOther { .. } => "node was created by another transaction",
            ConflictType::ModifiedByOther { .. } => "node was modified by another transaction",
        }
    }
}

impl From<ConflictType> for StoreError {
    fn from(conflict: ConflictType) -> Self {
        let message = conflict.message();
        match conflict {
            ConflictType::DeletedByOther { path }
            | ConflictType::CreatedByOther { path }
            | ConflictType::ModifiedByOther { path } => StoreError::conflict(path, message),
        }
    }
}

/// Result of conflict validation
///
/// Accumulates all conflicts found; a modification may be committed only if
/// `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A successful result
    pub fn ok() -> Self {
        ValidationResult::default()
    }

    /// Whether validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Merge another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// First conflict as an error, if any
    pub fn into_result(self) -> StoreResult<()> {
        match self.conflicts.into_iter().next() {
            Some(conflict) => Err(conflict.into()),
            None => Ok(()),
        }
    }

    fn push(&mut self, conflict: ConflictType) {
        self.conflicts.push(conflict);
    }
}

/// Schema hook run on every written or merged subtree before commit
///
/// Returning `Err(reason)` rejects the modification with ValidationFailed.
pub trait SchemaValidator: Send + Sync {
    /// Validate `data` about to be stored at `path`
    fn validate(&self, path: &TreePath, data: &DataNode) -> Result<(), String>;
}

/// Validator that accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(&self, _path: &TreePath, _data: &DataNode) -> Result<(), String> {
        Ok(())
    }
}

impl<F> SchemaValidator for F
where
    F: Fn(&TreePath, &DataNode) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, path: &TreePath, data: &DataNode) -> Result<(), String> {
        self(path, data)
    }
}

/// Check recorded operations against the current tree
pub(crate) fn check_conflicts(
    node: &ModifiedNode,
    path: &mut TreePath,
    original: Option<&Arc<DataNode>>,
    current: Option<&Arc<DataNode>>,
    result: &mut ValidationResult,
) {
    match &node.operation {
        LogicalOperation::Unchanged => {}
        LogicalOperation::Write(_) | LogicalOperation::Delete => {
            if !DataNode::same(original, current) {
                result.push(ConflictType::classify(path.clone(), original, current));
            }
        }
        LogicalOperation::Merge(data) => check_merge(data, path, original, current, result),
        LogicalOperation::Touch => {
            let current = match current {
                Some(current) if current.is_container() => current,
                _ => {
                    result.push(ConflictType::classify(path.clone(), original, current));
                    return;
                }
            };
            for (arg, child) in &node.children {
                path.push(arg.clone());
                check_conflicts(
                    child,
                    path,
                    original.and_then(|o| o.child(arg)),
                    current.child(arg),
                    result,
                );
                path.pop();
            }
        }
    }
}

fn check_merge(
    data: &Arc<DataNode>,
    path: &mut TreePath,
    original: Option<&Arc<DataNode>>,
    current: Option<&Arc<DataNode>>,
    result: &mut ValidationResult,
) {
    if DataNode::same(original, current) {
        return;
    }

    let original_is_container = original.map_or(true, |o| o.is_container());
    match (data.children(), current) {
        (Some(children), Some(current)) if current.is_container() && original_is_container => {
            for (arg, child) in children {
                path.push(arg.clone());
                check_merge(
                    child,
                    path,
                    original.and_then(|o| o.child(arg)),
                    current.child(arg),
                    result,
                );
                path.pop();
            }
        }
        _ => result.push(ConflictType::classify(path.clone(), original, current)),
    }
}

/// Run the schema hook over every written or merged subtree
pub(crate) fn check_schema(
    node: &ModifiedNode,
    path: &mut TreePath,
    validator: &dyn SchemaValidator,
) -> StoreResult<()> {
    match &node.operation {
        LogicalOperation::Write(data) | LogicalOperation::Merge(data) => validator
            .validate(path, data)
            .map_err(|message| StoreError::validation(path.clone(), message)),
        LogicalOperation::Touch => {
            for (arg, child) in &node.children {
                path.push(arg.clone());
                check_schema(child, path, validator)?;
                path.pop();
            }
            Ok(())
        }
        LogicalOperation::Unchanged | LogicalOperation::Delete => Ok(()),
    }
}
