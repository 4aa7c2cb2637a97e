//! Tree data: leaves carrying a [`Value`] and containers of children
//!
//! Nodes are immutable once built. Subtrees are shared between snapshots
//! through `Arc`, so "modifying" a tree means rebuilding the spine from the
//! changed node up to the root and reusing every untouched sibling.

use crate::path::PathArgument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Leaf payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Presence-only leaf
    Empty,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// UTF-8 string
    String(String),
    /// Opaque bytes
    Bytes(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "(empty)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

/// Children of a container, ordered by argument
pub type Children = BTreeMap<PathArgument, Arc<DataNode>>;

/// A node of the data tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataNode {
    /// Terminal value
    Leaf(Value),
    /// Composite node; repeated elements are children keyed by
    /// [`PathArgument::Entry`]
    Container(Children),
}

impl DataNode {
    /// Create a leaf
    pub fn leaf(value: impl Into<Value>) -> Self {
        DataNode::Leaf(value.into())
    }

    /// Create a container without children
    pub fn empty_container() -> Self {
        DataNode::Container(Children::new())
    }

    /// Create a container from `(argument, node)` pairs
    pub fn container<I: IntoIterator<Item = (PathArgument, DataNode)>>(children: I) -> Self {
        DataNode::Container(
            children
                .into_iter()
                .map(|(arg, node)| (arg, Arc::new(node)))
                .collect(),
        )
    }

    /// Start building a container
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// Whether this is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self, DataNode::Leaf(_))
    }

    /// Whether this is a container
    pub fn is_container(&self) -> bool {
        matches!(self, DataNode::Container(_))
    }

    /// Leaf value (None for containers)
    pub fn value(&self) -> Option<&Value> {
        match self {
            DataNode::Leaf(v) => Some(v),
            DataNode::Container(_) => None,
        }
    }

    /// Children (None for leaves)
    pub fn children(&self) -> Option<&Children> {
        match self {
            DataNode::Leaf(_) => None,
            DataNode::Container(children) => Some(children),
        }
    }

    /// Direct child by argument
    pub fn child(&self, arg: &PathArgument) -> Option<&Arc<DataNode>> {
        self.children().and_then(|c| c.get(arg))
    }

    /// Descendant by relative argument sequence
    pub fn descendant(self: &Arc<Self>, args: &[PathArgument]) -> Option<Arc<DataNode>> {
        let mut current = self;
        for arg in args {
            current = current.child(arg)?;
        }
        Some(Arc::clone(current))
    }

    /// Copy of this container with one child replaced or removed
    ///
    /// Returns None when called on a leaf.
    pub fn with_child(&self, arg: &PathArgument, child: Option<Arc<DataNode>>) -> Option<DataNode> {
        let mut children = self.children()?.clone();
        match child {
            Some(node) => {
                children.insert(arg.clone(), node);
            }
            None => {
                children.remove(arg);
            }
        }
        Some(DataNode::Container(children))
    }

    /// Copy of this tree with the node at `args` replaced (or removed when
    /// `node` is None), rebuilding only the spine above it
    ///
    /// Returns None when an intermediate node is missing or is a leaf, or
    /// when asked to remove the root itself.
    pub fn with_descendant(
        self: &Arc<Self>,
        args: &[PathArgument],
        node: Option<Arc<DataNode>>,
    ) -> Option<Arc<DataNode>> {
        let (first, rest) = match args.split_first() {
            Some(split) => split,
            None => return node,
        };
        let replaced = if rest.is_empty() {
            node
        } else {
            Some(self.child(first)?.with_descendant(rest, node)?)
        };
        self.with_child(first, replaced).map(Arc::new)
    }

    /// Merge `data` on top of `current`
    ///
    /// Containers are merged child by child; anything else is replaced.
    /// Subtrees that `data` does not mention keep their existing `Arc`.
    pub fn merge(current: &Arc<DataNode>, data: &Arc<DataNode>) -> Arc<DataNode> {
        match (current.as_ref(), data.as_ref()) {
            (DataNode::Container(existing), DataNode::Container(incoming)) => {
                let mut children = existing.clone();
                for (arg, node) in incoming {
                    let merged = match existing.get(arg) {
                        Some(old) => DataNode::merge(old, node),
                        None => Arc::clone(node),
                    };
                    children.insert(arg.clone(), merged);
                }
                Arc::new(DataNode::Container(children))
            }
            _ => Arc::clone(data),
        }
    }

    /// Identity-or-equality comparison of two optional subtrees
    pub fn same(a: Option<&Arc<DataNode>>, b: Option<&Arc<DataNode>>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl From<Value> for DataNode {
    fn from(v: Value) -> Self {
        DataNode::Leaf(v)
    }
}

/// Builder for container nodes
#[derive(Debug, Default, Clone)]
pub struct ContainerBuilder {
    children: Children,
}

impl ContainerBuilder {
    /// Add a leaf child
    pub fn leaf(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.child(PathArgument::node(name), DataNode::leaf(value))
    }

    /// Add a plain container child
    pub fn node(self, name: impl Into<String>, node: DataNode) -> Self {
        self.child(PathArgument::node(name), node)
    }

    /// Add a keyed repeated element
    pub fn entry(self, name: impl Into<String>, key: impl Into<String>, node: DataNode) -> Self {
        self.child(PathArgument::entry(name, key), node)
    }

    /// Add a child under an arbitrary argument
    pub fn child(mut self, arg: PathArgument, node: DataNode) -> Self {
        self.children.insert(arg, Arc::new(node));
        self
    }

    /// Finish the container
    pub fn build(self) -> DataNode {
        DataNode::Container(self.children)
    }
}
