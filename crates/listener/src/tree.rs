//! Registry of listeners keyed by path
//!
//! The tree is copy-on-write: register and unregister build a new root and
//! swap it in, so a resolution pass working from a [`ListenerTreeSnapshot`]
//! is never disturbed by concurrent changes. Every change bumps the
//! generation, which lets a commit detect that its snapshot went stale.

use crate::event::DataChangeScope;
use crate::registration::{DataChangeListener, DataChangeListenerRegistration, RegistrationId};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use treestore_core::{PathArgument, TreePath};

/// One node of the listener tree
#[derive(Debug, Clone, Default)]
pub struct ListenerNode {
    children: FxHashMap<PathArgument, Arc<ListenerNode>>,
    registrations: Vec<Arc<DataChangeListenerRegistration>>,
}

impl ListenerNode {
    /// Child for exactly this argument
    pub fn child(&self, arg: &PathArgument) -> Option<&Arc<ListenerNode>> {
        self.children.get(arg)
    }

    /// Children matching a concrete data argument
    ///
    /// The exact child, plus the wildcard child when `arg` is a keyed entry.
    pub fn matching_children<'a>(
        &'a self,
        arg: &PathArgument,
    ) -> impl Iterator<Item = &'a Arc<ListenerNode>> + 'a {
        let exact = self.children.get(arg);
        let wildcard = arg.to_wildcard().and_then(|w| self.children.get(&w));
        exact.into_iter().chain(wildcard)
    }

    /// Registrations attached at this node
    pub fn registrations(&self) -> &[Arc<DataChangeListenerRegistration>] {
        &self.registrations
    }

    /// No registrations here or below
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        self.registrations.len() + self.children.values().map(|c| c.count()).sum::<usize>()
    }
}

/// Immutable view of the listener tree
#[derive(Debug, Clone)]
pub struct ListenerTreeSnapshot {
    root: Arc<ListenerNode>,
    generation: u64,
}

impl ListenerTreeSnapshot {
    /// Root node
    pub fn root(&self) -> &ListenerNode {
        &self.root
    }

    /// Generation this snapshot was taken at
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of registrations in the snapshot
    pub fn registration_count(&self) -> usize {
        self.root.count()
    }
}

struct TreeRoot {
    node: Arc<ListenerNode>,
    generation: u64,
}

/// Concurrent listener registry
pub struct ListenerTree {
    root: RwLock<TreeRoot>,
    next_id: AtomicU64,
}

impl Default for ListenerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerTree {
    /// Empty registry
    pub fn new() -> Self {
        ListenerTree {
            root: RwLock::new(TreeRoot {
                node: Arc::new(ListenerNode::default()),
                generation: 0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach `listener` at `path`
    ///
    /// Wildcard arguments in `path` become wildcard nodes that match any
    /// entry with the same name.
    pub fn register(
        &self,
        path: TreePath,
        scope: DataChangeScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> Arc<DataChangeListenerRegistration> {
        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(DataChangeListenerRegistration::new(
            id,
            path.clone(),
            scope,
            listener,
        ));

        let mut root = self.root.write();
        let mut node = Arc::clone(&root.node);
        insert(&mut node, path.args(), Arc::clone(&registration));
        root.node = node;
        root.generation += 1;

        debug!(
            target: "treestore::listener",
            registration = %id,
            path = %path,
            scope = %scope,
            generation = root.generation,
            "Listener registered"
        );
        registration
    }

    /// Detach a registration and mark it closed
    ///
    /// Returns false if it was already removed. Events already queued for it
    /// are skipped at delivery.
    pub fn unregister(&self, registration: &DataChangeListenerRegistration) -> bool {
        registration.mark_closed();

        let mut root = self.root.write();
        let mut node = Arc::clone(&root.node);
        if !remove(&mut node, registration.path().args(), registration.id()) {
            return false;
        }
        root.node = node;
        root.generation += 1;

        debug!(
            target: "treestore::listener",
            registration = %registration.id(),
            path = %registration.path(),
            generation = root.generation,
            "Listener unregistered"
        );
        true
    }

    /// Current immutable view
    pub fn snapshot(&self) -> ListenerTreeSnapshot {
        let root = self.root.read();
        ListenerTreeSnapshot {
            root: Arc::clone(&root.node),
            generation: root.generation,
        }
    }

    /// Current generation
    pub fn generation(&self) -> u64 {
        self.root.read().generation
    }

    /// Number of live registrations
    pub fn registration_count(&self) -> usize {
        self.root.read().node.count()
    }
}

fn insert(
    node: &mut Arc<ListenerNode>,
    args: &[PathArgument],
    registration: Arc<DataChangeListenerRegistration>,
) {
    let node = Arc::make_mut(node);
    match args.split_first() {
        None => node.registrations.push(registration),
        Some((first, rest)) => {
            let child = node.children.entry(first.clone()).or_default();
            insert(child, rest, registration);
        }
    }
}

fn remove(node: &mut Arc<ListenerNode>, args: &[PathArgument], id: RegistrationId) -> bool {
    match args.split_first() {
        None => {
            if !node.registrations.iter().any(|r| r.id() == id) {
                return false;
            }
            Arc::make_mut(node).registrations.retain(|r| r.id() != id);
            true
        }
        Some((first, rest)) => {
            if node.children.get(first).is_none() {
                return false;
            }
            let node = Arc::make_mut(node);
            let removed = match node.children.get_mut(first) {
                Some(child) => remove(child, rest, id),
                None => false,
            };
            if removed && node.children.get(first).map_or(false, |c| c.is_empty()) {
                node.children.remove(first);
            }
            removed
        }
    }
}
