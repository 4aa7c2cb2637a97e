//! Listener registrations

use crate::event::{DataChangeEvent, DataChangeScope};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use treestore_core::TreePath;

/// Receives change events
///
/// Called on a notification worker thread, never while the store's commit
/// lock is held. Events for one registration arrive one at a time, in
/// commit order.
pub trait DataChangeListener: Send + Sync {
    /// Handle one event
    fn on_data_changed(&self, event: &DataChangeEvent);
}

impl<F> DataChangeListener for F
where
    F: Fn(&DataChangeEvent) + Send + Sync,
{
    fn on_data_changed(&self, event: &DataChangeEvent) {
        self(event)
    }
}

/// Unique identifier of a registration within one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub(crate) u64);

impl RegistrationId {
    /// Raw counter value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

/// A listener attached to a path with a scope
pub struct DataChangeListenerRegistration {
    id: RegistrationId,
    path: TreePath,
    scope: DataChangeScope,
    listener: Arc<dyn DataChangeListener>,
    closed: AtomicBool,
}

impl fmt::Debug for DataChangeListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChangeListenerRegistration")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("scope", &self.scope)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DataChangeListenerRegistration {
    pub(crate) fn new(
        id: RegistrationId,
        path: TreePath,
        scope: DataChangeScope,
        listener: Arc<dyn DataChangeListener>,
    ) -> Self {
        DataChangeListenerRegistration {
            id,
            path,
            scope,
            listener,
            closed: AtomicBool::new(false),
        }
    }

    /// Registration identifier
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Registered path; may contain wildcards
    pub fn path(&self) -> &TreePath {
        &self.path
    }

    /// Registered scope
    pub fn scope(&self) -> DataChangeScope {
        self.scope
    }

    /// Whether the registration has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed; returns true on the first call only
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Invoke the listener unless the registration is closed
    ///
    /// Returns whether the listener was called.
    pub fn notify(&self, event: &DataChangeEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        self.listener.on_data_changed(event);
        true
    }
}
