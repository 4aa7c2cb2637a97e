//! Notification delivery
//!
//! A fixed pool of worker threads delivers events to listeners outside the
//! store's commit lock. Each registration has its own bounded FIFO queue and
//! at most one worker serves a given registration at a time, so a listener
//! sees its events one by one in submission order. Different registrations
//! are served round-robin with no ordering between them.
//!
//! `submit` blocks while the target queue is full, which pushes back on
//! committers when a listener falls behind.

use crate::event::DataChangeEvent;
use crate::registration::{DataChangeListenerRegistration, RegistrationId};
use crate::resolve::NotificationTask;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, error, trace};
use treestore_core::StoreError;

/// Dispatch failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The manager has been shut down; the task was not queued
    #[error("notification manager is shut down")]
    ShutDown,

    /// `try_submit` found the registration's queue at capacity
    #[error("notification queue for {0} is full")]
    QueueFull(RegistrationId),

    /// A worker thread could not be started
    #[error("failed to spawn notification worker: {0}")]
    Spawn(String),
}

impl From<DispatchError> for StoreError {
    fn from(e: DispatchError) -> Self {
        StoreError::unexpected(e.to_string())
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Number of worker threads (at least one is started)
    pub workers: usize,
    /// Maximum queued events per registration before `submit` blocks
    pub max_queue_depth: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        NotificationConfig {
            workers: 2,
            max_queue_depth: 1000,
        }
    }
}

/// Dispatcher metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events waiting in queues
    pub queued: usize,
    /// Events currently being delivered
    pub active: usize,
    /// Events accepted since creation
    pub submitted: u64,
    /// Events handed to a listener
    pub delivered: u64,
    /// Events dropped because the registration was closed
    pub skipped: u64,
    /// Deliveries where the listener panicked
    pub panicked: u64,
    /// Number of worker threads
    pub worker_count: usize,
}

struct ListenerQueue {
    registration: Arc<DataChangeListenerRegistration>,
    events: VecDeque<Arc<DataChangeEvent>>,
    /// In the ready list or being served by a worker
    scheduled: bool,
}

#[derive(Default)]
struct DispatchState {
    queues: FxHashMap<RegistrationId, ListenerQueue>,
    ready: VecDeque<RegistrationId>,
    queued: usize,
    active: usize,
}

struct DispatchInner {
    state: Mutex<DispatchState>,
    work_ready: Condvar,
    space_available: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    max_queue_depth: usize,
    submitted: AtomicU64,
    delivered: AtomicU64,
    skipped: AtomicU64,
    panicked: AtomicU64,
}

/// Per-registration FIFO event dispatcher
pub struct NotificationManager {
    inner: Arc<DispatchInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
}

impl NotificationManager {
    /// Start the worker pool
    ///
    /// Workers are named `treestore-notify-0`, `treestore-notify-1`, etc.
    pub fn new(config: NotificationConfig) -> Result<Self, DispatchError> {
        let num_workers = config.workers.max(1);
        let inner = Arc::new(DispatchInner {
            state: Mutex::new(DispatchState::default()),
            work_ready: Condvar::new(),
            space_available: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            max_queue_depth: config.max_queue_depth.max(1),
            submitted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let manager = NotificationManager {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_workers)),
            num_workers,
        };
        for i in 0..num_workers {
            let inner = Arc::clone(&manager.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("treestore-notify-{}", i))
                .spawn(move || worker_loop(&inner));
            match spawned {
                Ok(handle) => manager.workers.lock().push(handle),
                Err(e) => {
                    manager.shutdown();
                    return Err(DispatchError::Spawn(e.to_string()));
                }
            }
        }

        debug!(
            target: "treestore::notify",
            workers = num_workers,
            max_queue_depth = manager.inner.max_queue_depth,
            "Notification manager started"
        );
        Ok(manager)
    }

    /// Queue a task, blocking while the registration's queue is full
    ///
    /// # Errors
    ///
    /// [`DispatchError::ShutDown`] if the manager is (or becomes, while
    /// waiting) shut down.
    pub fn submit(&self, task: NotificationTask) -> Result<(), DispatchError> {
        let mut state = self.inner.state.lock();
        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(DispatchError::ShutDown);
            }
            if queue_len(&state, task.registration().id()) < self.inner.max_queue_depth {
                break;
            }
            trace!(
                target: "treestore::notify",
                registration = %task.registration().id(),
                "Queue full, waiting"
            );
            self.inner.space_available.wait(&mut state);
        }
        self.enqueue(&mut state, task);
        drop(state);

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Queue a task without blocking
    ///
    /// # Errors
    ///
    /// [`DispatchError::QueueFull`] if the registration's queue is at
    /// capacity, [`DispatchError::ShutDown`] after shutdown.
    pub fn try_submit(&self, task: NotificationTask) -> Result<(), DispatchError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(DispatchError::ShutDown);
        }
        let mut state = self.inner.state.lock();
        let id = task.registration().id();
        if queue_len(&state, id) >= self.inner.max_queue_depth {
            return Err(DispatchError::QueueFull(id));
        }
        self.enqueue(&mut state, task);
        drop(state);

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Queue every task in order; stops at the first failure
    pub fn submit_all(
        &self,
        tasks: impl IntoIterator<Item = NotificationTask>,
    ) -> Result<(), DispatchError> {
        for task in tasks {
            self.submit(task)?;
        }
        Ok(())
    }

    fn enqueue(&self, state: &mut DispatchState, task: NotificationTask) {
        let id = task.registration().id();
        let queue = state.queues.entry(id).or_insert_with(|| ListenerQueue {
            registration: Arc::clone(task.registration()),
            events: VecDeque::new(),
            scheduled: false,
        });
        queue.events.push_back(Arc::clone(task.event()));
        let newly_ready = !queue.scheduled;
        queue.scheduled = true;

        state.queued += 1;
        if newly_ready {
            state.ready.push_back(id);
        }
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Block until every queued and in-flight event has been handled
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut state = self.inner.state.lock();
        while state.queued > 0 || state.active > 0 {
            self.inner.drain_cond.wait(&mut state);
        }
    }

    /// Stop accepting events, deliver what is queued, then join the workers
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        let already = self.inner.shutdown.swap(true, Ordering::AcqRel);

        {
            let _state = self.inner.state.lock();
            self.inner.work_ready.notify_all();
            self.inner.space_available.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        if !already {
            debug!(target: "treestore::notify", "Notification manager shut down");
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Snapshot of dispatcher metrics
    pub fn stats(&self) -> DispatchStats {
        let (queued, active) = {
            let state = self.inner.state.lock();
            (state.queued, state.active)
        };
        DispatchStats {
            queued,
            active,
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            skipped: self.inner.skipped.load(Ordering::Relaxed),
            panicked: self.inner.panicked.load(Ordering::Relaxed),
            worker_count: self.num_workers,
        }
    }
}

impl Drop for NotificationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn queue_len(state: &DispatchState, id: RegistrationId) -> usize {
    state.queues.get(&id).map_or(0, |q| q.events.len())
}

/// Returns a registration to the ready list (or retires its queue) once a
/// delivery finishes, even if the listener panicked.
struct ActiveDeliveryGuard<'a> {
    inner: &'a DispatchInner,
    id: RegistrationId,
}

impl Drop for ActiveDeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.active -= 1;

        let has_more = match state.queues.get_mut(&self.id) {
            Some(queue) if !queue.events.is_empty() => true,
            Some(queue) => {
                queue.scheduled = false;
                false
            }
            None => false,
        };
        if has_more {
            state.ready.push_back(self.id);
            self.inner.work_ready.notify_one();
        } else {
            state.queues.remove(&self.id);
        }

        if state.queued == 0 && state.active == 0 {
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &DispatchInner) {
    loop {
        let (id, registration, event) = {
            let mut state = inner.state.lock();
            loop {
                if let Some(id) = state.ready.pop_front() {
                    let next = state.queues.get_mut(&id).and_then(|q| {
                        let event = q.events.pop_front()?;
                        Some((Arc::clone(&q.registration), event))
                    });
                    if let Some((registration, event)) = next {
                        state.queued -= 1;
                        state.active += 1;
                        break (id, registration, event);
                    }
                    continue;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut state);
            }
        };
        inner.space_available.notify_all();

        let _guard = ActiveDeliveryGuard { inner, id };

        if registration.is_closed() {
            inner.skipped.fetch_add(1, Ordering::Relaxed);
            trace!(
                target: "treestore::notify",
                registration = %id,
                "Skipping closed registration"
            );
            continue;
        }

        let delivery = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registration.notify(&event)
        }));
        match delivery {
            Ok(true) => {
                inner.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                inner.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                inner.panicked.fetch_add(1, Ordering::Relaxed);
                let message = e
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| e.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("(non-string panic)");
                error!(
                    target: "treestore::notify",
                    registration = %id,
                    path = %registration.path(),
                    "listener panicked: {}",
                    message
                );
            }
        }
    }
}
