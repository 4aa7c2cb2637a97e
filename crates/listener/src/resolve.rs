//! Change resolution
//!
//! Walks a [`DataTreeCandidate`] against a [`ListenerTreeSnapshot`] and
//! produces one [`DataChangeEvent`] per affected registration.
//!
//! Each level of the walk carries:
//! - the concrete data path
//! - every listener node reachable at that path, wildcard matches included
//! - SUBTREE builders inherited from all ancestors
//! - ONE builders inherited from the immediate parent
//! - one builder per registration anchored at this level
//!
//! Events are produced bottom-up and offered to every builder of the level.
//! A builder accepts an event according to its scope: SUBTREE builders take
//! everything, ONE builders take ONE and BASE events, BASE builders (and ONE
//! builders inherited from the parent) take BASE events only.
//!
//! The walk is a pure function of its inputs. Builders live in an arena
//! indexed by position, so inherited sets are plain index lists.

use crate::event::{DataChangeEvent, DataChangeEventBuilder, DataChangeScope};
use crate::registration::{DataChangeListenerRegistration, RegistrationId};
use crate::tree::{ListenerNode, ListenerTreeSnapshot};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};
use treestore_core::{DataNode, PathArgument, TreePath};
use treestore_storage::{CandidateNode, DataTreeCandidate, ModificationType};

/// One event bound for one registration
#[derive(Debug, Clone)]
pub struct NotificationTask {
    registration: Arc<DataChangeListenerRegistration>,
    event: Arc<DataChangeEvent>,
}

impl NotificationTask {
    /// Pair a registration with an event
    pub fn new(registration: Arc<DataChangeListenerRegistration>, event: DataChangeEvent) -> Self {
        NotificationTask {
            registration,
            event: Arc::new(event),
        }
    }

    /// Target registration
    pub fn registration(&self) -> &Arc<DataChangeListenerRegistration> {
        &self.registration
    }

    /// Event to deliver
    pub fn event(&self) -> &Arc<DataChangeEvent> {
        &self.event
    }

    /// Deliver now on the calling thread; false if the registration is closed
    pub fn deliver(&self) -> bool {
        self.registration.notify(&self.event)
    }
}

/// Compute the notification tasks a candidate produces
///
/// Tasks are ordered by registration id. Registrations that are already
/// closed are ignored.
pub fn resolve_changes(
    candidate: &DataTreeCandidate,
    listeners: &ListenerTreeSnapshot,
) -> Vec<NotificationTask> {
    let mut nodes = vec![listeners.root()];
    for arg in candidate.root_path().args() {
        nodes = nodes
            .iter()
            .flat_map(|n| n.matching_children(arg))
            .map(|c| &**c)
            .collect();
    }

    let mut resolver = Resolver::default();
    let state = resolver.state(
        candidate.root_path().clone(),
        nodes,
        Rc::new(Vec::new()),
        Vec::new(),
    );
    resolver.resolve_any(&state, candidate.root());

    let tasks = resolver.finish();
    debug!(
        target: "treestore::listener",
        tasks = tasks.len(),
        base_version = candidate.base_version(),
        "Resolved change events"
    );
    tasks
}

#[derive(Debug, Clone, Copy)]
enum SimpleEvent {
    Created,
    Removed,
}

struct LocalBuilder {
    registration: Arc<DataChangeListenerRegistration>,
    builder: usize,
}

struct ResolveState<'a> {
    path: TreePath,
    nodes: Vec<&'a ListenerNode>,
    inherited_sub: Rc<Vec<usize>>,
    inherited_one: Vec<usize>,
    base: Vec<LocalBuilder>,
    one: Vec<LocalBuilder>,
    sub: Vec<LocalBuilder>,
}

impl ResolveState<'_> {
    /// Whether anything at or below this level could receive an event
    fn needs_processing(&self) -> bool {
        !self.nodes.is_empty() || !self.inherited_sub.is_empty() || !self.inherited_one.is_empty()
    }

    fn local(&self) -> impl Iterator<Item = &LocalBuilder> {
        self.base.iter().chain(&self.one).chain(&self.sub)
    }
}

#[derive(Default)]
struct Resolver {
    builders: Vec<Option<DataChangeEventBuilder>>,
    collected: BTreeMap<
        RegistrationId,
        (Arc<DataChangeListenerRegistration>, Vec<DataChangeEvent>),
    >,
}

impl Resolver {
    fn state<'a>(
        &mut self,
        path: TreePath,
        nodes: Vec<&'a ListenerNode>,
        inherited_sub: Rc<Vec<usize>>,
        inherited_one: Vec<usize>,
    ) -> ResolveState<'a> {
        let mut state = ResolveState {
            path,
            nodes,
            inherited_sub,
            inherited_one,
            base: Vec::new(),
            one: Vec::new(),
            sub: Vec::new(),
        };

        for node in &state.nodes {
            for registration in node.registrations() {
                if registration.is_closed() {
                    continue;
                }
                let builder = self.builders.len();
                self.builders
                    .push(Some(DataChangeEventBuilder::new(registration.scope())));
                let local = LocalBuilder {
                    registration: Arc::clone(registration),
                    builder,
                };
                match registration.scope() {
                    DataChangeScope::Base => state.base.push(local),
                    DataChangeScope::One => state.one.push(local),
                    DataChangeScope::Subtree => state.sub.push(local),
                }
            }
        }
        state
    }

    fn child<'a>(&mut self, parent: &ResolveState<'a>, arg: &PathArgument) -> ResolveState<'a> {
        let inherited_sub = if parent.sub.is_empty() {
            Rc::clone(&parent.inherited_sub)
        } else {
            let mut sub = Vec::with_capacity(parent.inherited_sub.len() + parent.sub.len());
            sub.extend(parent.inherited_sub.iter().copied());
            sub.extend(parent.sub.iter().map(|l| l.builder));
            Rc::new(sub)
        };
        let inherited_one = parent.one.iter().map(|l| l.builder).collect();
        let nodes = parent
            .nodes
            .iter()
            .flat_map(|n| n.matching_children(arg))
            .map(|c| &**c)
            .collect();

        self.state(parent.path.join(arg), nodes, inherited_sub, inherited_one)
    }

    fn merge_into(&mut self, builder: usize, event: &DataChangeEvent) {
        if let Some(b) = self.builders[builder].as_mut() {
            b.merge(event);
        }
    }

    fn add_event(&mut self, state: &ResolveState<'_>, event: &DataChangeEvent) {
        for local in &state.sub {
            self.merge_into(local.builder, event);
        }
        for &builder in state.inherited_sub.iter() {
            self.merge_into(builder, event);
        }

        if matches!(event.scope(), DataChangeScope::One | DataChangeScope::Base) {
            for local in &state.one {
                self.merge_into(local.builder, event);
            }
        }

        if event.scope() == DataChangeScope::Base {
            for &builder in &state.inherited_one {
                self.merge_into(builder, event);
            }
            for local in &state.base {
                self.merge_into(local.builder, event);
            }
        }
    }

    /// Finalize the builders anchored at this level
    fn collect_events(
        &mut self,
        state: &ResolveState<'_>,
        before: Option<&Arc<DataNode>>,
        after: Option<&Arc<DataNode>>,
    ) {
        for local in state.local() {
            let Some(mut builder) = self.builders[local.builder].take() else {
                continue;
            };
            if builder.is_empty() {
                continue;
            }
            builder.set_before(before.cloned()).set_after(after.cloned());
            self.collected
                .entry(local.registration.id())
                .or_insert_with(|| (Arc::clone(&local.registration), Vec::new()))
                .1
                .push(builder.build());
        }
    }

    fn resolve_any(&mut self, state: &ResolveState<'_>, node: &CandidateNode) -> bool {
        let before = node.before();
        let after = node.after();
        let kind = node.kind();

        if kind != ModificationType::Unmodified && before.is_none() && after.is_none() {
            debug!(
                target: "treestore::listener",
                path = %state.path,
                kind = ?kind,
                "Modification has no before or after data, assuming unchanged"
            );
            return false;
        }

        match kind {
            ModificationType::SubtreeModified => self.resolve_subtree(state, node),
            ModificationType::Write | ModificationType::Merge => match (before, after) {
                (None, Some(after)) => {
                    self.resolve_same_recursively(state, after, SimpleEvent::Created);
                    true
                }
                (Some(before), Some(after)) => self.resolve_replaced(state, before, after),
                (_, None) => false,
            },
            ModificationType::Delete => match before {
                Some(before) => {
                    self.resolve_same_recursively(state, before, SimpleEvent::Removed);
                    true
                }
                None => false,
            },
            ModificationType::Unmodified => false,
        }
    }

    fn resolve_replaced(
        &mut self,
        state: &ResolveState<'_>,
        before: &Arc<DataNode>,
        after: &Arc<DataNode>,
    ) -> bool {
        if Arc::ptr_eq(before, after) {
            return false;
        }

        match (before.children(), after.children()) {
            (Some(before_children), Some(after_children)) => {
                if !state.needs_processing() {
                    trace!(
                        target: "treestore::listener",
                        path = %state.path,
                        "Not processing replaced container"
                    );
                    return before != after;
                }

                let mut changed = false;
                for (arg, before_child) in before_children {
                    let child = self.child(state, arg);
                    let child_changed = match after_children.get(arg) {
                        Some(after_child) => {
                            self.resolve_replaced(&child, before_child, after_child)
                        }
                        None => {
                            let removed = SimpleEvent::Removed;
                            self.resolve_same_recursively(&child, before_child, removed);
                            true
                        }
                    };
                    changed |= child_changed;
                }
                for (arg, after_child) in after_children {
                    if !before_children.contains_key(arg) {
                        let child = self.child(state, arg);
                        self.resolve_same_recursively(&child, after_child, SimpleEvent::Created);
                        changed = true;
                    }
                }

                if changed {
                    let mut event = DataChangeEvent::builder(DataChangeScope::Base);
                    event.add_updated(state.path.clone(), Arc::clone(before), Arc::clone(after));
                    self.add_event(state, &event.build());
                }
                self.collect_events(state, Some(before), Some(after));
                changed
            }
            _ => {
                if before == after {
                    trace!(
                        target: "treestore::listener",
                        path = %state.path,
                        "Skipping equal leaf"
                    );
                    return false;
                }
                let mut event = DataChangeEvent::builder(DataChangeScope::Base);
                event.add_updated(state.path.clone(), Arc::clone(before), Arc::clone(after));
                self.add_event(state, &event.build());
                self.collect_events(state, Some(before), Some(after));
                true
            }
        }
    }

    fn resolve_same_recursively(
        &mut self,
        state: &ResolveState<'_>,
        node: &Arc<DataNode>,
        kind: SimpleEvent,
    ) {
        if !state.needs_processing() {
            return;
        }

        if let Some(children) = node.children() {
            for (arg, child) in children {
                let child_state = self.child(state, arg);
                self.resolve_same_recursively(&child_state, child, kind);
            }
        }

        let mut builder = DataChangeEvent::builder(DataChangeScope::Base);
        match kind {
            SimpleEvent::Created => builder
                .set_after(Some(Arc::clone(node)))
                .add_created(state.path.clone(), Arc::clone(node)),
            SimpleEvent::Removed => builder
                .set_before(Some(Arc::clone(node)))
                .add_removed(state.path.clone(), Arc::clone(node)),
        };
        let event = builder.build();
        self.add_event(state, &event);
        self.collect_events(state, event.original_subtree(), event.updated_subtree());
    }

    fn resolve_subtree(&mut self, state: &ResolveState<'_>, node: &CandidateNode) -> bool {
        let (before, after) = match (node.before(), node.after()) {
            (Some(before), Some(after)) => (before, after),
            _ => return false,
        };

        // a direct change (ONE) takes precedence over a deeper one (SUBTREE)
        let mut scope = None;
        for child in node.children() {
            let Some(arg) = child.identifier() else {
                continue;
            };
            let child_state = self.child(state, arg);
            match child.kind() {
                ModificationType::Write | ModificationType::Merge | ModificationType::Delete => {
                    if self.resolve_any(&child_state, child) {
                        scope = Some(DataChangeScope::One);
                    }
                }
                ModificationType::SubtreeModified => {
                    if self.resolve_subtree(&child_state, child) && scope.is_none() {
                        scope = Some(DataChangeScope::Subtree);
                    }
                }
                ModificationType::Unmodified => {}
            }
        }

        if let Some(scope) = scope {
            let mut event = DataChangeEvent::builder(scope);
            event.add_updated(state.path.clone(), Arc::clone(before), Arc::clone(after));
            self.add_event(state, &event.build());
        }
        self.collect_events(state, Some(before), Some(after));
        scope.is_some()
    }

    /// One task per registration, merging when a registration collected
    /// several partial events
    fn finish(self) -> Vec<NotificationTask> {
        self.collected
            .into_values()
            .map(|(registration, mut events)| {
                let event = if events.len() == 1 {
                    events.remove(0)
                } else {
                    let mut merged = DataChangeEvent::builder(DataChangeScope::Base);
                    for event in &events {
                        merged.merge(event);
                    }
                    merged.build()
                };
                NotificationTask::new(registration, event)
            })
            .collect()
    }
}
