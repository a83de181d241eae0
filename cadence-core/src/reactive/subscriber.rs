//! Subscriber types for the reactive system.
//!
//! Two traits split the graph in half:
//!
//! - [`Source`] is anything a computation can read and depend on
//!   (signals and memos).
//! - [`Reactive`] is anything that can be notified when a source changes
//!   (memos, effects and observers).
//!
//! A memo implements both. Sources hold their subscribers weakly so that a
//! dropped memo does not stay alive just because it once read a signal;
//! computations hold their sources strongly so that whatever they read
//! outlives them.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::node::{DirtyState, NodeId, NodeKind};

/// A node that can be read from inside a tracked computation.
pub(crate) trait Source {
    /// The node's identity.
    fn node_id(&self) -> NodeId;

    /// Register a subscriber. Registering the same ID twice is a no-op.
    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Reactive>);

    /// Remove a subscriber. Unknown IDs are ignored.
    fn remove_subscriber(&self, id: NodeId);

    /// Bring the source's value up to date.
    ///
    /// Signals are always current. Memos recompute here if they are stale,
    /// and mark their own subscribers dirty if the value changed.
    fn refresh(&self);

    /// A subscriber missed a notification from this source while it was
    /// running. Stale memos pass the next one on even though they are
    /// already dirty. Signals keep no state and ignore this.
    fn reopen(&self) {}
}

/// A node that is notified when one of its sources changes.
pub(crate) trait Reactive {
    /// The node's identity.
    fn node_id(&self) -> NodeId;

    /// What kind of computation this is.
    fn kind(&self) -> NodeKind;

    /// Raise the node's dirty state and propagate downstream.
    fn mark(&self, state: DirtyState);

    /// Validate and, if needed, re-run the node. Called by the runtime for
    /// queued effects.
    fn schedule(&self);

    /// Detach the node from the graph permanently.
    fn dispose(&self);
}

/// The subscriber set of a source.
///
/// Insertion-ordered so notification order is deterministic, and always
/// walked through a snapshot so subscribers may subscribe, unsubscribe or
/// dispose themselves while being notified.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: RefCell<IndexMap<NodeId, Weak<dyn Reactive>>>,
}

impl Subscribers {
    pub(crate) fn insert(&self, id: NodeId, subscriber: Weak<dyn Reactive>) {
        self.entries.borrow_mut().entry(id).or_insert(subscriber);
    }

    pub(crate) fn remove(&self, id: NodeId) {
        self.entries.borrow_mut().shift_remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.entries.borrow().contains_key(&id)
    }

    /// Number of live subscribers.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|subscriber| subscriber.strong_count() > 0)
            .count()
    }

    /// Live subscribers at this instant. Dead entries are pruned on the way.
    pub(crate) fn snapshot(&self) -> SmallVec<[Rc<dyn Reactive>; 8]> {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, subscriber| subscriber.strong_count() > 0);
        entries.values().filter_map(Weak::upgrade).collect()
    }

    /// Mark every current subscriber with `state`.
    pub(crate) fn mark_all(&self, state: DirtyState) {
        for subscriber in self.snapshot() {
            subscriber.mark(state);
        }
    }
}
