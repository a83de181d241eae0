//! Graph Nodes
//!
//! Identity and state shared by every node of the reactive graph.
//!
//! There is no central graph structure: edges live on the nodes themselves.
//! A source (signal or memo) owns the set of computations subscribed to it,
//! and a computation (memo or effect) owns the list of sources it read during
//! its last run. The types here are the vocabulary both sides agree on.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a node in the reactive graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of computation node in the reactive graph.
///
/// Signals are pure sources and carry no kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A derived node (memo). Reads sources and is itself a source.
    Derived,

    /// An effect node. Reads sources, produces side effects, has no subscribers.
    Effect,

    /// An observer. Subscribed to sources but never re-reads them.
    Observer,
}

/// Dirty state of a computation.
///
/// The ordering matters: a state only ever moves upwards while a change is
/// being propagated, and drops back to `Clean` once the node has been
/// brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    /// The node is up to date.
    Clean,

    /// Something upstream changed, but a memo in between may still absorb
    /// the change. The node must validate its sources before deciding.
    MaybeDirty,

    /// A direct source changed. The node must re-run.
    Dirty,
}
