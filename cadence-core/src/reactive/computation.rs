//! Computation
//!
//! The state shared by memos and effects: dirty state, re-entrancy flag,
//! disposal flag and the dependency list, plus the tracked-run routine that
//! keeps the dependency list exact.
//!
//! # Dependency pruning
//!
//! Reads subscribe the running computation immediately. When the run ends
//! the computation compares what it read this time against what it read last
//! time and unsubscribes from every source it no longer touched. The
//! comparison happens in a drop guard, so it also happens when the body
//! panics.

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use super::context::{Dependencies, ReactiveContext};
use super::node::{DirtyState, NodeId, NodeKind};
use super::subscriber::Reactive;

pub(crate) struct Computation {
    id: NodeId,
    kind: NodeKind,
    state: Cell<DirtyState>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    failed: Cell<bool>,
    missed: Cell<bool>,
    runs: Cell<usize>,
    sources: RefCell<Dependencies>,
}

impl Computation {
    /// A new computation starts dirty: it has never run.
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            state: Cell::new(DirtyState::Dirty),
            running: Cell::new(false),
            disposed: Cell::new(false),
            failed: Cell::new(false),
            missed: Cell::new(false),
            runs: Cell::new(0),
            sources: RefCell::new(Dependencies::new()),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn state(&self) -> DirtyState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: DirtyState) {
        self.state.set(state);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.get()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.get()
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.sources.borrow().len()
    }

    /// Whether the last run or validation unwound, and clear the flag.
    ///
    /// Downstream nodes were told about the change but never finished
    /// validating, so the next notification has to reach them again even
    /// though this node is already dirty.
    pub(crate) fn take_failed(&self) -> bool {
        self.failed.replace(false)
    }

    /// Raise the dirty state to `state`.
    ///
    /// Returns the previous state when the state actually went up. Disposed
    /// and currently running computations ignore the notification; a running
    /// one remembers that it did.
    pub(crate) fn raise(&self, state: DirtyState) -> Option<DirtyState> {
        if self.disposed.get() {
            return None;
        }
        if self.running.get() {
            self.missed.set(true);
            return None;
        }
        let previous = self.state.get();
        if state > previous {
            self.state.set(state);
            Some(previous)
        } else {
            None
        }
    }

    /// Run `body` with reads attributed to `subscriber`.
    ///
    /// The caller decides what the dirty state should be before and after;
    /// this only handles tracking, pruning and the running flag.
    pub(crate) fn run<R>(&self, subscriber: Weak<dyn Reactive>, body: impl FnOnce() -> R) -> R {
        let guard = RunGuard {
            computation: self,
            context: Some(ReactiveContext::enter(self.id, subscriber)),
            first_run: self.runs.get() == 0,
        };
        self.running.set(true);

        let value = body();

        drop(guard);
        self.runs.set(self.runs.get() + 1);
        value
    }

    /// Pull each source up to date, in read order, until one of them turns
    /// this computation `Dirty`.
    pub(crate) fn refresh_sources(&self) {
        let _unwind = FailOnUnwind(self);
        let sources = self.sources.borrow().clone();
        for source in sources {
            source.refresh();
            if self.state.get() == DirtyState::Dirty {
                break;
            }
        }
    }

    /// Make a stale computation pass its next notification on again.
    ///
    /// Called on the sources of a subscriber that ignored a notification
    /// while it was running. The subscriber ends its run `Clean` while these
    /// sources stay dirty, and a dirty node normally stays silent.
    pub(crate) fn reopen(&self) {
        if self.disposed.get() || self.running.get() || self.state.get() == DirtyState::Clean {
            return;
        }
        self.failed.set(true);
        let sources = self.sources.borrow().clone();
        for source in sources {
            source.reopen();
        }
    }

    /// Mark the computation disposed and drop every subscription.
    ///
    /// Returns `false` if it was already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.replace(true) {
            return false;
        }
        if !self.running.get() {
            self.unsubscribe_all();
        }
        true
    }

    fn unsubscribe_all(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for source in sources {
            source.remove_subscriber(self.id);
        }
    }
}

/// Closes one run of a computation.
struct RunGuard<'a> {
    computation: &'a Computation,
    context: Option<ReactiveContext>,
    first_run: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let computation = self.computation;
        let fresh = self
            .context
            .take()
            .map(ReactiveContext::exit)
            .unwrap_or_default();

        let stale = std::mem::replace(&mut *computation.sources.borrow_mut(), fresh);
        let dropped: Vec<_> = {
            let current = computation.sources.borrow();
            stale
                .into_iter()
                .filter(|old| !current.iter().any(|new| new.node_id() == old.node_id()))
                .collect()
        };
        for source in dropped {
            source.remove_subscriber(computation.id);
        }

        // A computation that never completed a run is never left half
        // subscribed, and one disposed mid-run drops what it just read.
        let panicking = std::thread::panicking();
        if self.first_run && panicking {
            computation.disposed.set(true);
        } else {
            computation.failed.set(panicking);
        }
        computation.running.set(false);
        if computation.disposed.get() {
            computation.unsubscribe_all();
        } else if computation.missed.replace(false) {
            let sources = computation.sources.borrow().clone();
            for source in sources {
                source.reopen();
            }
        }
    }
}

/// Flags the computation as failed if a source refresh unwinds.
struct FailOnUnwind<'a>(&'a Computation);

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.failed.set(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal::Signal;
    use std::rc::Rc;

    struct Inert {
        computation: Computation,
    }

    impl Reactive for Inert {
        fn node_id(&self) -> NodeId {
            self.computation.id()
        }
        fn kind(&self) -> NodeKind {
            self.computation.kind()
        }
        fn mark(&self, state: DirtyState) {
            self.computation.raise(state);
        }
        fn schedule(&self) {}
        fn dispose(&self) {
            self.computation.dispose();
        }
    }

    fn inert() -> Rc<Inert> {
        Rc::new(Inert {
            computation: Computation::new(NodeKind::Effect),
        })
    }

    fn weak(node: &Rc<Inert>) -> Weak<dyn Reactive> {
        let weak: Weak<Inert> = Rc::downgrade(node);
        weak
    }

    #[test]
    fn run_records_dependencies() {
        let node = inert();
        let a = Signal::new(1);
        let b = Signal::new(2);

        let sum = node.computation.run(weak(&node), || a.get() + b.get());

        assert_eq!(sum, 3);
        assert_eq!(node.computation.dependency_count(), 2);
        assert_eq!(node.computation.run_count(), 1);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn run_prunes_sources_not_read_again() {
        let node = inert();
        let a = Signal::new(1);
        let b = Signal::new(2);

        node.computation.run(weak(&node), || a.get() + b.get());
        node.computation.run(weak(&node), || a.get());

        assert_eq!(node.computation.dependency_count(), 1);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);
    }

    #[test]
    fn raise_only_moves_up() {
        let computation = Computation::new(NodeKind::Derived);
        computation.set_state(DirtyState::Clean);

        assert_eq!(computation.raise(DirtyState::MaybeDirty), Some(DirtyState::Clean));
        assert_eq!(computation.raise(DirtyState::MaybeDirty), None);
        assert_eq!(computation.raise(DirtyState::Dirty), Some(DirtyState::MaybeDirty));
        assert_eq!(computation.state(), DirtyState::Dirty);
    }

    #[test]
    fn disposed_computation_ignores_marks() {
        let computation = Computation::new(NodeKind::Effect);
        computation.set_state(DirtyState::Clean);

        assert!(computation.dispose());
        assert!(!computation.dispose());
        assert_eq!(computation.raise(DirtyState::Dirty), None);
    }

    #[test]
    fn panicking_first_run_leaves_nothing_subscribed() {
        let node = inert();
        let a = Signal::new(1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            node.computation.run(weak(&node), || {
                a.get();
                panic!("first run failed");
            })
        }));

        assert!(result.is_err());
        assert!(node.computation.is_disposed());
        assert!(!node.computation.is_running());
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn panicking_later_run_keeps_what_it_read() {
        let node = inert();
        let a = Signal::new(1);
        let b = Signal::new(2);
        node.computation.run(weak(&node), || a.get() + b.get());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            node.computation.run(weak(&node), || {
                a.get();
                panic!("second run failed");
            })
        }));

        assert!(result.is_err());
        assert!(!node.computation.is_disposed());
        assert!(node.computation.take_failed());
        assert!(!node.computation.take_failed());
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);
    }
}
