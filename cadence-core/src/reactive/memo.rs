//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On construction, the memo runs its computation once and caches the
//!    result (`Memo::lazy` defers this to the first read).
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a direct dependency changes, the memo is marked `Dirty` and its own
//!    subscribers `MaybeDirty`. Nothing is recomputed yet.
//!
//! 4. On next access, a `MaybeDirty` memo first brings its sources up to date;
//!    a `Dirty` memo recomputes.
//!
//! 5. Only a recomputed value that differs from the cached one (under the
//!    memo's equality predicate) marks the memo's subscribers `Dirty`. An
//!    equal result leaves them to settle back to `Clean` without running.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! It also makes diamonds glitch-free: an effect reading two memos of the
//! same signal pulls both up to date before it decides to run, so it never
//! observes one fresh and one stale.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::computation::Computation;
use super::context::ReactiveContext;
use super::effect::Effect;
use super::node::{DirtyState, NodeId, NodeKind};
use super::runtime::{untrack, Runtime};
use super::signal::EqualsFn;
use super::subscriber::{Reactive, Source, Subscribers};

struct MemoInner<T> {
    computation: Computation,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    equals: EqualsFn<T>,
    version: Cell<u64>,
    subscribers: Subscribers,
    this: Weak<MemoInner<T>>,
}

impl<T: 'static> MemoInner<T> {
    fn recompute(&self) {
        let me: Weak<dyn Reactive> = self.this.clone();
        let next = self.computation.run(me, || (self.compute)());

        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };

        if changed {
            let previous = self.value.replace(Some(next));
            self.version.set(self.version.get() + 1);
            tracing::trace!(memo = ?self.computation.id(), "memo recomputed with a new value");
            drop(previous);
        } else {
            tracing::trace!(memo = ?self.computation.id(), "memo recomputed, value unchanged");
        }
        self.computation.set_state(DirtyState::Clean);

        if changed {
            self.subscribers.mark_all(DirtyState::Dirty);
        }
    }
}

impl<T: 'static> Source for MemoInner<T> {
    fn node_id(&self) -> NodeId {
        self.computation.id()
    }

    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Reactive>) {
        self.subscribers.insert(id, subscriber);
    }

    fn remove_subscriber(&self, id: NodeId) {
        self.subscribers.remove(id);
    }

    fn refresh(&self) {
        let computation = &self.computation;
        if computation.is_disposed() {
            return;
        }
        assert!(
            !computation.is_running(),
            "memo {:?} was read while computing its own value",
            computation.id()
        );

        if computation.state() == DirtyState::MaybeDirty {
            computation.refresh_sources();
        }

        if computation.state() == DirtyState::Dirty {
            self.recompute();
        } else {
            computation.set_state(DirtyState::Clean);
        }
    }

    fn reopen(&self) {
        self.computation.reopen();
    }
}

impl<T: 'static> Reactive for MemoInner<T> {
    fn node_id(&self) -> NodeId {
        self.computation.id()
    }

    fn kind(&self) -> NodeKind {
        self.computation.kind()
    }

    fn mark(&self, state: DirtyState) {
        let failed = self.computation.take_failed();
        let previous = self.computation.raise(state);
        if failed || previous == Some(DirtyState::Clean) {
            self.subscribers.mark_all(DirtyState::MaybeDirty);
        }
    }

    fn schedule(&self) {
        Source::refresh(self);
    }

    fn dispose(&self) {
        if self.computation.dispose() {
            tracing::debug!(memo = ?self.computation.id(), "memo disposed");
        }
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        self.computation.dispose();
    }
}

/// A cached value derived from other reactive values.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be `Clone` so reads can hand
///   out owned copies; equality comes from `PartialEq` or a custom predicate.
///
/// # Example
///
/// ```rust
/// use cadence_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Memo::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

impl<T: Clone + 'static> Memo<T> {
    /// Create a memo and compute its initial value immediately.
    pub fn new<F>(compute: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        Self::with_equals(compute, |a: &T, b: &T| a == b)
    }

    /// Create a memo with a custom equality predicate and compute its
    /// initial value immediately.
    pub fn with_equals<F, E>(compute: F, equals: E) -> Self
    where
        F: Fn() -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let memo = Self::build(Box::new(compute), Rc::new(equals));
        Source::refresh(&*memo.inner);
        memo
    }

    /// Create a memo that does not compute until it is first read.
    pub fn lazy<F>(compute: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(compute), Rc::new(|a: &T, b: &T| a == b))
    }

    fn build(compute: Box<dyn Fn() -> T>, equals: EqualsFn<T>) -> Self {
        let inner = Rc::new_cyclic(|this| MemoInner {
            computation: Computation::new(NodeKind::Derived),
            compute,
            value: RefCell::new(None),
            equals,
            version: Cell::new(0),
            subscribers: Subscribers::default(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Get the memo's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.computation.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value. Inside a
    /// reactive context the read is tracked.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        untrack(|| self.get())
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if ReactiveContext::is_active() {
            let source: Rc<dyn Source> = self.inner.clone();
            ReactiveContext::track(&source);
        }

        Source::refresh(&*self.inner);

        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => f(value),
            None => {
                // Disposed before it ever computed: evaluate on the spot.
                drop(value);
                let value = untrack(|| (self.inner.compute)());
                f(&value)
            }
        }
    }

    /// Call `on_change` every time this memo's value changes.
    pub fn subscribe<F>(&self, on_change: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        let memo = self.clone();
        Effect::watch(move || memo.with(|_| ()), on_change)
    }

    /// Mark the memo as definitely needing recomputation.
    ///
    /// Effects downstream re-validate right away; the memo itself still
    /// recomputes only when pulled.
    pub fn mark_dirty(&self) {
        self.inner.mark(DirtyState::Dirty);
        Runtime::flush_effects();
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner.computation.state()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Get the number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.computation.dependency_count()
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.computation.run_count()
    }

    /// Number of times the cached value was replaced by an unequal one.
    ///
    /// Recomputations absorbed by the equality predicate leave it unchanged.
    /// Does not bring the memo up to date.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Detach the memo from its sources.
    ///
    /// A disposed memo keeps returning its last cached value.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the memo has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.computation.is_disposed()
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
