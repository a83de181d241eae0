//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued with the runtime and
//!    re-run once the write that changed it has finished notifying.
//!
//! 3. Each run re-tracks dependencies from scratch; sources the run no longer
//!    reads are unsubscribed.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (recompute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Re-entrancy
//!
//! While an effect's body runs, notifications addressed to that same effect
//! are ignored. An effect that writes a signal it also reads therefore does
//! not re-trigger itself; the write still reaches every other subscriber.
//!
//! # Cleanup
//!
//! Effects built with [`Effect::with_cleanup`] return a cleanup function from
//! each run. It is called before the effect re-runs and when the effect is
//! disposed. This is useful for cleaning up resources like event listeners
//! or timers.
//!
//! # Lifetime
//!
//! The runtime keeps every effect alive until [`Effect::dispose`] is called.
//! Dropping the handle does not stop it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::computation::Computation;
use super::node::{DirtyState, NodeId, NodeKind};
use super::runtime::{batch, untrack, Runtime};
use super::subscriber::Reactive;

/// A cleanup function returned by an effect run.
pub type Cleanup = Box<dyn FnOnce()>;

type EffectFn = Box<dyn FnMut() -> Option<Cleanup>>;

struct EffectInner {
    computation: Computation,
    run: RefCell<EffectFn>,
    cleanup: RefCell<Option<Cleanup>>,
    this: Weak<EffectInner>,
}

impl EffectInner {
    fn execute(&self) {
        if self.computation.is_disposed() || self.computation.is_running() {
            return;
        }

        self.run_cleanup();
        self.computation.set_state(DirtyState::Clean);

        let me: Weak<dyn Reactive> = self.this.clone();
        let cleanup = self.computation.run(me, || {
            let mut run = self.run.borrow_mut();
            (&mut **run)()
        });
        tracing::trace!(
            effect = ?self.computation.id(),
            runs = self.computation.run_count(),
            "effect ran"
        );

        if self.computation.is_disposed() {
            // Disposed from inside its own body.
            if let Some(cleanup) = cleanup {
                untrack(cleanup);
            }
        } else {
            *self.cleanup.borrow_mut() = cleanup;
        }
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            untrack(cleanup);
        }
    }
}

impl Reactive for EffectInner {
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
            if let Some(me) = self.this.upgrade() {
                Runtime::enqueue(me);
            }
        }
    }

    fn schedule(&self) {
        if self.computation.is_disposed() {
            return;
        }

        if self.computation.state() == DirtyState::MaybeDirty {
            self.computation.refresh_sources();
        }

        if self.computation.state() == DirtyState::Dirty {
            self.execute();
        } else {
            self.computation.set_state(DirtyState::Clean);
        }
    }

    fn dispose(&self) {
        if !self.computation.dispose() {
            return;
        }
        self.run_cleanup();
        Runtime::unregister(self.computation.id());
        tracing::debug!(effect = ?self.computation.id(), "effect disposed");
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Cloning an effect produces another handle to the same computation.
///
/// # Example
///
/// ```rust
/// use cadence_core::reactive::{Effect, Signal};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let effect = Effect::new({
///     let count = count.clone();
///     let seen = seen.clone();
///     move || seen.borrow_mut().push(count.get())
/// });
///
/// count.set(5);
/// assert_eq!(*seen.borrow(), vec![0, 5]);
///
/// effect.dispose();
/// count.set(6);
/// assert_eq!(*seen.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    /// Writes it performs during that first run are batched.
    pub fn new<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::spawn(Box::new(move || {
            run();
            None
        }))
    }

    /// Create an effect whose runs return a cleanup function.
    ///
    /// The cleanup from one run is called right before the next run and when
    /// the effect is disposed.
    pub fn with_cleanup<F, C>(mut run: F) -> Self
    where
        F: FnMut() -> C + 'static,
        C: FnOnce() + 'static,
    {
        Self::spawn(Box::new(move || Some(Box::new(run()) as Cleanup)))
    }

    /// Create a new effect without running it immediately.
    ///
    /// Useful for cases where you want to control when the effect first runs.
    /// It has no dependencies until [`execute`](Self::execute) is called.
    pub fn new_lazy<F>(mut run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        let effect = Self::build(Box::new(move || {
            run();
            None
        }));
        Runtime::register(effect.inner.clone());
        effect
    }

    /// Subscribe to whatever `track` reads and call `on_change` after each
    /// confirmed change.
    ///
    /// `track` runs tracked, first at construction and again on every change;
    /// `on_change` runs untracked and is skipped for the initial run. Changes
    /// absorbed by an equal memo result never reach `on_change`.
    pub fn watch<T, F>(track: T, mut on_change: F) -> Self
    where
        T: Fn() + 'static,
        F: FnMut() + 'static,
    {
        let mut primed = false;
        Self::new(move || {
            track();
            if primed {
                untrack(&mut on_change);
            } else {
                primed = true;
            }
        })
    }

    fn build(run: EffectFn) -> Self {
        let inner = Rc::new_cyclic(|this| EffectInner {
            computation: Computation::new(NodeKind::Effect),
            run: RefCell::new(run),
            cleanup: RefCell::new(None),
            this: this.clone(),
        });
        Self { inner }
    }

    fn spawn(run: EffectFn) -> Self {
        let effect = Self::build(run);
        // Registered only once the first run succeeded; a panicking first
        // run leaves nothing behind.
        batch(|| effect.inner.execute());
        Runtime::register(effect.inner.clone());
        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.computation.id()
    }

    /// Run the effect function now, regardless of its dirty state.
    ///
    /// This runs the function within a reactive context to track dependencies.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Re-run the effect if one of its dependencies actually changed.
    pub fn schedule(&self) {
        self.inner.schedule();
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again. Disposing twice is a
    /// no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.computation.is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.computation.run_count()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.computation.dependency_count()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
