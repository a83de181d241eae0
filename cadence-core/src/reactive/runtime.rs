//! Reactive Runtime
//!
//! The runtime is the per-thread coordinator behind signals, memos, and
//! effects. It owns three pieces of state:
//!
//! - the **effect registry**, which keeps every live effect alive until it
//!   is disposed, whether or not its handle is still around;
//! - the **pending queue** of effects notified by a write but not yet
//!   re-run;
//! - the **batch depth** and **flushing** flags that decide when the queue
//!   is drained.
//!
//! # How It Works
//!
//! 1. A signal write marks its subscribers. Memos turn `Dirty` and mark their
//!    own subscribers `MaybeDirty`; effects that were clean get queued.
//!
//! 2. When the write returns from marking, the runtime drains the queue
//!    unless a batch is open or a drain is already in progress further up the
//!    stack (a write from inside an effect body).
//!
//! 3. Each queued effect validates its sources before running, so an effect
//!    behind a memo that absorbed the change does not run at all.
//!
//! Writes are therefore synchronous per write: three writes in a row run a
//! dependent effect three times. Wrap them in [`batch`] to run it once.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::node::{NodeId, NodeKind};
use super::subscriber::Reactive;

/// Upper bound on effect runs in a single drain of the pending queue.
///
/// Effects that keep re-triggering each other would otherwise loop forever.
pub const MAX_EFFECT_RUNS_PER_FLUSH: usize = 100_000;

thread_local! {
    static EFFECTS: RefCell<IndexMap<NodeId, Rc<dyn Reactive>>> = RefCell::new(IndexMap::new());
    static PENDING: RefCell<VecDeque<Rc<dyn Reactive>>> = const { RefCell::new(VecDeque::new()) };
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Keep an effect alive until it is unregistered.
    pub(crate) fn register(effect: Rc<dyn Reactive>) {
        debug_assert_eq!(effect.kind(), NodeKind::Effect);
        let id = effect.node_id();
        EFFECTS.with(|effects| effects.borrow_mut().insert(id, effect));
    }

    /// Release an effect.
    pub(crate) fn unregister(id: NodeId) {
        // Dropped outside the borrow: the effect may be the last owner of
        // memos whose teardown touches the runtime again.
        let removed = EFFECTS.with(|effects| effects.borrow_mut().shift_remove(&id));
        drop(removed);
    }

    /// Number of live (registered, not disposed) effects on this thread.
    pub fn effect_count() -> usize {
        EFFECTS.with(|effects| effects.borrow().len())
    }

    /// Queue an effect for the next drain.
    pub(crate) fn enqueue(effect: Rc<dyn Reactive>) {
        PENDING.with(|pending| pending.borrow_mut().push_back(effect));
    }

    /// Number of effects waiting to run.
    pub fn pending_count() -> usize {
        PENDING.with(|pending| pending.borrow().len())
    }

    /// Check if a batch is open.
    pub fn is_batching() -> bool {
        BATCH_DEPTH.with(Cell::get) > 0
    }

    /// Check if we're inside a tracked computation.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        ReactiveContext::current_subscriber()
    }

    /// Run queued effects until the queue is empty.
    ///
    /// Does nothing inside a batch, or when called re-entrantly from an
    /// effect that is itself being run by a drain; the outer drain picks up
    /// whatever the inner write queued.
    ///
    /// # Panics
    ///
    /// Panics if one drain runs more than [`MAX_EFFECT_RUNS_PER_FLUSH`]
    /// effects, which only happens when effects re-trigger each other in a
    /// cycle. Panics raised by effect bodies propagate unchanged.
    pub fn flush_effects() {
        if Self::is_batching() || FLUSHING.with(Cell::get) {
            return;
        }

        let _flushing = FlushGuard::enter();
        let mut runs = 0usize;

        while let Some(effect) = PENDING.with(|pending| pending.borrow_mut().pop_front()) {
            runs += 1;
            if runs > MAX_EFFECT_RUNS_PER_FLUSH {
                PENDING.with(|pending| pending.borrow_mut().clear());
                panic!(
                    "effect flush exceeded {MAX_EFFECT_RUNS_PER_FLUSH} runs; \
                     effects are re-triggering each other in a cycle"
                );
            }
            effect.schedule();
        }
    }

    /// Dispose every live effect on this thread.
    pub fn dispose_all() {
        let effects: Vec<Rc<dyn Reactive>> =
            EFFECTS.with(|effects| effects.borrow().values().cloned().collect());
        for effect in effects {
            effect.dispose();
        }
        PENDING.with(|pending| pending.borrow_mut().clear());
        tracing::debug!("disposed all effects");
    }
}

/// Marks a drain in progress; cleared on every exit path.
struct FlushGuard;

impl FlushGuard {
    fn enter() -> Self {
        FLUSHING.with(|flushing| flushing.set(true));
        Self
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}

/// Closes a batch when dropped, even while unwinding.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        BATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` with effect execution deferred.
///
/// Writes inside the batch commit and notify immediately, and memos read
/// inside it are up to date, but effects only run once the outermost batch
/// closes, each at most once, against the final values.
///
/// # Example
///
/// ```rust
/// use cadence_core::reactive::{batch, Effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let runs = Rc::new(Cell::new(0));
///
/// let _effect = Effect::new({
///     let count = count.clone();
///     let runs = runs.clone();
///     move || {
///         count.get();
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// batch(|| {
///     count.set(1);
///     count.set(2);
///     count.set(3);
/// });
///
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = {
        let _batch = BatchGuard;
        f()
    };
    Runtime::flush_effects();
    result
}

/// Run `f` without tracking any of the reads it performs.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _untracked = ReactiveContext::untracked();
    f()
}
