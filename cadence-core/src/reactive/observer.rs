//! Observer Implementation
//!
//! An Observer is the thinnest possible subscriber: it is told that
//! something it watches may have changed, and it never reads anything in
//! response. Unlike an effect it does not validate memos at write time, so a
//! failing memo body surfaces wherever the value is eventually read instead
//! of inside the write that invalidated it.
//!
//! The frame scheduler uses one observer per hole as its dirty marker.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::computation::Computation;
use super::node::{DirtyState, NodeId, NodeKind};
use super::subscriber::Reactive;

type NotifyFn = Box<dyn FnMut()>;

struct ObserverInner {
    computation: Computation,
    notify: RefCell<NotifyFn>,
    this: Weak<ObserverInner>,
}

impl Reactive for ObserverInner {
    fn node_id(&self) -> NodeId {
        self.computation.id()
    }

    fn kind(&self) -> NodeKind {
        self.computation.kind()
    }

    fn mark(&self, _state: DirtyState) {
        let computation = &self.computation;
        if computation.is_disposed() || computation.is_running() {
            return;
        }
        // Re-entrant marks while `notify` runs are dropped.
        if let Ok(mut notify) = self.notify.try_borrow_mut() {
            (&mut **notify)();
        }
    }

    fn schedule(&self) {}

    fn dispose(&self) {
        if self.computation.dispose() {
            tracing::debug!(observer = ?self.computation.id(), "observer disposed");
        }
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        self.computation.dispose();
    }
}

/// A subscription that calls `notify` on every change notification.
///
/// Notifications are not confirmed: a memo that later recomputes to an equal
/// value still produces one. `notify` runs synchronously inside the write
/// and must not read reactive values.
///
/// Unlike an effect, an observer is owned by its handle. Dropping the last
/// handle unsubscribes it.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use cadence_core::reactive::{Memo, Observer, Signal};
///
/// let count = Signal::new(1);
/// let doubled = Memo::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// let hits = Rc::new(Cell::new(0));
/// let _observer = Observer::new(
///     {
///         let doubled = doubled.clone();
///         move || {
///             doubled.with(|_| ());
///         }
///     },
///     {
///         let hits = hits.clone();
///         move || hits.set(hits.get() + 1)
///     },
/// );
///
/// count.set(2);
/// assert_eq!(hits.get(), 1);
/// // Nothing was recomputed yet.
/// assert_eq!(doubled.run_count(), 1);
/// ```
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    /// Subscribe to whatever `track` reads.
    ///
    /// `track` runs once, tracked, right away; its reads bring memos up to
    /// date. It never runs again.
    pub fn new<T, F>(track: T, notify: F) -> Self
    where
        T: FnOnce(),
        F: FnMut() + 'static,
    {
        let inner = Rc::new_cyclic(|this| ObserverInner {
            computation: Computation::new(NodeKind::Observer),
            notify: RefCell::new(Box::new(notify)),
            this: this.clone(),
        });
        let me: Weak<dyn Reactive> = inner.this.clone();
        inner.computation.run(me, track);
        inner.computation.set_state(DirtyState::Clean);
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.computation.id()
    }

    /// Number of sources being watched.
    pub fn dependency_count(&self) -> usize {
        self.inner.computation.dependency_count()
    }

    /// Unsubscribe from everything. Disposing twice is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.computation.is_disposed()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Memo, Signal};
    use std::cell::Cell;

    fn counting(signal: &Signal<i32>) -> (Observer, Rc<Cell<usize>>) {
        let hits = Rc::new(Cell::new(0));
        let observer = Observer::new(
            {
                let signal = signal.clone();
                move || {
                    signal.get();
                }
            },
            {
                let hits = hits.clone();
                move || hits.set(hits.get() + 1)
            },
        );
        (observer, hits)
    }

    #[test]
    fn notified_once_per_write() {
        let signal = Signal::new(0);
        let (observer, hits) = counting(&signal);

        assert_eq!(observer.dependency_count(), 1);
        assert_eq!(hits.get(), 0);

        signal.set(1);
        signal.set(2);
        assert_eq!(hits.get(), 2);

        batch(|| {
            signal.set(3);
            signal.set(4);
        });
        // Notifications are synchronous, batching only defers effects.
        assert_eq!(hits.get(), 4);
    }

    #[test]
    fn does_not_pull_memos() {
        let signal = Signal::new(1);
        let runs = Rc::new(Cell::new(0));
        let memo = Memo::new({
            let (signal, runs) = (signal.clone(), runs.clone());
            move || {
                runs.set(runs.get() + 1);
                signal.get() * 2
            }
        });
        let hits = Rc::new(Cell::new(0));
        let _observer = Observer::new(
            {
                let memo = memo.clone();
                move || {
                    memo.get();
                }
            },
            {
                let hits = hits.clone();
                move || hits.set(hits.get() + 1)
            },
        );

        signal.set(2);
        signal.set(3);

        // The memo stays dirty after the first write and passes on nothing
        // more until it is read again.
        assert_eq!(runs.get(), 1);
        assert_eq!(hits.get(), 1);

        // Reading it confirms the change, which is one more notification.
        assert_eq!(memo.get(), 6);
        assert_eq!(runs.get(), 2);
        assert_eq!(hits.get(), 2);

        signal.set(4);
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn disposed_and_dropped_observers_unsubscribe() {
        let signal = Signal::new(0);
        let (observer, hits) = counting(&signal);
        observer.dispose();
        observer.dispose();
        signal.set(1);
        assert!(observer.is_disposed());
        assert_eq!(hits.get(), 0);
        assert_eq!(signal.subscriber_count(), 0);

        let (observer, _) = counting(&signal);
        assert_eq!(signal.subscriber_count(), 1);
        drop(observer);
        assert_eq!(signal.subscriber_count(), 0);
    }
}
