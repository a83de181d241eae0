//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal is written, the new value is compared with the current
//!    one using the signal's equality predicate. Equal writes are dropped
//!    without notifying anyone.
//!
//! 3. Otherwise the value is committed and every subscriber is marked, then
//!    the runtime runs whatever effects that queued.
//!
//! # Threading
//!
//! Signals are single-threaded (`!Send`). Values from other threads reach a
//! signal through whatever channel the host uses; the write itself always
//! happens on the reactive thread.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use super::context::ReactiveContext;
use super::effect::Effect;
use super::node::{DirtyState, NodeId};
use super::runtime::Runtime;
use super::subscriber::{Reactive, Source, Subscribers};

/// Equality predicate deciding whether a write is a change.
pub type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

pub(crate) struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equals: EqualsFn<T>,
    subscribers: Subscribers,
    version: Cell<u64>,
}

impl<T> Source for SignalInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn add_subscriber(&self, id: NodeId, subscriber: Weak<dyn Reactive>) {
        self.subscribers.insert(id, subscriber);
    }

    fn remove_subscriber(&self, id: NodeId) {
        self.subscribers.remove(id);
    }

    fn refresh(&self) {}
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal produces another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use cadence_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a new signal that treats `PartialEq`-equal writes as no-ops.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(value, |a: &T, b: &T| a == b)
    }

    /// Create a new signal with a custom equality predicate.
    ///
    /// Pass `|_, _| false` to notify on every write.
    pub fn with_equals<E>(value: T, equals: E) -> Self
    where
        E: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(SignalInner {
                id: NodeId::new(),
                value: RefCell::new(value),
                equals: Rc::new(equals),
                subscribers: Subscribers::default(),
                version: Cell::new(0),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Writing to this same signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// A value equal to the current one (under the signal's predicate) is
    /// dropped: nothing is committed and nobody is notified.
    pub fn set(&self, value: T) {
        let unchanged = {
            let current = self.inner.value.borrow();
            (self.inner.equals)(&current, &value)
        };
        if unchanged {
            tracing::trace!(signal = ?self.inner.id, "write suppressed by equality");
            return;
        }

        let previous = self.inner.value.replace(value);
        self.inner.version.set(self.inner.version.get() + 1);
        tracing::trace!(signal = ?self.inner.id, version = self.inner.version.get(), "signal committed");

        // The old value may own reactive handles; drop it before notifying.
        drop(previous);

        self.inner.subscribers.mark_all(DirtyState::Dirty);
        Runtime::flush_effects();
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.borrow();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Call `on_change` every time this signal commits a new value.
    ///
    /// The subscription lives until the returned effect is disposed.
    pub fn subscribe<F>(&self, on_change: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        let signal = self.clone();
        Effect::watch(move || signal.with(|_| ()), on_change)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Number of committed writes since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// A read-only handle to the same cell.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            signal: self.clone(),
        }
    }

    /// A write-only handle to the same cell.
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal {
            signal: self.clone(),
        }
    }

    /// Split into a read accessor and a write setter.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (self.read_only(), WriteSignal { signal: self })
    }

    pub(crate) fn as_source(&self) -> Rc<dyn Source> {
        self.inner.clone()
    }

    fn track(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track(&self.as_source());
        }
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// The read half of a signal.
pub struct ReadSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: Clone + 'static> ReadSignal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// Call `on_change` every time the signal commits a new value.
    pub fn subscribe<F>(&self, on_change: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        self.signal.subscribe(on_change)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.signal.subscriber_count()
    }

    /// Number of committed writes.
    pub fn version(&self) -> u64 {
        self.signal.version()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.signal, f)
    }
}

impl<T: Clone + 'static> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self { signal }
    }
}

/// The write half of a signal.
pub struct WriteSignal<T: 'static> {
    signal: Signal<T>,
}

impl<T: Clone + 'static> WriteSignal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.signal.id()
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        self.signal.set(value);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.signal.update(f);
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.signal, f)
    }
}

/// Create a signal and return its read accessor and write setter.
///
/// ```rust
/// use cadence_core::reactive::create_signal;
///
/// let (count, set_count) = create_signal(1);
/// set_count.update(|n| n + 1);
/// assert_eq!(count.get(), 2);
/// ```
pub fn create_signal<T>(value: T) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + PartialEq + 'static,
{
    Signal::new(value).split()
}

/// Create a signal with a custom equality predicate.
pub fn create_signal_with_equals<T, E>(value: T, equals: E) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + 'static,
    E: Fn(&T, &T) -> bool + 'static,
{
    Signal::with_equals(value, equals).split()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let _subscription = signal.subscribe(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        assert_eq!(call_count.get(), 0);

        signal.set(1);
        assert_eq!(call_count.get(), 1);

        signal.set(2);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        signal.set(1);
        assert_eq!(call_count.get(), 1);

        subscription.dispose();
        signal.set(2);
        // Should not have been called again
        assert_eq!(call_count.get(), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let signal = Signal::new(7);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let _subscription = signal.subscribe(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        signal.set(7);
        signal.update(|v| *v);

        assert_eq!(call_count.get(), 0);
        assert_eq!(signal.version(), 0);
    }

    #[test]
    fn split_signal_with_custom_equality() {
        // Equal when in the same bucket of ten.
        let (read, write) = create_signal_with_equals(10, |a: &i32, b: &i32| a / 10 == b / 10);
        let call_count = Rc::new(Cell::new(0));
        let _subscription = read.subscribe({
            let call_count = call_count.clone();
            move || call_count.set(call_count.get() + 1)
        });

        write.set(15);
        assert_eq!(read.get(), 10);
        assert_eq!(read.version(), 0);
        assert_eq!(call_count.get(), 0);

        write.update(|v| v + 10);
        assert_eq!(read.get(), 20);
        assert_eq!(read.version(), 1);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn custom_equality_controls_notification() {
        // Compare case-insensitively.
        let signal = Signal::with_equals("hello".to_string(), |a: &String, b: &String| {
            a.eq_ignore_ascii_case(b)
        });

        signal.set("HELLO".to_string());
        assert_eq!(signal.get(), "hello");

        signal.set("world".to_string());
        assert_eq!(signal.get(), "world");
    }

    #[test]
    fn never_equal_notifies_every_write() {
        let signal = Signal::with_equals(1, |_: &i32, _: &i32| false);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let _subscription = signal.subscribe(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        signal.set(1);
        signal.set(1);

        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn split_halves_share_the_cell() {
        let (read, write) = create_signal(String::from("a"));
        write.set(String::from("b"));
        assert_eq!(read.get(), "b");
        assert_eq!(read.id(), write.id());
    }

    #[test]
    fn untracked_read_does_not_subscribe() {
        let signal = Signal::new(1);
        let _effect = Effect::new({
            let signal = signal.clone();
            move || {
                signal.get_untracked();
            }
        });

        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn panicking_equality_aborts_the_write() {
        let signal = Signal::with_equals(1, |_: &i32, _: &i32| panic!("bad predicate"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| signal.set(2)));

        assert!(result.is_err());
        assert_eq!(signal.get_untracked(), 1);
    }
}
