//! Tagged reactive values.
//!
//! A [`Value`] is either a plain value, a signal, a memo, or a fragment made
//! of further values. Consumers such as the frame scheduler dispatch on the
//! variant instead of probing what a value can do.

use std::fmt::{Display, Write as _};

use super::effect::Effect;
use super::memo::Memo;
use super::observer::Observer;
use super::runtime::untrack;
use super::signal::{ReadSignal, Signal};

/// Coarse classification of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A constant; never changes.
    Plain,
    /// A signal or memo accessor.
    Signal,
    /// A sequence of values rendered back to back.
    Fragment,
}

/// A value that may or may not be reactive.
pub enum Value<T: 'static> {
    Static(T),
    Signal(ReadSignal<T>),
    Memo(Memo<T>),
    Fragment(Vec<Value<T>>),
}

impl<T: Clone + 'static> Value<T> {
    pub fn constant(value: T) -> Self {
        Value::Static(value)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Static(_) => ValueKind::Plain,
            Value::Signal(_) | Value::Memo(_) => ValueKind::Signal,
            Value::Fragment(_) => ValueKind::Fragment,
        }
    }

    /// Whether any part of the value can change.
    pub fn is_reactive(&self) -> bool {
        match self {
            Value::Static(_) => false,
            Value::Signal(_) | Value::Memo(_) => true,
            Value::Fragment(parts) => parts.iter().any(Value::is_reactive),
        }
    }

    /// Read every reactive part, registering the reads with the current
    /// computation.
    pub fn track(&self) {
        match self {
            Value::Static(_) => {}
            Value::Signal(signal) => signal.with(|_| ()),
            Value::Memo(memo) => memo.with(|_| ()),
            Value::Fragment(parts) => parts.iter().for_each(Value::track),
        }
    }

    /// Visit the current value of every leaf, in order, without tracking.
    pub fn for_each_leaf(&self, f: &mut dyn FnMut(&T)) {
        untrack(|| self.visit(f));
    }

    fn visit(&self, f: &mut dyn FnMut(&T)) {
        match self {
            Value::Static(value) => f(value),
            Value::Signal(signal) => signal.with(|value| f(value)),
            Value::Memo(memo) => memo.with(|value| f(value)),
            Value::Fragment(parts) => {
                for part in parts {
                    part.visit(f);
                }
            }
        }
    }

    /// The current string form; fragments concatenate their parts.
    pub fn render(&self) -> String
    where
        T: Display,
    {
        let mut out = String::new();
        self.for_each_leaf(&mut |value: &T| {
            let _ = write!(out, "{value}");
        });
        out
    }

    /// Call `on_change` whenever a reactive part changes.
    ///
    /// Returns `None` for values with nothing to observe.
    pub fn subscribe<F>(&self, on_change: F) -> Option<Effect>
    where
        F: FnMut() + 'static,
    {
        if !self.is_reactive() {
            return None;
        }
        let value = self.clone();
        Some(Effect::watch(move || value.track(), on_change))
    }

    /// Call `notify` whenever a reactive part may have changed, without
    /// reading anything at notification time.
    ///
    /// Returns `None` for values with nothing to observe.
    pub fn observe<F>(&self, notify: F) -> Option<Observer>
    where
        F: FnMut() + 'static,
    {
        if !self.is_reactive() {
            return None;
        }
        Some(Observer::new(|| self.track(), notify))
    }

    /// A counter that moves whenever a leaf commits a different value.
    ///
    /// Reads cached state only: a stale memo counts with its last value.
    pub fn revision(&self) -> u64 {
        match self {
            Value::Static(_) => 0,
            Value::Signal(signal) => signal.version(),
            Value::Memo(memo) => memo.version(),
            Value::Fragment(parts) => parts
                .iter()
                .fold(0, |sum, part| sum.wrapping_add(part.revision())),
        }
    }
}

impl<T: Clone + 'static> Clone for Value<T> {
    fn clone(&self) -> Self {
        match self {
            Value::Static(value) => Value::Static(value.clone()),
            Value::Signal(signal) => Value::Signal(signal.clone()),
            Value::Memo(memo) => Value::Memo(memo.clone()),
            Value::Fragment(parts) => Value::Fragment(parts.clone()),
        }
    }
}

impl<T: Clone + std::fmt::Debug + 'static> std::fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Value::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            Value::Memo(memo) => f.debug_tuple("Memo").field(memo).finish(),
            Value::Fragment(parts) => f.debug_tuple("Fragment").field(parts).finish(),
        }
    }
}

impl<T: Clone + 'static> From<Signal<T>> for Value<T> {
    fn from(signal: Signal<T>) -> Self {
        Value::Signal(signal.read_only())
    }
}

impl<T: Clone + 'static> From<ReadSignal<T>> for Value<T> {
    fn from(signal: ReadSignal<T>) -> Self {
        Value::Signal(signal)
    }
}

impl<T: Clone + 'static> From<Memo<T>> for Value<T> {
    fn from(memo: Memo<T>) -> Self {
        Value::Memo(memo)
    }
}

impl<T: Clone + 'static> From<Vec<Value<T>>> for Value<T> {
    fn from(parts: Vec<Value<T>>) -> Self {
        Value::Fragment(parts)
    }
}
