//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Cadence's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes and something reads it. Memos are useful for
//! expensive computations that should not be repeated unnecessarily.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as a log or a network socket.
//!
//! ## Observers
//!
//! An Observer is only told that something may have changed and never reads
//! anything back. The frame scheduler marks holes dirty with observers so
//! that nothing is computed while a write is in progress.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! Propagation is push-pull. A write pushes dirty marks through the graph
//! without computing anything; queued effects then pull their inputs up to
//! date and run only if something they read really changed. That is what keeps
//! diamond-shaped graphs glitch-free.
//!
//! Everything here is single-threaded. Handles are `!Send`.

mod computation;
mod context;
mod effect;
mod memo;
mod node;
mod observer;
mod runtime;
mod signal;
mod subscriber;
mod value;

pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect};
pub use memo::Memo;
pub use node::{DirtyState, NodeId, NodeKind};
pub use observer::Observer;
pub use runtime::{batch, untrack, Runtime, MAX_EFFECT_RUNS_PER_FLUSH};
pub use signal::{
    create_signal, create_signal_with_equals, EqualsFn, ReadSignal, Signal, WriteSignal,
};
pub use value::{Value, ValueKind};
