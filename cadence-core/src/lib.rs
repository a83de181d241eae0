//! Cadence Core
//!
//! This crate provides the core runtime for Cadence, a fine-grained reactive
//! engine with frame-synchronized output. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Automatic dependency tracking with pruning
//! - Glitch-free push-pull propagation
//! - A frame scheduler that applies changes at most once per display frame
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `frame`: Holes, rendering targets, frame clocks and the flush scheduler
//! - `config`: Scheduler configuration
//! - `error`: Error types for the frame layer
//!
//! Everything is single-threaded. Reactive state lives in thread-locals and
//! `Rc` handles, so nothing here is `Send`.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use cadence_core::reactive::{Effect, Memo, Signal};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Memo::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = Effect::new({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move || log.borrow_mut().push((count.get(), doubled.get()))
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically ran again
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod config;
pub mod error;
pub mod frame;
pub mod reactive;

pub use config::SchedulerConfig;
pub use error::{ConfigError, FlushError, FrameError, TargetError};
pub use frame::{Connection, FrameClock, FrameScheduler, Hole, ManualClock};
pub use reactive::{batch, untrack, Effect, Memo, Signal};
