//! Frame Scheduler
//!
//! The frame scheduler keeps a set of holes in sync with their targets while
//! touching each target at most once per frame.
//!
//! # How It Works
//!
//! 1. [`FrameScheduler::connect`] subscribes to every hole with an
//!    [`Observer`]. The subscription does one thing: put the hole's ID into
//!    the dirty set. It reads nothing, so a failing memo body never fails
//!    the write. A hole that is already dirty is not added again, so any
//!    number of changes between two frames collapse into one entry.
//!
//! 2. [`Connection::flush`] renders each dirty hole's *current* value,
//!    writes it to the target, and removes the hole from the dirty set. A
//!    hole whose memo recomputed to an equal value is cleared without a
//!    write. With nothing dirty it does nothing at all.
//!
//! 3. [`Connection::tick`] is one frame: a flush, then a request for the next
//!    frame from the [`FrameClock`]. Started with [`Connection::start`], the
//!    connection keeps ticking on every frame the clock delivers, one flush per
//!    frame.
//!
//! 4. [`Connection::disconnect`] drops every subscription, cancels the
//!    pending frame, and forgets the dirty set. It cannot be undone.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use cadence_core::frame::{FrameScheduler, Hole, ManualClock, RecordingTarget};
//! use cadence_core::reactive::Signal;
//!
//! let clock = Rc::new(ManualClock::new());
//! let target = RecordingTarget::new();
//! let count = Signal::new(0);
//!
//! let scheduler = FrameScheduler::new(clock.clone());
//! let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);
//! connection.start().unwrap();
//!
//! count.set(1);
//! count.set(2);
//! count.set(3);
//! clock.advance();
//!
//! assert_eq!(target.text(), "3");
//! assert_eq!(target.write_count(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use super::clock::{FrameClock, TickHandle};
use super::hole::{Hole, HoleId};
use crate::config::SchedulerConfig;
use crate::error::{FlushError, Result};
use crate::reactive::Observer;

type DirtySet = Rc<RefCell<IndexSet<HoleId>>>;

/// Counters describing what a connection has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushStats {
    /// Frames ticked.
    pub frames: u64,
    /// Flushes that found at least one dirty hole.
    pub flushes: u64,
    /// Target writes performed.
    pub writes: u64,
}

/// Creates connections that share a clock and configuration.
pub struct FrameScheduler {
    clock: Rc<dyn FrameClock>,
    config: SchedulerConfig,
}

impl FrameScheduler {
    pub fn new(clock: Rc<dyn FrameClock>) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    pub fn with_config(clock: Rc<dyn FrameClock>, config: SchedulerConfig) -> Self {
        Self { clock, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Subscribe to every hole and return the connection that flushes them.
    ///
    /// Nothing is written until the first flush, and only holes that changed
    /// after connecting are dirty. Call [`Connection::invalidate_all`] to
    /// paint everything on the first frame.
    pub fn connect(&self, holes: Vec<Hole>) -> Connection {
        let dirty: DirtySet = Rc::new(RefCell::new(IndexSet::new()));

        let mut subscriptions = Vec::new();
        let mut painted = IndexMap::new();
        for hole in &holes {
            let id = hole.id();
            let dirty = dirty.clone();
            if let Some(subscription) = hole.observe(move || {
                dirty.borrow_mut().insert(id);
            }) {
                subscriptions.push(subscription);
            }
            painted.insert(id, hole.revision());
        }

        let holes: IndexMap<HoleId, Hole> = holes.into_iter().map(|hole| (hole.id(), hole)).collect();
        tracing::debug!(
            holes = holes.len(),
            subscriptions = subscriptions.len(),
            "frame scheduler connected"
        );

        let inner = Rc::new_cyclic(|this| ConnectionInner {
            holes,
            dirty,
            painted: RefCell::new(painted),
            subscriptions: RefCell::new(subscriptions),
            clock: self.clock.clone(),
            budget: self.config.flush_budget(),
            pending: Cell::new(None),
            connected: Cell::new(true),
            stats: Cell::new(FlushStats::default()),
            last_error: RefCell::new(None),
            this: this.clone(),
        });
        Connection { inner }
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("config", &self.config)
            .finish()
    }
}

struct ConnectionInner {
    holes: IndexMap<HoleId, Hole>,
    dirty: DirtySet,
    /// Revision each hole had when it was last written, or at connect.
    /// Missing entries always write.
    painted: RefCell<IndexMap<HoleId, u64>>,
    subscriptions: RefCell<Vec<Observer>>,
    clock: Rc<dyn FrameClock>,
    budget: Duration,
    pending: Cell<Option<TickHandle>>,
    connected: Cell<bool>,
    stats: Cell<FlushStats>,
    last_error: RefCell<Option<FlushError>>,
    this: Weak<ConnectionInner>,
}

impl ConnectionInner {
    fn flush(&self) -> Result<usize> {
        if !self.connected.get() {
            return Ok(0);
        }

        let dirty: Vec<HoleId> = self.dirty.borrow().iter().copied().collect();
        if dirty.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        let mut applied = 0;
        let result = self.apply_all(&dirty, &mut applied);

        self.update_stats(|stats| {
            stats.flushes += 1;
            stats.writes += applied as u64;
        });

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            tracing::warn!(
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = self.budget.as_micros() as u64,
                holes = applied,
                "flush exceeded the frame budget"
            );
        }

        result.map(|()| applied)
    }

    fn apply_all(&self, dirty: &[HoleId], applied: &mut usize) -> Result<()> {
        for &id in dirty {
            let Some(hole) = self.holes.get(&id) else {
                self.dirty.borrow_mut().shift_remove(&id);
                continue;
            };

            // A panicking render leaves the hole dirty.
            let rendered = hole.render();
            let revision = hole.revision();

            // Cleared before the write so a change caused by the write
            // itself is kept for the next frame.
            self.dirty.borrow_mut().shift_remove(&id);
            if self.painted.borrow().get(&id) == Some(&revision) {
                continue;
            }
            if let Err(source) = hole.write(&rendered) {
                self.dirty.borrow_mut().insert(id);
                return Err(FlushError::Apply { hole: id, source });
            }
            self.painted.borrow_mut().insert(id, revision);
            *applied += 1;
        }
        Ok(())
    }

    fn tick(&self) -> Result<TickHandle> {
        if !self.connected.get() {
            return Err(FlushError::Disconnected);
        }
        self.update_stats(|stats| stats.frames += 1);

        let flushed = self.flush();
        let next = self.request_frame()?;
        flushed?;
        Ok(next)
    }

    fn request_frame(&self) -> Result<TickHandle> {
        if let Some(previous) = self.pending.take() {
            self.clock.cancel_tick(previous);
        }

        let this = self.this.clone();
        let handle = self.clock.request_tick(Box::new(move || {
            if let Some(inner) = this.upgrade() {
                inner.on_frame();
            }
        }))?;
        self.pending.set(Some(handle));
        Ok(handle)
    }

    fn on_frame(&self) {
        self.pending.set(None);
        if !self.connected.get() {
            return;
        }
        if let Err(error) = self.tick() {
            tracing::error!(%error, "frame tick failed");
            *self.last_error.borrow_mut() = Some(error);
        }
    }

    fn stop(&self) {
        if let Some(handle) = self.pending.take() {
            self.clock.cancel_tick(handle);
            tracing::debug!(tick = handle.raw(), "frame loop stopped");
        }
    }

    fn disconnect(&self) {
        if !self.connected.replace(false) {
            return;
        }
        self.stop();

        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        for subscription in &subscriptions {
            subscription.dispose();
        }
        drop(subscriptions);

        self.dirty.borrow_mut().clear();
        self.painted.borrow_mut().clear();
        tracing::debug!(holes = self.holes.len(), "frame scheduler disconnected");
    }

    fn update_stats(&self, f: impl FnOnce(&mut FlushStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// A live set of holes bound to a frame clock.
///
/// Cloning a connection produces another handle to the same binding. The
/// binding is disconnected when the last handle is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl Connection {
    /// Apply every dirty hole to its target and clear it.
    ///
    /// Returns the number of holes written. A target error stops the flush;
    /// the failing hole and every hole not yet reached stay dirty and are
    /// retried on the next flush. Panics from rendering a hole's value
    /// propagate unchanged and leave that hole dirty, so the next flush
    /// fails the same way. After [`disconnect`](Self::disconnect) this is a
    /// no-op.
    pub fn flush(&self) -> Result<usize> {
        self.inner.flush()
    }

    /// Run one frame: flush, then request the next frame from the clock.
    ///
    /// The next frame is requested even when the flush fails, so the loop
    /// survives errors. The flush error is returned once the request is
    /// made.
    pub fn tick(&self) -> Result<TickHandle> {
        self.inner.tick()
    }

    /// Begin ticking on the next frame.
    ///
    /// Does nothing if a frame is already pending; returns its handle.
    pub fn start(&self) -> Result<TickHandle> {
        if !self.inner.connected.get() {
            return Err(FlushError::Disconnected);
        }
        if let Some(handle) = self.inner.pending.get() {
            return Ok(handle);
        }
        let handle = self.inner.request_frame()?;
        tracing::debug!(tick = handle.raw(), "frame loop started");
        Ok(handle)
    }

    /// Cancel the pending frame. Subscriptions stay; dirty holes keep
    /// accumulating until the next flush.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Drop every subscription and cancel the pending frame.
    ///
    /// Idempotent. Later writes to bound values never reach a target.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Mark every hole dirty so the next flush repaints all of them.
    pub fn invalidate_all(&self) {
        if !self.inner.connected.get() {
            return;
        }
        self.inner.painted.borrow_mut().clear();
        self.inner
            .dirty
            .borrow_mut()
            .extend(self.inner.holes.keys().copied());
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Whether a frame is pending.
    pub fn is_running(&self) -> bool {
        self.inner.pending.get().is_some()
    }

    pub fn is_dirty(&self, hole: HoleId) -> bool {
        self.inner.dirty.borrow().contains(&hole)
    }

    pub fn dirty_count(&self) -> usize {
        self.inner.dirty.borrow().len()
    }

    pub fn hole_count(&self) -> usize {
        self.inner.holes.len()
    }

    /// IDs of the connected holes, in connection order.
    pub fn hole_ids(&self) -> Vec<HoleId> {
        self.inner.holes.keys().copied().collect()
    }

    pub fn stats(&self) -> FlushStats {
        self.inner.stats.get()
    }

    /// The most recent error from a clock-driven tick, if any.
    pub fn take_error(&self) -> Option<FlushError> {
        self.inner.last_error.borrow_mut().take()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("holes", &self.hole_count())
            .field("dirty", &self.dirty_count())
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FrameError, TargetError};
    use crate::frame::{ManualClock, RecordingTarget, TargetWrite};
    use crate::reactive::{batch, Memo, Runtime, Signal, Value};

    fn setup() -> (Rc<ManualClock>, FrameScheduler) {
        let clock = Rc::new(ManualClock::new());
        let scheduler = FrameScheduler::new(clock.clone());
        (clock, scheduler)
    }

    #[test]
    fn writes_between_frames_coalesce() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);

        for n in 1..=10 {
            count.set(n);
        }
        assert_eq!(connection.dirty_count(), 1);

        assert_eq!(connection.flush().unwrap(), 1);
        assert_eq!(target.writes(), vec![TargetWrite::Text("10".into())]);
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count)]);

        assert_eq!(connection.flush().unwrap(), 0);
        assert_eq!(connection.flush().unwrap(), 0);
        assert_eq!(target.write_count(), 0);
        assert_eq!(connection.stats().flushes, 0);
    }

    #[test]
    fn only_dirty_holes_are_applied() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let title = Signal::new("a".to_string());
        let width = Signal::new(10);
        let connection = scheduler.connect(vec![
            Hole::text(target.clone(), title.clone()),
            Hole::attribute(target.clone(), "width", width.clone()),
        ]);

        width.set(20);
        connection.flush().unwrap();

        assert_eq!(
            target.writes(),
            vec![TargetWrite::Attribute {
                name: "width".into(),
                value: "20".into()
            }]
        );
        assert_eq!(target.text(), "");
    }

    #[test]
    fn absorbed_memo_change_writes_nothing() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(1);
        let parity = Memo::new({
            let count = count.clone();
            move || if count.get() % 2 == 0 { "even" } else { "odd" }
        });
        let connection = scheduler.connect(vec![Hole::text(target.clone(), parity.clone())]);

        // Dirtied without recomputing anything.
        count.set(3);
        assert_eq!(connection.dirty_count(), 1);
        assert_eq!(parity.run_count(), 1);

        assert_eq!(connection.flush().unwrap(), 0);
        assert_eq!(connection.dirty_count(), 0);
        assert_eq!(target.write_count(), 0);

        count.set(4);
        assert_eq!(connection.flush().unwrap(), 1);
        assert_eq!(target.text(), "even");
    }

    #[test]
    fn tick_flushes_then_requests_the_next_frame() {
        let (clock, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);

        connection.start().unwrap();
        assert!(connection.is_running());
        assert_eq!(clock.pending_count(), 1);

        count.set(1);
        clock.advance();
        assert_eq!(target.text(), "1");
        assert_eq!(clock.pending_count(), 1);

        clock.advance_by(3);
        assert_eq!(target.write_count(), 1);
        assert_eq!(
            connection.stats(),
            FlushStats {
                frames: 4,
                flushes: 1,
                writes: 1
            }
        );
    }

    #[test]
    fn start_is_idempotent() {
        let (clock, scheduler) = setup();
        let connection = scheduler.connect(Vec::new());

        let first = connection.start().unwrap();
        let second = connection.start().unwrap();

        assert_eq!(first, second);
        assert_eq!(clock.pending_count(), 1);
    }

    #[test]
    fn manual_ticks_never_stack_frames() {
        let (clock, scheduler) = setup();
        let connection = scheduler.connect(Vec::new());

        connection.tick().unwrap();
        connection.tick().unwrap();
        connection.tick().unwrap();

        assert_eq!(clock.pending_count(), 1);
    }

    #[test]
    fn stop_cancels_the_pending_frame() {
        let (clock, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);

        connection.start().unwrap();
        connection.stop();
        count.set(1);
        clock.advance_by(3);

        assert!(!connection.is_running());
        assert_eq!(target.write_count(), 0);
        // Still subscribed: the change waits for a flush.
        assert_eq!(connection.dirty_count(), 1);
    }

    #[test]
    fn disconnect_is_final_and_idempotent() {
        let (clock, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);
        connection.start().unwrap();
        count.set(1);

        connection.disconnect();
        connection.disconnect();

        count.set(2);
        clock.advance_by(10);
        assert_eq!(connection.flush().unwrap(), 0);
        connection.invalidate_all();

        assert!(!connection.is_connected());
        assert_eq!(connection.dirty_count(), 0);
        assert_eq!(target.write_count(), 0);
        assert_eq!(count.subscriber_count(), 0);
        assert_eq!(Runtime::effect_count(), 0);
        assert!(matches!(connection.tick(), Err(FlushError::Disconnected)));
        assert!(matches!(connection.start(), Err(FlushError::Disconnected)));
    }

    #[test]
    fn dropping_the_last_handle_disconnects() {
        let (clock, scheduler) = setup();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(RecordingTarget::new(), count.clone())]);
        connection.start().unwrap();

        drop(connection);

        assert_eq!(count.subscriber_count(), 0);
        assert_eq!(clock.pending_count(), 0);
    }

    #[test]
    fn failed_write_keeps_the_hole_dirty() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);
        let hole = connection.hole_ids()[0];

        count.set(1);
        target.detach();
        let error = connection.flush().unwrap_err();
        assert!(matches!(
            error,
            FlushError::Apply {
                source: TargetError::Detached,
                ..
            }
        ));
        assert!(connection.is_dirty(hole));

        // Surfaces again until the target recovers.
        assert!(connection.flush().is_err());
        target.reattach();
        assert_eq!(connection.flush().unwrap(), 1);
        assert_eq!(target.text(), "1");
    }

    #[test]
    fn clock_driven_failures_are_kept_for_the_host() {
        let (clock, scheduler) = setup();
        let target = RecordingTarget::new();
        let count = Signal::new(0);
        let connection = scheduler.connect(vec![Hole::text(target.clone(), count.clone())]);
        connection.start().unwrap();

        count.set(1);
        target.detach();
        clock.advance();

        assert!(matches!(connection.take_error(), Some(FlushError::Apply { .. })));
        assert!(connection.take_error().is_none());
        // The loop keeps running.
        assert!(connection.is_running());
        target.reattach();
        clock.advance();
        assert_eq!(target.text(), "1");
    }

    #[test]
    fn closed_clock_surfaces_as_frame_error() {
        let (clock, scheduler) = setup();
        let connection = scheduler.connect(Vec::new());
        clock.close();

        let error = connection.start().unwrap_err();
        assert_eq!(
            error,
            FlushError::Frame(FrameError::Unavailable("clock is closed".into()))
        );
    }

    #[test]
    fn invalidate_all_repaints_every_hole() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let greeting: Value<String> = vec![
            Value::constant("hello, ".to_string()),
            Signal::new("world".to_string()).into(),
        ]
        .into();
        let connection = scheduler.connect(vec![
            Hole::text(target.clone(), greeting),
            Hole::attribute(target.clone(), "lang", Value::constant("en")),
        ]);

        connection.invalidate_all();
        assert_eq!(connection.flush().unwrap(), 2);

        assert_eq!(target.text(), "hello, world");
        assert_eq!(target.attribute("lang").as_deref(), Some("en"));
    }

    #[test]
    fn batched_writes_dirty_once() {
        let (_, scheduler) = setup();
        let target = RecordingTarget::new();
        let a = Signal::new(0);
        let b = Signal::new(0);
        let sum = Memo::new({
            let (a, b) = (a.clone(), b.clone());
            move || a.get() + b.get()
        });
        let connection = scheduler.connect(vec![Hole::text(target.clone(), sum)]);

        batch(|| {
            a.set(1);
            b.set(2);
        });

        assert_eq!(connection.flush().unwrap(), 1);
        assert_eq!(target.text(), "3");
    }
}
