//! A frame clock driven by tokio timers.
//!
//! Frames land on a fixed grid: `origin + period * k`. A tick requested in the
//! middle of a frame fires at the next grid point, never earlier, so a
//! scheduler that re-requests from its own callback settles into exactly one
//! callback per period however long its flushes take.
//!
//! Callbacks are `!Send`, so ticks run as local tasks. Requests must come from
//! inside a [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::clock::{FrameClock, TickHandle};
use crate::config::SchedulerConfig;
use crate::error::FrameError;

type Tasks = Rc<RefCell<IndexMap<TickHandle, JoinHandle<()>>>>;

pub struct IntervalClock {
    period: Duration,
    origin: Instant,
    next_handle: Cell<u64>,
    tasks: Tasks,
}

impl IntervalClock {
    /// A clock with frames every `period`, starting now.
    ///
    /// A zero period is treated as one nanosecond.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_nanos(1)),
            origin: Instant::now(),
            next_handle: Cell::new(0),
            tasks: Rc::new(RefCell::new(IndexMap::new())),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.frame_interval())
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of ticks requested and not yet fired or cancelled.
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// The first grid point strictly after now.
    fn next_frame(&self) -> Instant {
        let period = self.period.as_nanos();
        let elapsed = Instant::now().saturating_duration_since(self.origin).as_nanos();
        let frames = elapsed / period + 1;
        let offset = u64::try_from(frames * period).unwrap_or(u64::MAX);
        self.origin + Duration::from_nanos(offset)
    }
}

impl FrameClock for IntervalClock {
    /// # Panics
    ///
    /// Panics when called inside a tokio runtime but outside a `LocalSet`.
    fn request_tick(&self, callback: Box<dyn FnOnce()>) -> Result<TickHandle, FrameError> {
        Handle::try_current().map_err(|_| FrameError::NoRuntime)?;

        let handle = TickHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);

        let deadline = self.next_frame();
        let tasks = Rc::downgrade(&self.tasks);
        let task = tokio::task::spawn_local(async move {
            sleep_until(deadline).await;
            if let Some(tasks) = tasks.upgrade() {
                tasks.borrow_mut().shift_remove(&handle);
            }
            callback();
        });

        self.tasks.borrow_mut().insert(handle, task);
        Ok(handle)
    }

    fn cancel_tick(&self, handle: TickHandle) {
        let task = self.tasks.borrow_mut().shift_remove(&handle);
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        for (_, task) in self.tasks.borrow_mut().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for IntervalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalClock")
            .field("period", &self.period)
            .field("pending", &self.pending_count())
            .finish()
    }
}
