//! Frame clocks.
//!
//! A frame clock is the external time source behind the scheduler. It calls
//! back once per display refresh; the scheduler never decides on its own when
//! a frame happens.

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;

use crate::error::FrameError;

/// Handle to one requested tick, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickHandle(pub(crate) u64);

impl TickHandle {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A source of frame callbacks.
///
/// Each request fires at most once, on the next frame. Recurring work
/// re-requests from inside its callback.
pub trait FrameClock {
    /// Run `callback` on the next frame.
    fn request_tick(&self, callback: Box<dyn FnOnce()>) -> Result<TickHandle, FrameError>;

    /// Cancel a requested tick. Unknown or already fired handles are ignored.
    fn cancel_tick(&self, handle: TickHandle);
}

/// A clock the host advances by hand, one frame per [`advance`] call.
///
/// Suits hosts that receive their own refresh callback and tests that need
/// exact control over frames.
///
/// [`advance`]: ManualClock::advance
#[derive(Default)]
pub struct ManualClock {
    next_handle: Cell<u64>,
    frame: Cell<u64>,
    closed: Cell<bool>,
    queue: RefCell<IndexMap<TickHandle, Box<dyn FnOnce()>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire one frame.
    ///
    /// Only callbacks requested before the frame started run; ticks they
    /// request in turn wait for the next `advance`. Returns how many
    /// callbacks ran.
    ///
    /// A panicking callback propagates. The callbacks after it stay queued,
    /// ahead of anything requested during this frame.
    pub fn advance(&self) -> usize {
        self.frame.set(self.frame.get() + 1);
        let due = std::mem::take(&mut *self.queue.borrow_mut());
        let mut unfired = Unfired {
            clock: self,
            due: due.into_iter(),
        };
        let mut fired = 0;
        while let Some((_, callback)) = unfired.due.next() {
            callback();
            fired += 1;
        }
        fired
    }

    /// Fire `frames` frames in a row.
    pub fn advance_by(&self, frames: usize) -> usize {
        (0..frames).map(|_| self.advance()).sum()
    }

    /// Number of frames fired so far.
    pub fn frame(&self) -> u64 {
        self.frame.get()
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending_count(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Refuse further requests, as a host does once its surface is gone.
    pub fn close(&self) {
        self.closed.set(true);
        let dropped = std::mem::take(&mut *self.queue.borrow_mut());
        drop(dropped);
    }
}

/// Callbacks of the current frame that have not fired yet.
struct Unfired<'a> {
    clock: &'a ManualClock,
    due: indexmap::map::IntoIter<TickHandle, Box<dyn FnOnce()>>,
}

impl Drop for Unfired<'_> {
    fn drop(&mut self) {
        let rest: IndexMap<_, _> = self.due.by_ref().collect();
        if rest.is_empty() || self.clock.closed.get() {
            return;
        }
        let mut queue = self.clock.queue.borrow_mut();
        let newer = std::mem::replace(&mut *queue, rest);
        queue.extend(newer);
    }
}

impl FrameClock for ManualClock {
    fn request_tick(&self, callback: Box<dyn FnOnce()>) -> Result<TickHandle, FrameError> {
        if self.closed.get() {
            return Err(FrameError::Unavailable("clock is closed".to_string()));
        }
        let handle = TickHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);
        self.queue.borrow_mut().insert(handle, callback);
        Ok(handle)
    }

    fn cancel_tick(&self, handle: TickHandle) {
        let removed = self.queue.borrow_mut().shift_remove(&handle);
        drop(removed);
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("frame", &self.frame.get())
            .field("pending", &self.pending_count())
            .field("closed", &self.closed.get())
            .finish()
    }
}
