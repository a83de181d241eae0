//! Frame-synchronized flushing.
//!
//! Reactive writes happen whenever the application likes; targets should
//! change at most once per display frame. This module sits between the two:
//! holes record that they changed, and a frame clock decides when the
//! accumulated changes are applied.

mod clock;
mod hole;
mod interval;
mod scheduler;

pub use clock::{FrameClock, ManualClock, TickHandle};
pub use hole::{Hole, HoleId, RecordingTarget, Target, TargetWrite};
pub use interval::IntervalClock;
pub use scheduler::{Connection, FlushStats, FrameScheduler};
