//! Error types.
//!
//! The reactive graph itself never returns errors: a failing computation body
//! is a panic that propagates out of the write or construction that ran it.
//! Errors here belong to the edges of the system, where the frame scheduler
//! talks to rendering targets and frame clocks.

use thiserror::Error;

use crate::frame::HoleId;

/// A rendering target refused a write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The target is no longer attached to anything that can display it.
    #[error("target is detached")]
    Detached,

    /// The target rejected the value.
    #[error("target rejected the write: {0}")]
    Rejected(String),
}

/// The frame clock could not schedule a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The clock exists but cannot take requests.
    #[error("frame clock unavailable: {0}")]
    Unavailable(String),

    /// An async clock was used outside of a runtime.
    #[error("no async runtime is available to drive frames")]
    NoRuntime,
}

/// Failure while flushing dirty holes or scheduling the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlushError {
    /// Applying a hole to its target failed. The hole stays dirty.
    #[error("failed to apply hole {hole:?}")]
    Apply {
        hole: HoleId,
        #[source]
        source: TargetError,
    },

    /// The next tick could not be requested.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The connection was disconnected and can no longer be driven.
    #[error("connection is disconnected")]
    Disconnected,
}

/// Invalid scheduler configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration was not valid JSON for the expected shape.
    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the scheduler cannot use.
    #[error("invalid value for `{field}`: must be greater than zero")]
    Invalid { field: &'static str },
}

/// Result type for flush operations.
pub type Result<T> = std::result::Result<T, FlushError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn apply_error_exposes_target_error_as_source() {
        let error = FlushError::Apply {
            hole: HoleId::new(),
            source: TargetError::Detached,
        };

        let source = error.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("target is detached"));
    }

    #[test]
    fn frame_error_converts_transparently() {
        let error: FlushError = FrameError::NoRuntime.into();
        assert_eq!(
            error.to_string(),
            "no async runtime is available to drive frames"
        );
    }
}
