//! Structured error types for the scheduler.
//!
//! Scheduling mistakes are reported synchronously as [`InvalidSchedule`].
//! Errors raised by an event's action travel through the run loop as an
//! opaque [`ActionError`] that the core never inspects or wraps.

use thiserror::Error;

use crate::time::VirtualTime;

/// A `schedule`/`timeout` call that the scheduler refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidSchedule {
    /// Attempted to schedule an event before the current time.
    #[error("cannot schedule event at {requested} when current time is {current}")]
    InPast {
        requested: VirtualTime,
        current: VirtualTime,
    },

    /// `timeout` was called with a negative delay.
    #[error("delay must be non-negative, got {0}")]
    NegativeDelay(f64),

    /// The requested time (or delay) is NaN or infinite.
    #[error("time must be finite, got {0}")]
    NonFinite(f64),

    /// `current_time + delay` is not representable.
    #[error("delay {delay} from {current} overflows virtual time")]
    Overflow { current: VirtualTime, delay: f64 },
}

/// Error raised by an event's action.
///
/// Opaque to the core. Callers that need their concrete error back can use
/// [`anyhow::Error::downcast_ref`].
pub type ActionError = anyhow::Error;

/// What an action returns once it has been invoked.
pub type ActionResult = Result<(), ActionError>;

/// Convenience alias for `Result<T, InvalidSchedule>`.
pub type ScheduleResult<T> = Result<T, InvalidSchedule>;
