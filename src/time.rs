//! Virtual time for the discrete-event scheduler.
//!
//! A logical timestamp with no dependency on `std::time`. Time advances
//! only when the scheduler executes an event, never from wall-clock
//! observation.

use std::cmp::Ordering;

use crate::error::InvalidSchedule;

/// A point in simulated time.
///
/// Backed by an `f64` so models can use fractional ticks (a clock that
/// ticks every `0.5` units). The value is always finite, which is what
/// makes the `Eq`/`Ord` implementations total.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(try_from = "f64", into = "f64"))]
pub struct VirtualTime(f64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0.0);

    /// Create a `VirtualTime` from a raw value.
    ///
    /// Fails with [`InvalidSchedule::NonFinite`] for NaN or infinities.
    /// Negative zero is normalized to zero.
    pub fn new(value: f64) -> Result<Self, InvalidSchedule> {
        if value.is_finite() {
            Ok(VirtualTime(value + 0.0))
        } else {
            Err(InvalidSchedule::NonFinite(value))
        }
    }

    /// Return the raw value.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Compute the absolute time that is `delay` units after `self`.
    ///
    /// Returns `None` if `delay` is negative or non-finite, or if the sum
    /// overflows to infinity.
    #[inline]
    pub fn plus(self, delay: f64) -> Option<VirtualTime> {
        if !delay.is_finite() || delay < 0.0 {
            return None;
        }
        let at = self.0 + delay;
        at.is_finite().then_some(VirtualTime(at))
    }
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<f64> for VirtualTime {
    type Error = InvalidSchedule;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        VirtualTime::new(value)
    }
}

impl From<VirtualTime> for f64 {
    fn from(t: VirtualTime) -> f64 {
        t.0
    }
}

impl PartialEq for VirtualTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VirtualTime {}

impl Ord for VirtualTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for VirtualTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq<f64> for VirtualTime {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<f64> for VirtualTime {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0.partial_cmp(other)
    }
}

impl std::hash::Hash for VirtualTime {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}
