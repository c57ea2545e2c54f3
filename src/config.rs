//! Scheduler configuration.

use crate::error::ScheduleResult;
use crate::time::VirtualTime;

/// Construction-time settings for an [`EventScheduler`](crate::EventScheduler).
///
/// The defaults give a plain scheduler: clock at zero, no trace, no
/// event limit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct SchedulerConfig {
    /// Initial value of the clock.
    pub epoch: f64,

    /// Record every executed event into an [`EventTrace`](crate::EventTrace).
    pub record_trace: bool,

    /// Upper bound on the number of events a single run loop call may
    /// execute. `None` means unbounded, so a model that keeps
    /// rescheduling zero-delay events will never return.
    pub event_limit: Option<u64>,
}

impl SchedulerConfig {
    /// Default configuration starting the clock at `epoch`.
    pub fn starting_at(epoch: f64) -> Self {
        SchedulerConfig {
            epoch,
            ..Self::default()
        }
    }

    /// Enable trace recording.
    pub fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }

    /// Cap the number of events per run loop call.
    pub fn with_event_limit(mut self, limit: u64) -> Self {
        self.event_limit = Some(limit);
        self
    }

    /// The epoch as a validated `VirtualTime`.
    pub fn epoch_time(&self) -> ScheduleResult<VirtualTime> {
        VirtualTime::new(self.epoch)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            epoch: 0.0,
            record_trace: false,
            event_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidSchedule;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.epoch, 0.0);
        assert!(!config.record_trace);
        assert_eq!(config.event_limit, None);
        assert_eq!(config.epoch_time().unwrap(), VirtualTime::ZERO);
    }

    #[test]
    fn test_builder_methods() {
        let config = SchedulerConfig::starting_at(100.0)
            .with_trace()
            .with_event_limit(50);
        assert_eq!(config.epoch, 100.0);
        assert!(config.record_trace);
        assert_eq!(config.event_limit, Some(50));
    }

    #[test]
    fn test_non_finite_epoch_rejected() {
        let config = SchedulerConfig::starting_at(f64::NAN);
        assert!(matches!(
            config.epoch_time(),
            Err(InvalidSchedule::NonFinite(_))
        ));
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_serde_roundtrip_with_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{"epoch": 5.0}"#).unwrap();
        assert_eq!(config, SchedulerConfig::starting_at(5.0));

        let json = serde_json::to_string(&config.clone().with_trace()).unwrap();
        let back: SchedulerConfig = serde_json::from_str(&json).unwrap();
        assert!(back.record_trace);
    }
}
