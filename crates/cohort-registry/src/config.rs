use std::time::Duration;

use cohort_core::CoreError;
use cohort_core::constants::DEFAULT_MISSED_REFRESHES_BEFORE_RETIRE;
use cohort_core::constants::DEFAULT_REFRESH_INTERVAL;
use cohort_core::constants::DEFAULT_RETENTION_AFTER_RETIRE;

/// Consecutive failed federation calls before a member is reported as
/// repeatedly unreachable.
pub const DEFAULT_UNREACHABLE_ALERT_THRESHOLD: u32 = 3;

/// Registry timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How often the local registration is refreshed and members are swept.
    pub refresh_interval: Duration,
    /// Consecutive missed refreshes before a member is retired.
    pub missed_refreshes_before_retire: u32,
    /// How long reference copies of a retired member are kept.
    pub retention_after_retire: Duration,
    pub unreachable_alert_threshold: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            missed_refreshes_before_retire: DEFAULT_MISSED_REFRESHES_BEFORE_RETIRE,
            retention_after_retire: DEFAULT_RETENTION_AFTER_RETIRE,
            unreachable_alert_threshold: DEFAULT_UNREACHABLE_ALERT_THRESHOLD,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.refresh_interval.is_zero() {
            return Err(CoreError::invalid("registry.refresh_interval", "must be greater than zero"));
        }
        if self.missed_refreshes_before_retire == 0 {
            return Err(CoreError::invalid("registry.missed_refreshes_before_retire", "must be at least 1"));
        }
        if self.unreachable_alert_threshold == 0 {
            return Err(CoreError::invalid("registry.unreachable_alert_threshold", "must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn refresh_interval_ms(&self) -> u64 {
        (self.refresh_interval.as_millis() as u64).max(1)
    }
}
