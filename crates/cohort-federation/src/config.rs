use std::time::Duration;

use cohort_core::CoreError;
use cohort_core::constants::DEFAULT_MEMBER_TIMEOUT;
use cohort_core::constants::MAX_PAGE_SIZE;

/// Federation engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederationConfig {
    /// Bound on a whole federated call, and so on every member's part of it.
    pub member_timeout: Duration,
    /// Largest accepted page size.
    pub max_page_size: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            member_timeout: DEFAULT_MEMBER_TIMEOUT,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl FederationConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.member_timeout.is_zero() {
            return Err(CoreError::invalid("federation.member_timeout", "must be greater than zero"));
        }
        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE {
            return Err(CoreError::invalid(
                "federation.max_page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        Ok(())
    }
}
