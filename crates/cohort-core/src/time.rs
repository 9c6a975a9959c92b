//! Injectable clock.
//!
//! Registry freshness, audit timestamps and instance headers all read time
//! through [`TimeProvider`] so tests can drive missed refreshes without
//! sleeping. Use [`SystemTimeProvider`] in production and
//! [`SimulatedTimeProvider`] (behind the `simulation` feature) in tests.

#[cfg(feature = "simulation")]
use std::sync::Arc;
#[cfg(feature = "simulation")]
use std::sync::atomic::AtomicU64;
#[cfg(feature = "simulation")]
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Current Unix timestamp in milliseconds; 0 if the clock is before the epoch.
#[inline]
pub fn current_time_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Source of wall-clock time in Unix milliseconds.
pub trait TimeProvider: Send + Sync {
    fn now_unix_ms(&self) -> u64;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    #[inline]
    fn now_unix_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same underlying instant.
#[cfg(feature = "simulation")]
#[derive(Debug, Clone)]
pub struct SimulatedTimeProvider {
    now_ms: Arc<AtomicU64>,
}

#[cfg(feature = "simulation")]
impl SimulatedTimeProvider {
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(initial_ms)),
        }
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

#[cfg(feature = "simulation")]
impl TimeProvider for SimulatedTimeProvider {
    fn now_unix_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_after_2020() {
        assert!(SystemTimeProvider.now_unix_ms() > 1_577_836_800_000);
    }

    #[cfg(feature = "simulation")]
    #[test]
    fn test_simulated_time_is_shared_between_clones() {
        let time = SimulatedTimeProvider::new(1_000);
        let other = time.clone();
        time.advance_ms(500);
        assert_eq!(other.now_unix_ms(), 1_500);
        other.set_ms(42);
        assert_eq!(time.now_unix_ms(), 42);
    }
}
