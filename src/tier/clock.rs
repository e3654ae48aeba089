//! Millisecond clock abstraction.
//!
//! The frequency window, decision debounce, and sample aging all compare
//! wall-clock milliseconds. Injecting the clock keeps those paths
//! deterministic under test.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock: monotonic milliseconds since first use.
#[derive(Debug, Default)]
pub struct SystemClock;

static EPOCH: OnceLock<Instant> = OnceLock::new();

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let epoch = EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_millis() as u64
    }
}

/// Hand-advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 350);
        clock.set(50);
        assert_eq!(clock.now_ms(), 50);
    }

    #[test]
    fn test_system_clock_monotone() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
