//! Time utilities shared by the relay and the client simulation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
static STARTED_AT: std::sync::OnceLock<DateTime<Utc>> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
    STARTED_AT.get_or_init(Utc::now);
}

/// Wall-clock start time, once initialized
pub fn started_at() -> Option<DateTime<Utc>> {
    STARTED_AT.get().copied()
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Client render cadence (one engine update per frame)
pub const FRAME_RATE: u32 = 60;

/// Frame duration in milliseconds as a float, for `update(dt)`
pub fn frame_delta_ms() -> f32 {
    1000.0 / FRAME_RATE as f32
}

/// Wall clock in milliseconds. The engine and relay read time only through
/// this trait so timing rules can be driven by hand in tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Real time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        unix_millis()
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
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

/// Monotonic countdown toward a deadline, queried once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Countdown {
    deadline: Option<u64>,
}

impl Countdown {
    /// Arm the countdown to expire `duration_ms` after `now`
    pub fn start(&mut self, now: u64, duration_ms: u64) {
        self.deadline = Some(now.saturating_add(duration_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Remaining milliseconds, `None` when not armed
    pub fn remaining(&self, now: u64) -> Option<u64> {
        self.deadline.map(|deadline| deadline.saturating_sub(now))
    }

    pub fn expired(&self, now: u64) -> bool {
        matches!(self.remaining(now), Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 1_250);
        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn countdown_saturates_at_zero() {
        let mut countdown = Countdown::default();
        assert_eq!(countdown.remaining(10), None);
        assert!(!countdown.expired(10));

        countdown.start(1_000, 180_000);
        assert_eq!(countdown.remaining(1_000), Some(180_000));
        assert_eq!(countdown.remaining(100_000), Some(81_000));
        assert!(countdown.expired(181_000));
        assert_eq!(countdown.remaining(500_000), Some(0));

        countdown.cancel();
        assert!(!countdown.is_armed());
        assert!(!countdown.expired(500_000));
    }
}
