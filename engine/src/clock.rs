//! Time as a capability.
//!
//! The engine never reads the system clock directly; everything time-shaped
//! (timestamps on records, flash expiry, navigation debounce, batch
//! windows) goes through `Clock` so tests can advance time by hand.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use chrono::{DateTime, SecondsFormat, Utc};

/// Monotonic and wall time for the engine.
pub trait Clock: Send + Sync {
    /// Wall-clock time, UTC.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Milliseconds on a monotonic clock with an arbitrary epoch.
    fn monotonic_ms(&self) -> u64;

    /// ISO-8601 rendering of the current wall time.
    fn now_iso8601(&self) -> String {
        format_iso8601(&self.now_utc())
    }
}

/// The ISO-8601 (RFC 3339) string format used in persisted records.
pub fn format_iso8601(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a persisted timestamp. Accepts any RFC 3339 offset and
/// normalizes to UTC.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Real time.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// A clock tests drive by hand. Wall time is the fixed `base` plus the
/// advanced monotonic offset, so record timestamps stay deterministic.
pub struct ManualClock {
    base: DateTime<Utc>,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.offset_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::milliseconds(self.offset_ms.load(Ordering::SeqCst) as i64)
    }

    fn monotonic_ms(&self) -> u64 {
        self.offset_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DateTime<Utc> {
        parse_iso8601("2024-05-01T10:00:00.000Z").unwrap()
    }

    #[test]
    fn test_format_round_trip() {
        let dt = base();
        let s = format_iso8601(&dt);
        assert_eq!(s, "2024-05-01T10:00:00.000Z");
        assert_eq!(parse_iso8601(&s), Some(dt));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_iso8601("yesterday").is_none());
        assert!(parse_iso8601("").is_none());
    }

    #[test]
    fn test_manual_clock_advances_both_times() {
        let clock = ManualClock::new(base());
        assert_eq!(clock.monotonic_ms(), 0);
        clock.advance_ms(1500);
        assert_eq!(clock.monotonic_ms(), 1500);
        assert_eq!(clock.now_iso8601(), "2024-05-01T10:00:01.500Z");
    }
}
