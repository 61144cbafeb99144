use std::time::{Duration, Instant};

use classful_common::Rate;

/// A byte-denominated token bucket.
///
/// Tokens accumulate at `rate` bytes per second up to `burst` and are
/// spent by transmissions. Refill is lazy: nothing moves until the bucket
/// is next consulted, at which point the elapsed time since the last
/// refill is credited in one step. A monotonic clock that somehow reports
/// an earlier instant credits nothing rather than underflowing.
///
/// Shaping charges may drive the level negative: that is the borrowing
/// debt an intermediate class picks up when a descendant sends through it,
/// paid down by later refills. The policer never spends below zero.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    /// Refill rate in bytes per second.
    rate: f64,
    /// Level cap in bytes.
    burst: f64,
    /// Current level in bytes.
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket that starts full, so the configured burst is
    /// available immediately after attach.
    pub(crate) fn new(rate: Rate, burst: u64, now: Instant) -> Self {
        Self {
            rate: rate.bytes_per_sec() as f64,
            burst: burst as f64,
            tokens: burst as f64,
            last_refill: now,
        }
    }

    /// Credits tokens for the time elapsed since the last refill.
    pub(crate) fn refill(&mut self, now: Instant) {
        // `checked_duration_since` is None when `now` is earlier than the
        // last refill; treat a regressed clock as zero elapsed.
        let Some(elapsed) = now.checked_duration_since(self.last_refill) else {
            return;
        };
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        self.last_refill = now;
    }

    #[inline]
    pub(crate) fn has(&self, bytes: u32) -> bool {
        self.tokens >= f64::from(bytes)
    }

    /// Spends `bytes`. The level may go negative.
    #[inline]
    pub(crate) fn charge(&mut self, bytes: u32) {
        self.tokens -= f64::from(bytes);
    }

    /// Time until the bucket holds at least `bytes`. `None` when it never
    /// will: a zero rate, or a packet larger than the burst cap.
    pub(crate) fn time_until(&self, bytes: u32) -> Option<Duration> {
        let deficit = f64::from(bytes) - self.tokens;
        if deficit <= 0.0 {
            return Some(Duration::ZERO);
        }
        if self.rate <= 0.0 || self.burst < f64::from(bytes) {
            return None;
        }
        Some(Duration::from_secs_f64(deficit / self.rate))
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(rate: u64, burst: u64) -> (TokenBucket, Instant) {
        let now = Instant::now();
        (TokenBucket::new(Rate::from_bytes_per_sec(rate), burst, now), now)
    }

    #[test]
    fn starts_full_and_caps_at_burst() {
        let (mut b, now) = bucket(1_000, 500);
        assert!(b.has(500));
        assert!(!b.has(501));

        // A long idle period must not overfill past the burst cap.
        b.refill(now + Duration::from_secs(60));
        assert!((b.tokens() - 500.0).abs() < 1e-9);
    }

    #[test]
    fn refills_at_rate() {
        let (mut b, now) = bucket(1_000, 10_000);
        b.charge(10_000);
        assert!(!b.has(1));

        b.refill(now + Duration::from_millis(500));
        assert!(b.has(500));
        assert!(!b.has(501));
    }

    #[test]
    fn clock_regression_credits_nothing() {
        let (mut b, now) = bucket(1_000, 1_000);
        b.refill(now + Duration::from_secs(1));
        b.charge(1_000);

        // An earlier "now" must neither credit nor underflow.
        b.refill(now);
        assert!(!b.has(1));
        assert!(b.tokens().abs() < 1e-9);
    }

    #[test]
    fn negative_levels_recover() {
        let (mut b, now) = bucket(1_000, 1_000);
        b.charge(2_000);
        assert!(b.tokens() < 0.0);

        b.refill(now + Duration::from_secs(1));
        assert!(!b.has(1));
        b.refill(now + Duration::from_secs(2));
        assert!(b.has(1_000));
    }

    #[test]
    fn time_until_accounts_for_deficit() {
        let (mut b, _) = bucket(1_000, 1_000);
        assert_eq!(b.time_until(500), Some(Duration::ZERO));

        b.charge(1_000);
        assert_eq!(b.time_until(500), Some(Duration::from_millis(500)));

        // Larger than burst: never.
        assert_eq!(b.time_until(1_500), None);
    }
}
