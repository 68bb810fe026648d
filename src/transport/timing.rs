//! Clock and timestamp utilities.
//!
//! Every timestamp on the wire is a 32-bit microsecond counter that wraps
//! about every 71 minutes. All comparisons go through [`diff`], which is
//! correct as long as the real distance between two timestamps is under
//! 2^31 microseconds (about 35 minutes).

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

/// Signed distance from `y` to `x` on the wrapping 32-bit clock.
///
/// `diff(5, 0xffff_fffe) == 7`.
#[inline]
pub fn diff(x: u32, y: u32) -> i32 {
    x.wrapping_sub(y) as i32
}

/// `x / y`, or 0 when `y` is 0.
pub fn div_or_zero(x: f64, y: f64) -> f64 {
    if y != 0.0 { x / y } else { 0.0 }
}

/// Standard deviation from a running count, sum and sum of squares, without
/// knowing the mean in advance.
pub fn onepass_stddev(sumsq: i64, sum: i64, count: i64) -> f64 {
    let numer = i128::from(count) * i128::from(sumsq) - i128::from(sum) * i128::from(sum);
    let denom = i128::from(count) * (i128::from(count) - 1);
    div_or_zero(numer as f64, denom as f64).sqrt()
}

/// Monotonic microsecond clock.
///
/// Driven by [`Instant`], so it never jumps backwards, but anchored at the
/// wall-clock time of its creation so 64-bit readings double as
/// human-readable timestamps.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    origin_usec: u64,
}

impl MonotonicClock {
    /// Start a clock anchored at the current wall-clock time.
    pub fn new() -> Self {
        let origin_usec = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            origin_usec,
        }
    }

    /// Full-width reading in microseconds. Never 0.
    pub fn now64(&self) -> u64 {
        let usec = self
            .origin_usec
            .wrapping_add(self.origin.elapsed().as_micros() as u64);
        if usec == 0 { 1 } else { usec }
    }

    /// Wire reading: the low 32 bits of [`now64`](Self::now64). Never 0, so
    /// 0 can mean "no timestamp".
    pub fn now(&self) -> u32 {
        let usec = self.now64() as u32;
        if usec == 0 { 1 } else { usec }
    }

    /// Expand a recent 32-bit reading back to full width.
    pub fn expand(&self, when: u32) -> u64 {
        let now = self.now64();
        let back = diff(now as u32, when);
        now.wrapping_sub(back as i64 as u64)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a microsecond wall-clock time as local `HH:MM:SS.uuuuuu`, the
/// format tcpdump prints, so the two outputs can be sorted together.
pub fn format_timestamp(usec: u64) -> String {
    let stamp = DateTime::from_timestamp_micros(usec as i64).unwrap_or_default();
    stamp.with_timezone(&Local).format("%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(5, 0xffff_fffe, 7)]
    #[case(0xffff_fffe, 5, -7)]
    #[case(1000, 400, 600)]
    #[case(400, 1000, -600)]
    #[case(0, 0, 0)]
    #[case(0x8000_0000, 1, 0x7fff_ffff)]
    fn test_diff_wraps(#[case] x: u32, #[case] y: u32, #[case] expected: i32) {
        assert_eq!(diff(x, y), expected);
    }

    #[test]
    fn test_diff_across_wrap_matches_elapsed() {
        let start = u32::MAX - 10_000;
        for elapsed in [1u32, 10_000, 10_001, 2_000_000] {
            assert_eq!(diff(start.wrapping_add(elapsed), start), elapsed as i32);
        }
    }

    #[test]
    fn test_onepass_stddev() {
        // samples 2, 4, 4, 4, 5, 5, 7, 9: sample stddev = sqrt(32/7)
        let samples = [2i64, 4, 4, 4, 5, 5, 7, 9];
        let sum: i64 = samples.iter().sum();
        let sumsq: i64 = samples.iter().map(|s| s * s).sum();
        let sd = onepass_stddev(sumsq, sum, samples.len() as i64);
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_onepass_stddev_degenerate(#[case] count: i64) {
        assert_eq!(onepass_stddev(25 * count, 5 * count, count), 0.0);
    }

    #[test]
    fn test_clock_never_zero_and_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now64();
        let b = clock.now64();
        assert!(a != 0);
        assert!(b >= a);
        assert!(clock.now() != 0);
    }

    #[test]
    fn test_expand_recovers_recent_reading() {
        let clock = MonotonicClock::new();
        let full = clock.now64();
        let expanded = clock.expand(full as u32);
        assert_eq!(expanded, full);
    }

    #[test]
    fn test_format_timestamp() {
        // 2020-09-13 12:26:40.000456 UTC
        let usec = 1_600_000_000_000_456;
        let expected = DateTime::from_timestamp(1_600_000_000, 456_000)
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();
        let stamp = format_timestamp(usec);
        assert_eq!(stamp, format!("{expected}.000456"));
        assert_eq!(stamp.len(), 15);
    }

    #[test]
    fn test_format_timestamp_follows_local_offset() {
        let usec = 1_600_000_000_000_000u64;
        let offset = Local
            .timestamp_opt(1_600_000_000, 0)
            .unwrap()
            .offset()
            .local_minus_utc();
        let utc_secs = 1_600_000_000 % 86_400;
        let local_secs = (utc_secs + i64::from(offset)).rem_euclid(86_400);
        let expected = format!(
            "{:02}:{:02}:{:02}.000000",
            local_secs / 3600,
            (local_secs / 60) % 60,
            local_secs % 60
        );
        assert_eq!(format_timestamp(usec), expected);
    }
}
