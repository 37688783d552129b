// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Power records and the timing math derived from them.
//!
//! A [`PowerRecord`] is one fetched measurement together with the local
//! timestamps bracketing the request. All timestamps are Unix-epoch seconds
//! as `f64`: the device reports its measurement time quantized to whole
//! seconds, while the local bracket keeps sub-second precision, so the
//! derived latency carries the fractional part.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix-epoch seconds.
///
/// Times before the epoch come out negative, mirroring the sign convention
/// of `SystemTime::duration_since`.
pub fn unix_now() -> f64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// One power measurement fetched from the device, with timing metadata.
///
/// Immutable once constructed; the cycle synchronizer only ever derives
/// quantities from it.
#[derive(Clone, Copy, Debug)]
pub struct PowerRecord {
    /// Measured power in watts. The device reports hundredths of a watt;
    /// the client has already scaled the value.
    pub watts: f64,
    /// Timestamp the device assigned to this value (Unix seconds, quantized
    /// to whole seconds by the device). Non-decreasing across successive
    /// distinct measurements.
    pub sample_time: f64,
    /// Local time immediately before the fetch request was sent.
    pub request_time: f64,
    /// Local time immediately after the response arrived. Never earlier
    /// than `request_time`.
    pub response_time: f64,
}

impl PowerRecord {
    /// Round-trip cost of the fetch that produced this record, in seconds.
    pub fn duration(&self) -> f64 {
        self.response_time - self.request_time
    }

    /// Staleness of the value at the moment it was observed: elapsed time
    /// between the device's measurement and the local receipt of the
    /// response, in seconds.
    ///
    /// Under a correctly functioning channel this is small but strictly
    /// positive. A result `<= 0` indicates clock skew between the box and
    /// the local host (or a stale buffered record) and must not be treated
    /// as a fresh reading; see [`PowerRecord::latency_ok`].
    pub fn latency(&self) -> f64 {
        self.response_time - self.sample_time
    }

    /// Whether the latency is positive and below `allowed` seconds.
    ///
    /// The lower bound rejects non-positive latencies outright: a skewed
    /// clock would otherwise satisfy any `latency < allowed` check.
    pub fn latency_ok(&self, allowed: f64) -> bool {
        let latency = self.latency();
        latency > 0.0 && latency < allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sample_time: f64, request_time: f64, response_time: f64) -> PowerRecord {
        PowerRecord {
            watts: 42.0,
            sample_time,
            request_time,
            response_time,
        }
    }

    #[test]
    fn test_duration_and_latency() {
        let r = record(100.0, 100.5, 101.42);
        assert!((r.duration() - 0.92).abs() < 1e-12);
        assert!((r.latency() - 1.42).abs() < 1e-12);
    }

    #[test]
    fn test_zero_duration() {
        let r = record(100.0, 100.5, 100.5);
        assert_eq!(r.duration(), 0.0);
    }

    #[test]
    fn test_latency_ok_within_tolerance() {
        let r = record(100.0, 100.2, 100.95);
        assert!(r.latency_ok(1.0));
    }

    #[test]
    fn test_latency_ok_boundary_is_rejected() {
        // latency == allowed must not pass.
        let r = record(100.0, 100.2, 101.0);
        assert_eq!(r.latency(), 1.0);
        assert!(!r.latency_ok(1.0));
    }

    #[test]
    fn test_zero_latency_is_rejected() {
        let r = record(100.0, 99.8, 100.0);
        assert_eq!(r.latency(), 0.0);
        assert!(!r.latency_ok(1.0));
    }

    #[test]
    fn test_negative_latency_is_rejected() {
        // Device clock ahead of ours: the record looks like it is from the
        // future. Must never count as fresh.
        let r = record(105.0, 100.0, 100.3);
        assert!(r.latency() < 0.0);
        assert!(!r.latency_ok(10.0));
    }

    #[test]
    fn test_unix_now_is_recent() {
        // Sanity: somewhere after 2020-01-01 and moving forward.
        let a = unix_now();
        assert!(a > 1_577_836_800.0);
        let b = unix_now();
        assert!(b >= a);
    }
}
