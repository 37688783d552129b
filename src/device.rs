// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The capability interface the idle monitor consumes.
//!
//! The monitor never depends on vendor specifics: everything it needs from
//! a metered smart switch is the three operations below. The concrete
//! Fritz!Box client in [`crate::aha`] implements this trait; tests drive the
//! monitor with scripted in-memory implementations.

use std::future::Future;

use crate::error::AhaError;
use crate::record::PowerRecord;

/// A remotely switchable outlet that reports its power draw.
///
/// Implementations perform one network exchange per call and do not retry:
/// any failure propagates as an [`AhaError`] and terminates the caller's
/// run.
pub trait SmartPlug {
    /// Fetch the most recent power measurement, bracketed with local
    /// request/response timestamps.
    ///
    /// The device refreshes its measurement on its own fixed cycle; two
    /// calls within one cycle may return an identical `sample_time`, which
    /// signals staleness rather than a new reading.
    fn latest_power_record(&self) -> impl Future<Output = Result<PowerRecord, AhaError>> + Send;

    /// Switch the outlet on or off. One atomic remote command per call.
    fn set_switch(&self, on: bool) -> impl Future<Output = Result<(), AhaError>> + Send;

    /// Report whether the outlet is currently switched on.
    fn switch_state(&self) -> impl Future<Output = Result<bool, AhaError>> + Send;
}
