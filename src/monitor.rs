// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The idle monitor: polls a smart plug's power measurement and switches
//! the plug off once a reading is both idle and trustworthy.
//!
//! # Architecture
//!
//! The monitor uses a builder for configuration and a `tokio::sync::watch`
//! channel for publishing per-poll state to consumers; presentation stays
//! outside the library.
//!
//! A run proceeds in three stages:
//!
//! 1. If the switch already reports off, return without fetching anything.
//! 2. Bootstrap: fetch until the device timestamp is seen to advance, which
//!    proves the record reflects a fresh measurement cycle rather than a
//!    buffered value.
//! 3. Poll loop: wake on the [`CycleTracker`] schedule, fetch, try the idle
//!    gate, then fold the observed latency back into the tracker.
//!
//! The loop is unbounded by design; it ends when the plug is switched off,
//! on the first transport error, on the optional caller-supplied deadline,
//! or when the caller drops/aborts the [`IdleMonitor::run`] future (every
//! suspension point is an ordinary tokio await).
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> Result<(), fritz_idle::AhaError> {
//! use fritz_idle::{AhaSession, IdleMonitorBuilder};
//!
//! let plug = AhaSession::login("fritz.box", "user", "secret", "11657 0272633").await?;
//! let (monitor, mut state_rx) = IdleMonitorBuilder::new()
//!     .idle_threshold(5.0)
//!     .allowed_latency(1.0)
//!     .build(plug)?;
//!
//! tokio::spawn(async move {
//!     while state_rx.changed().await.is_ok() {
//!         let s = state_rx.borrow();
//!         println!("power: {:.2} W, latency: {:.2} s", s.watts, s.latency);
//!     }
//! });
//!
//! monitor.run().await?;
//! # Ok(())
//! # }
//! ```

use log::{debug, warn};
use std::time::{Duration, Instant};

use crate::device::SmartPlug;
use crate::error::{AhaError, ConfigError, TimeoutError};
use crate::record::{PowerRecord, unix_now};
use crate::sync::{Band, CycleTracker, INITIAL_INCREMENT, LOWER_BOUND_SENTINEL};

/// The per-poll state published by a running monitor, available via
/// `tokio::sync::watch::Receiver<MonitorState>`.
#[derive(Clone, Debug)]
pub struct MonitorState {
    /// Power reported by the most recent record, in watts.
    pub watts: f64,
    /// Latency of the most recent record, in seconds.
    pub latency: f64,
    /// Round-trip duration of the most recent fetch, in seconds.
    pub duration: f64,
    /// Phase-correction estimate that scheduled the most recent poll.
    pub offset: f64,
    /// Current offset adjustment step, in seconds.
    pub increment: f64,
    /// Largest offset known to be too early, or the sentinel.
    pub lower_bound: f64,
    /// Smallest non-negative latency observed so far this run.
    pub min_latency: f64,
    /// Number of records fetched so far this run, bootstrap included.
    pub total_polls: u64,
    /// When this state was last updated.
    pub last_update: Instant,
}

impl Default for MonitorState {
    fn default() -> Self {
        MonitorState {
            watts: 0.0,
            latency: 0.0,
            duration: 0.0,
            offset: 0.0,
            increment: INITIAL_INCREMENT,
            lower_bound: LOWER_BOUND_SENTINEL,
            min_latency: f64::INFINITY,
            total_polls: 0,
            last_update: Instant::now(),
        }
    }
}

/// Builder for configuring and creating an [`IdleMonitor`].
pub struct IdleMonitorBuilder {
    idle_threshold: f64,
    allowed_latency: f64,
    fast_path_latency: f64,
    precision_digits: u32,
    cycle: f64,
    bootstrap_interval: Duration,
    deadline: Option<Duration>,
}

impl IdleMonitorBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        IdleMonitorBuilder {
            idle_threshold: 5.0,
            allowed_latency: 1.0,
            fast_path_latency: 0.5,
            precision_digits: 1,
            cycle: 10.0,
            bootstrap_interval: Duration::from_secs(2),
            deadline: None,
        }
    }

    /// Power level in watts below which the load counts as idle
    /// (default: 5.0).
    pub fn idle_threshold(mut self, watts: f64) -> Self {
        self.idle_threshold = watts;
        self
    }

    /// Maximum latency at which a steady-state reading may trigger the
    /// shutoff, in seconds (default: 1.0).
    pub fn allowed_latency(mut self, seconds: f64) -> Self {
        self.allowed_latency = seconds;
        self
    }

    /// Tightened latency tolerance for the single check right after
    /// bootstrap, in seconds (default: 0.5).
    pub fn fast_path_latency(mut self, seconds: f64) -> Self {
        self.fast_path_latency = seconds;
        self
    }

    /// Cycle detection precision: offset refinement stops at
    /// `10^-digits` seconds (default: 1, valid range 1..=6).
    pub fn precision_digits(mut self, digits: u32) -> Self {
        self.precision_digits = digits;
        self
    }

    /// Poll period in seconds, matching the device's internal sampling
    /// cycle (default: 10.0).
    pub fn cycle(mut self, seconds: f64) -> Self {
        self.cycle = seconds;
        self
    }

    /// Pause between bootstrap fetches while the device timestamp has not
    /// advanced yet (default: 2 s).
    pub fn bootstrap_interval(mut self, interval: Duration) -> Self {
        self.bootstrap_interval = interval;
        self
    }

    /// Optional limit for the whole run. When it elapses before the switch
    /// was turned off, [`IdleMonitor::run`] fails with a deadline timeout.
    /// Without one the run is unbounded (default).
    pub fn deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    /// Validate the configuration and build the monitor around `plug`.
    ///
    /// Returns the monitor (to be run) and a watch receiver for per-poll
    /// state updates.
    pub fn build<P: SmartPlug>(
        self,
        plug: P,
    ) -> Result<(IdleMonitor<P>, tokio::sync::watch::Receiver<MonitorState>), AhaError> {
        for (value, parameter) in [
            (self.idle_threshold, "idle_threshold"),
            (self.allowed_latency, "allowed_latency"),
            (self.fast_path_latency, "fast_path_latency"),
            (self.cycle, "cycle"),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(AhaError::Config(ConfigError::NonPositive { parameter }));
            }
        }
        if self.bootstrap_interval.is_zero() {
            return Err(AhaError::Config(ConfigError::NonPositive {
                parameter: "bootstrap_interval",
            }));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(AhaError::Config(ConfigError::NonPositive {
                parameter: "deadline",
            }));
        }
        // Zero digits would put the floor (1 s) above the initial 0.25 s
        // increment and disable refinement entirely.
        if self.precision_digits < 1 || self.precision_digits > 6 {
            return Err(AhaError::Config(ConfigError::PrecisionOutOfRange {
                digits: self.precision_digits,
            }));
        }

        let (state_tx, state_rx) = tokio::sync::watch::channel(MonitorState::default());

        Ok((
            IdleMonitor {
                plug,
                idle_threshold: self.idle_threshold,
                allowed_latency: self.allowed_latency,
                fast_path_latency: self.fast_path_latency,
                precision_digits: self.precision_digits,
                cycle: self.cycle,
                bootstrap_interval: self.bootstrap_interval,
                deadline: self.deadline,
                state_tx,
                min_latency: f64::INFINITY,
                total_polls: 0,
            },
            state_rx,
        ))
    }
}

impl Default for IdleMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A monitor that polls one smart plug and turns it off once the attached
/// load is reliably idle.
///
/// Created via [`IdleMonitorBuilder`]. Call [`run()`](IdleMonitor::run) to
/// start; the future can be awaited directly or spawned and aborted for
/// cancellation.
pub struct IdleMonitor<P: SmartPlug> {
    plug: P,
    idle_threshold: f64,
    allowed_latency: f64,
    fast_path_latency: f64,
    precision_digits: u32,
    cycle: f64,
    bootstrap_interval: Duration,
    deadline: Option<Duration>,
    state_tx: tokio::sync::watch::Sender<MonitorState>,
    min_latency: f64,
    total_polls: u64,
}

impl<P: SmartPlug> IdleMonitor<P> {
    /// Run until the plug has been switched off.
    ///
    /// Returns `Ok(())` once the off command has been issued (or the switch
    /// was already off). The first transport, auth or parse error aborts
    /// the run; an elapsed deadline surfaces as
    /// [`TimeoutError::Deadline`](crate::TimeoutError::Deadline).
    pub async fn run(mut self) -> Result<(), AhaError> {
        match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, self.run_inner()).await {
                Ok(result) => result,
                Err(_) => Err(AhaError::Timeout(TimeoutError::Deadline)),
            },
            None => self.run_inner().await,
        }
    }

    async fn run_inner(&mut self) -> Result<(), AhaError> {
        if !self.plug.switch_state().await? {
            debug!("switch is already off, nothing to do");
            return Ok(());
        }

        debug!("requesting current power data");
        let record = self.reliable_record().await?;

        // Fast path: act immediately if the bootstrap record is already
        // fresh enough under the tightened tolerance.
        if self.turn_off_if_idle(&record, self.fast_path_latency).await? {
            return Ok(());
        }

        let mut tracker = CycleTracker::new(record.sample_time, self.cycle, self.precision_digits);
        debug!(
            "optimizing latency (cycle {}s, floor {}s)",
            self.cycle,
            10f64.powi(-(self.precision_digits as i32))
        );

        loop {
            let wake = tracker.next_wake(unix_now());
            sleep_until_unix(wake).await;

            let record = self.plug.latest_power_record().await?;
            self.publish(&record, Some(&tracker));
            debug!(
                "power={:7.2}W latency={:5.2}s offset={:+.3}s increment={:.3}s",
                record.watts,
                record.latency(),
                tracker.offset(),
                tracker.increment()
            );

            if self.turn_off_if_idle(&record, self.allowed_latency).await? {
                return Ok(());
            }

            match tracker.observe(record.sample_time, record.latency()) {
                Band::Fresh => {}
                Band::TooEarly => {
                    debug!("poll landed before the device refresh, shifting later")
                }
                Band::Anomalous => warn!(
                    "anomalous latency {:.2}s, abandoning offset estimate",
                    record.latency()
                ),
            }
        }
    }

    /// Fetch until the device timestamp advances, proving the returned
    /// record reflects a fresh measurement cycle.
    ///
    /// A device that has not been polled in a while answers the first
    /// request with a cached reading; only an observed *change* in the
    /// sample time rules that out. Loops indefinitely on identical
    /// timestamps (the device will advance within one cycle); only
    /// transport failures break out.
    async fn reliable_record(&mut self) -> Result<PowerRecord, AhaError> {
        let first = self.plug.latest_power_record().await?;
        self.publish(&first, None);

        let mut previous = first.sample_time;
        let mut record = self.plug.latest_power_record().await?;
        self.publish(&record, None);

        while record.sample_time == previous {
            tokio::time::sleep(self.bootstrap_interval).await;
            previous = record.sample_time;
            record = self.plug.latest_power_record().await?;
            self.publish(&record, None);
        }
        Ok(record)
    }

    /// The idle gate: iff the record is below the idle threshold *and* its
    /// latency is positive and below `allowed_latency`, issue the off
    /// command and report `true`. Otherwise report `false` and issue
    /// nothing.
    async fn turn_off_if_idle(
        &self,
        record: &PowerRecord,
        allowed_latency: f64,
    ) -> Result<bool, AhaError> {
        let idle = record.watts < self.idle_threshold;
        if idle && record.latency_ok(allowed_latency) {
            debug!(
                "reported idle ({:.2}W at {:.2}s latency), turning off",
                record.watts,
                record.latency()
            );
            self.plug.set_switch(false).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Publish one fetched record to the watch channel, paired with the
    /// tracker state that scheduled it (bootstrap fetches carry the
    /// defaults).
    fn publish(&mut self, record: &PowerRecord, tracker: Option<&CycleTracker>) {
        self.total_polls += 1;
        let latency = record.latency();
        if latency >= 0.0 && latency < self.min_latency {
            self.min_latency = latency;
        }
        let state = MonitorState {
            watts: record.watts,
            latency,
            duration: record.duration(),
            offset: tracker.map_or(0.0, |t| t.offset()),
            increment: tracker.map_or(INITIAL_INCREMENT, |t| t.increment()),
            lower_bound: tracker.map_or(LOWER_BOUND_SENTINEL, |t| t.lower_bound()),
            min_latency: self.min_latency,
            total_polls: self.total_polls,
            last_update: Instant::now(),
        };
        // Ignore send errors (no receivers).
        let _ = self.state_tx.send(state);
    }
}

/// Suspend until the wall clock reaches `target` (Unix seconds). Returns
/// immediately if the instant has already passed.
async fn sleep_until_unix(target: f64) {
    let now = unix_now();
    if target > now {
        tokio::time::sleep(Duration::from_secs_f64(target - now)).await;
    }
}
