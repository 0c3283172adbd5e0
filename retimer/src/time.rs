// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Timing primitives shared by the video and audio paths.
//!
//! All timestamps handled by this crate are unsigned 64-bit nanoseconds.
//! Conversions between sample/frame counts and durations round to the
//! nearest integer in both directions so that repeated conversions do not
//! accumulate drift.
//!
//! The output clock domain is abstracted behind [`OutputClock`]:
//!
//! - [`MonotonicClock`] follows the host's monotonic clock and sleeps with the
//!   OS scheduler.
//! - [`ManualClock`] only moves when told to, which makes it possible to run
//!   the whole pipeline in simulated time.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

/// Nanoseconds per second.
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Computes `a * b / c` without intermediate overflow, truncating.
///
/// Returns 0 if `c` is 0.
pub fn mul_div(a: u64, b: u64, c: u64) -> u64 {
    if c == 0 {
        return 0;
    }
    (a as u128 * b as u128 / c as u128) as u64
}

/// Computes `a * b / c` without intermediate overflow, rounding to nearest.
///
/// Returns 0 if `c` is 0.
pub fn mul_div_round(a: u64, b: u64, c: u64) -> u64 {
    if c == 0 {
        return 0;
    }
    let c = c as u128;
    ((a as u128 * b as u128 + c / 2) / c) as u64
}

/// Converts a duration in nanoseconds to a number of audio frames.
///
/// `frames = round(ns * sample_rate / 1e9)`
pub fn ns_to_audio_frames(sample_rate: u32, ns: u64) -> u64 {
    mul_div_round(ns, sample_rate as u64, NS_PER_SEC)
}

/// Converts a number of audio frames to a duration in nanoseconds.
///
/// `ns = round(frames * 1e9 / sample_rate)`
pub fn audio_frames_to_ns(sample_rate: u32, frames: u64) -> u64 {
    mul_div_round(frames, NS_PER_SEC, sample_rate as u64)
}

/// Rational number representation for rates.
///
/// Used for frame rates (e.g., 30000/1001 for 29.97 fps).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    /// Numerator of the rate.
    pub numerator: u32,
    /// Denominator of the rate (defaults to 1 if omitted in JSON).
    #[serde(default = "default_denominator")]
    pub denominator: u32,
}

/// Default denominator for rates.
fn default_denominator() -> u32 {
    1
}

impl Rate {
    /// Creates a new rate.
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns `true` if both terms are non-zero.
    pub fn is_valid(&self) -> bool {
        self.numerator != 0 && self.denominator != 0
    }

    /// Duration of one unit (e.g. one frame) in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        mul_div(NS_PER_SEC, self.denominator as u64, self.numerator as u64)
    }

    /// Number of whole units that fit in `ns` nanoseconds.
    pub fn units_in(&self, ns: u64) -> u64 {
        mul_div(
            ns,
            self.numerator as u64,
            self.denominator as u64 * NS_PER_SEC,
        )
    }
}

/// Source of time in the output clock domain.
///
/// Implementations must be monotonic.
pub trait OutputClock: Send + Sync {
    /// Current time in nanoseconds.
    fn now_ns(&self) -> u64;

    /// Blocks until `deadline_ns` is reached.
    ///
    /// Returns `false` without sleeping if the deadline had already passed
    /// when the call was made.
    fn sleep_until_ns(&self, deadline_ns: u64) -> bool;
}

/// Output clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    base: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose zero is the moment of creation.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputClock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.base.elapsed().as_nanos() as u64
    }

    fn sleep_until_ns(&self, deadline_ns: u64) -> bool {
        let now = self.now_ns();
        if deadline_ns <= now {
            return false;
        }
        std::thread::sleep(Duration::from_nanos(deadline_ns - now));
        true
    }
}

/// Output clock that advances only when driven.
///
/// `sleep_until_ns` jumps the clock forward to the deadline instead of
/// blocking, so a cadence thread running on a `ManualClock` produces ticks as
/// fast as it can execute them. Tests and simulations use it to cover seconds
/// of output time in milliseconds of wall time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// Moves the clock forward by `delta_ns`.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::AcqRel) + delta_ns
    }

    /// Sets the clock to `ns` if that is later than the current time.
    pub fn advance_to(&self, ns: u64) {
        self.now.fetch_max(ns, Ordering::AcqRel);
    }
}

impl OutputClock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    fn sleep_until_ns(&self, deadline_ns: u64) -> bool {
        let previous = self.now.fetch_max(deadline_ns, Ordering::AcqRel);
        previous < deadline_ns
    }
}
