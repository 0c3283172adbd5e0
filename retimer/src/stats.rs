// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Counters for the events both retimers handle internally.
//!
//! Nothing in the retimers surfaces as an error once running, so these
//! counters are the way to observe how often each self-healing policy fired.
//! All counters use relaxed atomics and may be read from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! retimer_stats {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        /// Live event counters shared by a transcoder's retimers.
        #[derive(Debug, Default)]
        pub struct RetimerStats {
            $($(#[$doc])* pub $name: AtomicU64,)*
        }

        /// Point-in-time copy of [`RetimerStats`].
        #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
        }

        impl RetimerStats {
            /// Reads every counter.
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }

            /// Sets every counter back to zero.
            pub fn clear(&self) {
                $(self.$name.store(0, Ordering::Relaxed);)*
            }
        }
    };
}

retimer_stats! {
    /// Video frames accepted into the FIFO.
    frames_ingested,
    /// Video frames ignored for lack of a usable format or scaler.
    frames_ignored,
    /// Stale video frames dropped while catching up.
    frames_dropped,
    /// Times the whole video backlog was discarded.
    backlog_flushes,
    /// Discontinuities that re-baselined video selection.
    video_jumps,
    /// Ticks that covered more than one output interval.
    lagged_ticks,
    /// Output frames delivered to the video sink, counting duplicates.
    frames_submitted,
    /// Audio blocks written into the ring buffers.
    blocks_ingested,
    /// Audio blocks ignored before timing was established.
    blocks_ignored,
    /// Audio buffer flushes after a timestamp discontinuity.
    audio_resets,
    /// Blocks re-placed to correct drift.
    drift_placements,
    /// Pulls answered with `false`.
    underruns,
    /// Pulls answered with a silent quantum.
    silent_quanta,
    /// Pulls answered with buffered samples.
    real_quanta,
    /// Pending windows given silence after waiting too long.
    expired_windows,
}

impl RetimerStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
