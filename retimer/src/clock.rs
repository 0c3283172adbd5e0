// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Source-to-output clock domain translation.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default, Clone, Copy)]
struct AdjustState {
    offset: Option<i64>,
    last_source_ts: Option<u64>,
}

/// Tracks the offset between a source's timestamps and the output clock.
///
/// The offset is `output - source` and may be negative. It is unset after
/// construction and after [`ClockAdjuster::reset`]; until it is established
/// no source timestamp can be translated.
///
/// The lock is held only for a single load or store, never across buffer
/// operations.
#[derive(Debug, Default)]
pub struct ClockAdjuster {
    state: Mutex<AdjustState>,
}

impl ClockAdjuster {
    /// Creates an adjuster with no established offset.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AdjustState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Returns the current offset, if established.
    pub fn offset(&self) -> Option<i64> {
        self.with_state(|s| s.offset)
    }

    /// Returns `true` once an offset has been established.
    pub fn is_established(&self) -> bool {
        self.offset().is_some()
    }

    /// Establishes the offset from a correspondence if none exists yet.
    ///
    /// Returns the offset in effect after the call.
    pub fn establish(&self, output_now: u64, source_ts: u64) -> i64 {
        self.with_state(|s| {
            *s.offset.get_or_insert_with(|| {
                s.last_source_ts = Some(source_ts);
                offset_between(output_now, source_ts)
            })
        })
    }

    /// Records a new correspondence observed by a render/ingest tick.
    ///
    /// The offset is recomputed only when `source_ts` differs from the last
    /// observed source timestamp, so repeated ticks on a stalled frame keep
    /// the previous correspondence. Returns `true` if the offset changed.
    pub fn observe(&self, output_now: u64, source_ts: u64) -> bool {
        self.with_state(|s| {
            if s.offset.is_some() && s.last_source_ts == Some(source_ts) {
                return false;
            }
            let offset = offset_between(output_now, source_ts);
            let changed = s.offset != Some(offset);
            s.offset = Some(offset);
            s.last_source_ts = Some(source_ts);
            changed
        })
    }

    /// Translates a source timestamp into the output clock domain.
    ///
    /// Returns `None` if no offset is established. Results are clamped to
    /// the `u64` range.
    pub fn to_output(&self, source_ts: u64) -> Option<u64> {
        self.offset().map(|offset| apply_offset(source_ts, offset))
    }

    /// Forgets the current offset.
    pub fn reset(&self) {
        self.with_state(|s| *s = AdjustState::default());
    }
}

fn offset_between(output_now: u64, source_ts: u64) -> i64 {
    let diff = output_now as i128 - source_ts as i128;
    diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Adds a signed offset to a timestamp, clamping to the `u64` range.
pub(crate) fn apply_offset(ts: u64, offset: i64) -> u64 {
    (ts as i128 + offset as i128).clamp(0, u64::MAX as i128) as u64
}
