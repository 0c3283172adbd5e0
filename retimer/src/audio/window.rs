// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Pending pull windows.

use std::collections::VecDeque;

/// A requested `[start, end)` range in output-clock nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// FIFO of windows requested by the encoder but not yet answered.
///
/// Windows are answered strictly oldest first. A retried request for the
/// newest window is not queued twice.
#[derive(Debug, Default, Clone)]
pub struct PendingWindows {
    queue: VecDeque<TimeWindow>,
}

impl PendingWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, window: TimeWindow) {
        self.queue.push_back(window);
    }

    pub fn oldest(&self) -> Option<TimeWindow> {
        self.queue.front().copied()
    }

    /// The most recently requested window.
    pub fn newest(&self) -> Option<TimeWindow> {
        self.queue.back().copied()
    }

    pub fn pop_oldest(&mut self) -> Option<TimeWindow> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Time between the start of the oldest window and `newest_end`.
    pub fn span_to(&self, newest_end: u64) -> u64 {
        self.oldest()
            .map_or(0, |oldest| newest_end.saturating_sub(oldest.start))
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
