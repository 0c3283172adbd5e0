// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-quantum audio re-timing.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info, trace};

use crate::{
    Error, Result,
    audio::{
        block::{AudioBlock, AudioQuantum},
        resample::{Resampler, remix_channels},
        ring::SampleRingBuffer,
        window::{PendingWindows, TimeWindow},
    },
    clock::{ClockAdjuster, apply_offset},
    config::{AudioOutputInfo, RetimerConfig},
    io::{AudioPull, PlaybackState},
    stats::RetimerStats,
    time::{OutputClock, ns_to_audio_frames},
};

/// Drift-tracking state of an [`AudioRetimer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftState {
    /// Output time of the first buffered frame. `None` until audio arrives.
    pub audio_time: Option<u64>,
    /// Output time at which the next ingested block is expected to start.
    pub next_expected_time: u64,
    /// Current source-to-output offset, if established.
    pub timing_adjust: Option<i64>,
}

struct AudioState {
    buffers: SampleRingBuffer,
    pending: PendingWindows,
    audio_time: Option<u64>,
    next_expected_time: u64,
    resampler: Option<Resampler>,
}

impl AudioState {
    fn new(channels: usize) -> Self {
        Self {
            buffers: SampleRingBuffer::new(channels),
            pending: PendingWindows::new(),
            audio_time: None,
            next_expected_time: 0,
            resampler: None,
        }
    }

    fn reset_buffers(&mut self) {
        self.buffers.clear();
        self.audio_time = None;
        self.next_expected_time = 0;
    }
}

enum PullOutcome {
    Silence,
    Samples,
    Underrun,
}

/// Re-emits irregular decoded audio as fixed-size quanta on demand.
///
/// Blocks are written into per-channel ring buffers by
/// [`AudioRetimer::ingest`]. The buffer front corresponds to `audio_time`
/// in the output clock domain; each block is appended where it is expected,
/// re-placed when it deviates by more than the smoothing threshold, or
/// starts a fresh buffer after a discontinuity.
///
/// The encoder's audio clock calls [`AudioPull::pull`] with consecutive
/// windows. Windows that cannot be served yet stay queued and are answered
/// oldest first.
pub struct AudioRetimer {
    source_id: String,
    output: AudioOutputInfo,
    config: RetimerConfig,
    clock: Arc<dyn OutputClock>,
    adjuster: Arc<ClockAdjuster>,
    playback: Arc<dyn PlaybackState>,
    stats: Arc<RetimerStats>,
    running: AtomicBool,
    state: Mutex<AudioState>,
}

impl AudioRetimer {
    /// Creates a stopped retimer for the given output channel.
    pub fn new(
        source_id: impl Into<String>,
        output: AudioOutputInfo,
        config: RetimerConfig,
        clock: Arc<dyn OutputClock>,
        adjuster: Arc<ClockAdjuster>,
        playback: Arc<dyn PlaybackState>,
        stats: Arc<RetimerStats>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            state: Mutex::new(AudioState::new(output.channels)),
            output,
            config,
            clock,
            adjuster,
            playback,
            stats,
            running: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AudioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn output(&self) -> &AudioOutputInfo {
        &self.output
    }

    /// Current drift-tracking state.
    pub fn drift(&self) -> DriftState {
        let state = self.lock_state();
        DriftState {
            audio_time: state.audio_time,
            next_expected_time: state.next_expected_time,
            timing_adjust: self.adjuster.offset(),
        }
    }

    /// Frames buffered per channel.
    pub fn buffered_frames(&self) -> usize {
        self.lock_state().buffers.len_frames()
    }

    /// Byte length of every channel buffer.
    pub fn channel_lens(&self) -> Vec<usize> {
        self.lock_state().buffers.channel_lens()
    }

    /// Windows requested but not yet answered.
    pub fn pending_windows(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Starts accepting blocks and answering pulls.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if already started.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }
        let mut state = self.lock_state();
        state.reset_buffers();
        state.pending.clear();
        info!(
            source = %self.source_id,
            sample_rate = self.output.sample_rate,
            channels = self.output.channels,
            "Audio retimer started"
        );
        Ok(())
    }

    /// Flushes all buffered audio and pending windows and zeroes the drift
    /// state. The resampler, if any, is released.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        let mut state = self.lock_state();
        state.reset_buffers();
        state.pending.clear();
        state.resampler = None;
        if was_running {
            info!(source = %self.source_id, "Audio retimer stopped");
        }
    }

    /// Writes a decoded block into the ring buffers.
    pub fn ingest(&self, block: &AudioBlock) {
        if !self.is_running() || block.frames == 0 || block.sample_rate == 0 {
            return;
        }

        let offset = match self.adjuster.offset() {
            Some(offset) => offset,
            None if self.config.audio_establishes_timing => self
                .adjuster
                .establish(self.clock.now_ns(), block.timestamp),
            None => {
                RetimerStats::inc(&self.stats.blocks_ignored);
                trace!(source = %self.source_id, ts = block.timestamp, "Timing not established, ignoring audio");
                return;
            }
        };
        let mut current = apply_offset(block.timestamp, offset);
        let duration = block.duration_ns();
        let rate = self.output.sample_rate;

        let mut guard = self.lock_state();
        let state = &mut *guard;

        let reset = match state.audio_time {
            None => true,
            Some(audio_time) => {
                current < audio_time || current - audio_time > self.config.audio_reset_threshold_ns
            }
        };
        if reset {
            state.buffers.clear();
            state.resampler = None;
            if let Some(audio_time) = state.audio_time.take() {
                RetimerStats::inc(&self.stats.audio_resets);
                self.adjuster.reset();
                if !self.config.audio_establishes_timing {
                    state.next_expected_time = 0;
                    RetimerStats::inc(&self.stats.blocks_ignored);
                    info!(
                        source = %self.source_id,
                        audio_time,
                        current_audio_time = current,
                        "Audio buffer reset, waiting for video timing"
                    );
                    return;
                }
                let offset = self.adjuster.establish(self.clock.now_ns(), block.timestamp);
                info!(
                    source = %self.source_id,
                    audio_time,
                    current_audio_time = current,
                    timing_adjust = offset,
                    "Audio buffer reset"
                );
                current = apply_offset(block.timestamp, offset);
            }
            state.audio_time = Some(current);
            state.next_expected_time = current;
        }

        let mut planes = remix_channels(block.to_planes(), self.output.channels);
        if block.sample_rate != rate {
            if state
                .resampler
                .as_ref()
                .is_none_or(|r| r.input_rate() != block.sample_rate)
            {
                debug!(
                    source = %self.source_id,
                    from = block.sample_rate,
                    to = rate,
                    "Creating resampler"
                );
                state.resampler = Some(Resampler::new(block.sample_rate, rate, self.output.channels));
            }
            if let Some(resampler) = state.resampler.as_mut() {
                planes = resampler.process(&planes);
            }
        } else {
            state.resampler = None;
        }
        let frames = planes.first().map_or(0, Vec::len);

        let audio_time = state.audio_time.unwrap_or(current);
        let diff = state.next_expected_time.abs_diff(current);
        if diff > self.config.audio_smoothing_threshold_ns {
            let placement = ns_to_audio_frames(rate, current - audio_time) as usize;
            debug!(
                source = %self.source_id,
                diff,
                audio_time,
                current_audio_time = current,
                "Audio buffer placement"
            );
            state.buffers.place(placement, &planes, frames);
            state.next_expected_time = current;
            RetimerStats::inc(&self.stats.drift_placements);
        } else {
            state.buffers.push_back(&planes, frames);
        }

        state.next_expected_time += duration;
        RetimerStats::inc(&self.stats.blocks_ingested);
    }

    /// Serves the oldest pending window from the buffers.
    fn consume(
        &self,
        state: &mut AudioState,
        audio_time: u64,
        window: TimeWindow,
        quantum: &mut AudioQuantum,
    ) -> PullOutcome {
        let rate = self.output.sample_rate;
        let frames = quantum.frames();

        let (lead, start_frame) = if audio_time < window.start {
            (ns_to_audio_frames(rate, window.start - audio_time) as usize, 0)
        } else {
            let start_frame = ns_to_audio_frames(rate, audio_time - window.start) as usize;
            (0, start_frame.min(frames))
        };
        let needed = lead + frames - start_frame;
        if state.buffers.len_frames() < needed {
            return PullOutcome::Underrun;
        }

        state.buffers.pop_front(lead);
        for plane in &mut quantum.planes {
            plane[..start_frame].fill(0.0);
        }
        state
            .buffers
            .pop_front_into(frames - start_frame, &mut quantum.planes, start_frame);
        state.audio_time = Some(window.end);
        PullOutcome::Samples
    }
}

impl AudioPull for AudioRetimer {
    fn pull(&self, start: u64, end: u64, quantum: &mut AudioQuantum) -> bool {
        if !self.is_running() {
            return false;
        }

        let mut guard = self.lock_state();
        let state = &mut *guard;

        let window = TimeWindow::new(start, end);
        if state.pending.newest() != Some(window) {
            state.pending.push(window);
        }
        let Some(oldest) = state.pending.oldest() else {
            return false;
        };
        quantum.timestamp = oldest.start;

        let outcome = match state.audio_time {
            None => {
                state.reset_buffers();
                PullOutcome::Silence
            }
            Some(_) if self.playback.is_paused() => {
                state.reset_buffers();
                PullOutcome::Silence
            }
            Some(audio_time) if audio_time >= oldest.end => {
                debug!(
                    source = %self.source_id,
                    audio_time,
                    window_end = oldest.end,
                    "Audio running ahead"
                );
                PullOutcome::Silence
            }
            Some(audio_time) => self.consume(state, audio_time, oldest, quantum),
        };

        let outcome = match outcome {
            PullOutcome::Underrun
                if state.pending.span_to(end) >= self.config.max_pending_window_span_ns =>
            {
                debug!(
                    source = %self.source_id,
                    window_start = oldest.start,
                    window_end = oldest.end,
                    "Pending audio window expired"
                );
                RetimerStats::inc(&self.stats.expired_windows);
                PullOutcome::Silence
            }
            outcome => outcome,
        };

        match outcome {
            PullOutcome::Silence => {
                quantum.silence();
                state.pending.pop_oldest();
                RetimerStats::inc(&self.stats.silent_quanta);
                true
            }
            PullOutcome::Samples => {
                state.pending.pop_oldest();
                RetimerStats::inc(&self.stats.real_quanta);
                trace!(source = %self.source_id, start = oldest.start, end = oldest.end, "Audio quantum");
                true
            }
            PullOutcome::Underrun => {
                RetimerStats::inc(&self.stats.underruns);
                trace!(
                    source = %self.source_id,
                    buffered = state.buffers.len_frames(),
                    pending = state.pending.len(),
                    "Audio underrun"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use tracing_test::traced_test;

    use super::*;
    use crate::time::{ManualClock, audio_frames_to_ns};

    const RATE: u32 = 48_000;
    const QUANTUM: usize = 1024;

    fn retimer(clock: Arc<ManualClock>) -> (AudioRetimer, Arc<AtomicBool>) {
        let paused = Arc::new(AtomicBool::new(false));
        let output = AudioOutputInfo {
            name: "test".into(),
            sample_rate: RATE,
            channels: 2,
            quantum_frames: QUANTUM,
        };
        let retimer = AudioRetimer::new(
            "test",
            output,
            RetimerConfig::default(),
            clock,
            Arc::new(ClockAdjuster::new()),
            paused.clone(),
            Arc::new(RetimerStats::new()),
        );
        retimer.start().unwrap();
        (retimer, paused)
    }

    fn ingest(retimer: &AudioRetimer, ts: u64, value: f32) {
        let samples = vec![value; QUANTUM * 2];
        retimer.ingest(&AudioBlock::interleaved(&samples, 2, RATE, ts));
    }

    #[test]
    #[traced_test]
    fn discontinuity_is_logged() {
        let clock = Arc::new(ManualClock::new(1_000));
        let (retimer, _) = retimer(clock);
        ingest(&retimer, 0, 0.1);
        ingest(&retimer, 5_000_000_000, 0.2);
        assert!(logs_contain("Audio buffer reset"));
        assert_eq!(retimer.stats.snapshot().audio_resets, 1);
    }

    #[test]
    #[traced_test]
    fn drift_placement_is_logged() {
        let clock = Arc::new(ManualClock::new(0));
        let (retimer, _) = retimer(clock);
        ingest(&retimer, 0, 0.1);
        ingest(&retimer, 200_000_000, 0.2);
        assert!(logs_contain("Audio buffer placement"));

        let placed = ns_to_audio_frames(RATE, 200_000_000) as usize;
        assert_eq!(retimer.buffered_frames(), placed + QUANTUM);
        assert_eq!(
            retimer.drift().next_expected_time,
            200_000_000 + audio_frames_to_ns(RATE, QUANTUM as u64)
        );
    }

    #[test]
    fn paused_source_yields_silence_and_flushes() {
        let clock = Arc::new(ManualClock::new(0));
        let (retimer, paused) = retimer(clock);
        ingest(&retimer, 0, 0.5);
        paused.store(true, Ordering::Release);

        let mut quantum = AudioQuantum::new(2, QUANTUM);
        assert!(retimer.pull(0, audio_frames_to_ns(RATE, QUANTUM as u64), &mut quantum));
        assert!(quantum.is_silent());
        assert_eq!(retimer.buffered_frames(), 0);
        assert_eq!(retimer.drift().audio_time, None);
    }

    #[test]
    fn ingest_without_timing_is_ignored_when_audio_cannot_establish() {
        let clock: Arc<dyn OutputClock> = Arc::new(ManualClock::new(0));
        let output = AudioOutputInfo {
            name: String::new(),
            sample_rate: RATE,
            channels: 1,
            quantum_frames: QUANTUM,
        };
        let config = RetimerConfig {
            audio_establishes_timing: false,
            ..Default::default()
        };
        let retimer = AudioRetimer::new(
            "test",
            output,
            config,
            clock,
            Arc::new(ClockAdjuster::new()),
            Arc::new(AtomicBool::new(false)),
            Arc::new(RetimerStats::new()),
        );
        retimer.start().unwrap();
        retimer.ingest(&AudioBlock::interleaved(&[0.1; QUANTUM], 1, RATE, 10));
        assert_eq!(retimer.buffered_frames(), 0);
        assert_eq!(retimer.stats.snapshot().blocks_ignored, 1);
    }

    #[test]
    fn resamples_mismatched_rate() {
        let clock = Arc::new(ManualClock::new(0));
        let (retimer, _) = retimer(clock);
        let samples = vec![0.3f32; 441 * 2];
        retimer.ingest(&AudioBlock::interleaved(&samples, 2, 44_100, 0));
        let buffered = retimer.buffered_frames();
        assert!((478..=480).contains(&buffered), "{buffered}");
        assert_eq!(retimer.channel_lens()[0], retimer.channel_lens()[1]);
    }

    #[test]
    fn reset_discards_resampler_history() {
        let clock = Arc::new(ManualClock::new(0));
        let (retimer, _) = retimer(clock);
        let loud = vec![1.0f32; 441 * 2];
        let quiet = vec![0.0f32; 441 * 2];
        retimer.ingest(&AudioBlock::interleaved(&loud, 2, 44_100, 0));
        retimer.ingest(&AudioBlock::interleaved(&quiet, 2, 44_100, 5_000_000_000));
        assert_eq!(retimer.stats.snapshot().audio_resets, 1);

        let buffered = retimer.buffered_frames();
        let mut out = vec![1.0f32; buffered];
        assert_eq!(retimer.lock_state().buffers.peek_front(0, &mut out), buffered);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    #[traced_test]
    fn reset_waits_for_video_timing_when_audio_cannot_establish() {
        let clock: Arc<dyn OutputClock> = Arc::new(ManualClock::new(1_000_000_000));
        let adjuster = Arc::new(ClockAdjuster::new());
        let output = AudioOutputInfo {
            name: String::new(),
            sample_rate: RATE,
            channels: 1,
            quantum_frames: QUANTUM,
        };
        let config = RetimerConfig {
            audio_establishes_timing: false,
            ..Default::default()
        };
        let retimer = AudioRetimer::new(
            "test",
            output,
            config,
            clock,
            adjuster.clone(),
            Arc::new(AtomicBool::new(false)),
            Arc::new(RetimerStats::new()),
        );
        retimer.start().unwrap();
        adjuster.observe(1_000_000_000, 0);

        retimer.ingest(&AudioBlock::interleaved(&[0.1; QUANTUM], 1, RATE, 0));
        assert_eq!(retimer.buffered_frames(), QUANTUM);

        retimer.ingest(&AudioBlock::interleaved(&[0.1; QUANTUM], 1, RATE, 9_000_000_000));
        assert!(logs_contain("waiting for video timing"));
        assert_eq!(adjuster.offset(), None);
        assert_eq!(retimer.buffered_frames(), 0);
        assert_eq!(retimer.drift().audio_time, None);

        adjuster.observe(2_000_000_000, 9_100_000_000);
        retimer.ingest(&AudioBlock::interleaved(&[0.1; QUANTUM], 1, RATE, 9_100_000_000));
        assert_eq!(retimer.drift().audio_time, Some(2_000_000_000));
        assert_eq!(retimer.stats.snapshot().audio_resets, 1);
    }
}
