// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the audio retimer.
//!
//! # Test Coverage
//!
//! - Underrun and recovery on the pull side
//! - Fixed quantum size of every answered pull
//! - Monotonic consumed audio time
//! - Drift correction under jitter without resets
//! - Reset on a timestamp discontinuity
//! - Recovery after the source loops back without any video timing
//! - Pending window expiry and stale windows

mod common;

use std::sync::Arc;

use common::{QUANTUM, SAMPLE_RATE, audio_retimer, ramp, setup_logging};
use retimer::{
    AudioBlock, AudioPull, AudioQuantum, ManualClock, RetimerConfig, time::audio_frames_to_ns,
};

const BASE: u64 = 1_000_000_000;

/// Source timestamp of block `k` in a gapless stream.
fn block_ts(k: u64) -> u64 {
    audio_frames_to_ns(SAMPLE_RATE, k * QUANTUM as u64)
}

/// Output window `k` when the output clock is `BASE` ahead of the source.
fn window(k: u64) -> (u64, u64) {
    (BASE + block_ts(k), BASE + block_ts(k + 1))
}

fn block(samples: &[f32], ts: u64) -> AudioBlock<'_> {
    AudioBlock::interleaved(samples, 2, SAMPLE_RATE, ts)
}

// Small xorshift generator so jitter sequences are reproducible.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// Uniform value in `[-bound, bound]`.
    fn jitter(&mut self, bound: i64) -> i64 {
        (self.next() % (2 * bound as u64 + 1)) as i64 - bound
    }
}

#[test]
fn underrun_then_recovery() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, stats) = audio_retimer(clock, RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);

    let first = ramp(0.0, QUANTUM);
    audio.ingest(&block(&first, block_ts(0)));
    let (start, end) = window(0);
    assert!(audio.pull(start, end, &mut quantum));
    assert_eq!(quantum.planes[0][10], 10.0);

    let (start, end) = window(1);
    for _ in 0..3 {
        assert!(!audio.pull(start, end, &mut quantum));
    }
    assert_eq!(audio.pending_windows(), 1);
    assert_eq!(stats.snapshot().underruns, 3);

    let second = ramp(QUANTUM as f32, QUANTUM);
    audio.ingest(&block(&second, block_ts(1)));
    assert!(audio.pull(start, end, &mut quantum));

    assert_eq!(quantum.timestamp, start);
    assert_eq!(quantum.planes[0][0], 1024.0);
    assert_eq!(quantum.planes[0][1023], 2047.0);
    assert_eq!(quantum.planes[1][1023], -2047.0);
    assert_eq!(audio.pending_windows(), 0);
    assert_eq!(audio.drift().audio_time, Some(end));
}

#[test]
fn no_audio_yields_silence() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, stats) = audio_retimer(clock, RetimerConfig::default());

    let mut quantum = AudioQuantum::new(2, QUANTUM);
    quantum.planes[0].fill(1.0);
    let (start, end) = window(0);
    assert!(audio.pull(start, end, &mut quantum));
    assert!(quantum.is_silent());
    assert_eq!(stats.snapshot().silent_quanta, 1);
}

#[test]
fn every_answered_pull_is_one_quantum() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, _) = audio_retimer(clock, RetimerConfig::default());
    let mut rng = XorShift(0x2545_f491_4f6c_dd1d);

    for quantum_frames in [QUANTUM, 480] {
        let mut quantum = AudioQuantum::new(2, quantum_frames);
        let q = audio_frames_to_ns(SAMPLE_RATE, quantum_frames as u64);
        let mut next_window = BASE;
        for k in 0..200u64 {
            let jitter = if k < 3 { 0 } else { rng.jitter(5_000_000) };
            let ts = (block_ts(k) as i64 + jitter) as u64;
            let samples = ramp(k as f32, QUANTUM);
            audio.ingest(&block(&samples, ts));

            if audio.pull(next_window, next_window + q, &mut quantum) {
                assert_eq!(quantum.channels(), 2);
                assert!(quantum.planes.iter().all(|p| p.len() == quantum_frames));
                next_window += q;
            }
        }
        audio.stop();
        audio.start().unwrap();
    }
}

#[test]
fn audio_time_is_monotonic_between_resets() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, stats) = audio_retimer(clock, RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);

    let mut last_audio_time = 0;
    let mut last_resets = 0;
    let mut decreases = 0;
    let mut pulled = 0u64;
    for k in 0..300u64 {
        // Rewind the source by three seconds halfway through.
        let source_k = if k < 150 { k } else { k - 140 };
        let jitter = if k < 3 { 0 } else { rng.jitter(5_000_000) };
        let ts = (block_ts(source_k) as i64 + jitter) as u64;
        let samples = ramp(0.0, QUANTUM);
        audio.ingest(&block(&samples, ts));

        // Keep a few blocks of slack so jitter never lands behind audio time.
        let (start, end) = window(pulled);
        if k >= 5 && audio.pull(start, end, &mut quantum) {
            pulled += 1;
        }

        let audio_time = audio.drift().audio_time.unwrap_or(0);
        let resets = stats.snapshot().audio_resets;
        if audio_time < last_audio_time {
            assert!(resets > last_resets, "audio time went back without a reset at block {k}");
            decreases += 1;
        }
        last_audio_time = audio_time;
        last_resets = resets;
    }
    assert_eq!(decreases, 1);
    assert!(stats.snapshot().audio_resets >= 1);
}

#[test]
fn jitter_below_threshold_never_resets() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let config = RetimerConfig::default();
    let threshold = config.audio_smoothing_threshold_ns;
    let (audio, _, _, stats) = audio_retimer(clock, config);
    let mut rng = XorShift(0xdead_beef_cafe_f00d);
    let duration = block_ts(1);

    for k in 0..60u64 {
        let jitter = if k < 3 { 0 } else { rng.jitter(50_000_000) };
        let ts = (block_ts(k) as i64 + jitter) as u64;
        let samples = ramp(0.0, QUANTUM);
        audio.ingest(&block(&samples, ts));

        let drift = audio.drift();
        let offset = drift.timing_adjust.unwrap();
        let current = (ts as i64 + offset) as u64;
        let deviation = drift.next_expected_time.abs_diff(current + duration);
        assert!(deviation <= threshold, "block {k}: deviation {deviation}");

        let lens = audio.channel_lens();
        assert_eq!(lens[0], lens[1]);
    }

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.audio_resets, 0);
    assert_eq!(snapshot.blocks_ingested, 60);
}

#[test]
fn forward_jump_resets_once() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, stats) = audio_retimer(clock, RetimerConfig::default());
    let samples = ramp(0.0, QUANTUM);

    for k in 0..5 {
        audio.ingest(&block(&samples, block_ts(k)));
    }
    assert_eq!(audio.buffered_frames(), 5 * QUANTUM);

    let jumped = block_ts(4) + 5_000_000_000;
    audio.ingest(&block(&samples, jumped));
    assert_eq!(stats.snapshot().audio_resets, 1);
    assert_eq!(audio.buffered_frames(), QUANTUM);
    // The jumped block is re-anchored at the current output time.
    assert_eq!(audio.drift().audio_time, Some(BASE));
    assert_eq!(audio.drift().timing_adjust, Some(BASE as i64 - jumped as i64));

    audio.ingest(&block(&samples, jumped + block_ts(1)));
    assert_eq!(stats.snapshot().audio_resets, 1);
    assert_eq!(audio.buffered_frames(), 2 * QUANTUM);
}

#[test]
fn looped_source_resumes_real_audio() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, adjuster, _, stats) = audio_retimer(clock.clone(), RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);
    let source_start = 60_000_000_000;

    let mut pulled = 0u64;
    let mut real_after_loop = 0;
    for k in 0..570u64 {
        clock.advance_to(BASE + block_ts(k));
        // The source plays one minute in, then loops back to zero.
        let ts = if k < 100 {
            source_start + block_ts(k)
        } else {
            block_ts(k - 100)
        };
        let samples = ramp(1.0, QUANTUM);
        audio.ingest(&block(&samples, ts));

        let (start, end) = window(pulled);
        if k >= 5 && audio.pull(start, end, &mut quantum) {
            pulled += 1;
            if k >= 100 && !quantum.is_silent() {
                real_after_loop += 1;
            }
        }
        if k == 99 {
            assert_eq!(stats.snapshot().real_quanta, 95);
        }
    }

    assert_eq!(stats.snapshot().audio_resets, 1);
    assert_eq!(adjuster.offset(), Some((BASE + block_ts(100)) as i64));
    assert!(real_after_loop > 400, "only {real_after_loop} real quanta");
    assert!(stats.snapshot().underruns < 10);
}

#[test]
fn stalled_windows_expire_with_silence() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, stats) = audio_retimer(clock, RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);

    let samples = ramp(1.0, QUANTUM);
    audio.ingest(&block(&samples, block_ts(0)));
    let (start, end) = window(0);
    assert!(audio.pull(start, end, &mut quantum));

    for k in 1..24 {
        let (start, end) = window(k);
        assert!(!audio.pull(start, end, &mut quantum), "window {k}");
    }

    let (start, end) = window(24);
    assert!(audio.pull(start, end, &mut quantum));
    assert!(quantum.is_silent());
    assert_eq!(quantum.timestamp, window(1).0);
    assert_eq!(audio.pending_windows(), 23);
    assert_eq!(stats.snapshot().expired_windows, 1);
}

#[test]
fn windows_behind_audio_time_get_silence() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, _) = audio_retimer(clock, RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);

    let samples = ramp(1.0, QUANTUM);
    audio.ingest(&block(&samples, 0));

    let start = BASE - 500_000_000;
    assert!(audio.pull(start, start + block_ts(1), &mut quantum));
    assert!(quantum.is_silent());
    assert_eq!(quantum.timestamp, start);
    assert_eq!(audio.buffered_frames(), QUANTUM);
}

#[test]
fn late_start_in_window_is_zero_padded() {
    setup_logging();
    let clock = Arc::new(ManualClock::new(BASE));
    let (audio, _, _, _) = audio_retimer(clock, RetimerConfig::default());
    let mut quantum = AudioQuantum::new(2, QUANTUM);
    quantum.planes[0].fill(9.0);

    // Audio starts 256 frames into the first window.
    let lead = audio_frames_to_ns(SAMPLE_RATE, 256);
    let samples = ramp(1.0, QUANTUM);
    audio.ingest(&block(&samples, 0));

    let start = BASE - lead;
    let end = start + block_ts(1);
    assert!(audio.pull(start, end, &mut quantum));
    assert!(quantum.planes[0][..256].iter().all(|&s| s == 0.0));
    assert_eq!(quantum.planes[0][256], 1.0);
    assert_eq!(quantum.planes[0][1023], 768.0);
    assert_eq!(audio.buffered_frames(), 256);
}
