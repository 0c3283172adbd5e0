// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runs a simulated decoder through a transcoder and prints the resulting
//! counters as JSON.
//!
//! Time is simulated with a [`ManualClock`], so ten seconds of output take a
//! fraction of a second to produce. Audio timestamps can be jittered and the
//! source can jump forward to watch the retimers correct themselves.
//!
//! ```text
//! cargo run --example simulate -- --seconds 10 --jitter-ms 30 --jump-at 4
//! ```

mod common;

use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use clap::Parser;
use retimer::{
    OutputClock, AudioBlock, AudioPull, AudioQuantum, Encoder, ExternalCadence, Frame, ManualClock,
    MediaListener, MediaSource, OutputFrame, OutputSettings, PixelFormat, PlaybackState, Rate,
    Result, RetimerConfig, SourceTranscoder, VideoSink,
    time::{NS_PER_SEC, audio_frames_to_ns},
};

#[derive(Parser, Debug)]
#[command(version, about = "Simulate a decoder feeding a retimed output")]
struct Opts {
    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Output frame rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Output sample rate.
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    /// Maximum audio timestamp jitter in milliseconds.
    #[arg(long, default_value_t = 0)]
    jitter_ms: u64,

    /// Second at which the source timestamps jump five seconds forward.
    #[arg(long)]
    jump_at: Option<u64>,

    /// Seed for the jitter sequence.
    #[arg(long, default_value_t = 0x9e37_79b9)]
    seed: u64,

    /// Retimer configuration as JSON.
    #[arg(long)]
    config: Option<PathBuf>,
}

const QUANTUM: usize = 1024;
const CHANNELS: usize = 2;

/// Source whose listener is driven directly by the simulation loop.
#[derive(Default)]
struct SimSource {
    listener: Mutex<Option<Arc<dyn MediaListener>>>,
}

impl SimSource {
    fn listener(&self) -> Option<Arc<dyn MediaListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PlaybackState for SimSource {
    fn is_paused(&self) -> bool {
        false
    }
}

impl MediaSource for SimSource {
    fn id(&self) -> &str {
        "sim"
    }

    fn connect(&self, listener: Arc<dyn MediaListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn disconnect(&self) {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[derive(Default)]
struct CountingSink {
    intervals: AtomicU64,
}

impl VideoSink for CountingSink {
    fn submit(&self, _frame: &OutputFrame, count: u32, _timestamp: u64) {
        self.intervals.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Encoder that hands its audio pull callback back to the simulation.
#[derive(Default)]
struct SimEncoder {
    sink: Arc<CountingSink>,
    audio: Mutex<Option<Arc<dyn AudioPull>>>,
}

impl Encoder for SimEncoder {
    fn open(
        &self,
        settings: &OutputSettings,
        audio: Arc<dyn AudioPull>,
    ) -> Result<Arc<dyn VideoSink>> {
        tracing::info!(
            video = %settings.video.name,
            audio = %settings.audio.name,
            "Opened output"
        );
        *self.audio.lock().unwrap_or_else(PoisonError::into_inner) = Some(audio);
        Ok(self.sink.clone())
    }

    fn close(&self) {
        self.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn main() -> Result<()> {
    common::setup_logging();
    let opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| retimer::Error::Other(format!("{}: {e}", path.display())))?;
            RetimerConfig::from_json(&json)?
        }
        None => RetimerConfig::default(),
    };
    let settings = OutputSettings::new(
        opts.width,
        opts.height,
        Rate::new(opts.fps, 1),
        opts.sample_rate,
        CHANNELS,
    );
    let frame_interval = settings.video.frame_rate.interval_ns();

    let clock = Arc::new(ManualClock::new(NS_PER_SEC));
    let source = Arc::new(SimSource::default());
    let encoder = Arc::new(SimEncoder::default());
    let cadence = ExternalCadence::new();
    let hook = cadence.hook();

    let mut transcoder = SourceTranscoder::new(
        source.clone(),
        encoder.clone(),
        settings,
        config,
        clock.clone(),
        Box::new(cadence),
    )?;
    transcoder.start()?;

    let origin = clock.now_ns();
    let until = origin + opts.seconds * NS_PER_SEC;
    let jump_at = opts.jump_at.map(|s| origin + s * NS_PER_SEC);
    let source_ts = |at: u64| {
        let ts = at - origin;
        match jump_at {
            Some(jump) if at >= jump => ts + 5 * NS_PER_SEC,
            _ => ts,
        }
    };
    let block_offset = |n: u64| audio_frames_to_ns(opts.sample_rate, n * QUANTUM as u64);

    let mut frame = Frame::new(PixelFormat::Bgra, opts.width, opts.height, 0);
    let samples = vec![0.25f32; QUANTUM * CHANNELS];
    let mut quantum = AudioQuantum::new(CHANNELS, QUANTUM);
    let mut jitter = common::Jitter::new(opts.seed);
    let (mut frames, mut blocks, mut pulls) = (0u64, 0u64, 0u64);
    let mut pull_at = origin + block_offset(1);

    loop {
        let frame_at = origin + frames * frame_interval;
        let block_at = origin + block_offset(blocks);
        let now = frame_at.min(block_at).min(pull_at);
        if now >= until {
            break;
        }
        clock.advance_to(now);
        let listener = source.listener();

        if block_at == now {
            let ts = source_ts(now)
                .saturating_add_signed(jitter.sample(opts.jitter_ms * 1_000_000));
            if let Some(listener) = &listener {
                listener.on_audio_block(&AudioBlock::interleaved(
                    &samples,
                    CHANNELS,
                    opts.sample_rate,
                    ts,
                ));
            }
            blocks += 1;
        }
        if frame_at == now {
            frame.timestamp = source_ts(now);
            if let Some(listener) = &listener {
                listener.on_video_frame(&frame);
            }
            hook.render(now);
            frames += 1;
        }
        if pull_at == now {
            let audio = encoder
                .audio
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let window_start = origin + block_offset(pulls);
            let window_end = origin + block_offset(pulls + 1);
            match audio.map(|a| a.pull(window_start, window_end, &mut quantum)) {
                Some(true) => {
                    pulls += 1;
                    pull_at = (origin + block_offset(pulls + 1)).max(now + 1);
                }
                _ => pull_at = now + NS_PER_SEC / 1000,
            }
        }
    }

    let stats = transcoder.stats();
    transcoder.stop();

    tracing::info!(
        intervals = encoder.sink.intervals.load(Ordering::Relaxed),
        quanta = pulls,
        "Simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
