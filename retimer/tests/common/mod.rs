// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Test doubles shared by the integration tests.
//!
//! - [`ScriptedSource`]: a media source the test pushes frames and blocks through
//! - [`RecordingEncoder`]: an encoder that records every submitted frame and
//!   lets the test drive audio pulls
//! - [`EventLog`]: ordered record of lifecycle calls across doubles

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use retimer::{
    AudioBlock, AudioOutputInfo, AudioPull, AudioQuantum, AudioRetimer, ClockAdjuster, Encoder,
    Error, Frame, ManualClock, MediaListener, MediaSource, OutputFrame, OutputSettings,
    PixelFormat, PlaybackState, Rate, Result, RetimerConfig, RetimerStats, VideoOutputInfo,
    VideoRetimer, VideoSink,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes logging once (respects the RUST_LOG environment variable).
pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
}

pub const SAMPLE_RATE: u32 = 48_000;
pub const QUANTUM: usize = 1024;

/// Ordered lifecycle events shared between doubles.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// One call to [`VideoSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub count: u32,
    pub timestamp: u64,
    /// BGRA value of the top-left pixel.
    pub pixel: [u8; 4],
}

#[derive(Default)]
pub struct RecordingSink {
    pub submitted: Mutex<Vec<Submitted>>,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<Submitted> {
        self.submitted.lock().unwrap().clone()
    }

    /// Output intervals covered so far, counting duplicates.
    pub fn intervals(&self) -> u64 {
        self.frames().iter().map(|s| s.count as u64).sum()
    }
}

impl VideoSink for RecordingSink {
    fn submit(&self, frame: &OutputFrame, count: u32, timestamp: u64) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.submitted.lock().unwrap().push(Submitted {
            count,
            timestamp,
            pixel: frame.pixel(0, 0).unwrap_or_default(),
        });
    }
}

/// Encoder double: hands out a [`RecordingSink`] and keeps the audio pull
/// callback so the test can act as the encoder's audio clock.
pub struct RecordingEncoder {
    pub sink: Arc<RecordingSink>,
    pub opened: Mutex<Option<OutputSettings>>,
    audio: Mutex<Option<Arc<dyn AudioPull>>>,
    fail: bool,
    log: EventLog,
}

impl RecordingEncoder {
    pub fn new(log: EventLog) -> Self {
        Self {
            sink: Arc::new(RecordingSink::default()),
            opened: Mutex::new(None),
            audio: Mutex::new(None),
            fail: false,
            log,
        }
    }

    /// An encoder whose `open` always fails.
    pub fn failing(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    /// Pulls one quantum for `[start, end)` like the encoder's audio clock.
    pub fn pull(&self, start: u64, end: u64, quantum: &mut AudioQuantum) -> Option<bool> {
        let audio = self.audio.lock().unwrap().clone()?;
        Some(audio.pull(start, end, quantum))
    }

    pub fn is_open(&self) -> bool {
        self.audio.lock().unwrap().is_some()
    }
}

impl Encoder for RecordingEncoder {
    fn open(
        &self,
        settings: &OutputSettings,
        audio: Arc<dyn AudioPull>,
    ) -> Result<Arc<dyn VideoSink>> {
        if self.fail {
            self.log.push("encoder-open-failed");
            return Err(Error::OutputOpen(format!(
                "refusing to open {}",
                settings.video.name
            )));
        }
        self.log.push("encoder-open");
        *self.opened.lock().unwrap() = Some(settings.clone());
        *self.audio.lock().unwrap() = Some(audio);
        self.sink.closed.store(false, Ordering::Release);
        Ok(self.sink.clone())
    }

    fn close(&self) {
        self.log.push("encoder-close");
        self.audio.lock().unwrap().take();
        self.sink.closed.store(true, Ordering::Release);
    }
}

/// Media source double. The test pushes media with [`ScriptedSource::push_frame`]
/// and [`ScriptedSource::push_audio`].
pub struct ScriptedSource {
    id: String,
    pub paused: AtomicBool,
    listener: Mutex<Option<Arc<dyn MediaListener>>>,
    log: EventLog,
}

impl ScriptedSource {
    pub fn new(id: &str, log: EventLog) -> Self {
        Self {
            id: id.to_string(),
            paused: AtomicBool::new(false),
            listener: Mutex::new(None),
            log,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    pub fn push_frame(&self, frame: &Frame) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_video_frame(frame);
        }
    }

    pub fn push_audio(&self, block: &AudioBlock<'_>) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.on_audio_block(block);
        }
    }
}

impl PlaybackState for ScriptedSource {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl MediaSource for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn connect(&self, listener: Arc<dyn MediaListener>) {
        self.log.push("source-connect");
        *self.listener.lock().unwrap() = Some(listener);
    }

    fn disconnect(&self) {
        self.log.push("source-disconnect");
        self.listener.lock().unwrap().take();
    }
}

/// A BGRA frame whose every pixel is `[value, value, value, 255]`.
pub fn bgra_frame(width: u32, height: u32, timestamp: u64, value: u8) -> Frame {
    let mut frame = Frame::new(PixelFormat::Bgra, width, height, timestamp);
    for px in frame.planes[0].chunks_exact_mut(4) {
        px.copy_from_slice(&[value, value, value, 255]);
    }
    frame
}

/// Stereo output with the standard quantum.
pub fn audio_output() -> AudioOutputInfo {
    AudioOutputInfo {
        name: "audio".into(),
        sample_rate: SAMPLE_RATE,
        channels: 2,
        quantum_frames: QUANTUM,
    }
}

/// A started stereo audio retimer on a manual clock, with its adjuster and
/// pause flag.
pub fn audio_retimer(
    clock: Arc<ManualClock>,
    config: RetimerConfig,
) -> (Arc<AudioRetimer>, Arc<ClockAdjuster>, Arc<AtomicBool>, Arc<RetimerStats>) {
    let adjuster = Arc::new(ClockAdjuster::new());
    let paused = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(RetimerStats::new());
    let retimer = Arc::new(AudioRetimer::new(
        "audio-test",
        audio_output(),
        config,
        clock,
        adjuster.clone(),
        paused.clone(),
        stats.clone(),
    ));
    retimer.start().unwrap();
    (retimer, adjuster, paused, stats)
}

/// A started video retimer with 8x8 BGRA output at `fps`.
pub fn video_retimer(
    fps: u32,
    config: RetimerConfig,
) -> (Arc<VideoRetimer>, Arc<RecordingSink>, Arc<ClockAdjuster>, Arc<RetimerStats>) {
    let adjuster = Arc::new(ClockAdjuster::new());
    let stats = Arc::new(RetimerStats::new());
    let output = VideoOutputInfo {
        name: "video".into(),
        width: 8,
        height: 8,
        frame_rate: Rate::new(fps, 1),
        format: PixelFormat::Bgra,
    };
    let retimer = Arc::new(VideoRetimer::new(
        "video-test",
        output,
        config,
        adjuster.clone(),
        stats.clone(),
    ));
    let sink = Arc::new(RecordingSink::default());
    retimer.start(sink.clone()).unwrap();
    (retimer, sink, adjuster, stats)
}

/// Interleaved stereo samples where frame `i` holds `base + i` on the left
/// channel and `-(base + i)` on the right.
pub fn ramp(base: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .flat_map(|i| {
            let v = base + i as f32;
            [v, -v]
        })
        .collect()
}
