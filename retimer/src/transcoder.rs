// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-source transcoder lifecycle.
//!
//! [`SourceTranscoder`] wires a [`MediaSource`] to an [`Encoder`] through a
//! [`VideoRetimer`] and an [`AudioRetimer`] sharing one [`ClockAdjuster`].
//! It owns the order in which those pieces are brought up and torn down.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    Result,
    audio::{AudioBlock, AudioRetimer},
    cadence::{CadenceSource, Tick},
    clock::ClockAdjuster,
    config::{OutputSettings, RetimerConfig},
    io::{AudioPull, Encoder, MediaListener, MediaSource, SourcePlayback},
    stats::{RetimerStats, StatsSnapshot},
    time::OutputClock,
    video::{Frame, VideoRetimer},
};

/// Forwards decoder callbacks to the retimers.
struct RetimerListener {
    video: Arc<VideoRetimer>,
    audio: Arc<AudioRetimer>,
}

impl MediaListener for RetimerListener {
    fn on_video_frame(&self, frame: &Frame) {
        self.video.ingest(frame);
    }

    fn on_audio_block(&self, block: &AudioBlock<'_>) {
        self.audio.ingest(block);
    }
}

/// Re-times one source onto a dedicated fixed-rate encoder output.
///
/// # Lifecycle
///
/// [`SourceTranscoder::start`] starts the audio retimer, opens the encoder
/// channels, starts the video retimer and its cadence, and finally connects
/// to the source. Any failure unwinds the steps already taken and is
/// returned; nothing keeps running.
///
/// [`SourceTranscoder::stop`] disconnects from the source, closes the
/// encoder, joins the cadence, drains the video FIFO, flushes the audio
/// buffers and forgets the clock offset. It is idempotent and also runs on
/// drop.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use retimer::{
///     Encoder, MediaSource, MonotonicClock, OutputSettings, Rate, RetimerConfig,
///     SourceTranscoder, ThreadCadence,
/// };
///
/// # fn run(source: Arc<dyn MediaSource>, encoder: Arc<dyn Encoder>) -> retimer::Result<()> {
/// let clock = Arc::new(MonotonicClock::new());
/// let settings = OutputSettings::new(1920, 1080, Rate::new(30, 1), 48_000, 2);
/// let cadence = Box::new(ThreadCadence::new(clock.clone(), "video-cadence"));
///
/// let mut transcoder =
///     SourceTranscoder::new(source, encoder, settings, RetimerConfig::default(), clock, cadence)?;
/// transcoder.start()?;
/// // ...
/// transcoder.stop();
/// # Ok(())
/// # }
/// ```
pub struct SourceTranscoder {
    session: Uuid,
    source: Arc<dyn MediaSource>,
    encoder: Arc<dyn Encoder>,
    settings: OutputSettings,
    adjuster: Arc<ClockAdjuster>,
    stats: Arc<RetimerStats>,
    video: Arc<VideoRetimer>,
    audio: Arc<AudioRetimer>,
    cadence: Box<dyn CadenceSource>,
    span: tracing::Span,
    running: bool,
}

impl SourceTranscoder {
    /// Creates a stopped transcoder.
    ///
    /// The output channels are named after the source id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] or
    /// [`crate::Error::UnsupportedFormat`] if `settings` or `config` are
    /// unusable.
    pub fn new(
        source: Arc<dyn MediaSource>,
        encoder: Arc<dyn Encoder>,
        settings: OutputSettings,
        config: RetimerConfig,
        clock: Arc<dyn OutputClock>,
        cadence: Box<dyn CadenceSource>,
    ) -> Result<Self> {
        settings.validate()?;
        config.validate()?;

        let source_id = source.id().to_string();
        let settings = settings.with_source_names(&source_id);
        let session = Uuid::new_v4();
        let span = tracing::info_span!("transcoder", source = %source_id, session = %session);

        let adjuster = Arc::new(ClockAdjuster::new());
        let stats = Arc::new(RetimerStats::new());
        let video = Arc::new(VideoRetimer::new(
            source_id.clone(),
            settings.video.clone(),
            config.clone(),
            adjuster.clone(),
            stats.clone(),
        ));
        let audio = Arc::new(AudioRetimer::new(
            source_id,
            settings.audio.clone(),
            config,
            clock,
            adjuster.clone(),
            Arc::new(SourcePlayback(source.clone())),
            stats.clone(),
        ));

        Ok(Self {
            session,
            source,
            encoder,
            settings,
            adjuster,
            stats,
            video,
            audio,
            cadence,
            span,
            running: false,
        })
    }

    /// Unique id of this transcoder, attached to every log line it emits.
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    /// Output settings with channel names applied.
    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn video(&self) -> &Arc<VideoRetimer> {
        &self.video
    }

    pub fn audio(&self) -> &Arc<AudioRetimer> {
        &self.audio
    }

    /// Current event counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Brings the output path up.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::AlreadyRunning`] if started twice, and any
    /// error from opening the encoder, creating the scale context or starting
    /// the cadence.
    pub fn start(&mut self) -> Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();

        if self.running {
            return Err(crate::Error::AlreadyRunning);
        }
        self.stats.clear();
        self.adjuster.reset();

        self.audio.start()?;

        let pull: Arc<dyn AudioPull> = self.audio.clone();
        let sink = match self.encoder.open(&self.settings, pull) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open output channels");
                self.audio.stop();
                return Err(e);
            }
        };

        if let Err(e) = self.video.start(sink) {
            self.encoder.close();
            self.audio.stop();
            return Err(e);
        }

        let video = self.video.clone();
        let tick_span = self.span.clone();
        let on_tick = Box::new(move |tick: Tick| {
            let _entered = tick_span.enter();
            video.tick(tick);
        });
        if let Err(e) = self.cadence.start(self.video.interval_ns(), on_tick) {
            tracing::error!(error = %e, "Failed to start video cadence");
            self.encoder.close();
            self.video.stop();
            self.audio.stop();
            return Err(e);
        }

        self.source.connect(Arc::new(RetimerListener {
            video: self.video.clone(),
            audio: self.audio.clone(),
        }));
        self.running = true;

        tracing::info!(
            video = %self.settings.video.name,
            audio = %self.settings.audio.name,
            "Transcoder started"
        );
        Ok(())
    }

    /// Tears the output path down. Does nothing if not running.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        let _entered = self.span.enter();
        self.running = false;

        self.source.disconnect();
        self.encoder.close();
        self.cadence.stop();
        self.video.stop();
        self.audio.stop();
        self.adjuster.reset();

        let stats = self.stats.snapshot();
        tracing::info!(
            frames_submitted = stats.frames_submitted,
            audio_resets = stats.audio_resets,
            underruns = stats.underruns,
            "Transcoder stopped"
        );
    }
}

impl Drop for SourceTranscoder {
    /// Stops the transcoder if it is still running.
    fn drop(&mut self) {
        self.stop();
    }
}
