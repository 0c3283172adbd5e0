// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # Retimer - per-source output re-timing
//!
//! Takes the video frames and audio blocks a decoder delivers irregularly and
//! re-emits them as two steady, fixed-rate streams for a dedicated encoder:
//! fixed-size BGRA video at a fixed frame rate, and fixed-size planar `f32`
//! audio quanta at a fixed sample rate.
//!
//! ## Overview
//!
//! ### Key Concepts
//!
//! - **Source clock domain**: the timestamps a decoder attaches to its output
//! - **Output clock domain**: the wall-clock-aligned time the encoder consumes ([`OutputClock`])
//! - **Timing adjust**: the offset between the two, tracked by [`ClockAdjuster`]
//! - **Cadence**: one tick per output video interval ([`CadenceSource`])
//! - **Quantum**: one fixed-size unit of audio requested per pull ([`AudioQuantum`])
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  frames   ┌──────────────┐  tick   ┌──────────────┐
//! │ MediaSource ├──────────►│ VideoRetimer │◄────────┤ Cadence      │
//! │ (decoder)   │           └──────┬───────┘         └──────────────┘
//! │             │                  │ submit
//! │             │  blocks   ┌──────▼───────┐  pull   ┌──────────────┐
//! │             ├──────────►│ AudioRetimer │◄────────┤ Encoder      │
//! └─────────────┘           └──────────────┘         └──────────────┘
//! ```
//!
//! [`SourceTranscoder`] owns the whole path for one source.
//!
//! ## Self-healing
//!
//! Once running nothing is reported as an error. Backlog overflow, timestamp
//! jumps, drift and underruns are corrected internally, logged through
//! [`tracing`] and counted in [`StatsSnapshot`]. Only failures that prevent
//! the output from starting are returned from [`SourceTranscoder::start`].
//!
//! ## Examples
//!
//! Driving an [`AudioRetimer`] directly:
//!
//! ```
//! use std::sync::{Arc, atomic::AtomicBool};
//! use retimer::{
//!     AudioBlock, AudioOutputInfo, AudioPull, AudioQuantum, AudioRetimer, ClockAdjuster,
//!     ManualClock, RetimerConfig, RetimerStats,
//! };
//!
//! let output = AudioOutputInfo {
//!     name: "out".into(),
//!     sample_rate: 48_000,
//!     channels: 1,
//!     quantum_frames: 1024,
//! };
//! let audio = AudioRetimer::new(
//!     "cam1",
//!     output,
//!     RetimerConfig::default(),
//!     Arc::new(ManualClock::new(0)),
//!     Arc::new(ClockAdjuster::new()),
//!     Arc::new(AtomicBool::new(false)),
//!     Arc::new(RetimerStats::new()),
//! );
//! audio.start().unwrap();
//!
//! let samples = vec![0.5f32; 1024];
//! audio.ingest(&AudioBlock::interleaved(&samples, 1, 48_000, 0));
//!
//! let mut quantum = AudioQuantum::new(1, 1024);
//! assert!(audio.pull(0, 21_333_333, &mut quantum));
//! assert_eq!(quantum.planes[0][1023], 0.5);
//! ```
//!
//! ## Thread Safety
//!
//! - Both retimers are `Send + Sync` and are shared between the decoder
//!   thread, the cadence and the encoder's audio clock
//! - The video FIFO, the audio buffers with their pending windows, and the
//!   timing adjust are each guarded by their own lock
//! - Video conversion and the hand-off to the encoder use a separate lock
//!   that decoder ingest never takes
//! - An audio pull never waits for audio; an underrun returns `false`

pub mod audio;
pub mod cadence;
pub mod clock;
pub mod config;
mod error;
pub mod io;
pub mod stats;
pub mod time;
pub mod transcoder;
pub mod video;

pub use audio::{AudioBlock, AudioLayout, AudioQuantum, AudioRetimer, DriftState, SampleRingBuffer};
pub use cadence::{CadenceSource, ExternalCadence, RenderHook, ThreadCadence, Tick};
pub use clock::ClockAdjuster;
pub use config::{AudioOutputInfo, OutputSettings, RetimerConfig, VideoOutputInfo};
pub use error::{Error, Result};
pub use io::{AudioPull, Encoder, MediaListener, MediaSource, PlaybackState, VideoSink};
pub use stats::{RetimerStats, StatsSnapshot};
pub use time::{ManualClock, MonotonicClock, OutputClock, Rate};
pub use transcoder::SourceTranscoder;
pub use video::{Frame, OutputFrame, PixelFormat, VideoRetimer};
