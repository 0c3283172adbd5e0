// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Contracts with the collaborators around a transcoder.
//!
//! ```text
//! MediaSource ──► MediaListener ──► VideoRetimer ──► VideoSink ──┐
//!  (decoder)       (ingest)      └► AudioRetimer ◄── AudioPull ◄─┴─ Encoder
//! ```
//!
//! The decoder pushes frames and blocks; the encoder is pushed video and
//! pulls audio on its own clock.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    Result,
    audio::{AudioBlock, AudioQuantum},
    config::OutputSettings,
    video::{Frame, OutputFrame},
};

/// Receives decoded media from a [`MediaSource`].
///
/// Both callbacks run on decoder threads and must return promptly. The
/// arguments are borrowed for the duration of the call only.
pub trait MediaListener: Send + Sync {
    fn on_video_frame(&self, frame: &Frame);
    fn on_audio_block(&self, block: &AudioBlock<'_>);
}

/// Reports whether playback of a source is paused.
pub trait PlaybackState: Send + Sync {
    fn is_paused(&self) -> bool;
}

impl PlaybackState for AtomicBool {
    fn is_paused(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// A decoder delivering frames and audio blocks through callbacks.
pub trait MediaSource: PlaybackState {
    /// Stable identifier of the source, used in channel names and logs.
    fn id(&self) -> &str;

    /// Registers the listener receiving decoded media. Replaces any
    /// previously connected listener.
    fn connect(&self, listener: Arc<dyn MediaListener>);

    /// Unregisters the listener. No callback may start after this returns.
    fn disconnect(&self);
}

/// Push side of the encoder's output channel pair.
pub trait VideoSink: Send + Sync {
    /// Submits `frame` to cover `count` output intervals starting at
    /// `timestamp`. Calls made after the encoder was closed are ignored.
    fn submit(&self, frame: &OutputFrame, count: u32, timestamp: u64);
}

/// Pull side of the encoder's output channel pair.
pub trait AudioPull: Send + Sync {
    /// Fills `quantum` with the audio for `[start, end)`.
    ///
    /// Returns `true` when `quantum` holds a result (real samples or silence)
    /// and `false` on underrun. On `false` the encoder retries on its own
    /// schedule; the call never blocks waiting for audio.
    fn pull(&self, start: u64, end: u64, quantum: &mut AudioQuantum) -> bool;
}

/// The external encoder consuming the fixed-rate channel pair.
pub trait Encoder: Send + Sync {
    /// Opens the output channels described by `settings`. The encoder's audio
    /// clock pulls from `audio` until [`Encoder::close`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutputOpen`] if the channels cannot be opened.
    fn open(&self, settings: &OutputSettings, audio: Arc<dyn AudioPull>)
    -> Result<Arc<dyn VideoSink>>;

    /// Closes the channels and stops pulling audio.
    fn close(&self);
}

/// Exposes a [`MediaSource`]'s pause state as a [`PlaybackState`].
pub(crate) struct SourcePlayback(pub Arc<dyn MediaSource>);

impl PlaybackState for SourcePlayback {
    fn is_paused(&self) -> bool {
        self.0.is_paused()
    }
}
