// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Retimer tunables and output channel descriptions.
//!
//! Both structures are plain serde types so they can be loaded from the
//! surrounding engine's JSON settings. Every field of [`RetimerConfig`] has a
//! default; missing keys fall back to it.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, time::Rate, video::PixelFormat};

/// Thresholds governing the self-healing policies of both retimers.
///
/// # Examples
///
/// ```
/// use retimer::RetimerConfig;
///
/// let config = RetimerConfig::from_json(r#"{"audio_smoothing_threshold_ns": 40000000}"#).unwrap();
/// assert_eq!(config.audio_smoothing_threshold_ns, 40_000_000);
/// assert_eq!(config.max_video_buffer_ns, 1_000_000_000);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RetimerConfig {
    /// Maximum duration of buffered source video before the backlog is flushed.
    pub max_video_buffer_ns: u64,
    /// Gap between consecutive source frames treated as a discontinuity.
    pub video_jump_threshold_ns: u64,
    /// Forward gap between ingested and consumed audio that forces a reset.
    pub audio_reset_threshold_ns: u64,
    /// Deviation from the expected block position that triggers a re-placement.
    pub audio_smoothing_threshold_ns: u64,
    /// Span of unanswered pull windows after which the oldest is given silence.
    pub max_pending_window_span_ns: u64,
    /// Whether an audio block may establish the source/output clock offset.
    pub audio_establishes_timing: bool,
}

impl Default for RetimerConfig {
    fn default() -> Self {
        Self {
            max_video_buffer_ns: 1_000_000_000,
            video_jump_threshold_ns: 2_000_000_000,
            audio_reset_threshold_ns: 2_000_000_000,
            audio_smoothing_threshold_ns: 70_000_000,
            max_pending_window_span_ns: 500_000_000,
            audio_establishes_timing: true,
        }
    }
}

impl RetimerConfig {
    /// Parses a configuration from JSON and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is malformed and
    /// [`Error::InvalidConfig`] if a value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every threshold is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero thresholds or a smoothing
    /// threshold that is not below the reset threshold.
    pub fn validate(&self) -> Result<()> {
        if self.max_video_buffer_ns == 0 {
            return Err(Error::InvalidConfig(
                "max_video_buffer_ns must be greater than zero".into(),
            ));
        }
        if self.video_jump_threshold_ns == 0 {
            return Err(Error::InvalidConfig(
                "video_jump_threshold_ns must be greater than zero".into(),
            ));
        }
        if self.audio_smoothing_threshold_ns == 0 {
            return Err(Error::InvalidConfig(
                "audio_smoothing_threshold_ns must be greater than zero".into(),
            ));
        }
        if self.audio_smoothing_threshold_ns >= self.audio_reset_threshold_ns {
            return Err(Error::InvalidConfig(format!(
                "audio_smoothing_threshold_ns ({}) must be below audio_reset_threshold_ns ({})",
                self.audio_smoothing_threshold_ns, self.audio_reset_threshold_ns
            )));
        }
        if self.max_pending_window_span_ns == 0 {
            return Err(Error::InvalidConfig(
                "max_pending_window_span_ns must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fixed geometry and rate of the output video channel.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VideoOutputInfo {
    /// Channel name announced to the encoder.
    #[serde(default)]
    pub name: String,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub frame_rate: Rate,
    /// Output pixel format. Only [`PixelFormat::Bgra`] is produced.
    #[serde(default = "default_output_format")]
    pub format: PixelFormat,
}

fn default_output_format() -> PixelFormat {
    PixelFormat::Bgra
}

/// Fixed sample rate and layout of the output audio channel.
///
/// Samples are delivered as planar `f32`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AudioOutputInfo {
    /// Channel name announced to the encoder.
    #[serde(default)]
    pub name: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Number of output channels.
    pub channels: usize,
    /// Frames requested per pull.
    #[serde(default = "default_quantum_frames")]
    pub quantum_frames: usize,
}

fn default_quantum_frames() -> usize {
    1024
}

/// The fixed-rate output channel pair, immutable between start and stop.
///
/// # Examples
///
/// ```
/// use retimer::OutputSettings;
///
/// let json = r#"{
///     "video": {"width": 1920, "height": 1080, "frame_rate": {"numerator": 30}},
///     "audio": {"sample_rate": 48000, "channels": 2}
/// }"#;
/// let settings = OutputSettings::from_json(json).unwrap();
/// assert_eq!(settings.audio.quantum_frames, 1024);
/// assert_eq!(settings.video.frame_rate.denominator, 1);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OutputSettings {
    pub video: VideoOutputInfo,
    pub audio: AudioOutputInfo,
}

impl OutputSettings {
    /// Builds settings with default names and quantum.
    pub fn new(
        width: u32,
        height: u32,
        frame_rate: Rate,
        sample_rate: u32,
        channels: usize,
    ) -> Self {
        Self {
            video: VideoOutputInfo {
                name: String::new(),
                width,
                height,
                frame_rate,
                format: PixelFormat::Bgra,
            },
            audio: AudioOutputInfo {
                name: String::new(),
                sample_rate,
                channels,
                quantum_frames: default_quantum_frames(),
            },
        }
    }

    /// Parses output settings from JSON and validates them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is malformed and
    /// [`Error::InvalidConfig`] if a value is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Names both channels after the source they carry.
    pub fn with_source_names(mut self, source_id: &str) -> Self {
        self.video.name = format!("source_video_output_{source_id}");
        self.audio.name = format!("source_audio_output_{source_id}");
        self
    }

    /// Checks that both channels describe a usable output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero sizes or rates and
    /// [`Error::UnsupportedFormat`] for an output format other than BGRA.
    pub fn validate(&self) -> Result<()> {
        let video = &self.video;
        if video.width == 0 || video.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "invalid output size {}x{}",
                video.width, video.height
            )));
        }
        if !video.frame_rate.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "invalid output frame rate {}/{}",
                video.frame_rate.numerator, video.frame_rate.denominator
            )));
        }
        if video.format != PixelFormat::Bgra {
            return Err(Error::UnsupportedFormat(video.format));
        }

        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(Error::InvalidConfig("output sample rate is zero".into()));
        }
        if audio.channels == 0 {
            return Err(Error::InvalidConfig("output channel count is zero".into()));
        }
        if audio.quantum_frames == 0 {
            return Err(Error::InvalidConfig("audio quantum is zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_smoothing_above_reset() {
        let config = RetimerConfig {
            audio_smoothing_threshold_ns: 3_000_000_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            RetimerConfig::from_json("{not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn output_settings_validation() {
        let settings = OutputSettings::new(1920, 1080, Rate::new(30, 1), 48_000, 2);
        assert!(settings.validate().is_ok());

        let mut bad = settings.clone();
        bad.video.width = 0;
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));

        let mut bad = settings.clone();
        bad.video.format = PixelFormat::I420;
        assert!(matches!(
            bad.validate(),
            Err(Error::UnsupportedFormat(PixelFormat::I420))
        ));

        let named = settings.with_source_names("cam1");
        assert_eq!(named.video.name, "source_video_output_cam1");
        assert_eq!(named.audio.name, "source_audio_output_cam1");
    }
}
