// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Audio payloads crossing the retimer boundary.

use crate::time::audio_frames_to_ns;

/// Sample layout of an ingested block.
#[derive(Debug, Clone, Copy)]
pub enum AudioLayout<'a> {
    /// One slice per channel.
    Planar(&'a [&'a [f32]]),
    /// Channels interleaved frame by frame.
    Interleaved(&'a [f32]),
}

/// A block of decoded audio borrowed from the decoder for the duration of
/// an ingest callback.
///
/// The payload is copied into the retimer's ring buffers; nothing is
/// retained after the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub layout: AudioLayout<'a>,
    /// Frames per channel.
    pub frames: usize,
    pub channels: usize,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Timestamp of the first frame, in the source clock domain.
    pub timestamp: u64,
}

impl<'a> AudioBlock<'a> {
    /// Wraps planar channel slices. The frame count is the shortest plane.
    pub fn planar(planes: &'a [&'a [f32]], sample_rate: u32, timestamp: u64) -> Self {
        Self {
            layout: AudioLayout::Planar(planes),
            frames: planes.iter().map(|p| p.len()).min().unwrap_or(0),
            channels: planes.len(),
            sample_rate,
            timestamp,
        }
    }

    /// Wraps interleaved samples. Trailing samples that do not form a whole
    /// frame are ignored.
    pub fn interleaved(
        samples: &'a [f32],
        channels: usize,
        sample_rate: u32,
        timestamp: u64,
    ) -> Self {
        Self {
            layout: AudioLayout::Interleaved(samples),
            frames: samples.len().checked_div(channels).unwrap_or(0),
            channels,
            sample_rate,
            timestamp,
        }
    }

    /// Duration of the block in nanoseconds.
    pub fn duration_ns(&self) -> u64 {
        audio_frames_to_ns(self.sample_rate, self.frames as u64)
    }

    /// Copies the payload into one owned buffer per channel.
    pub fn to_planes(&self) -> Vec<Vec<f32>> {
        match self.layout {
            AudioLayout::Planar(planes) => planes
                .iter()
                .map(|plane| plane[..self.frames].to_vec())
                .collect(),
            AudioLayout::Interleaved(samples) => (0..self.channels)
                .map(|ch| {
                    samples
                        .iter()
                        .skip(ch)
                        .step_by(self.channels)
                        .take(self.frames)
                        .copied()
                        .collect()
                })
                .collect(),
        }
    }
}

/// One fixed-size unit of planar output audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioQuantum {
    /// One buffer per output channel, each exactly `frames()` long.
    pub planes: Vec<Vec<f32>>,
    /// Output-domain timestamp of the first frame.
    pub timestamp: u64,
}

impl AudioQuantum {
    /// Creates a silent quantum.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            planes: vec![vec![0.0; frames]; channels],
            timestamp: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.planes.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Zeroes every sample.
    pub fn silence(&mut self) {
        for plane in &mut self.planes {
            plane.fill(0.0);
        }
    }

    /// Returns `true` if every sample is zero.
    pub fn is_silent(&self) -> bool {
        self.planes.iter().flatten().all(|&s| s == 0.0)
    }
}
