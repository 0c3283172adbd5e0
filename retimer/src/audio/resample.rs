// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Channel remapping and sample-rate conversion for mismatched sources.

/// Maps `planes` onto `channels` output channels.
///
/// Mono input is copied to every output channel. Otherwise extra input
/// channels are dropped and missing output channels are silent.
pub fn remix_channels(mut planes: Vec<Vec<f32>>, channels: usize) -> Vec<Vec<f32>> {
    let frames = planes.first().map_or(0, Vec::len);
    if planes.len() == 1 && channels > 1 {
        let mono = planes.remove(0);
        return vec![mono; channels];
    }
    planes.truncate(channels);
    planes.resize(channels, vec![0.0; frames]);
    planes
}

/// Streaming linear-interpolation resampler.
///
/// Keeps the last input frame and the fractional read position between
/// calls so consecutive blocks join without clicks or drift.
#[derive(Debug, Clone)]
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    step: f64,
    phase: f64,
    history: Vec<f32>,
    primed: bool,
}

impl Resampler {
    /// Creates a resampler converting `input_rate` to `output_rate` for
    /// `channels` channels.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Self {
        Self {
            input_rate,
            output_rate,
            step: input_rate as f64 / output_rate as f64,
            phase: 0.0,
            history: vec![0.0; channels],
            primed: false,
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Converts one block. Every plane must have the same length.
    pub fn process(&mut self, planes: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let channels = self.history.len();
        let frames = planes.first().map_or(0, Vec::len);
        let mut out = vec![Vec::with_capacity((frames as f64 / self.step) as usize + 1); channels];
        if frames == 0 {
            return out;
        }

        let sample = |history: &[f32], ch: usize, i: isize| -> f32 {
            let plane = planes.get(ch);
            if i < 0 {
                history[ch]
            } else {
                plane.and_then(|p| p.get(i as usize)).copied().unwrap_or(0.0)
            }
        };

        let mut t = if self.primed { self.phase } else { 0.0 };
        let last = (frames - 1) as f64;
        while t < last {
            let base = t.floor();
            let frac = (t - base) as f32;
            let i = base as isize;
            for (ch, plane) in out.iter_mut().enumerate() {
                let s0 = sample(&self.history, ch, i);
                let s1 = sample(&self.history, ch, i + 1);
                plane.push(s0 + (s1 - s0) * frac);
            }
            t += self.step;
        }

        self.phase = t - frames as f64;
        for (ch, h) in self.history.iter_mut().enumerate() {
            *h = planes
                .get(ch)
                .and_then(|p| p.last())
                .copied()
                .unwrap_or(0.0);
        }
        self.primed = true;
        out
    }
}
