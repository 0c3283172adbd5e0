// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Byte ring buffers for buffered audio.
//!
//! [`ByteRing`] is a growable byte FIFO with a `place` operation that writes
//! at an arbitrary offset and truncates whatever followed. [`SampleRingBuffer`]
//! keeps one `ByteRing` per channel and only exposes operations that resize
//! every channel by the same amount.

use std::collections::VecDeque;

/// Size in bytes of one buffered sample (`f32`).
pub const SAMPLE_SIZE: usize = size_of::<f32>();

/// Growable byte FIFO.
///
/// Push and pop are amortized O(1) per byte. There is no size bound; callers
/// decide when to evict.
#[derive(Debug, Default, Clone)]
pub struct ByteRing {
    buf: VecDeque<u8>,
}

impl ByteRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `data` at the back.
    pub fn push_back(&mut self, data: &[u8]) {
        self.buf.extend(data);
    }

    /// Copies up to `out.len()` bytes from the front without consuming them.
    ///
    /// Returns the number of bytes copied.
    pub fn peek_front(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.buf.len());
        let (first, second) = self.buf.as_slices();
        let from_first = n.min(first.len());
        out[..from_first].copy_from_slice(&first[..from_first]);
        let from_second = n - from_first;
        out[from_first..n].copy_from_slice(&second[..from_second]);
        n
    }

    /// Removes up to `n` bytes from the front.
    ///
    /// If `out` is given, the removed bytes are copied into it (as many as
    /// fit). Returns the number of bytes removed.
    pub fn pop_front(&mut self, n: usize, out: Option<&mut [u8]>) -> usize {
        let n = n.min(self.buf.len());
        if let Some(out) = out {
            let m = n.min(out.len());
            self.peek_front(&mut out[..m]);
        }
        self.buf.drain(..n);
        n
    }

    /// Removes up to `n` bytes from the back. Returns the number removed.
    pub fn pop_back(&mut self, n: usize) -> usize {
        let n = n.min(self.buf.len());
        self.buf.truncate(self.buf.len() - n);
        n
    }

    /// Writes `data` so that it starts at byte `offset`.
    ///
    /// Bytes before `offset` are kept. If the buffer is shorter than
    /// `offset`, the gap is filled with zeros. Everything previously stored
    /// at or after `offset + data.len()` is discarded, so the resulting length
    /// is always `offset + data.len()`.
    pub fn place(&mut self, offset: usize, data: &[u8]) {
        self.buf.truncate(offset);
        self.buf.resize(offset, 0);
        self.buf.extend(data);
    }

    /// Drops all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Per-channel sample buffers resized in lock-step.
///
/// Every operation applies the same byte count to every channel, so all
/// channels always hold the same length. Planes passed in that are shorter
/// than the frame count are padded with silence, missing planes are written
/// as silence, and extra planes are ignored.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    channels: Vec<ByteRing>,
    scratch: Vec<u8>,
}

impl SampleRingBuffer {
    /// Creates empty buffers for `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            channels: vec![ByteRing::new(); channels],
            scratch: Vec::new(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Buffered bytes per channel.
    pub fn len_bytes(&self) -> usize {
        self.channels.first().map_or(0, ByteRing::len)
    }

    /// Buffered frames per channel.
    pub fn len_frames(&self) -> usize {
        self.len_bytes() / SAMPLE_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len_bytes() == 0
    }

    /// Byte length of every channel.
    pub fn channel_lens(&self) -> Vec<usize> {
        self.channels.iter().map(ByteRing::len).collect()
    }

    /// Appends `frames` frames from `planes` to every channel.
    pub fn push_back<S: AsRef<[f32]>>(&mut self, planes: &[S], frames: usize) {
        for ch in 0..self.channels.len() {
            encode_plane(&mut self.scratch, planes.get(ch).map(AsRef::as_ref), frames);
            self.channels[ch].push_back(&self.scratch);
        }
    }

    /// Writes `frames` frames from `planes` starting at frame `offset_frames`
    /// and truncates every channel after them.
    pub fn place<S: AsRef<[f32]>>(&mut self, offset_frames: usize, planes: &[S], frames: usize) {
        let offset = offset_frames * SAMPLE_SIZE;
        for ch in 0..self.channels.len() {
            encode_plane(&mut self.scratch, planes.get(ch).map(AsRef::as_ref), frames);
            self.channels[ch].place(offset, &self.scratch);
        }
    }

    /// Copies up to `out.len()` frames of `channel` from the front without
    /// consuming them. Returns the number of frames copied.
    pub fn peek_front(&mut self, channel: usize, out: &mut [f32]) -> usize {
        let Some(ring) = self.channels.get(channel) else {
            return 0;
        };
        self.scratch.resize(out.len() * SAMPLE_SIZE, 0);
        let n = ring.peek_front(&mut self.scratch) / SAMPLE_SIZE;
        decode_into(&self.scratch[..n * SAMPLE_SIZE], &mut out[..n]);
        n
    }

    /// Discards up to `frames` frames from the front of every channel.
    pub fn pop_front(&mut self, frames: usize) -> usize {
        let bytes = frames * SAMPLE_SIZE;
        let mut popped = 0;
        for ring in &mut self.channels {
            popped = ring.pop_front(bytes, None);
        }
        popped / SAMPLE_SIZE
    }

    /// Removes up to `frames` frames from the front of every channel, writing
    /// channel `ch` into `out[ch][out_offset..]`.
    ///
    /// Channels without a matching output plane are discarded. Returns the
    /// number of frames removed.
    pub fn pop_front_into(
        &mut self,
        frames: usize,
        out: &mut [Vec<f32>],
        out_offset: usize,
    ) -> usize {
        let bytes = frames * SAMPLE_SIZE;
        let mut popped = 0;
        for (ch, ring) in self.channels.iter_mut().enumerate() {
            self.scratch.resize(bytes, 0);
            popped = ring.pop_front(bytes, Some(&mut self.scratch));
            if let Some(plane) = out.get_mut(ch)
                && out_offset <= plane.len()
            {
                let n = (popped / SAMPLE_SIZE).min(plane.len() - out_offset);
                decode_into(
                    &self.scratch[..n * SAMPLE_SIZE],
                    &mut plane[out_offset..out_offset + n],
                );
            }
        }
        popped / SAMPLE_SIZE
    }

    /// Discards up to `frames` frames from the back of every channel.
    pub fn pop_back(&mut self, frames: usize) -> usize {
        let bytes = frames * SAMPLE_SIZE;
        let mut popped = 0;
        for ring in &mut self.channels {
            popped = ring.pop_back(bytes);
        }
        popped / SAMPLE_SIZE
    }

    /// Drops all buffered samples.
    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(ByteRing::clear);
    }
}

fn encode_plane(scratch: &mut Vec<u8>, plane: Option<&[f32]>, frames: usize) {
    scratch.clear();
    scratch.reserve(frames * SAMPLE_SIZE);
    let plane = plane.unwrap_or(&[]);
    for i in 0..frames {
        let sample = plane.get(i).copied().unwrap_or(0.0);
        scratch.extend_from_slice(&sample.to_ne_bytes());
    }
}

fn decode_into(bytes: &[u8], out: &mut [f32]) {
    for (sample, chunk) in out.iter_mut().zip(bytes.chunks_exact(SAMPLE_SIZE)) {
        *sample = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}
