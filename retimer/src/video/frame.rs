// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Video frame types.

use serde::{Deserialize, Serialize};

/// Pixel layout of a frame.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// No format information. Frames in this format are ignored.
    #[default]
    None,
    /// Planar YUV 4:2:0, three planes.
    I420,
    /// Y plane followed by an interleaved UV plane, 4:2:0.
    Nv12,
    /// Packed 8-bit RGBA.
    Rgba,
    /// Packed 8-bit BGRA.
    Bgra,
    /// Packed 8-bit BGR with an unused fourth byte.
    Bgrx,
}

impl PixelFormat {
    /// Number of planes a frame in this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::None => 0,
            PixelFormat::I420 => 3,
            PixelFormat::Nv12 => 2,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Bgrx => 1,
        }
    }

    /// Minimum line size and row count of `plane` for the given frame size.
    pub fn plane_geometry(self, plane: usize, width: u32, height: u32) -> Option<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        match (self, plane) {
            (PixelFormat::I420 | PixelFormat::Nv12, 0) => Some((w, h)),
            (PixelFormat::I420, 1 | 2) => Some((cw, ch)),
            (PixelFormat::Nv12, 1) => Some((cw * 2, ch)),
            (PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Bgrx, 0) => Some((w * 4, h)),
            _ => None,
        }
    }
}

/// A decoded frame owned by the retimer.
///
/// Frames are copied out of the decoder callback on ingest, so the decoder
/// may reuse its buffers as soon as the callback returns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// One byte buffer per plane.
    pub planes: Vec<Vec<u8>>,
    /// Bytes per row of each plane.
    pub linesizes: Vec<usize>,
    /// Presentation time in the source clock domain.
    pub timestamp: u64,
}

impl Frame {
    /// Allocates a zeroed frame with tightly packed planes.
    pub fn new(format: PixelFormat, width: u32, height: u32, timestamp: u64) -> Self {
        let (planes, linesizes) = (0..format.plane_count())
            .filter_map(|p| format.plane_geometry(p, width, height))
            .map(|(line, rows)| (vec![0u8; line * rows], line))
            .unzip();
        Self {
            format,
            width,
            height,
            planes,
            linesizes,
            timestamp,
        }
    }

    /// Returns `true` if the frame carries a format and enough plane data for
    /// its geometry.
    pub fn is_well_formed(&self) -> bool {
        let count = self.format.plane_count();
        if count == 0 || self.width == 0 || self.height == 0 {
            return false;
        }
        if self.planes.len() < count || self.linesizes.len() < count {
            return false;
        }
        (0..count).all(|p| match self.format.plane_geometry(p, self.width, self.height) {
            Some((line, rows)) => {
                let stride = self.linesizes[p];
                stride >= line && self.planes[p].len() >= stride * (rows - 1) + line
            }
            None => false,
        })
    }
}

/// A fixed-size BGRA output picture.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row; always `width * 4`.
    pub linesize: usize,
    pub data: Vec<u8>,
}

/// Opaque black in BGRA.
pub const BLACK_BGRA: [u8; 4] = [0, 0, 0, 255];

impl OutputFrame {
    /// Allocates a black picture.
    pub fn new(width: u32, height: u32) -> Self {
        let linesize = width as usize * 4;
        let mut frame = Self {
            width,
            height,
            linesize,
            data: vec![0; linesize * height as usize],
        };
        frame.fill_black();
        frame
    }

    pub fn fill_black(&mut self) {
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&BLACK_BGRA);
        }
    }

    /// BGRA value at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.linesize + x as usize * 4;
        let px = self.data.get(at..at + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_planes_per_format() {
        let frame = Frame::new(PixelFormat::I420, 5, 3, 0);
        assert_eq!(frame.linesizes, vec![5, 3, 3]);
        assert_eq!(frame.planes[1].len(), 6);
        assert!(frame.is_well_formed());

        let frame = Frame::new(PixelFormat::Nv12, 4, 4, 0);
        assert_eq!(frame.linesizes, vec![4, 4]);

        assert!(!Frame::new(PixelFormat::None, 4, 4, 0).is_well_formed());
    }

    #[test]
    fn truncated_plane_is_rejected() {
        let mut frame = Frame::new(PixelFormat::Bgra, 4, 4, 0);
        frame.planes[0].truncate(10);
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn output_starts_black() {
        let out = OutputFrame::new(2, 2);
        assert_eq!(out.pixel(1, 1), Some(BLACK_BGRA));
        assert_eq!(out.pixel(2, 0), None);
    }
}
