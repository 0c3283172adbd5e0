// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Scale/convert from decoded frames to the fixed BGRA output.
//!
//! Scaling is nearest-neighbour and preserves the source aspect ratio: the
//! image is centred in the output and the remaining area is black. YUV input
//! is converted with BT.601 limited-range coefficients.

use std::sync::Arc;

use crate::{
    Error, Result,
    video::frame::{BLACK_BGRA, Frame, OutputFrame, PixelFormat},
};

/// Largest dimension accepted on either side of a conversion.
pub const MAX_DIMENSION: u32 = 16_384;

/// Destination rectangle of the scaled image inside the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fits `src` inside `dst` preserving aspect ratio, centred.
pub fn letterbox(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Placement {
    let (sw, sh) = (src_width as u64, src_height as u64);
    let (dw, dh) = (dst_width as u64, dst_height as u64);
    let (width, height) = if sw * dh >= sh * dw {
        (dw, (sh * dw / sw).clamp(1, dh))
    } else {
        ((sw * dh / sh).clamp(1, dw), dh)
    };
    Placement {
        x: ((dw - width) / 2) as u32,
        y: ((dh - height) / 2) as u32,
        width: width as u32,
        height: height as u32,
    }
}

/// A conversion from one source format/geometry to the output geometry.
#[derive(Debug, Clone)]
pub struct ScaleContext {
    src_format: PixelFormat,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    placement: Placement,
    x_map: Vec<usize>,
    y_map: Vec<usize>,
}

impl ScaleContext {
    /// Builds the sampling tables for a conversion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for [`PixelFormat::None`] and
    /// [`Error::ScalerCreate`] if either geometry is empty or too large.
    pub fn new(
        src_format: PixelFormat,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    ) -> Result<Self> {
        if src_format == PixelFormat::None {
            return Err(Error::UnsupportedFormat(src_format));
        }
        let valid = |d: u32| d > 0 && d <= MAX_DIMENSION;
        if !(valid(src_width) && valid(src_height) && valid(dst_width) && valid(dst_height)) {
            return Err(Error::ScalerCreate {
                src_format,
                src_width,
                src_height,
                dst_width,
                dst_height,
            });
        }

        let placement = letterbox(src_width, src_height, dst_width, dst_height);
        let map = |dst: u32, src: u32| -> Vec<usize> {
            (0..dst as u64)
                .map(|i| ((2 * i + 1) * src as u64 / (2 * dst as u64)) as usize)
                .collect()
        };

        Ok(Self {
            src_format,
            src_width,
            src_height,
            dst_width,
            dst_height,
            placement,
            x_map: map(placement.width, src_width),
            y_map: map(placement.height, src_height),
        })
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Returns `true` if this context was built for `frame`'s format and size.
    pub fn accepts(&self, frame: &Frame) -> bool {
        self.src_format == frame.format
            && self.src_width == frame.width
            && self.src_height == frame.height
    }

    /// Converts `frame` into `out`, which must have the output geometry.
    ///
    /// The frame must have been checked with [`Frame::is_well_formed`].
    pub fn convert(&self, frame: &Frame, out: &mut OutputFrame) {
        debug_assert!(self.accepts(frame));
        debug_assert_eq!((out.width, out.height), (self.dst_width, self.dst_height));

        let p = self.placement;
        if p.width != self.dst_width || p.height != self.dst_height {
            out.fill_black();
        }

        let identity = p.width == self.src_width && p.height == self.src_height;
        match frame.format {
            PixelFormat::Bgra | PixelFormat::Bgrx if identity => {
                self.copy_rows(frame, out);
            }
            PixelFormat::Bgra | PixelFormat::Bgrx | PixelFormat::Rgba => {
                self.for_each_pixel(out, |sx, sy| {
                    let at = sy * frame.linesizes[0] + sx * 4;
                    let px = &frame.planes[0][at..at + 4];
                    match frame.format {
                        PixelFormat::Rgba => [px[2], px[1], px[0], px[3]],
                        PixelFormat::Bgrx => [px[0], px[1], px[2], 255],
                        _ => [px[0], px[1], px[2], px[3]],
                    }
                });
            }
            PixelFormat::I420 => {
                self.for_each_pixel(out, |sx, sy| {
                    let y = frame.planes[0][sy * frame.linesizes[0] + sx];
                    let c = (sy / 2) * frame.linesizes[1] + sx / 2;
                    let u = frame.planes[1][c];
                    let v = frame.planes[2][(sy / 2) * frame.linesizes[2] + sx / 2];
                    yuv_to_bgra(y, u, v)
                });
            }
            PixelFormat::Nv12 => {
                self.for_each_pixel(out, |sx, sy| {
                    let y = frame.planes[0][sy * frame.linesizes[0] + sx];
                    let c = (sy / 2) * frame.linesizes[1] + (sx / 2) * 2;
                    yuv_to_bgra(y, frame.planes[1][c], frame.planes[1][c + 1])
                });
            }
            PixelFormat::None => out.fill_black(),
        }
    }

    fn copy_rows(&self, frame: &Frame, out: &mut OutputFrame) {
        let p = self.placement;
        let row_bytes = p.width as usize * 4;
        for row in 0..p.height as usize {
            let src = &frame.planes[0][row * frame.linesizes[0]..][..row_bytes];
            let at = (p.y as usize + row) * out.linesize + p.x as usize * 4;
            let dst = &mut out.data[at..at + row_bytes];
            dst.copy_from_slice(src);
            if frame.format == PixelFormat::Bgrx {
                dst.chunks_exact_mut(4).for_each(|px| px[3] = 255);
            }
        }
    }

    fn for_each_pixel(&self, out: &mut OutputFrame, sample: impl Fn(usize, usize) -> [u8; 4]) {
        let p = self.placement;
        for (row, &sy) in self.y_map.iter().enumerate() {
            let at = (p.y as usize + row) * out.linesize + p.x as usize * 4;
            let line = &mut out.data[at..at + p.width as usize * 4];
            for (px, &sx) in line.chunks_exact_mut(4).zip(&self.x_map) {
                px.copy_from_slice(&sample(sx, sy));
            }
        }
    }
}

/// BT.601 limited-range YUV to opaque BGRA.
pub fn yuv_to_bgra(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    let r = clamp(298 * c + 409 * e);
    let g = clamp(298 * c - 100 * d - 208 * e);
    let b = clamp(298 * c + 516 * d);
    [b, g, r, 255]
}

/// The scale/convert context currently configured for a source.
///
/// The context is rebuilt whenever a frame arrives whose format or geometry
/// differs from the one it was built for. Contexts are shared so a queued
/// frame keeps the one it was accepted with.
#[derive(Debug)]
pub struct VideoScaleState {
    dst_width: u32,
    dst_height: u32,
    context: Option<Arc<ScaleContext>>,
}

impl VideoScaleState {
    pub fn new(dst_width: u32, dst_height: u32) -> Self {
        Self {
            dst_width,
            dst_height,
            context: None,
        }
    }

    /// Returns a context for `frame`, rebuilding it if needed.
    ///
    /// # Errors
    ///
    /// Propagates [`ScaleContext::new`] failures; the previous context is
    /// released in that case.
    pub fn ensure(&mut self, frame: &Frame) -> Result<Arc<ScaleContext>> {
        let stale = self.context.as_ref().is_none_or(|ctx| !ctx.accepts(frame));
        if stale {
            if self.context.is_some() {
                tracing::debug!(
                    format = ?frame.format,
                    width = frame.width,
                    height = frame.height,
                    "Recreating scale context"
                );
            }
            self.context = None;
            self.context = Some(Arc::new(ScaleContext::new(
                frame.format,
                frame.width,
                frame.height,
                self.dst_width,
                self.dst_height,
            )?));
        }
        self.context
            .clone()
            .ok_or_else(|| Error::Other("scale context missing".into()))
    }

    pub fn is_configured(&self) -> bool {
        self.context.is_some()
    }

    /// Drops the current context.
    pub fn release(&mut self) {
        self.context = None;
    }
}

impl Default for VideoScaleState {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Returns `true` if `out` still holds only black pixels.
pub fn is_black(out: &OutputFrame) -> bool {
    out.data.chunks_exact(4).all(|px| px == BLACK_BGRA)
}
