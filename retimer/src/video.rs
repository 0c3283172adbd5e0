// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Video path: frame FIFO, scale/convert and fixed-rate output.
//!
//! # Key Types
//!
//! - [`VideoRetimer`]: queues frames and renders one output per tick
//! - [`Frame`]: a decoded frame copied in from the decoder
//! - [`OutputFrame`]: the fixed-size BGRA picture handed to the encoder
//! - [`VideoScaleState`]: the scale/convert context for the current source geometry

pub mod frame;
pub mod retimer;
pub mod scale;

pub use frame::{Frame, OutputFrame, PixelFormat};
pub use retimer::VideoRetimer;
pub use scale::{ScaleContext, VideoScaleState};
