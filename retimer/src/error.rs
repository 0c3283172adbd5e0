// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for re-timing operations.
//!
//! Only conditions that prevent a retimer from starting are reported as
//! errors. Everything that happens while running (backlog overflow, timestamp
//! jumps, audio underruns) is corrected internally and logged instead.

use crate::video::PixelFormat;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when configuring or starting a retimer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The encoder refused to open the fixed-rate output channel pair.
    #[error("Failed to open output channels: {0}")]
    OutputOpen(String),

    /// A scale/convert context could not be created for the given geometry.
    #[error("Failed to create scaler from {src_format:?} {src_width}x{src_height} to {dst_width}x{dst_height}")]
    ScalerCreate {
        src_format: PixelFormat,
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },

    /// The pixel format cannot be converted by the built-in scaler.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start` was called on a component that is already running.
    #[error("Already running")]
    AlreadyRunning,

    /// A configuration document could not be parsed.
    #[error("Json: {0}")]
    Json(#[from] serde_json::Error),

    /// A generic error for failures not covered by the other variants.
    #[error("Other error: {0}")]
    Other(String),
}
