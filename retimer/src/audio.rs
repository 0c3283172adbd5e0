// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Audio path: ingest of decoded blocks and fixed-quantum output.
//!
//! # Key Types
//!
//! - [`AudioRetimer`]: buffers blocks and answers encoder pulls
//! - [`SampleRingBuffer`]: per-channel byte rings kept in lock-step
//! - [`AudioBlock`]: decoded input borrowed for one ingest call
//! - [`AudioQuantum`]: one fixed-size unit of planar output

pub mod block;
pub mod resample;
pub mod retimer;
pub mod ring;
pub mod window;

pub use block::{AudioBlock, AudioLayout, AudioQuantum};
pub use retimer::{AudioRetimer, DriftState};
pub use ring::{ByteRing, SampleRingBuffer};
pub use window::TimeWindow;
