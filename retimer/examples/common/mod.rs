// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the retimer examples.

/// Installs a stderr subscriber so the JSON report on stdout stays clean.
///
/// Defaults to INFO; `RUST_LOG` overrides it (e.g. `RUST_LOG=retimer=debug`
/// shows drift placements and video jumps).
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

/// Reproducible timestamp jitter.
pub struct Jitter(u64);

impl Jitter {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    /// Uniform offset in `[-bound_ns, bound_ns]`.
    pub fn sample(&mut self, bound_ns: u64) -> i64 {
        if bound_ns == 0 {
            return 0;
        }
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 % (2 * bound_ns + 1)) as i64 - bound_ns as i64
    }
}
