// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Clock sources driving the video retimer.
//!
//! A [`CadenceSource`] calls back once per output frame interval. Two
//! implementations exist:
//!
//! - [`ThreadCadence`] owns a thread that sleeps to absolute deadlines on an
//!   [`OutputClock`]. Each deadline is the previous tick plus one interval,
//!   never "now plus one interval", so scheduling error does not accumulate.
//! - [`ExternalCadence`] derives ticks from an external compositor's render
//!   callback, delivered through a [`RenderHook`].
//!
//! Both report a [`Tick`] whose `count` is the number of intervals it covers.
//! A count above one means intervals were missed.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use crate::{Error, Result, time::OutputClock};

/// One cadence callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Output-clock time of the tick.
    pub time: u64,
    /// Number of output intervals covered.
    pub count: u32,
}

/// Callback invoked for every tick.
pub type TickFn = Box<dyn FnMut(Tick) + Send>;

/// A single authoritative source of video ticks.
pub trait CadenceSource: Send {
    /// Starts delivering ticks every `interval_ns` to `on_tick`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if already started and
    /// [`Error::InvalidConfig`] for a zero interval.
    fn start(&mut self, interval_ns: u64, on_tick: TickFn) -> Result<()>;

    /// Stops delivering ticks. Returns once no callback is in progress.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Self-clocked cadence running on a dedicated thread.
pub struct ThreadCadence {
    clock: Arc<dyn OutputClock>,
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadCadence {
    /// Creates a stopped cadence. `name` is used for the thread name.
    pub fn new(clock: Arc<dyn OutputClock>, name: impl Into<String>) -> Self {
        Self {
            clock,
            name: name.into(),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl CadenceSource for ThreadCadence {
    fn start(&mut self, interval_ns: u64, mut on_tick: TickFn) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if interval_ns == 0 {
            return Err(Error::InvalidConfig("cadence interval is zero".into()));
        }

        self.stop.store(false, Ordering::Release);
        let stop = self.stop.clone();
        let clock = self.clock.clone();
        let span = tracing::Span::current();

        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let _entered = span.enter();
                let mut last = clock.now_ns();
                while !stop.load(Ordering::Acquire) {
                    let mut time = last + interval_ns;
                    let mut count = 1;
                    if !clock.sleep_until_ns(time) {
                        let missed = (clock.now_ns().saturating_sub(last) / interval_ns).max(1);
                        count = u32::try_from(missed).unwrap_or(u32::MAX);
                        time = last + interval_ns * count as u64;
                    }
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    on_tick(Tick { time, count });
                    last = time;
                }
                tracing::trace!("Cadence thread exiting");
            })
            .map_err(|e| Error::Other(format!("failed to spawn cadence thread: {e}")))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!(name = %self.name, "Cadence thread panicked");
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ThreadCadence {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Default)]
struct ExternalState {
    interval_ns: u64,
    last: Option<u64>,
    on_tick: Option<TickFn>,
}

fn lock(shared: &Mutex<ExternalState>) -> MutexGuard<'_, ExternalState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cadence derived from an external render loop.
///
/// The compositor calls [`RenderHook::render`] at its own rate. The first
/// call after start ticks immediately; later calls tick only once a full
/// interval has elapsed since the previous tick, and several elapsed
/// intervals collapse into one tick.
#[derive(Default)]
pub struct ExternalCadence {
    shared: Arc<Mutex<ExternalState>>,
}

impl ExternalCadence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle the compositor calls every rendered frame.
    pub fn hook(&self) -> RenderHook {
        RenderHook {
            shared: self.shared.clone(),
        }
    }
}

impl CadenceSource for ExternalCadence {
    fn start(&mut self, interval_ns: u64, on_tick: TickFn) -> Result<()> {
        if interval_ns == 0 {
            return Err(Error::InvalidConfig("cadence interval is zero".into()));
        }
        let mut state = lock(&self.shared);
        if state.on_tick.is_some() {
            return Err(Error::AlreadyRunning);
        }
        *state = ExternalState {
            interval_ns,
            last: None,
            on_tick: Some(on_tick),
        };
        Ok(())
    }

    fn stop(&mut self) {
        *lock(&self.shared) = ExternalState::default();
    }

    fn is_running(&self) -> bool {
        lock(&self.shared).on_tick.is_some()
    }
}

/// Render-loop entry point of an [`ExternalCadence`].
#[derive(Clone)]
pub struct RenderHook {
    shared: Arc<Mutex<ExternalState>>,
}

impl RenderHook {
    /// Reports a rendered frame at output time `now`.
    ///
    /// Returns the tick delivered, if any.
    pub fn render(&self, now: u64) -> Option<Tick> {
        let mut guard = lock(&self.shared);
        let state = &mut *guard;
        let on_tick = state.on_tick.as_mut()?;

        let tick = match state.last {
            None => Tick { time: now, count: 1 },
            Some(last) => {
                let elapsed = now.checked_sub(last)?;
                let count = elapsed / state.interval_ns;
                if count == 0 {
                    return None;
                }
                Tick {
                    time: last + count * state.interval_ns,
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                }
            }
        };
        on_tick(tick);
        state.last = Some(tick.time);
        Some(tick)
    }
}
