// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-rate video re-timing.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::{debug, error, info, trace, warn};

use crate::{
    Error, Result,
    cadence::Tick,
    clock::ClockAdjuster,
    config::{RetimerConfig, VideoOutputInfo},
    io::VideoSink,
    stats::RetimerStats,
    video::{
        frame::{Frame, OutputFrame},
        scale::{MAX_DIMENSION, ScaleContext, VideoScaleState},
    },
};

/// A frame accepted by ingest, with the context that converts it.
struct QueuedFrame {
    /// Ingest order; identifies the picture drawn into the output.
    seq: u64,
    frame: Frame,
    scaler: Arc<ScaleContext>,
}

/// Decoder-side state: the FIFO and the selection baseline.
struct FrameQueue {
    frames: VecDeque<Arc<QueuedFrame>>,
    scale: VideoScaleState,
    next_seq: u64,
    /// Output time of the previous tick.
    last_tick_time: Option<u64>,
    /// Source time selected by the previous tick.
    last_frame_ts: Option<u64>,
}

impl FrameQueue {
    fn new(output: &VideoOutputInfo) -> Self {
        Self {
            frames: VecDeque::new(),
            scale: VideoScaleState::new(output.width, output.height),
            next_seq: 0,
            last_tick_time: None,
            last_frame_ts: None,
        }
    }

    fn reset(&mut self) {
        self.frames.clear();
        self.scale.release();
        self.last_tick_time = None;
        self.last_frame_ts = None;
    }
}

/// Cadence-side state: the output picture and what it currently shows.
struct RenderState {
    output: OutputFrame,
    rendered_seq: Option<u64>,
    rendered_ts: Option<u64>,
}

impl RenderState {
    fn new(output: &VideoOutputInfo) -> Self {
        Self {
            output: OutputFrame::new(output.width, output.height),
            rendered_seq: None,
            rendered_ts: None,
        }
    }

    fn clear(&mut self) {
        self.rendered_ts = None;
        if self.rendered_seq.take().is_some() {
            self.output.fill_black();
        }
    }
}

/// Re-emits irregular decoded frames as a fixed-rate output stream.
///
/// Frames are queued by [`VideoRetimer::ingest`] from the decoder thread and
/// consumed by [`VideoRetimer::tick`], which is driven once per output frame
/// interval by a [`crate::cadence::CadenceSource`].
///
/// Each tick advances a source-domain target by the output time elapsed
/// since the previous tick, drops queued frames the target has passed and
/// draws the first remaining frame. Two frames more than the jump threshold
/// apart are treated as a discontinuity: dropping stops there and the target
/// is re-based on the newer frame.
///
/// The FIFO lock is held only for queue operations. Conversion and the
/// hand-off to the sink happen under a separate lock that ingest never
/// takes, so a slow encoder does not stall the decoder.
pub struct VideoRetimer {
    source_id: String,
    output: VideoOutputInfo,
    config: RetimerConfig,
    adjuster: Arc<ClockAdjuster>,
    stats: Arc<RetimerStats>,
    max_frames: usize,
    running: AtomicBool,
    queue: Mutex<FrameQueue>,
    render: Mutex<RenderState>,
    sink: Mutex<Option<Arc<dyn VideoSink>>>,
}

impl VideoRetimer {
    /// Creates a stopped retimer for the given output channel.
    pub fn new(
        source_id: impl Into<String>,
        output: VideoOutputInfo,
        config: RetimerConfig,
        adjuster: Arc<ClockAdjuster>,
        stats: Arc<RetimerStats>,
    ) -> Self {
        let max_frames = output
            .frame_rate
            .units_in(config.max_video_buffer_ns)
            .max(1) as usize;
        Self {
            source_id: source_id.into(),
            queue: Mutex::new(FrameQueue::new(&output)),
            render: Mutex::new(RenderState::new(&output)),
            output,
            config,
            adjuster,
            stats,
            max_frames,
            running: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, FrameQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_render(&self) -> MutexGuard<'_, RenderState> {
        self.render.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Option<Arc<dyn VideoSink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of frames the FIFO may hold before the backlog is dropped.
    pub fn max_buffered_frames(&self) -> usize {
        self.max_frames
    }

    /// Frames currently queued.
    pub fn queued_frames(&self) -> usize {
        self.lock_queue().frames.len()
    }

    /// Source timestamp of the frame currently drawn into the output, if any.
    pub fn rendered_timestamp(&self) -> Option<u64> {
        self.lock_render().rendered_ts
    }

    /// Output interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.output.frame_rate.interval_ns()
    }

    /// Starts accepting frames and delivering ticks to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if already started and
    /// [`Error::ScalerCreate`] if the output geometry cannot be produced.
    pub fn start(&self, sink: Arc<dyn VideoSink>) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        let (width, height) = (self.output.width, self.output.height);
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            error!(source = %self.source_id, width, height, "Invalid output geometry");
            return Err(Error::ScalerCreate {
                src_format: self.output.format,
                src_width: width,
                src_height: height,
                dst_width: width,
                dst_height: height,
            });
        }

        self.lock_queue().reset();
        self.lock_render().clear();
        *self.lock_sink() = Some(sink);
        self.running.store(true, Ordering::Release);
        info!(
            source = %self.source_id,
            width,
            height,
            max_frames = self.max_frames,
            "Video retimer started"
        );
        Ok(())
    }

    /// Stops the retimer, releasing the scale context and every queued frame.
    ///
    /// The cadence driving [`VideoRetimer::tick`] must be stopped first.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.lock_sink().take();
        let dropped = {
            let mut queue = self.lock_queue();
            let dropped = queue.frames.len();
            queue.reset();
            dropped
        };
        self.lock_render().clear();
        if was_running {
            info!(source = %self.source_id, dropped, "Video retimer stopped");
        }
    }

    /// Queues a copy of `frame`.
    ///
    /// Frames without a usable format are ignored. If the FIFO already holds
    /// the maximum buffered duration, the whole backlog is dropped first.
    pub fn ingest(&self, frame: &Frame) {
        if !self.is_running() {
            return;
        }
        if !frame.is_well_formed() {
            RetimerStats::inc(&self.stats.frames_ignored);
            trace!(source = %self.source_id, format = ?frame.format, "Ignoring frame without usable format");
            return;
        }

        let mut queue = self.lock_queue();
        let scaler = match queue.scale.ensure(frame) {
            Ok(scaler) => scaler,
            Err(e) => {
                RetimerStats::inc(&self.stats.frames_ignored);
                warn!(source = %self.source_id, error = %e, "Unable to create scale context, dropping frame");
                return;
            }
        };

        if queue.frames.len() >= self.max_frames {
            info!(
                source = %self.source_id,
                max_frames = self.max_frames,
                "Video buffer overflow, dropping backlog"
            );
            queue.frames.clear();
            queue.last_frame_ts = None;
            RetimerStats::inc(&self.stats.backlog_flushes);
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.frames.push_back(Arc::new(QueuedFrame {
            seq,
            frame: frame.clone(),
            scaler,
        }));
        RetimerStats::inc(&self.stats.frames_ingested);
    }

    /// Produces the output for one cadence tick.
    ///
    /// `tick.count` output intervals are covered by the submitted frame; a
    /// count above one means the cadence fell behind.
    pub fn tick(&self, tick: Tick) {
        if !self.is_running() {
            return;
        }
        if tick.count > 1 {
            RetimerStats::inc(&self.stats.lagged_ticks);
            info!(source = %self.source_id, count = tick.count, "Video lagged");
        }

        let selected = {
            let mut queue = self.lock_queue();
            self.select_closest(&mut queue, tick.time);
            queue.last_tick_time = Some(tick.time);
            queue.frames.front().cloned()
        };

        let mut render = self.lock_render();
        match selected {
            Some(queued) => {
                let ts = queued.frame.timestamp;
                if self.adjuster.observe(tick.time, ts) {
                    trace!(
                        source = %self.source_id,
                        video_time = tick.time,
                        frame_ts = ts,
                        "Timing adjusted"
                    );
                }
                if render.rendered_seq != Some(queued.seq) {
                    queued.scaler.convert(&queued.frame, &mut render.output);
                    render.rendered_seq = Some(queued.seq);
                    render.rendered_ts = Some(ts);
                }
            }
            None => render.clear(),
        }

        let sink = self.lock_sink().clone();
        if let Some(sink) = sink {
            sink.submit(&render.output, tick.count, tick.time);
            RetimerStats::add(&self.stats.frames_submitted, tick.count as u64);
        }
    }

    fn select_closest(&self, queue: &mut FrameQueue, video_time: u64) {
        let Some(front_ts) = queue.frames.front().map(|f| f.frame.timestamp) else {
            return;
        };
        let last_tick = *queue.last_tick_time.get_or_insert(video_time);
        let last_ts = *queue.last_frame_ts.get_or_insert(front_ts);
        let mut target = last_ts.saturating_add(video_time.saturating_sub(last_tick));

        while queue.frames.len() > 1
            && let Some(front) = queue.frames.front()
            && target > front.frame.timestamp
        {
            let dropped = front.frame.timestamp;
            queue.frames.pop_front();
            RetimerStats::inc(&self.stats.frames_dropped);

            let Some(next) = queue.frames.front().map(|f| f.frame.timestamp) else {
                break;
            };
            if dropped.abs_diff(next) > self.config.video_jump_threshold_ns {
                debug!(source = %self.source_id, from = dropped, to = next, "Video jump");
                RetimerStats::inc(&self.stats.video_jumps);
                target = next;
                break;
            }
        }

        queue.last_frame_ts = match (queue.frames.len(), queue.frames.front()) {
            (1, Some(front)) => Some(front.frame.timestamp),
            _ => Some(target),
        };
    }
}
