//! # GPU Timer
//!
//! Timestamp queries written into a frame's command buffer and read back
//! once that frame's fence has signaled. Each frame slot owns a query pool,
//! so reading slot 0 never races with the GPU writing slot 1.
//!
//! ```text
//! acquire(frame) → read_timer_results → get_cmd(false) → begin
//!     → timer_start → ...work... → timestamp("shadows") → ...
//!     → timestamp("lighting") → end → submit_frame
//! ```
//!
//! `timer_start` resets the slot's pool and writes the reference stamp.
//! Every later stamp records the time since the stamp before it under its
//! own name, keeping the last [`TIMER_HISTORY`] intervals.
//!
//! The timer exists only when [`RendererConfig::gpu_timer`] is set.
//!
//! [`RendererConfig::gpu_timer`]: crate::config::RendererConfig::gpu_timer

use tracing::{debug, trace};

use crate::backend::{GpuBackend, Op};
use crate::error::{RenderError, RenderResult};
use crate::frame::CONCURRENT_FRAMES;
use crate::recorder::Recorder;
use crate::renderer::Renderer;

/// Timestamps per frame, the reference stamp included.
pub const MAX_TIMESTAMPS: u32 = 50;

/// Intervals kept per timestamp.
pub const TIMER_HISTORY: usize = 120;

/// Name of the reference stamp written by [`Recorder::timer_start`].
pub const TIMER_START: &str = "gpu timing start";

const NS_PER_MS: f64 = 1_000_000.0;

/// Ring of the most recent intervals of one timestamp, in milliseconds.
#[derive(Clone, Debug)]
pub struct TimestampHistory {
    samples: [f64; TIMER_HISTORY],
    next: usize,
    len: usize,
}

impl Default for TimestampHistory {
    fn default() -> Self {
        Self { samples: [0.0; TIMER_HISTORY], next: 0, len: 0 }
    }
}

impl TimestampHistory {
    /// Appends an interval, dropping the oldest once full.
    pub fn push(&mut self, ms: f64) {
        self.samples[self.next] = ms;
        self.next = (self.next + 1) % TIMER_HISTORY;
        self.len = (self.len + 1).min(TIMER_HISTORY);
    }

    /// Most recent interval.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        (self.len > 0).then(|| self.samples[(self.next + TIMER_HISTORY - 1) % TIMER_HISTORY])
    }

    /// Mean of the kept intervals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        (self.len > 0).then(|| self.iter().sum::<f64>() / self.len as f64)
    }

    /// Kept intervals, oldest first.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = (self.next + TIMER_HISTORY - self.len) % TIMER_HISTORY;
        (0..self.len).map(move |i| self.samples[(start + i) % TIMER_HISTORY])
    }

    /// Number of kept intervals.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true before the first interval arrives.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct SlotQueries<B: GpuBackend> {
    pool: B::QueryPool,
    written: u32,
}

/// Per-slot query pools and the interval history they feed.
pub struct GpuTimer<B: GpuBackend> {
    slots: Vec<SlotQueries<B>>,
    names: Vec<&'static str>,
    history: Vec<TimestampHistory>,
}

impl<B: GpuBackend> GpuTimer<B> {
    pub(crate) fn new(backend: &mut B) -> RenderResult<Self> {
        let mut slots = Vec::with_capacity(CONCURRENT_FRAMES);
        for _ in 0..CONCURRENT_FRAMES {
            match backend.create_query_pool(MAX_TIMESTAMPS) {
                Ok(pool) => slots.push(SlotQueries { pool, written: 0 }),
                Err(err) => {
                    for slot in slots {
                        backend.destroy_query_pool(slot.pool);
                    }
                    return Err(err.into());
                }
            }
        }
        debug!(slots = CONCURRENT_FRAMES, timestamps = MAX_TIMESTAMPS, "gpu timer created");
        Ok(Self {
            slots,
            names: vec![""; MAX_TIMESTAMPS as usize],
            history: vec![TimestampHistory::default(); MAX_TIMESTAMPS as usize],
        })
    }

    pub(crate) fn destroy(self, backend: &mut B) {
        for slot in self.slots {
            backend.destroy_query_pool(slot.pool);
        }
    }

    /// Timestamps recorded into `slot` since its last read.
    #[must_use]
    pub fn written(&self, slot: usize) -> u32 {
        self.slots.get(slot).map_or(0, |s| s.written)
    }

    /// History of the named interval, if it has been measured.
    #[must_use]
    pub fn history(&self, name: &str) -> Option<&TimestampHistory> {
        self.timings().find(|(n, _)| *n == name).map(|(_, history)| history)
    }

    /// Every measured interval in recording order. The reference stamp has
    /// no interval and is skipped.
    #[must_use]
    pub fn timings(&self) -> impl Iterator<Item = (&'static str, &TimestampHistory)> + '_ {
        self.names
            .iter()
            .zip(&self.history)
            .skip(1)
            .filter(|(_, history)| !history.is_empty())
            .map(|(name, history)| (*name, history))
    }

    /// Turns raw ticks into intervals. A clock that went backwards
    /// yields zero.
    fn record_intervals(&mut self, ticks: &[u64], period_ns: f64) {
        for (i, pair) in ticks.windows(2).enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let ns = pair[1].saturating_sub(pair[0]) as f64 * period_ns;
            self.history[i + 1].push(ns / NS_PER_MS);
        }
    }
}

impl<B: GpuBackend> Renderer<B> {
    /// The GPU timer, if enabled in the config.
    #[must_use]
    pub const fn gpu_timer(&self) -> Option<&GpuTimer<B>> {
        self.timer.as_ref()
    }

    /// Collects the active slot's timestamps from its previous frame.
    ///
    /// Call between [`Renderer::acquire_next_image`] and
    /// [`Renderer::get_cmd`]: this waits on the slot's fence, which
    /// `get_cmd` then resets. A slot with nothing recorded is a no-op.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidArgument`] if the timer is disabled
    /// - backend errors, including `WouldBlock` while the slot's work is
    ///   still in flight
    pub fn read_timer_results(&mut self) -> RenderResult<()> {
        let slot = self.active_frame;
        let timer = self.timer.as_mut().ok_or(RenderError::InvalidArgument("gpu timer is disabled"))?;
        let written = timer.slots[slot].written;
        if written == 0 {
            return Ok(());
        }

        self.backend.wait_fence(&self.frames[slot].fence)?;
        let mut ticks = [0u64; MAX_TIMESTAMPS as usize];
        let ticks = &mut ticks[..written as usize];
        self.backend.read_timestamps(&timer.slots[slot].pool, ticks)?;

        let period = f64::from(self.backend.device_info().limits.timestamp_period);
        timer.record_intervals(ticks, period);
        timer.slots[slot].written = 0;

        trace!(slot, timestamps = written, "gpu timer results read");
        Ok(())
    }
}

impl<B: GpuBackend> Recorder<'_, B> {
    /// Resets the active slot's queries and writes the reference stamp.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] if the timer is disabled, or
    /// backend failure.
    pub fn timer_start(&mut self) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let slot = r.active_frame;
        let timer = r.timer.as_mut().ok_or(RenderError::InvalidArgument("gpu timer is disabled"))?;
        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::ResetQueries { pool: &timer.slots[slot].pool, count: MAX_TIMESTAMPS })?;
        timer.slots[slot].written = 0;

        self.timestamp(TIMER_START)
    }

    /// Writes the next timestamp of the active slot under `name`. Its
    /// interval runs from the previous stamp.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidArgument`] if the timer is disabled or
    /// [`MAX_TIMESTAMPS`] stamps were already written this frame, or
    /// backend failure.
    pub fn timestamp(&mut self, name: &'static str) -> RenderResult<()> {
        let r = &mut *self.renderer;
        let slot = r.active_frame;
        let timer = r.timer.as_mut().ok_or(RenderError::InvalidArgument("gpu timer is disabled"))?;
        let index = timer.slots[slot].written;
        if index >= MAX_TIMESTAMPS {
            return Err(RenderError::InvalidArgument("too many gpu timestamps in one frame"));
        }

        let list = r.ring.recording_list(self.cmd)?;
        r.backend.record(list, Op::WriteTimestamp { pool: &timer.slots[slot].pool, index })?;
        timer.names[index as usize] = name;
        timer.slots[slot].written = index + 1;
        Ok(())
    }
}
