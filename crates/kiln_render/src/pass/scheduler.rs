//! Pass Scheduling
//!
//! While a [`PassScheduler`] is batching, `execute` does not record anything:
//! the pass hands over a [`ScheduledPass`] snapshot and returns. The
//! scheduler later replays the snapshots in submission order.
//!
//! Snapshots hold shared handles to the compiled objects, so a pass may be
//! mutated and recompiled after scheduling without affecting the queued
//! work.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::compiled::DispatchPacket;
use super::profiling::{self, PassProfilingStats};
use crate::device::ComputeCommandInterface;

pub trait PassScheduler: Send + Sync {
    fn is_active(&self) -> bool;

    fn add_pass(&self, pass: ScheduledPass);
}

/// A pass as it was when `execute` handed it to the scheduler.
#[derive(Clone)]
pub struct ScheduledPass {
    pub label: String,
    /// `None` if the pass was not compiled at hand-over; replaying it then
    /// records only the profiling bracket.
    pub packet: Option<DispatchPacket>,
    pub stats: Arc<PassProfilingStats>,
}

impl ScheduledPass {
    /// Begin, dispatch, end.
    pub fn execute(&self, cmd: &mut dyn ComputeCommandInterface) {
        profiling::begin_section(cmd, &self.label);
        if let Some(packet) = &self.packet {
            packet.record(cmd);
            self.stats.record_dispatch();
        }
        profiling::end_section(cmd, &self.stats);
    }
}

impl fmt::Debug for ScheduledPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledPass")
            .field("label", &self.label)
            .field("dispatch", &self.packet.as_ref().map(|p| p.size))
            .finish_non_exhaustive()
    }
}

// ─── Render Pass Scheduler ───────────────────────────────────────────────────

/// Queue-backed scheduler. Any thread may add passes while a batch is open.
#[derive(Default)]
pub struct RenderPassScheduler {
    active: AtomicBool,
    queue: Mutex<Vec<ScheduledPass>>,
}

impl RenderPassScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts deferring `execute` calls.
    pub fn begin_batch(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Ends the batch and replays every queued pass into `cmd`.
    ///
    /// Returns the number of passes replayed.
    pub fn flush(&self, cmd: &mut dyn ComputeCommandInterface) -> usize {
        self.active.store(false, Ordering::Release);
        let passes = std::mem::take(&mut *self.queue.lock());
        log::trace!("Replaying {} scheduled compute passes", passes.len());
        for pass in &passes {
            pass.execute(cmd);
        }
        passes.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.lock().len()
    }
}

impl PassScheduler for RenderPassScheduler {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn add_pass(&self, pass: ScheduledPass) {
        self.queue.lock().push(pass);
    }
}

impl fmt::Debug for RenderPassScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPassScheduler")
            .field("active", &self.is_active())
            .field("pending", &self.pending_count())
            .finish()
    }
}
