//! Pass Profiling
//!
//! Per-pass counters that any recording thread may update. Sections are
//! bracketed on the command list; with the `profiling` feature disabled the
//! brackets compile to nothing and only dispatch counts are kept.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::device::ComputeCommandInterface;

/// One measurement returned by a backend when a profiling section closes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProfilingSample {
    pub gpu_time_ms: f32,
    /// Dispatches the backend attributes to the measured section.
    pub dispatch_count: u32,
}

/// Point-in-time copy of [`PassProfilingStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfilingSnapshot {
    /// Dispatches recorded by the pass.
    pub dispatches: u64,
    pub samples: u64,
    /// Dispatches reported back by profiling samples.
    pub sampled_dispatches: u64,
    pub gpu_time_us: u64,
}

#[derive(Debug, Default)]
pub struct PassProfilingStats {
    dispatches: AtomicU64,
    samples: AtomicU64,
    sampled_dispatches: AtomicU64,
    gpu_time_us: AtomicU64,
}

impl PassProfilingStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn merge(&self, sample: ProfilingSample) {
        let micros = (f64::from(sample.gpu_time_ms.max(0.0)) * 1000.0).round() as u64;
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sampled_dispatches
            .fetch_add(u64::from(sample.dispatch_count), Ordering::Relaxed);
        self.gpu_time_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.dispatches.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        self.sampled_dispatches.store(0, Ordering::Relaxed);
        self.gpu_time_us.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProfilingSnapshot {
        ProfilingSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            sampled_dispatches: self.sampled_dispatches.load(Ordering::Relaxed),
            gpu_time_us: self.gpu_time_us.load(Ordering::Relaxed),
        }
    }
}

#[cfg(feature = "profiling")]
pub(crate) fn begin_section(cmd: &mut dyn ComputeCommandInterface, label: &str) {
    cmd.begin_profiling_section(label);
}

#[cfg(feature = "profiling")]
pub(crate) fn end_section(cmd: &mut dyn ComputeCommandInterface, stats: &PassProfilingStats) {
    if let Some(sample) = cmd.end_profiling_section() {
        stats.merge(sample);
    }
}

#[cfg(not(feature = "profiling"))]
pub(crate) fn begin_section(_cmd: &mut dyn ComputeCommandInterface, _label: &str) {}

#[cfg(not(feature = "profiling"))]
pub(crate) fn end_section(_cmd: &mut dyn ComputeCommandInterface, _stats: &PassProfilingStats) {}
