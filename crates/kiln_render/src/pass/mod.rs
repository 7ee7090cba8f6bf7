//! Compute passes and the machinery around them: dirty tracking, compiled
//! state, inline constants, profiling and deferred scheduling.

pub mod compiled;
pub mod compute;
pub mod constants;
pub mod dirty;
pub mod profiling;
pub mod scheduler;

pub use compiled::{CompiledPassState, DispatchPacket};
pub use compute::{ComputePassFlags, ComputeRenderPass};
pub use constants::{ConstantManager, ConstantSource, InlineConstantBuffer};
pub use dirty::{DirtyMask, InvalidationSignal, PassState};
pub use profiling::{PassProfilingStats, ProfilingSample, ProfilingSnapshot};
pub use scheduler::{PassScheduler, RenderPassScheduler, ScheduledPass};
