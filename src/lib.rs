//! Kiln
//!
//! Compile-on-demand resource binding for GPU compute passes.
//!
//! A [`ComputeRenderPass`] tracks which textures, buffers, samplers and
//! constant buffers are bound to it, notices when that state changes (by
//! its own setters or because a bound resource was resized or destroyed
//! elsewhere), and rebuilds exactly the device objects that went stale
//! before the next dispatch. A pass that fails to compile stays dirty and
//! never dispatches until a later compile succeeds.
//!
//! The device itself is abstract: backends implement
//! [`DeviceObjectFactory`], [`ComputeCommandInterface`] and
//! [`ShaderReflection`](kiln_render::device::ShaderReflection), and hand them to
//! passes through a [`DeviceContext`].

pub use kiln_core;
pub use kiln_render;

pub use kiln_core::{KilnError, Result};
pub use kiln_render::{
    ComputeCommandInterface, ComputePassFlags, ComputeRenderPass, DeviceContext,
    DeviceObjectFactory, DirtyMask, PassState, RenderPassScheduler, ResourceLayoutDescription,
    ResourceRegistry, ResourceSetDescription, ShaderHandle,
};
