//! Kiln Render
//!
//! Resource binding, dirty tracking and compile-on-demand compute passes.
//!
//! - [`resources`]: GPU resource registry, bindings, set and layout
//!   descriptions
//! - [`device`]: the collaborator traits a backend implements, plus a
//!   value-keyed device object cache
//! - [`pass`]: [`ComputeRenderPass`] and everything it compiles
//!
//! # Example
//!
//! ```rust,ignore
//! let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::empty());
//! pass.set_technique(shader, "CS_Downsample", 0);
//! pass.set_texture(0, source);
//! pass.set_output_uav(1, target);
//! pass.set_dispatch_size(8, 1, 1);
//!
//! pass.prepare_resources_for_use(&mut cmd);
//! pass.execute(&mut cmd);
//! ```

pub mod device;
pub mod pass;
pub mod resources;

pub use device::{
    ComputeCommandInterface, ComputePipelineKey, ComputePsoDescription, DeviceContext,
    DeviceObjectCache, DeviceObjectFactory, DevicePipelineState, DeviceResourceLayout,
    DeviceResourceSet, PipelineStateHandle, ResourceLayoutHandle, ResourceSetFlags,
    ResourceSetHandle, ShaderHandle, ShaderReflection,
};
pub use pass::{
    ComputePassFlags, ComputeRenderPass, DirtyMask, PassScheduler, PassState, RenderPassScheduler,
};
pub use resources::{
    ResourceBinding, ResourceLayoutDescription, ResourceRegistry, ResourceSetDescription,
    ResourceSetDirty,
};
