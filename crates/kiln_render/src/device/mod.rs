//! Device Collaborators
//!
//! The narrow interfaces the binding layer calls into. Backends implement
//! them over their native API; tests implement them with deterministic
//! mocks.
//!
//! - [`DeviceObjectFactory`]: creates resource sets, layouts and pipeline
//!   states. `None` means "could not compile", never a panic.
//! - [`DeviceResourceSet`] / [`DeviceResourceLayout`] /
//!   [`DevicePipelineState`]: the compiled, shared device objects.
//! - [`ComputeCommandInterface`]: the command list a pass records into.
//! - [`ShaderReflection`]: constant buffer metadata per technique.
//!
//! All compiled objects are handed out as `Arc`s because the factory may
//! cache them by value and share them between passes.

pub mod cache;
pub mod context;
pub mod reflection;

use std::fmt::Debug;
use std::sync::Arc;

use bitflags::bitflags;
use kiln_core::Symbol;
use wgpu::ShaderStages;

use crate::pass::profiling::ProfilingSample;
use crate::resources::layout_desc::ResourceLayoutDescription;
use crate::resources::registry::ConstantBufferHandle;
use crate::resources::set_desc::{ResourceSetDescription, ResourceSetDirty};

pub use cache::DeviceObjectCache;
pub use context::DeviceContext;
pub use reflection::{
    ConstantMember, NoReflection, ReflectedConstantBuffer, ShaderHandle, ShaderReflection,
};

pub type ResourceSetHandle = Arc<dyn DeviceResourceSet>;
pub type ResourceLayoutHandle = Arc<dyn DeviceResourceLayout>;
pub type PipelineStateHandle = Arc<dyn DevicePipelineState>;

bitflags! {
    /// Creation options for device resource sets.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ResourceSetFlags: u32 {
        /// Rebind every entry on each use instead of only the changed ones.
        const FORCE_SET_ALL_STATE = 1 << 0;
    }
}

// ─── Compiled Device Objects ─────────────────────────────────────────────────

pub trait DeviceResourceSet: Send + Sync + Debug {
    fn id(&self) -> u64;

    /// Realises the parts of `desc` selected by `filter`.
    ///
    /// Returns `false` when a referenced resource is unusable. On failure
    /// the set keeps its previous contents.
    fn update(&self, desc: &ResourceSetDescription, filter: ResourceSetDirty) -> bool;
}

pub trait DeviceResourceLayout: Send + Sync + Debug {
    fn id(&self) -> u64;
}

pub trait DevicePipelineState: Send + Sync + Debug {
    fn id(&self) -> u64;

    fn is_valid(&self) -> bool;

    /// Monotonic counter, bumped whenever the pipeline is rebuilt behind the
    /// pass's back (shader hot-reload, device reset).
    fn update_count(&self) -> u64;
}

// ─── Pipeline Description ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ComputePsoDescription {
    pub layout: ResourceLayoutHandle,
    pub shader: ShaderHandle,
    pub technique: Symbol,
    pub rt_mask: u64,
}

/// Value identity of a compute pipeline.
///
/// Layouts are deduplicated by shape, so the layout id stands in for the
/// full layout description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub layout_id: u64,
    pub shader: ShaderHandle,
    pub technique: Symbol,
    pub rt_mask: u64,
}

impl ComputePsoDescription {
    #[must_use]
    pub fn key(&self) -> ComputePipelineKey {
        ComputePipelineKey {
            layout_id: self.layout.id(),
            shader: self.shader,
            technique: self.technique,
            rt_mask: self.rt_mask,
        }
    }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

pub trait DeviceObjectFactory: Send + Sync {
    fn create_resource_set(&self, flags: ResourceSetFlags) -> ResourceSetHandle;

    fn create_resource_layout(&self, desc: &ResourceLayoutDescription) -> Option<ResourceLayoutHandle>;

    fn create_compute_pso(&self, desc: &ComputePsoDescription) -> Option<PipelineStateHandle>;
}

// ─── Command List ────────────────────────────────────────────────────────────

/// Command recording surface used by compute passes.
///
/// One instance is recorded by one thread at a time; different threads
/// record into different command lists.
pub trait ComputeCommandInterface {
    /// Lets the backend track residency and hazards of a resource set
    /// before any dispatch is recorded.
    fn prepare_resources_for_use(&mut self, slot: u8, resources: &ResourceSetHandle);

    fn prepare_inline_constant_buffer_for_use(
        &mut self,
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    );

    fn set_resource_layout(&mut self, layout: &ResourceLayoutHandle);

    fn set_pipeline_state(&mut self, pipeline: &PipelineStateHandle);

    fn set_resources(&mut self, slot: u8, resources: &ResourceSetHandle);

    fn set_inline_constant_buffer(
        &mut self,
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    );

    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn begin_profiling_section(&mut self, _label: &str) {}

    /// Closes the innermost profiling section, returning its timing if the
    /// backend measured one.
    fn end_profiling_section(&mut self) -> Option<ProfilingSample> {
        None
    }
}
