//! Compiled Pass State
//!
//! The device objects a pass compiled, plus the inline constant buffers that
//! were bound into its layout. Owned exclusively by one pass; the objects
//! themselves are shared handles that the factory may hand to other passes
//! with the same shape.

use smallvec::SmallVec;
use wgpu::ShaderStages;

use super::constants::ConstantManager;
use crate::device::{
    ComputeCommandInterface, PipelineStateHandle, ResourceLayoutHandle, ResourceSetHandle,
};
use crate::resources::layout_desc::ResourceLayoutDescription;
use crate::resources::registry::ConstantBufferHandle;

#[derive(Debug, Default)]
pub struct CompiledPassState {
    pub(crate) resource_set: Option<ResourceSetHandle>,
    pub(crate) resource_layout: Option<ResourceLayoutHandle>,
    pub(crate) pipeline_state: Option<PipelineStateHandle>,
    pub(crate) pso_update_count: u64,
    pub(crate) layout_desc: Option<ResourceLayoutDescription>,
    pub(crate) constants: ConstantManager,
}

impl CompiledPassState {
    #[must_use]
    pub fn resource_set(&self) -> Option<&ResourceSetHandle> {
        self.resource_set.as_ref()
    }

    #[must_use]
    pub fn resource_layout(&self) -> Option<&ResourceLayoutHandle> {
        self.resource_layout.as_ref()
    }

    #[must_use]
    pub fn pipeline_state(&self) -> Option<&PipelineStateHandle> {
        self.pipeline_state.as_ref()
    }

    /// Update count of the pipeline state at the time it was compiled.
    #[must_use]
    pub fn pso_update_count(&self) -> u64 {
        self.pso_update_count
    }

    #[must_use]
    pub fn layout_description(&self) -> Option<&ResourceLayoutDescription> {
        self.layout_desc.as_ref()
    }

    #[must_use]
    pub fn constants(&self) -> &ConstantManager {
        &self.constants
    }

    /// The pipeline was rebuilt externally since it was compiled.
    #[must_use]
    pub fn is_pipeline_stale(&self) -> bool {
        self.pipeline_state
            .as_ref()
            .is_some_and(|pso| pso.update_count() != self.pso_update_count)
    }

    /// Everything needed to record one dispatch, or `None` if an artifact is
    /// missing.
    #[must_use]
    pub fn dispatch_packet(&self, size: [u32; 3]) -> Option<DispatchPacket> {
        Some(DispatchPacket {
            layout: self.resource_layout.clone()?,
            pipeline: self.pipeline_state.clone()?,
            resources: self.resource_set.clone()?,
            inline_buffers: self
                .constants
                .buffers()
                .iter()
                .map(|cb| (cb.buffer, cb.shader_slot, cb.stages))
                .collect(),
            size,
        })
    }

    /// Drops every compiled artifact and every inline constant buffer.
    pub fn release(&mut self) {
        self.resource_set = None;
        self.resource_layout = None;
        self.pipeline_state = None;
        self.pso_update_count = 0;
        self.layout_desc = None;
        self.constants.reset();
    }
}

// ─── Dispatch Packet ─────────────────────────────────────────────────────────

/// Immutable snapshot of one compiled dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPacket {
    pub layout: ResourceLayoutHandle,
    pub pipeline: PipelineStateHandle,
    pub resources: ResourceSetHandle,
    /// `(buffer, shader_slot, stages)` in bind order.
    pub inline_buffers: SmallVec<[(ConstantBufferHandle, u8, ShaderStages); 2]>,
    pub size: [u32; 3],
}

impl DispatchPacket {
    /// Binds layout, pipeline, resource set (slot 0) and inline constant
    /// buffers (slots 1..), then dispatches.
    pub fn record(&self, cmd: &mut dyn ComputeCommandInterface) {
        cmd.set_resource_layout(&self.layout);
        cmd.set_pipeline_state(&self.pipeline);

        cmd.set_resources(0, &self.resources);
        for (bind_slot, &(buffer, shader_slot, stages)) in (1..=u8::MAX).zip(&self.inline_buffers) {
            cmd.set_inline_constant_buffer(bind_slot, buffer, shader_slot, stages);
        }

        let [x, y, z] = self.size;
        cmd.dispatch(x, y, z);
    }
}
