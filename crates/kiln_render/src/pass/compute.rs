//! Compute Render Pass
//!
//! A [`ComputeRenderPass`] owns the configuration of one compute dispatch
//! (shader, technique, bindings, dispatch size) and compiles the device
//! objects it needs on demand.
//!
//! # Frame Flow
//!
//! ```text
//! set_*()                    ORs bits into the dirty mask
//! begin_constant_update()    compiles if dirty, opens named constant writes
//! set_constant()             writes into staging
//! prepare_resources_for_use  closes constant writes, or compiles if dirty,
//!                            then lets the backend track residency
//! execute()                  begin / dispatch / end, or hand to the scheduler
//! ```
//!
//! # Compilation
//!
//! [`compile`](ComputeRenderPass::compile) rebuilds only what the dirty mask
//! names, in dependency order: resource set, then reflection and layout,
//! then pipeline state. The first failing step aborts the compile, the mask
//! keeps every bit it had, and the previously compiled objects stay in
//! place. Failures are logged and retried on the next call; a pass that
//! never compiles simply never dispatches.
//!
//! [`dispatch`](ComputeRenderPass::dispatch) never compiles, so it only
//! needs `&self` and is safe to call while other threads record other
//! passes.

use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use bytemuck::Pod;
use glam::UVec3;
use kiln_core::{Result, Symbol, interner};
use thiserror::Error;
use wgpu::ShaderStages;

use super::compiled::CompiledPassState;
use super::dirty::{DirtyMask, InvalidationSignal, PassState};
use super::profiling::{self, PassProfilingStats};
use super::scheduler::ScheduledPass;
use crate::device::{
    ComputeCommandInterface, ComputePsoDescription, DeviceContext, ResourceSetFlags, ShaderHandle,
};
use crate::resources::binding::{ResourceType, ResourceViewHandle, SamplerStateHandle};
use crate::resources::layout_desc::ResourceLayoutDescription;
use crate::resources::registry::{
    BufferHandle, ConstantBufferHandle, InvalidationListener, TextureHandle,
};
use crate::resources::set_desc::{ResourceSetDescription, ResourceSetDirty};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ComputePassFlags: u32 {
        /// Discover inline constant buffers from the shader and accept named
        /// constant writes.
        const REFLECT_CONSTANT_BUFFERS_FROM_SHADER = 1 << 0;
    }
}

const DEFAULT_LABEL: &str = "COMPUTE_PASS";

/// Why a compile step gave up.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
enum CompileFailure {
    #[error("resource set update failed")]
    ResourceSetUpdate,
    #[error("no shader technique assigned")]
    MissingShader,
    #[error("{0} inline constant buffers do not fit the layout slot range")]
    TooManyInlineConstantBuffers(usize),
    #[error("resource layout creation failed")]
    ResourceLayout,
    #[error("pipeline state creation failed")]
    PipelineState,
    #[error("pipeline state is not valid")]
    InvalidPipelineState,
}

pub struct ComputeRenderPass {
    ctx: DeviceContext,
    label: String,
    flags: ComputePassFlags,
    dirty: DirtyMask,
    invalidation: Arc<InvalidationSignal>,

    shader: Option<ShaderHandle>,
    technique: Option<Symbol>,
    rt_mask: u64,
    dispatch_size: [u32; 3],

    pending_constant_update: bool,
    compiled: bool,

    resource_desc: ResourceSetDescription,
    artifacts: CompiledPassState,
    stats: Arc<PassProfilingStats>,
}

impl ComputeRenderPass {
    #[must_use]
    pub fn new(ctx: DeviceContext, flags: ComputePassFlags) -> Self {
        let invalidation = Arc::new(InvalidationSignal::new());
        let listener = Arc::downgrade(&invalidation);
        let listener: Weak<dyn InvalidationListener> = listener;
        let resource_desc = ResourceSetDescription::with_invalidation(ctx.registry().clone(), listener);

        let artifacts = CompiledPassState {
            resource_set: Some(
                ctx.factory()
                    .create_resource_set(ResourceSetFlags::FORCE_SET_ALL_STATE),
            ),
            ..CompiledPassState::default()
        };

        Self {
            ctx,
            label: DEFAULT_LABEL.to_owned(),
            flags,
            dirty: DirtyMask::ALL,
            invalidation,
            shader: None,
            technique: None,
            rt_mask: 0,
            dispatch_size: [1, 1, 1],
            pending_constant_update: false,
            compiled: false,
            resource_desc,
            artifacts,
            stats: Arc::new(PassProfilingStats::new()),
        }
    }

    // ─── Configuration ───────────────────────────────────────────────────

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn flags(&self) -> ComputePassFlags {
        self.flags
    }

    /// Changing the flags changes how constants are reflected, so the
    /// pipeline is rebuilt.
    pub fn set_flags(&mut self, flags: ComputePassFlags) {
        if self.flags != flags {
            self.flags = flags;
            self.dirty |= DirtyMask::TECHNIQUE;
        }
    }

    pub fn set_technique(&mut self, shader: ShaderHandle, technique: &str, rt_mask: u64) {
        let technique = interner::intern(technique);
        if self.shader != Some(shader) || self.technique != Some(technique) || self.rt_mask != rt_mask {
            self.shader = Some(shader);
            self.technique = Some(technique);
            self.rt_mask = rt_mask;
            self.dirty |= DirtyMask::TECHNIQUE;
        }
    }

    #[must_use]
    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    #[must_use]
    pub fn technique(&self) -> Option<&'static str> {
        self.technique.map(interner::resolve)
    }

    #[must_use]
    pub fn rt_mask(&self) -> u64 {
        self.rt_mask
    }

    /// Dispatch size does not affect compiled state.
    pub fn set_dispatch_size(&mut self, x: u32, y: u32, z: u32) {
        self.dispatch_size = [x, y, z];
    }

    /// Enough groups of `group_size` threads to cover `extent`.
    pub fn set_dispatch_size_for_extent(&mut self, extent: UVec3, group_size: UVec3) {
        let group_size = group_size.max(UVec3::ONE);
        self.dispatch_size = [
            extent.x.div_ceil(group_size.x),
            extent.y.div_ceil(group_size.y),
            extent.z.div_ceil(group_size.z),
        ];
    }

    #[must_use]
    pub fn dispatch_size(&self) -> [u32; 3] {
        self.dispatch_size
    }

    // ─── Bindings ────────────────────────────────────────────────────────
    //
    // Each setter returns the dirty bits it added.

    pub fn set_texture(&mut self, slot: u8, texture: TextureHandle) -> DirtyMask {
        self.apply(|desc| {
            desc.set_texture(slot, texture, ResourceViewHandle::SHADER_RESOURCE, ShaderStages::COMPUTE)
        })
    }

    /// Binds `texture` for writing.
    pub fn set_output_uav(&mut self, slot: u8, texture: TextureHandle) -> DirtyMask {
        self.apply(|desc| {
            desc.set_texture(slot, texture, ResourceViewHandle::UNORDERED_ACCESS, ShaderStages::COMPUTE)
        })
    }

    pub fn set_buffer(&mut self, slot: u8, buffer: BufferHandle, view: ResourceViewHandle) -> DirtyMask {
        self.apply(|desc| desc.set_buffer(slot, buffer, view, ShaderStages::COMPUTE))
    }

    pub fn set_sampler(&mut self, slot: u8, sampler: SamplerStateHandle) -> DirtyMask {
        self.apply(|desc| desc.set_sampler(slot, sampler, ShaderStages::COMPUTE))
    }

    pub fn set_constant_buffer(&mut self, slot: u8, buffer: ConstantBufferHandle) -> DirtyMask {
        self.apply(|desc| desc.set_constant_buffer(slot, buffer, ShaderStages::COMPUTE))
    }

    pub fn clear_resource(&mut self, resource_type: ResourceType, slot: u8) -> DirtyMask {
        self.apply(|desc| desc.clear_slot(resource_type, slot))
    }

    fn apply(
        &mut self,
        update: impl FnOnce(&mut ResourceSetDescription) -> ResourceSetDirty,
    ) -> DirtyMask {
        let delta = DirtyMask::from(update(&mut self.resource_desc));
        self.dirty |= delta;
        delta
    }

    /// Binds a constant buffer outside the resource set, directly at
    /// `shader_slot`. It takes precedence over a reflected buffer at the
    /// same register.
    pub fn set_inline_constant_buffer(&mut self, shader_slot: u8, buffer: ConstantBufferHandle) -> DirtyMask {
        if self
            .artifacts
            .constants
            .set_manual_buffer(shader_slot, buffer, ShaderStages::COMPUTE)
        {
            self.dirty |= DirtyMask::RESOURCE_LAYOUT;
            DirtyMask::RESOURCE_LAYOUT
        } else {
            DirtyMask::empty()
        }
    }

    pub fn clear_inline_constant_buffer(&mut self, shader_slot: u8) -> DirtyMask {
        if self.artifacts.constants.remove_manual_buffer(shader_slot) {
            self.dirty |= DirtyMask::RESOURCE_LAYOUT;
            DirtyMask::RESOURCE_LAYOUT
        } else {
            DirtyMask::empty()
        }
    }

    #[must_use]
    pub fn resource_description(&self) -> &ResourceSetDescription {
        &self.resource_desc
    }

    // ─── Named Constants ─────────────────────────────────────────────────

    /// Writes a reflected constant. Only valid between
    /// [`begin_constant_update`](Self::begin_constant_update) and the next
    /// [`prepare_resources_for_use`](Self::prepare_resources_for_use).
    pub fn set_constant<T: Pod>(&mut self, name: &str, value: &T) -> Result<()> {
        self.artifacts.constants.set_constant(name, value)
    }

    pub fn set_constant_array<T: Pod>(&mut self, name: &str, values: &[T]) -> Result<()> {
        self.artifacts.constants.set_constant_array(name, values)
    }

    // ─── Dirty State ─────────────────────────────────────────────────────

    /// Current dirty bits, including resource invalidations raised by other
    /// threads and pipelines rebuilt since the last compile.
    #[must_use]
    pub fn dirty_mask(&self) -> DirtyMask {
        let mut mask = self.dirty;
        if self.invalidation.is_raised() {
            mask |= DirtyMask::RESOURCES;
        }
        if self.artifacts.is_pipeline_stale() {
            mask |= DirtyMask::TECHNIQUE;
        }
        mask
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty_mask().is_empty()
    }

    #[must_use]
    pub fn state(&self) -> PassState {
        PassState::from_mask(self.dirty_mask())
    }

    /// Whether the most recent compile succeeded.
    #[must_use]
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    #[must_use]
    pub fn compiled_state(&self) -> &CompiledPassState {
        &self.artifacts
    }

    /// The layout description of the last successful pipeline compile.
    #[must_use]
    pub fn layout_description(&self) -> Option<&ResourceLayoutDescription> {
        self.artifacts.layout_description()
    }

    #[must_use]
    pub fn profiling_stats(&self) -> &Arc<PassProfilingStats> {
        &self.stats
    }

    // ─── Compilation ─────────────────────────────────────────────────────

    /// Rebuilds whatever the dirty mask names and returns the remaining
    /// mask: empty on success, unchanged on failure.
    pub fn compile(&mut self) -> DirtyMask {
        let mut mask = self.dirty;
        if self.invalidation.take() {
            mask |= DirtyMask::RESOURCES;
        }
        if self.artifacts.is_pipeline_stale() {
            log::debug!("Compute pass '{}': pipeline state was rebuilt externally", self.label);
            mask |= DirtyMask::TECHNIQUE;
        }
        self.dirty = mask;
        self.compiled = false;

        match self.compile_steps(mask) {
            Ok(()) => {
                log::trace!("Compute pass '{}' compiled ({mask:?})", self.label);
                self.dirty = DirtyMask::empty();
                self.compiled = true;
            }
            Err(failure) => {
                log::warn!("Compute pass '{}' failed to compile: {failure}", self.label);
            }
        }
        self.dirty
    }

    fn compile_steps(&mut self, mask: DirtyMask) -> std::result::Result<(), CompileFailure> {
        if mask.contains(DirtyMask::RESOURCES) {
            let resource_set = match &self.artifacts.resource_set {
                Some(set) => set.clone(),
                None => self
                    .ctx
                    .factory()
                    .create_resource_set(ResourceSetFlags::FORCE_SET_ALL_STATE),
            };
            let filter = mask.resource_set_filter();
            if !resource_set.update(&self.resource_desc, filter) {
                return Err(CompileFailure::ResourceSetUpdate);
            }
            self.resource_desc.mark_clean(filter);
            self.artifacts.resource_set = Some(resource_set);
        }

        if mask.intersects(DirtyMask::PIPELINE) {
            let (Some(shader), Some(technique)) = (self.shader, self.technique) else {
                return Err(CompileFailure::MissingShader);
            };
            let reflect = self
                .flags
                .contains(ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);

            let constants = &mut self.artifacts.constants;
            constants.release_shader_reflection();
            if reflect {
                constants.allocate_shader_reflection(self.ctx.reflection().reflect_constant_buffers(
                    shader,
                    technique,
                    self.rt_mask,
                    ShaderStages::COMPUTE,
                ));
            }

            // Resource set first, then inline constant buffers.
            let inline_count = constants.buffers().len();
            if inline_count > usize::from(u8::MAX) {
                return Err(CompileFailure::TooManyInlineConstantBuffers(inline_count));
            }
            let mut layout_desc = ResourceLayoutDescription::new();
            layout_desc.set_resource_set(0, &self.resource_desc);
            for (bind_slot, cb) in (1..=u8::MAX).zip(constants.buffers()) {
                layout_desc.set_constant_buffer(bind_slot, cb.shader_slot, cb.stages);
            }

            let factory = self.ctx.factory();
            let layout = factory
                .create_resource_layout(&layout_desc)
                .ok_or(CompileFailure::ResourceLayout)?;

            let pipeline = factory
                .create_compute_pso(&ComputePsoDescription {
                    layout: layout.clone(),
                    shader,
                    technique,
                    rt_mask: self.rt_mask,
                })
                .ok_or(CompileFailure::PipelineState)?;
            if !pipeline.is_valid() {
                return Err(CompileFailure::InvalidPipelineState);
            }

            if reflect {
                constants.init_shader_reflection(pipeline.as_ref());
            }
            self.artifacts.pso_update_count = pipeline.update_count();
            self.artifacts.resource_layout = Some(layout);
            self.artifacts.pipeline_state = Some(pipeline);
            self.artifacts.layout_desc = Some(layout_desc);
        }

        Ok(())
    }

    // ─── Per-Frame Recording ─────────────────────────────────────────────

    /// Compiles if needed and opens named constant writes. Does nothing
    /// unless the pass reflects its constants from the shader, or while an
    /// update is already open.
    pub fn begin_constant_update(&mut self) {
        if !self
            .flags
            .contains(ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER)
            || self.pending_constant_update
        {
            return;
        }
        if self.is_dirty() {
            self.compile();
        }
        self.pending_constant_update = true;
        let pipeline = self.artifacts.pipeline_state().map(|pso| pso.id());
        self.artifacts
            .constants
            .begin_named_constant_update(self.ctx.registry(), pipeline);
    }

    #[must_use]
    pub fn is_constant_update_pending(&self) -> bool {
        self.pending_constant_update
    }

    /// Closes a pending constant update, or compiles if dirty. Once clean,
    /// announces the resource set (slot 0) and inline constant buffers
    /// (slots 1..) to the backend.
    pub fn prepare_resources_for_use(&mut self, cmd: &mut dyn ComputeCommandInterface) {
        if self.pending_constant_update {
            if self.compiled && self.is_dirty() {
                log::warn!(
                    "Compute pass '{}' was modified after begin_constant_update",
                    self.label
                );
            }
            self.artifacts
                .constants
                .end_named_constant_update(self.ctx.registry());
            self.pending_constant_update = false;
        } else if self.is_dirty() {
            self.compile();
        }

        if self.is_dirty() {
            return;
        }
        let Some(resource_set) = &self.artifacts.resource_set else {
            return;
        };

        cmd.prepare_resources_for_use(0, resource_set);
        for (bind_slot, cb) in (1..=u8::MAX).zip(self.artifacts.constants.buffers()) {
            cmd.prepare_inline_constant_buffer_for_use(bind_slot, cb.buffer, cb.shader_slot, cb.stages);
        }
    }

    pub fn begin_render_pass(&self, cmd: &mut dyn ComputeCommandInterface) {
        profiling::begin_section(cmd, &self.label);
    }

    pub fn end_render_pass(&self, cmd: &mut dyn ComputeCommandInterface) {
        profiling::end_section(cmd, &self.stats);
    }

    /// Records bind and dispatch commands if the pass is clean; otherwise
    /// records nothing.
    pub fn dispatch(&self, cmd: &mut dyn ComputeCommandInterface) {
        if self.is_dirty() {
            return;
        }
        if let Some(packet) = self.artifacts.dispatch_packet(self.dispatch_size) {
            packet.record(cmd);
            self.stats.record_dispatch();
        }
    }

    /// Begin, dispatch, end. While the scheduler is batching, the pass is
    /// handed to it instead and nothing is recorded here.
    pub fn execute(&self, cmd: &mut dyn ComputeCommandInterface) {
        if let Some(scheduler) = self.ctx.scheduler()
            && scheduler.is_active()
        {
            scheduler.add_pass(self.schedule());
            return;
        }

        self.begin_render_pass(cmd);
        self.dispatch(cmd);
        self.end_render_pass(cmd);
    }

    /// Snapshot of the pass for deferred execution.
    #[must_use]
    pub fn schedule(&self) -> ScheduledPass {
        let packet = if self.is_dirty() {
            None
        } else {
            self.artifacts.dispatch_packet(self.dispatch_size)
        };
        ScheduledPass {
            label: self.label.clone(),
            packet,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Back to a freshly constructed, uncompiled pass with zero dispatch
    /// size. All bindings and compiled objects are released.
    pub fn reset(&mut self) {
        self.flags = ComputePassFlags::empty();
        self.dirty = DirtyMask::ALL;
        self.invalidation.take();

        self.pending_constant_update = false;
        self.compiled = false;

        self.shader = None;
        self.technique = None;
        self.rt_mask = 0;
        self.dispatch_size = [0, 0, 0];

        self.resource_desc.clear();
        self.artifacts.release();
        self.stats.reset();
    }
}

impl fmt::Debug for ComputeRenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeRenderPass")
            .field("label", &self.label)
            .field("flags", &self.flags)
            .field("dirty", &self.dirty_mask())
            .field("technique", &self.technique())
            .field("dispatch_size", &self.dispatch_size)
            .field("bindings", &self.resource_desc.len())
            .finish_non_exhaustive()
    }
}
