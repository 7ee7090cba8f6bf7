//! Compute Render Pass Tests
//!
//! Tests for:
//! - Compile-on-demand: what gets rebuilt for which dirty bits
//! - Dispatch gating on a clean dirty mask
//! - Failure semantics (mask unchanged, previous artifacts kept)
//! - External invalidation (resize / destroy) and pipeline hot-reload
//! - Reset, named constants, inline constant buffers
//! - Execute with and without an active scheduler

use std::sync::Arc;

use glam::{UVec3, Vec2};
use smallvec::smallvec;
use wgpu::ShaderStages;

use kiln::kiln_core::{KilnError, interner};
use kiln::kiln_render::device::{ConstantMember, ReflectedConstantBuffer};
use kiln::kiln_render::pass::ProfilingSample;
use kiln::kiln_render::resources::{
    ConstantBufferDesc, ConstantBufferHandle, ResourceBinding, ResourceType, ResourceViewHandle,
    SamplerStateHandle, TextureDesc, TextureHandle,
};
use kiln::{
    ComputePassFlags, ComputeRenderPass, DirtyMask, PassState, RenderPassScheduler,
    ResourceRegistry, ShaderHandle,
};
use kiln_dev_utils::{MockDevice, MockReflection, RecordedCommand, RecordingCommandList, init_test_logging};

const CS_SOURCE: &str = "@compute @workgroup_size(8, 1, 1) fn cs_main() {}";

struct Harness {
    registry: Arc<ResourceRegistry>,
    device: Arc<MockDevice>,
}

impl Harness {
    fn new() -> Self {
        init_test_logging();
        let registry = Arc::new(ResourceRegistry::new());
        let device = MockDevice::new(registry.clone());
        Self { registry, device }
    }

    fn texture(&self, label: &str) -> TextureHandle {
        self.registry.create_texture(TextureDesc {
            label: label.into(),
            width: 64,
            height: 64,
            format: wgpu::TextureFormat::Rgba16Float,
        })
    }

    fn constant_buffer(&self, label: &str, size: u32) -> ConstantBufferHandle {
        self.registry
            .create_constant_buffer(ConstantBufferDesc { label: label.into(), size })
    }

    fn pass(&self) -> ComputeRenderPass {
        let mut pass = ComputeRenderPass::new(self.device.context(), ComputePassFlags::empty());
        pass.set_technique(shader(), "CS_Main", 0);
        pass
    }
}

fn shader() -> ShaderHandle {
    ShaderHandle::from_source(CS_SOURCE)
}

fn expected_dispatch(pass: &ComputeRenderPass, size: [u32; 3]) -> Vec<RecordedCommand> {
    let state = pass.compiled_state();
    vec![
        RecordedCommand::SetResourceLayout(state.resource_layout().unwrap().id()),
        RecordedCommand::SetPipelineState(state.pipeline_state().unwrap().id()),
        RecordedCommand::SetResources {
            slot: 0,
            set: state.resource_set().unwrap().id(),
        },
        RecordedCommand::Dispatch(size[0], size[1], size[2]),
    ]
}

fn resource_set_id(pass: &ComputeRenderPass) -> u64 {
    pass.compiled_state().resource_set().unwrap().id()
}

// ============================================================================
// Compile and Dispatch
// ============================================================================

#[test]
fn single_texture_compiles_and_dispatches() {
    let h = Harness::new();
    let tex = h.texture("input");
    let mut pass = h.pass();
    pass.set_texture(0, tex);
    pass.set_dispatch_size(8, 1, 1);

    assert_eq!(pass.state(), PassState::Uncompiled);
    assert_eq!(pass.compile(), DirtyMask::empty());
    assert_eq!(pass.state(), PassState::Compiled);
    assert!(pass.is_compiled());

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert_eq!(cmd.commands(), expected_dispatch(&pass, [8, 1, 1]).as_slice());

    let set = h.device.find_resource_set(resource_set_id(&pass)).unwrap();
    let bindings = set.bindings();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].0.slot, 0);
    assert_eq!(bindings[0].0.stages, ShaderStages::COMPUTE);
    assert_eq!(
        bindings[0].1,
        ResourceBinding::texture(tex, ResourceViewHandle::SHADER_RESOURCE)
    );
}

#[test]
fn dispatch_never_compiles() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("t"));

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);

    assert!(cmd.is_empty());
    assert_eq!(pass.dirty_mask(), DirtyMask::ALL);
    assert_eq!(h.device.pipeline_requests(), 0);
}

#[test]
fn prepare_compiles_a_dirty_pass_and_announces_resources() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("t"));

    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);

    assert!(!pass.is_dirty());
    assert_eq!(
        cmd.commands(),
        &[RecordedCommand::PrepareResources {
            slot: 0,
            set: resource_set_id(&pass),
        }]
    );
}

#[test]
fn content_change_rebuilds_only_the_resource_set() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("a"));
    pass.compile();
    let pipeline_requests = h.device.pipeline_requests();
    let layout_requests = h.device.layout_requests();

    assert_eq!(pass.set_texture(0, h.texture("b")), DirtyMask::RESOURCES);
    assert_eq!(pass.compile(), DirtyMask::empty());

    assert_eq!(h.device.pipeline_requests(), pipeline_requests);
    assert_eq!(h.device.layout_requests(), layout_requests);
    let set = h.device.find_resource_set(resource_set_id(&pass)).unwrap();
    assert_eq!(set.update_count(), 2);
}

#[test]
fn dispatch_size_does_not_dirty_the_pass() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.compile();

    pass.set_dispatch_size(4, 4, 1);
    assert!(!pass.is_dirty());

    pass.set_dispatch_size_for_extent(UVec3::new(1920, 1080, 1), UVec3::new(8, 8, 1));
    assert_eq!(pass.dispatch_size(), [240, 135, 1]);
    pass.set_dispatch_size_for_extent(UVec3::new(1921, 1, 1), UVec3::new(64, 1, 1));
    assert_eq!(pass.dispatch_size(), [31, 1, 1]);
    pass.set_dispatch_size_for_extent(UVec3::new(u32::MAX, 1, u32::MAX), UVec3::new(8, 1, 1));
    assert_eq!(pass.dispatch_size(), [536_870_912, 1, u32::MAX]);
    pass.set_dispatch_size_for_extent(UVec3::new(5, 5, 5), UVec3::ZERO);
    assert_eq!(pass.dispatch_size(), [5, 5, 5]);

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert_eq!(cmd.dispatches(), vec![[5, 5, 5]]);
}

// ============================================================================
// Dirty Mask Accumulation
// ============================================================================

#[test]
fn mutations_only_add_bits() {
    let h = Harness::new();
    let tex = h.texture("a");
    let mut pass = h.pass();
    pass.set_texture(0, tex);
    pass.compile();

    // Identical binding: nothing to do.
    assert_eq!(pass.set_texture(0, tex), DirtyMask::empty());
    assert_eq!(pass.dirty_mask(), DirtyMask::empty());

    assert_eq!(pass.set_output_uav(0, tex), DirtyMask::RESOURCES);
    pass.set_technique(shader(), "CS_Other", 0);
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES | DirtyMask::TECHNIQUE);

    // Re-binding the old view does not clear anything.
    pass.set_texture(0, tex);
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES | DirtyMask::TECHNIQUE);

    assert_eq!(
        pass.set_sampler(0, SamplerStateHandle::LINEAR_CLAMP),
        DirtyMask::RESOURCES | DirtyMask::RESOURCE_LAYOUT
    );
    assert_eq!(pass.dirty_mask(), DirtyMask::ALL);
    assert_eq!(pass.state(), PassState::Uncompiled);
}

#[test]
fn technique_and_flags_changes_mark_technique() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.compile();

    pass.set_technique(shader(), "CS_Main", 0);
    assert!(!pass.is_dirty());

    pass.set_technique(shader(), "CS_Main", 1);
    assert_eq!(pass.dirty_mask(), DirtyMask::TECHNIQUE);
    pass.compile();

    pass.set_flags(ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);
    assert_eq!(pass.dirty_mask(), DirtyMask::TECHNIQUE);
    assert_eq!(pass.state(), PassState::PartiallyDirty);
}

#[test]
fn clearing_a_slot_changes_the_layout() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("a"));
    pass.set_texture(1, h.texture("b"));
    pass.compile();
    let before = pass.layout_description().cloned().unwrap();

    assert_eq!(pass.clear_resource(ResourceType::Texture, 1), DirtyMask::ALL & !DirtyMask::TECHNIQUE);
    assert_eq!(pass.clear_resource(ResourceType::Texture, 1), DirtyMask::empty());
    assert_eq!(pass.compile(), DirtyMask::empty());

    assert_ne!(pass.layout_description().unwrap(), &before);
}

// ============================================================================
// Failure Semantics
// ============================================================================

#[test]
fn failed_resource_update_keeps_mask_and_previous_bindings() {
    let h = Harness::new();
    let a = h.texture("a");
    let mut pass = h.pass();
    pass.set_texture(0, a);
    pass.set_dispatch_size(8, 1, 1);
    pass.compile();

    pass.set_texture(0, h.texture("b"));
    h.device.fail_resource_set_updates(true);
    assert_eq!(pass.compile(), DirtyMask::RESOURCES);
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES);
    assert!(!pass.is_compiled());

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    pass.prepare_resources_for_use(&mut cmd);
    assert!(cmd.is_empty());

    let set = h.device.find_resource_set(resource_set_id(&pass)).unwrap();
    assert_eq!(
        set.bindings()[0].1,
        ResourceBinding::texture(a, ResourceViewHandle::SHADER_RESOURCE)
    );

    // Retried once the condition clears.
    h.device.fail_resource_set_updates(false);
    assert_eq!(pass.compile(), DirtyMask::empty());
    pass.dispatch(&mut cmd);
    assert_eq!(cmd.dispatches(), vec![[8, 1, 1]]);
}

#[test]
fn first_compile_failure_leaves_everything_dirty() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("a"));

    h.device.fail_resource_set_updates(true);
    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert_eq!(pass.state(), PassState::Uncompiled);
    // Short-circuits before layout and pipeline creation.
    assert_eq!(h.device.layout_requests(), 0);
    assert_eq!(h.device.pipeline_requests(), 0);
}

#[test]
fn layout_failure_stops_before_pipeline() {
    let h = Harness::new();
    let mut pass = h.pass();
    h.device.fail_layouts(true);

    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert_eq!(h.device.layout_requests(), 1);
    assert_eq!(h.device.pipeline_requests(), 0);
    assert!(pass.layout_description().is_none());
}

#[test]
fn pipeline_failure_keeps_previous_pipeline() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.compile();
    let old_pipeline = pass.compiled_state().pipeline_state().unwrap().id();

    pass.set_technique(shader(), "CS_Variant", 0);
    h.device.fail_pipelines(true);
    assert_eq!(pass.compile(), DirtyMask::TECHNIQUE);
    assert_eq!(pass.compiled_state().pipeline_state().unwrap().id(), old_pipeline);

    h.device.fail_pipelines(false);
    assert_eq!(pass.compile(), DirtyMask::empty());
    assert_ne!(pass.compiled_state().pipeline_state().unwrap().id(), old_pipeline);
}

#[test]
fn invalid_pipeline_is_a_compile_failure() {
    let h = Harness::new();
    let mut pass = h.pass();
    h.device.create_invalid_pipelines(true);

    assert_eq!(pass.compile(), DirtyMask::ALL);
    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert!(cmd.is_empty());

    h.device.create_invalid_pipelines(false);
    assert_eq!(pass.compile(), DirtyMask::empty());
}

#[test]
fn missing_technique_never_compiles() {
    let h = Harness::new();
    let mut pass = ComputeRenderPass::new(h.device.context(), ComputePassFlags::empty());
    pass.set_texture(0, h.texture("a"));

    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert_eq!(h.device.layout_requests(), 0);
}

// ============================================================================
// External Invalidation
// ============================================================================

#[test]
fn resized_texture_dirties_resources_until_recompiled() {
    let h = Harness::new();
    let tex = h.texture("a");
    let mut pass = h.pass();
    pass.set_texture(0, tex);
    pass.set_dispatch_size(8, 1, 1);
    assert_eq!(pass.compile(), DirtyMask::empty());

    h.registry.resize_texture(tex, 128, 128).unwrap();
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES);

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert!(cmd.is_empty());

    assert_eq!(pass.compile(), DirtyMask::empty());
    pass.dispatch(&mut cmd);
    assert_eq!(cmd.dispatches(), vec![[8, 1, 1]]);
}

#[test]
fn destroyed_texture_blocks_dispatch_until_rebound() {
    let h = Harness::new();
    let tex = h.texture("a");
    let mut pass = h.pass();
    pass.set_texture(0, tex);
    pass.compile();

    h.registry.destroy(tex).unwrap();
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES);
    assert_eq!(pass.compile(), DirtyMask::RESOURCES);
    assert_eq!(pass.compile(), DirtyMask::RESOURCES);

    pass.set_texture(0, h.texture("replacement"));
    assert_eq!(pass.compile(), DirtyMask::empty());
}

#[test]
fn unrelated_resources_do_not_dirty_the_pass() {
    let h = Harness::new();
    let bound = h.texture("bound");
    let other = h.texture("other");
    let mut pass = h.pass();
    pass.set_texture(0, bound);
    pass.compile();

    h.registry.resize_texture(other, 8, 8).unwrap();
    assert!(!pass.is_dirty());
}

#[test]
fn pipeline_hot_reload_recompiles_pipeline() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.compile();
    assert_eq!(pass.compiled_state().pso_update_count(), 1);

    h.device.reload_pipelines();
    assert_eq!(pass.dirty_mask(), DirtyMask::TECHNIQUE);
    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert!(cmd.is_empty());

    assert_eq!(pass.compile(), DirtyMask::empty());
    assert_eq!(pass.compiled_state().pso_update_count(), 2);
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_returns_to_uncompiled() {
    let h = Harness::new();
    let tex = h.texture("a");
    let mut pass = h.pass();
    pass.set_texture(0, tex);
    pass.set_dispatch_size(8, 8, 1);
    pass.compile();
    assert_eq!(h.registry.subscriber_count(tex), 1);

    pass.reset();

    assert_eq!(pass.dirty_mask(), DirtyMask::ALL);
    assert_eq!(pass.state(), PassState::Uncompiled);
    assert_eq!(pass.dispatch_size(), [0, 0, 0]);
    assert!(!pass.is_compiled());
    assert!(pass.technique().is_none());
    assert!(pass.resource_description().is_empty());
    assert!(pass.compiled_state().resource_set().is_none());
    assert!(pass.compiled_state().pipeline_state().is_none());
    assert!(pass.layout_description().is_none());
    assert_eq!(h.registry.subscriber_count(tex), 0);

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert!(cmd.is_empty());
}

#[test]
fn reset_pass_can_be_reconfigured() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.compile();
    pass.reset();
    pass.reset();
    assert_eq!(pass.dirty_mask(), DirtyMask::ALL);

    pass.set_technique(shader(), "CS_Main", 0);
    pass.set_texture(0, h.texture("a"));
    pass.set_dispatch_size(2, 2, 2);
    assert_eq!(pass.compile(), DirtyMask::empty());
    assert_eq!(h.device.resource_set_count(), 2);

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert_eq!(cmd.commands(), expected_dispatch(&pass, [2, 2, 2]).as_slice());
}

// ============================================================================
// Constants
// ============================================================================

#[test]
fn reflected_constants_are_written_and_bound_after_the_resource_set() {
    let h = Harness::new();
    let cb = h.constant_buffer("PerPass", 16);
    let reflection = Arc::new(MockReflection::new());
    reflection.register(
        shader(),
        "CS_Tonemap",
        [ReflectedConstantBuffer {
            buffer: cb,
            shader_slot: 0,
            stages: ShaderStages::COMPUTE,
            size: 16,
            members: smallvec![
                ConstantMember { name: interner::intern("g_Exposure"), offset: 0, size: 4 },
                ConstantMember { name: interner::intern("g_TexelSize"), offset: 8, size: 8 },
            ],
        }],
    );

    let ctx = h.device.context_with_reflection(reflection);
    let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);
    pass.set_technique(shader(), "CS_Tonemap", 0);
    pass.set_texture(0, h.texture("hdr"));
    pass.set_dispatch_size(16, 16, 1);

    pass.begin_constant_update();
    assert!(pass.is_constant_update_pending());
    assert!(!pass.is_dirty());
    pass.set_constant("g_Exposure", &1.5f32).unwrap();
    pass.set_constant("g_TexelSize", &Vec2::new(0.5, 0.25)).unwrap();
    assert!(matches!(
        pass.set_constant("g_Missing", &0u32),
        Err(KilnError::UnknownConstant(_))
    ));

    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);
    assert!(!pass.is_constant_update_pending());
    assert_eq!(
        cmd.commands(),
        &[
            RecordedCommand::PrepareResources { slot: 0, set: resource_set_id(&pass) },
            RecordedCommand::PrepareInlineConstantBuffer {
                slot: 1,
                buffer: cb,
                shader_slot: 0,
                stages: ShaderStages::COMPUTE,
            },
        ]
    );

    let contents = h.registry.constant_buffer_contents(cb).unwrap();
    assert_eq!(contents[0..4], 1.5f32.to_ne_bytes());
    assert_eq!(contents[8..12], 0.5f32.to_ne_bytes());
    assert_eq!(contents[12..16], 0.25f32.to_ne_bytes());

    let inline: Vec<_> = pass
        .layout_description()
        .unwrap()
        .inline_constant_buffers()
        .map(|(layout_slot, shader_slot, _)| (layout_slot, shader_slot))
        .collect();
    assert_eq!(inline, vec![(1, 0)]);

    cmd.clear();
    pass.dispatch(&mut cmd);
    assert_eq!(
        cmd.commands()[3],
        RecordedCommand::SetInlineConstantBuffer {
            slot: 1,
            buffer: cb,
            shader_slot: 0,
            stages: ShaderStages::COMPUTE,
        }
    );
    assert_eq!(cmd.dispatches(), vec![[16, 16, 1]]);
}

#[test]
fn constant_update_is_a_no_op_without_reflection() {
    let h = Harness::new();
    let mut pass = h.pass();

    pass.begin_constant_update();
    assert!(!pass.is_constant_update_pending());
    assert_eq!(pass.dirty_mask(), DirtyMask::ALL);
    assert_eq!(
        pass.set_constant("g_Exposure", &1.0f32),
        Err(KilnError::NoPendingConstantUpdate)
    );
}

#[test]
fn modification_after_begin_still_closes_the_update() {
    let h = Harness::new();
    let ctx = h.device.context_with_reflection(Arc::new(MockReflection::new()));
    let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);
    pass.set_technique(shader(), "CS_Main", 0);
    pass.set_texture(0, h.texture("a"));

    pass.begin_constant_update();
    assert!(!pass.is_dirty());
    pass.set_texture(0, h.texture("b"));

    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);
    assert!(!pass.is_constant_update_pending());
    assert_eq!(pass.dirty_mask(), DirtyMask::RESOURCES);
    assert!(cmd.is_empty());

    // The next prepare compiles.
    pass.prepare_resources_for_use(&mut cmd);
    assert!(!pass.is_dirty());
    assert_eq!(cmd.commands().len(), 1);
}

#[test]
fn manual_inline_constant_buffer_changes_layout() {
    let h = Harness::new();
    let cb = h.constant_buffer("Params", 32);
    let mut pass = h.pass();
    pass.set_texture(0, h.texture("a"));
    pass.compile();

    assert_eq!(pass.set_inline_constant_buffer(2, cb), DirtyMask::RESOURCE_LAYOUT);
    assert_eq!(pass.set_inline_constant_buffer(2, cb), DirtyMask::empty());
    assert_eq!(pass.compile(), DirtyMask::empty());

    let mut cmd = RecordingCommandList::new();
    pass.dispatch(&mut cmd);
    assert!(cmd.commands().contains(&RecordedCommand::SetInlineConstantBuffer {
        slot: 1,
        buffer: cb,
        shader_slot: 2,
        stages: ShaderStages::COMPUTE,
    }));

    assert_eq!(pass.clear_inline_constant_buffer(2), DirtyMask::RESOURCE_LAYOUT);
    pass.compile();
    assert_eq!(pass.layout_description().unwrap().inline_constant_buffers().count(), 0);
}

#[test]
fn conflicting_constant_buffer_slots_fail_layout_creation() {
    let h = Harness::new();
    let in_set = h.constant_buffer("InSet", 16);
    let inline = h.constant_buffer("Inline", 16);
    let mut pass = h.pass();
    pass.set_constant_buffer(0, in_set);
    pass.set_inline_constant_buffer(0, inline);

    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert_eq!(h.device.layout_count(), 0);

    pass.clear_inline_constant_buffer(0);
    assert_eq!(pass.compile(), DirtyMask::empty());
}

fn exposure_pass(h: &Harness, cb: ConstantBufferHandle) -> ComputeRenderPass {
    let reflection = Arc::new(MockReflection::new());
    reflection.register(
        shader(),
        "CS_Exposure",
        [ReflectedConstantBuffer {
            buffer: cb,
            shader_slot: 0,
            stages: ShaderStages::COMPUTE,
            size: 16,
            members: smallvec![ConstantMember {
                name: interner::intern("g_Exposure"),
                offset: 0,
                size: 4,
            }],
        }],
    );
    let ctx = h.device.context_with_reflection(reflection);
    let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);
    pass.set_technique(shader(), "CS_Exposure", 0);
    pass.set_texture(0, h.texture("hdr"));
    pass
}

#[test]
fn repeated_begin_keeps_earlier_constant_writes() {
    let h = Harness::new();
    let cb = h.constant_buffer("Exposure", 16);
    let mut pass = exposure_pass(&h, cb);

    pass.begin_constant_update();
    pass.set_constant("g_Exposure", &2.0f32).unwrap();
    pass.begin_constant_update();
    assert!(pass.is_constant_update_pending());

    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);
    let contents = h.registry.constant_buffer_contents(cb).unwrap();
    assert_eq!(contents[0..4], 2.0f32.to_ne_bytes());
}

#[test]
fn failed_compile_leaves_constant_update_open_but_unbound() {
    let h = Harness::new();
    let cb = h.constant_buffer("Exposure", 16);
    let mut pass = exposure_pass(&h, cb);
    h.device.fail_layouts(true);

    pass.begin_constant_update();
    assert!(pass.is_constant_update_pending());
    assert!(pass.is_dirty());
    assert_eq!(
        pass.set_constant("g_Exposure", &2.0f32),
        Err(KilnError::UnboundConstantReflection("g_Exposure".into()))
    );

    // Closing the update neither compiles nor records anything.
    let requests = h.device.layout_requests();
    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);
    assert!(!pass.is_constant_update_pending());
    assert!(pass.is_dirty());
    assert!(cmd.is_empty());
    assert_eq!(h.device.layout_requests(), requests);
    assert_eq!(h.registry.constant_buffer_contents(cb).unwrap(), vec![0; 16]);

    h.device.fail_layouts(false);
    pass.prepare_resources_for_use(&mut cmd);
    assert!(!pass.is_dirty());
    assert_eq!(cmd.commands().len(), 2);

    pass.begin_constant_update();
    assert!(pass.set_constant("g_Exposure", &2.0f32).is_ok());
}

#[test]
fn too_many_inline_constant_buffers_fail_compile() {
    let h = Harness::new();
    let reflection = Arc::new(MockReflection::new());
    reflection.register(
        shader(),
        "CS_Wide",
        (0..=u8::MAX).map(|slot| ReflectedConstantBuffer {
            buffer: h.constant_buffer(&format!("cb{slot}"), 16),
            shader_slot: slot,
            stages: ShaderStages::COMPUTE,
            size: 16,
            members: smallvec![],
        }),
    );
    let ctx = h.device.context_with_reflection(reflection);
    let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::REFLECT_CONSTANT_BUFFERS_FROM_SHADER);
    pass.set_technique(shader(), "CS_Wide", 0);

    assert_eq!(pass.compile(), DirtyMask::ALL);
    assert!(!pass.is_compiled());
    assert_eq!(h.device.layout_requests(), 0);

    let mut cmd = RecordingCommandList::new();
    pass.prepare_resources_for_use(&mut cmd);
    pass.dispatch(&mut cmd);
    assert!(cmd.is_empty());
}

// ============================================================================
// Execute / Scheduling
// ============================================================================

#[test]
fn execute_brackets_dispatch_with_profiling() {
    let h = Harness::new();
    let mut pass = h.pass();
    pass.set_label("BLUR_H");
    pass.set_dispatch_size(4, 1, 1);
    pass.compile();

    let mut cmd = RecordingCommandList::with_profiling_sample(ProfilingSample {
        gpu_time_ms: 0.5,
        dispatch_count: 1,
    });
    pass.execute(&mut cmd);

    assert_eq!(cmd.dispatches(), vec![[4, 1, 1]]);
    assert_eq!(cmd.gpu_commands(), expected_dispatch(&pass, [4, 1, 1]));
    let stats = pass.profiling_stats().snapshot();
    assert_eq!(stats.dispatches, 1);

    #[cfg(feature = "profiling")]
    {
        assert_eq!(cmd.commands().first(), Some(&RecordedCommand::BeginProfiling("BLUR_H".into())));
        assert_eq!(cmd.commands().last(), Some(&RecordedCommand::EndProfiling));
        assert_eq!(stats.samples, 1);
        assert_eq!(stats.sampled_dispatches, 1);
        assert_eq!(stats.gpu_time_us, 500);
    }
}

#[test]
fn execute_on_a_dirty_pass_records_no_gpu_work() {
    let h = Harness::new();
    let pass = h.pass();
    let mut cmd = RecordingCommandList::new();
    pass.execute(&mut cmd);

    assert!(cmd.gpu_commands().is_empty());
    assert_eq!(pass.profiling_stats().snapshot().dispatches, 0);
}

#[test]
fn active_scheduler_defers_execution() {
    let h = Harness::new();
    let scheduler = Arc::new(RenderPassScheduler::new());
    let ctx = h.device.context().with_scheduler(scheduler.clone());
    let mut pass = ComputeRenderPass::new(ctx, ComputePassFlags::empty());
    pass.set_technique(shader(), "CS_Main", 0);
    pass.set_texture(0, h.texture("a"));
    pass.set_dispatch_size(8, 1, 1);
    pass.compile();
    let expected = expected_dispatch(&pass, [8, 1, 1]);

    scheduler.begin_batch();
    let mut cmd = RecordingCommandList::new();
    pass.execute(&mut cmd);
    assert!(cmd.is_empty());
    assert_eq!(scheduler.pending_count(), 1);

    // Later changes do not leak into the queued snapshot.
    pass.set_dispatch_size(1, 1, 1);
    pass.set_technique(shader(), "CS_Other", 0);
    pass.compile();

    assert_eq!(scheduler.flush(&mut cmd), 1);
    assert_eq!(cmd.gpu_commands(), expected);
    assert_eq!(scheduler.pending_count(), 0);

    // Batch closed: execute records directly again.
    cmd.clear();
    pass.execute(&mut cmd);
    assert_eq!(cmd.dispatches(), vec![[1, 1, 1]]);
}
