//! Recording Command List
//!
//! Stores every call as a [`RecordedCommand`] so tests can assert on exactly
//! what a pass emitted.

use kiln_render::device::{
    ComputeCommandInterface, PipelineStateHandle, ResourceLayoutHandle, ResourceSetHandle,
};
use kiln_render::pass::ProfilingSample;
use kiln_render::resources::ConstantBufferHandle;
use wgpu::ShaderStages;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    PrepareResources { slot: u8, set: u64 },
    PrepareInlineConstantBuffer {
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    },
    SetResourceLayout(u64),
    SetPipelineState(u64),
    SetResources { slot: u8, set: u64 },
    SetInlineConstantBuffer {
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    },
    Dispatch(u32, u32, u32),
    BeginProfiling(String),
    EndProfiling,
}

#[derive(Debug, Default)]
pub struct RecordingCommandList {
    commands: Vec<RecordedCommand>,
    sample: Option<ProfilingSample>,
}

impl RecordingCommandList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every closed profiling section reports `sample`.
    #[must_use]
    pub fn with_profiling_sample(sample: ProfilingSample) -> Self {
        Self {
            commands: Vec::new(),
            sample: Some(sample),
        }
    }

    #[must_use]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Dispatch dimensions in recording order.
    #[must_use]
    pub fn dispatches(&self) -> Vec<[u32; 3]> {
        self.commands
            .iter()
            .filter_map(|cmd| match *cmd {
                RecordedCommand::Dispatch(x, y, z) => Some([x, y, z]),
                _ => None,
            })
            .collect()
    }

    /// Commands other than profiling brackets.
    #[must_use]
    pub fn gpu_commands(&self) -> Vec<RecordedCommand> {
        self.commands
            .iter()
            .filter(|cmd| {
                !matches!(cmd, RecordedCommand::BeginProfiling(_) | RecordedCommand::EndProfiling)
            })
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl ComputeCommandInterface for RecordingCommandList {
    fn prepare_resources_for_use(&mut self, slot: u8, resources: &ResourceSetHandle) {
        self.commands.push(RecordedCommand::PrepareResources { slot, set: resources.id() });
    }

    fn prepare_inline_constant_buffer_for_use(
        &mut self,
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    ) {
        self.commands.push(RecordedCommand::PrepareInlineConstantBuffer {
            slot,
            buffer,
            shader_slot,
            stages,
        });
    }

    fn set_resource_layout(&mut self, layout: &ResourceLayoutHandle) {
        self.commands.push(RecordedCommand::SetResourceLayout(layout.id()));
    }

    fn set_pipeline_state(&mut self, pipeline: &PipelineStateHandle) {
        self.commands.push(RecordedCommand::SetPipelineState(pipeline.id()));
    }

    fn set_resources(&mut self, slot: u8, resources: &ResourceSetHandle) {
        self.commands.push(RecordedCommand::SetResources { slot, set: resources.id() });
    }

    fn set_inline_constant_buffer(
        &mut self,
        slot: u8,
        buffer: ConstantBufferHandle,
        shader_slot: u8,
        stages: ShaderStages,
    ) {
        self.commands.push(RecordedCommand::SetInlineConstantBuffer {
            slot,
            buffer,
            shader_slot,
            stages,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(RecordedCommand::Dispatch(x, y, z));
    }

    fn begin_profiling_section(&mut self, label: &str) {
        self.commands.push(RecordedCommand::BeginProfiling(label.to_owned()));
    }

    fn end_profiling_section(&mut self) -> Option<ProfilingSample> {
        self.commands.push(RecordedCommand::EndProfiling);
        self.sample
    }
}
