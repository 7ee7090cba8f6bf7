//! Shader Reflection
//!
//! The binding layer never parses shaders. A [`ShaderReflection`] provider
//! answers one question: which constant buffers does a technique of a shader
//! consume, at which registers, and what members do they contain.

use kiln_core::Symbol;
use smallvec::SmallVec;
use wgpu::ShaderStages;
use xxhash_rust::xxh3::xxh3_128;

use crate::resources::registry::ConstantBufferHandle;

/// Identity of a shader, derived from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(u128);

impl ShaderHandle {
    #[must_use]
    pub const fn new(id: u128) -> Self {
        Self(id)
    }

    /// Hashes the shader source with xxh3-128.
    #[must_use]
    pub fn from_source(source: &str) -> Self {
        Self(xxh3_128(source.as_bytes()))
    }

    #[inline]
    #[must_use]
    pub const fn id(self) -> u128 {
        self.0
    }
}

/// A named member of a reflected constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantMember {
    pub name: Symbol,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedConstantBuffer {
    pub buffer: ConstantBufferHandle,
    pub shader_slot: u8,
    pub stages: ShaderStages,
    /// Size in bytes of the buffer the shader expects.
    pub size: u32,
    pub members: SmallVec<[ConstantMember; 8]>,
}

pub trait ShaderReflection: Send + Sync {
    /// Constant buffers consumed by `technique` of `shader` in `stage`, in
    /// the order the shader declares them.
    fn reflect_constant_buffers(
        &self,
        shader: ShaderHandle,
        technique: Symbol,
        rt_mask: u64,
        stage: ShaderStages,
    ) -> SmallVec<[ReflectedConstantBuffer; 2]>;
}

/// Reflection provider for backends that expose no constant metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReflection;

impl ShaderReflection for NoReflection {
    fn reflect_constant_buffers(
        &self,
        _shader: ShaderHandle,
        _technique: Symbol,
        _rt_mask: u64,
        _stage: ShaderStages,
    ) -> SmallVec<[ReflectedConstantBuffer; 2]> {
        SmallVec::new()
    }
}
