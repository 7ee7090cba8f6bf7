//! Table-driven shader reflection for tests.

use kiln_core::{Symbol, interner};
use kiln_render::device::{ReflectedConstantBuffer, ShaderHandle, ShaderReflection};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use wgpu::ShaderStages;

#[derive(Debug, Default)]
pub struct MockReflection {
    techniques: RwLock<FxHashMap<(ShaderHandle, Symbol), SmallVec<[ReflectedConstantBuffer; 2]>>>,
}

impl MockReflection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the constant buffers of `technique`, replacing any earlier
    /// declaration.
    pub fn register(
        &self,
        shader: ShaderHandle,
        technique: &str,
        buffers: impl IntoIterator<Item = ReflectedConstantBuffer>,
    ) {
        self.techniques
            .write()
            .insert((shader, interner::intern(technique)), buffers.into_iter().collect());
    }
}

impl ShaderReflection for MockReflection {
    fn reflect_constant_buffers(
        &self,
        shader: ShaderHandle,
        technique: Symbol,
        _rt_mask: u64,
        stage: ShaderStages,
    ) -> SmallVec<[ReflectedConstantBuffer; 2]> {
        self.techniques
            .read()
            .get(&(shader, technique))
            .map(|buffers| {
                buffers
                    .iter()
                    .filter(|cb| cb.stages.intersects(stage))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
