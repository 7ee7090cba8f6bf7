//! Inline Constant Buffers
//!
//! A [`ConstantManager`] owns the inline constant buffers of one pass.
//! They come from two places:
//!
//! - **Manual**: set by the caller with an explicit shader slot. They survive
//!   recompiles and only leave on [`ConstantManager::reset`].
//! - **Reflected**: discovered from the shader when the pass reflects its
//!   constants. They are dropped and re-acquired whenever the technique or
//!   layout is rebuilt.
//!
//! # Named Constant Updates
//!
//! Reflected buffers carry a member table. Between
//! [`begin_named_constant_update`](ConstantManager::begin_named_constant_update)
//! and [`end_named_constant_update`](ConstantManager::end_named_constant_update)
//! writes by name land in a per-buffer staging copy, which is flushed to the
//! registry when the update closes. Buffers nobody wrote to are left alone.
//!
//! Member tables are only trusted once
//! [`init_shader_reflection`](ConstantManager::init_shader_reflection) has
//! tied them to a pipeline state. Until then, and whenever an update opens
//! against a different pipeline, named writes are rejected.

use bytemuck::Pod;
use kiln_core::{KilnError, Result, Symbol, interner};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use wgpu::ShaderStages;

use crate::device::{ConstantMember, DevicePipelineState, ReflectedConstantBuffer};
use crate::resources::registry::{ConstantBufferHandle, ResourceRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantSource {
    Manual,
    Reflected,
}

#[derive(Debug, Clone)]
pub struct InlineConstantBuffer {
    pub buffer: ConstantBufferHandle,
    pub shader_slot: u8,
    pub stages: ShaderStages,
    pub source: ConstantSource,
    members: SmallVec<[ConstantMember; 8]>,
    staging: Vec<u8>,
    touched: bool,
}

impl InlineConstantBuffer {
    #[must_use]
    pub fn members(&self) -> &[ConstantMember] {
        &self.members
    }
}

#[derive(Debug, Default)]
pub struct ConstantManager {
    buffers: SmallVec<[InlineConstantBuffer; 2]>,
    // constant name -> (buffer index, member)
    name_lookup: FxHashMap<Symbol, (usize, ConstantMember)>,
    // pipeline id the reflected member tables were built for
    bound_pipeline: Option<u64>,
    update_pending: bool,
}

impl ConstantManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Manual Buffers ──────────────────────────────────────────────────

    /// Binds `buffer` at `shader_slot`. Returns whether anything changed.
    pub fn set_manual_buffer(
        &mut self,
        shader_slot: u8,
        buffer: ConstantBufferHandle,
        stages: ShaderStages,
    ) -> bool {
        let existing = self
            .buffers
            .iter_mut()
            .find(|cb| cb.source == ConstantSource::Manual && cb.shader_slot == shader_slot);

        match existing {
            Some(cb) if cb.buffer == buffer && cb.stages == stages => false,
            Some(cb) => {
                cb.buffer = buffer;
                cb.stages = stages;
                true
            }
            None => {
                let at = self
                    .buffers
                    .iter()
                    .position(|cb| cb.source == ConstantSource::Reflected)
                    .unwrap_or(self.buffers.len());
                self.buffers.insert(
                    at,
                    InlineConstantBuffer {
                        buffer,
                        shader_slot,
                        stages,
                        source: ConstantSource::Manual,
                        members: SmallVec::new(),
                        staging: Vec::new(),
                        touched: false,
                    },
                );
                self.rebuild_lookup();
                true
            }
        }
    }

    pub fn remove_manual_buffer(&mut self, shader_slot: u8) -> bool {
        let before = self.buffers.len();
        self.buffers
            .retain(|cb| !(cb.source == ConstantSource::Manual && cb.shader_slot == shader_slot));
        let removed = self.buffers.len() != before;
        if removed {
            self.rebuild_lookup();
        }
        removed
    }

    // ─── Shader Reflection ───────────────────────────────────────────────

    /// Drops every reflected buffer, keeping manual ones.
    pub fn release_shader_reflection(&mut self) {
        self.buffers.retain(|cb| cb.source == ConstantSource::Manual);
        self.name_lookup.clear();
        self.bound_pipeline = None;
    }

    /// Appends reflected buffers in declaration order. A manual buffer that
    /// already occupies the same register on overlapping stages wins.
    pub fn allocate_shader_reflection(
        &mut self,
        reflected: impl IntoIterator<Item = ReflectedConstantBuffer>,
    ) {
        self.bound_pipeline = None;
        for cb in reflected {
            let shadowed = self.buffers.iter().any(|existing| {
                existing.shader_slot == cb.shader_slot && existing.stages.intersects(cb.stages)
            });
            if shadowed {
                log::debug!(
                    "Reflected constant buffer at slot {} is overridden by a manual binding",
                    cb.shader_slot
                );
                continue;
            }

            self.buffers.push(InlineConstantBuffer {
                buffer: cb.buffer,
                shader_slot: cb.shader_slot,
                stages: cb.stages,
                source: ConstantSource::Reflected,
                members: cb.members,
                staging: vec![0; cb.size as usize],
                touched: false,
            });
        }
        self.rebuild_lookup();
    }

    /// Ties the reflected buffers to the pipeline they were compiled for.
    pub fn init_shader_reflection(&mut self, pipeline: &dyn DevicePipelineState) {
        self.bound_pipeline = Some(pipeline.id());
        log::trace!(
            "Constant reflection bound to pipeline {} ({} named constants)",
            pipeline.id(),
            self.name_lookup.len()
        );
    }

    /// Id of the pipeline state the reflected buffers were bound to.
    #[must_use]
    pub fn reflection_pipeline(&self) -> Option<u64> {
        self.bound_pipeline
    }

    fn rebuild_lookup(&mut self) {
        self.name_lookup.clear();
        for (index, cb) in self.buffers.iter().enumerate() {
            for member in &cb.members {
                self.name_lookup.entry(member.name).or_insert((index, *member));
            }
        }
    }

    // ─── Named Updates ───────────────────────────────────────────────────

    /// Opens a write region over the reflected buffers, seeding each
    /// staging copy with the buffer's current contents.
    ///
    /// `pipeline` is the pipeline state the pass will dispatch with. If the
    /// reflection was bound to another one, it is unbound and named writes
    /// fail until the next successful compile.
    pub fn begin_named_constant_update(&mut self, registry: &ResourceRegistry, pipeline: Option<u64>) {
        if self.bound_pipeline.is_some() && self.bound_pipeline != pipeline {
            log::debug!(
                "Constant reflection of pipeline {:?} does not match pipeline {pipeline:?}",
                self.bound_pipeline
            );
            self.bound_pipeline = None;
        }
        for cb in self.buffers.iter_mut().filter(|cb| cb.source == ConstantSource::Reflected) {
            if let Some(contents) = registry.constant_buffer_contents(cb.buffer) {
                let len = contents.len().min(cb.staging.len());
                cb.staging[..len].copy_from_slice(&contents[..len]);
            }
            cb.touched = false;
        }
        self.update_pending = true;
    }

    #[inline]
    #[must_use]
    pub fn is_update_pending(&self) -> bool {
        self.update_pending
    }

    pub fn set_constant_bytes(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.update_pending {
            return Err(KilnError::NoPendingConstantUpdate);
        }
        let unknown = || KilnError::UnknownConstant(name.to_owned());
        let symbol = interner::get(name).ok_or_else(unknown)?;
        let &(index, member) = self.name_lookup.get(&symbol).ok_or_else(unknown)?;
        if self.bound_pipeline.is_none() {
            return Err(KilnError::UnboundConstantReflection(name.to_owned()));
        }

        if bytes.len() > member.size as usize {
            return Err(KilnError::ConstantSizeMismatch {
                name: name.to_owned(),
                capacity: member.size as usize,
                written: bytes.len(),
            });
        }

        let cb = &mut self.buffers[index];
        let start = member.offset as usize;
        let end = start + bytes.len();
        if end > cb.staging.len() {
            return Err(KilnError::ConstantBufferOverflow {
                offset: start,
                len: bytes.len(),
                size: cb.staging.len(),
            });
        }
        cb.staging[start..end].copy_from_slice(bytes);
        cb.touched = true;
        Ok(())
    }

    pub fn set_constant<T: Pod>(&mut self, name: &str, value: &T) -> Result<()> {
        self.set_constant_bytes(name, bytemuck::bytes_of(value))
    }

    pub fn set_constant_array<T: Pod>(&mut self, name: &str, values: &[T]) -> Result<()> {
        self.set_constant_bytes(name, bytemuck::cast_slice(values))
    }

    /// Closes the write region and flushes touched buffers to the registry.
    pub fn end_named_constant_update(&mut self, registry: &ResourceRegistry) {
        for cb in self.buffers.iter_mut().filter(|cb| cb.touched) {
            if let Err(err) = registry.write_constant_buffer(cb.buffer, 0, &cb.staging) {
                log::warn!("Failed to upload constants for slot {}: {err}", cb.shader_slot);
            }
            cb.touched = false;
        }
        self.update_pending = false;
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Inline buffers in bind order: manual first, then reflected in
    /// declaration order.
    #[must_use]
    pub fn buffers(&self) -> &[InlineConstantBuffer] {
        &self.buffers
    }

    #[must_use]
    pub fn has_constant(&self, name: &str) -> bool {
        interner::get(name).is_some_and(|sym| self.name_lookup.contains_key(&sym))
    }

    pub fn reset(&mut self) {
        self.buffers.clear();
        self.name_lookup.clear();
        self.bound_pipeline = None;
        self.update_pending = false;
    }
}
