//! Resource Layout Description
//!
//! The shape of everything a pipeline consumes: resource-set slots and
//! inline constant buffers, each at a layout slot. Two descriptions are
//! equal iff their shapes are equal, which is what lets device layouts and
//! pipeline states be cached by value and shared between passes that were
//! built independently.
//!
//! Entries are ordered by [`LayoutBindPoint`] (slot type first, then layout
//! slot), so a compute pass layout always reads "resource set at 0, inline
//! constant buffers at 1..n".

use std::collections::BTreeMap;

use kiln_core::{KilnError, Result, fx_hash_key};
use smallvec::SmallVec;
use wgpu::ShaderStages;

use super::bind_point::BindPointShape;
use super::binding::ResourceType;
use super::set_desc::ResourceSetDescription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayoutSlotType {
    ResourceSet,
    InlineConstantBuffer,
}

/// Position of an entry in a resource layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutBindPoint {
    pub slot_type: LayoutSlotType,
    pub layout_slot: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutSlot {
    /// Shape of a resource set, in bind point order.
    ResourceSet(SmallVec<[BindPointShape; 8]>),
    InlineConstantBuffer { shader_slot: u8, stages: u32 },
}

/// Immutable compilation key for resource layouts and pipeline states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResourceLayoutDescription {
    slots: BTreeMap<LayoutBindPoint, LayoutSlot>,
}

impl ResourceLayoutDescription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current shape of `desc` at `layout_slot`.
    pub fn set_resource_set(&mut self, layout_slot: u8, desc: &ResourceSetDescription) {
        self.slots.insert(
            LayoutBindPoint {
                slot_type: LayoutSlotType::ResourceSet,
                layout_slot,
            },
            LayoutSlot::ResourceSet(desc.shape()),
        );
    }

    pub fn set_constant_buffer(&mut self, layout_slot: u8, shader_slot: u8, stages: ShaderStages) {
        self.slots.insert(
            LayoutBindPoint {
                slot_type: LayoutSlotType::InlineConstantBuffer,
                layout_slot,
            },
            LayoutSlot::InlineConstantBuffer {
                shader_slot,
                stages: stages.bits(),
            },
        );
    }

    /// Entries in layout order.
    pub fn entries(&self) -> impl Iterator<Item = (&LayoutBindPoint, &LayoutSlot)> + '_ {
        self.slots.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(layout_slot, shader_slot, stages)` of every inline constant buffer.
    pub fn inline_constant_buffers(&self) -> impl Iterator<Item = (u8, u8, ShaderStages)> + '_ {
        self.slots.iter().filter_map(|(point, slot)| match slot {
            LayoutSlot::InlineConstantBuffer { shader_slot, stages } => Some((
                point.layout_slot,
                *shader_slot,
                ShaderStages::from_bits_truncate(*stages),
            )),
            LayoutSlot::ResourceSet(_) => None,
        })
    }

    /// Cheap fingerprint for logging and L1-style lookups. Equality of the
    /// descriptions, not of fingerprints, is what caches must rely on.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        fx_hash_key(self)
    }

    /// Rejects layouts no backend can realise:
    /// - the same layout slot used by two entries
    /// - two constant buffers on the same shader register with overlapping
    ///   stages (between a resource set and an inline buffer, or between two
    ///   inline buffers)
    pub fn validate(&self) -> Result<()> {
        let mut used_slots: SmallVec<[u8; 8]> = SmallVec::new();
        // (shader_slot, stages, layout_slot)
        let mut constant_buffers: SmallVec<[(u8, u32, u8); 8]> = SmallVec::new();

        for (point, slot) in &self.slots {
            if used_slots.contains(&point.layout_slot) {
                return Err(KilnError::DuplicateLayoutSlot(point.layout_slot));
            }
            used_slots.push(point.layout_slot);

            match slot {
                LayoutSlot::ResourceSet(shape) => {
                    for bind_point in shape
                        .iter()
                        .filter(|bp| bp.resource_type == ResourceType::ConstantBuffer)
                    {
                        check_constant_buffer(
                            &mut constant_buffers,
                            bind_point.slot,
                            bind_point.stages,
                            point.layout_slot,
                        )?;
                    }
                }
                LayoutSlot::InlineConstantBuffer { shader_slot, stages } => {
                    check_constant_buffer(&mut constant_buffers, *shader_slot, *stages, point.layout_slot)?;
                }
            }
        }
        Ok(())
    }
}

fn check_constant_buffer(
    seen: &mut SmallVec<[(u8, u32, u8); 8]>,
    shader_slot: u8,
    stages: u32,
    layout_slot: u8,
) -> Result<()> {
    if let Some(&(_, _, first)) = seen
        .iter()
        .find(|(slot, other_stages, _)| *slot == shader_slot && other_stages & stages != 0)
    {
        return Err(KilnError::ShaderSlotConflict {
            shader_slot,
            first,
            second: layout_slot,
        });
    }
    seen.push((shader_slot, stages, layout_slot));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::binding::ResourceViewHandle;
    use crate::resources::registry::{ConstantBufferDesc, ResourceRegistry, TextureDesc};

    fn set_with_texture(registry: &ResourceRegistry) -> ResourceSetDescription {
        let tex = registry.create_texture(TextureDesc {
            label: "t".into(),
            width: 8,
            height: 8,
            format: wgpu::TextureFormat::R32Float,
        });
        let mut desc = ResourceSetDescription::new();
        desc.set_texture(0, tex, ResourceViewHandle::SHADER_RESOURCE, ShaderStages::COMPUTE);
        desc
    }

    #[test]
    fn equal_shapes_compare_equal_across_resources() {
        let registry = ResourceRegistry::new();
        let a = set_with_texture(&registry);
        let b = set_with_texture(&registry);

        let mut la = ResourceLayoutDescription::new();
        la.set_resource_set(0, &a);
        la.set_constant_buffer(1, 0, ShaderStages::COMPUTE);

        let mut lb = ResourceLayoutDescription::new();
        lb.set_constant_buffer(1, 0, ShaderStages::COMPUTE);
        lb.set_resource_set(0, &b);

        assert_eq!(la, lb);
        assert_eq!(la.fingerprint(), lb.fingerprint());
    }

    #[test]
    fn stage_difference_breaks_equality() {
        let mut la = ResourceLayoutDescription::new();
        la.set_constant_buffer(1, 0, ShaderStages::COMPUTE);
        let mut lb = ResourceLayoutDescription::new();
        lb.set_constant_buffer(1, 0, ShaderStages::VERTEX);

        assert_ne!(la, lb);
    }

    #[test]
    fn entries_order_resource_sets_first() {
        let mut layout = ResourceLayoutDescription::new();
        layout.set_constant_buffer(1, 2, ShaderStages::COMPUTE);
        layout.set_resource_set(0, &ResourceSetDescription::new());
        layout.set_constant_buffer(2, 3, ShaderStages::COMPUTE);

        let order: Vec<_> = layout.entries().map(|(p, _)| (p.slot_type, p.layout_slot)).collect();
        assert_eq!(
            order,
            vec![
                (LayoutSlotType::ResourceSet, 0),
                (LayoutSlotType::InlineConstantBuffer, 1),
                (LayoutSlotType::InlineConstantBuffer, 2),
            ]
        );
        let inline: Vec<_> = layout.inline_constant_buffers().map(|(l, s, _)| (l, s)).collect();
        assert_eq!(inline, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn validate_rejects_duplicate_layout_slot() {
        let mut layout = ResourceLayoutDescription::new();
        layout.set_resource_set(0, &ResourceSetDescription::new());
        layout.set_constant_buffer(0, 1, ShaderStages::COMPUTE);

        assert_eq!(layout.validate(), Err(KilnError::DuplicateLayoutSlot(0)));
    }

    #[test]
    fn validate_rejects_shader_slot_conflict() {
        let registry = ResourceRegistry::new();
        let cb = registry.create_constant_buffer(ConstantBufferDesc { label: "cb".into(), size: 16 });
        let mut set = ResourceSetDescription::new();
        set.set_constant_buffer(4, cb, ShaderStages::COMPUTE);

        let mut layout = ResourceLayoutDescription::new();
        layout.set_resource_set(0, &set);
        layout.set_constant_buffer(1, 4, ShaderStages::COMPUTE);
        assert_eq!(
            layout.validate(),
            Err(KilnError::ShaderSlotConflict { shader_slot: 4, first: 0, second: 1 })
        );

        // Disjoint stages do not collide.
        let mut layout = ResourceLayoutDescription::new();
        layout.set_resource_set(0, &set);
        layout.set_constant_buffer(1, 4, ShaderStages::FRAGMENT);
        assert!(layout.validate().is_ok());
    }
}
