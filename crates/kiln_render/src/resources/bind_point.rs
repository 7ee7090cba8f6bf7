//! Bind Points
//!
//! A [`ResourceBindPoint`] names the place a binding attaches to in a
//! shader's resource tables: `(resource type, slot)` plus the stages that
//! see it.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use wgpu::ShaderStages;

use super::binding::{ResourceBinding, ResourceType};

/// Where a binding attaches in a shader's resource table.
///
/// Identity (`Eq`, `Ord`, `Hash`) is `(resource_type, slot)`: a table has at
/// most one entry per register, whichever stages see it. `stages` is the
/// payload of that entry and is compared separately by
/// [`ResourceSetDescription`](super::ResourceSetDescription) and by layout
/// shapes.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBindPoint {
    pub resource_type: ResourceType,
    pub slot: u8,
    pub stages: ShaderStages,
}

impl ResourceBindPoint {
    #[must_use]
    pub const fn new(resource_type: ResourceType, slot: u8, stages: ShaderStages) -> Self {
        Self {
            resource_type,
            slot,
            stages,
        }
    }

    /// Bind point for a binding. `None` for an empty binding.
    #[must_use]
    pub fn for_binding(binding: &ResourceBinding, slot: u8, stages: ShaderStages) -> Option<Self> {
        binding
            .resource_type()
            .map(|ty| Self::new(ty, slot, stages))
    }

    /// The full comparable shape, stages included.
    #[must_use]
    pub fn shape(&self) -> BindPointShape {
        BindPointShape {
            resource_type: self.resource_type,
            slot: self.slot,
            stages: self.stages.bits(),
        }
    }
}

impl PartialEq for ResourceBindPoint {
    fn eq(&self, other: &Self) -> bool {
        self.resource_type == other.resource_type && self.slot == other.slot
    }
}

impl Eq for ResourceBindPoint {}

impl PartialOrd for ResourceBindPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceBindPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.resource_type
            .cmp(&other.resource_type)
            .then(self.slot.cmp(&other.slot))
    }
}

impl Hash for ResourceBindPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource_type.hash(state);
        self.slot.hash(state);
    }
}

/// Hashable, fully compared mirror of a bind point (stages as raw bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindPointShape {
    pub resource_type: ResourceType,
    pub slot: u8,
    pub stages: u32,
}

impl BindPointShape {
    #[inline]
    #[must_use]
    pub fn stages(&self) -> ShaderStages {
        ShaderStages::from_bits_truncate(self.stages)
    }
}
