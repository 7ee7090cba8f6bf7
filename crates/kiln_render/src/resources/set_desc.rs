//! Resource Set Description
//!
//! The CPU-side, ordered description of one resource set: which binding sits
//! at which bind point. Device resource sets are realised from it at compile
//! time.
//!
//! # Dirty Deltas
//!
//! Every `set_*` call compares the new binding against the entry at the same
//! bind point and reports what changed:
//!
//! | Situation | Delta |
//! |-----------|-------|
//! | identical binding, identical stages | empty |
//! | different resource or view, same stages | `RESOURCES` |
//! | bind point newly occupied or vacated | `ALL` |
//! | same bind point, different stages | `ALL` |
//!
//! A binding of a different resource type lands on a different bind point,
//! so it always counts as a layout change.
//!
//! # Invalidation
//!
//! A description created with [`ResourceSetDescription::with_invalidation`]
//! subscribes its owner's listener to every bound registry resource and
//! removes those subscriptions when a binding is replaced, on
//! [`clear`](ResourceSetDescription::clear) and on drop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use kiln_core::{KilnError, Result};
use smallvec::SmallVec;
use wgpu::ShaderStages;

use super::bind_point::{BindPointShape, ResourceBindPoint};
use super::binding::{ResourceBinding, ResourceType, ResourceViewHandle, SamplerStateHandle};
use super::registry::{
    BufferHandle, ConstantBufferHandle, InvalidationListener, ResourceRegistry, SubscriptionId,
    TextureHandle,
};

bitflags! {
    /// What a change to a resource set description invalidates.
    ///
    /// Bit values line up with the matching bits of the pass-level
    /// [`DirtyMask`](crate::pass::DirtyMask).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ResourceSetDirty: u32 {
        const RESOURCES       = 1 << 0;
        const RESOURCE_LAYOUT = 1 << 2;
        const ALL = Self::RESOURCES.bits() | Self::RESOURCE_LAYOUT.bits();
    }
}

struct InvalidationHook {
    registry: Arc<ResourceRegistry>,
    listener: Weak<dyn InvalidationListener>,
}

#[derive(Debug, Clone, Copy)]
struct BoundResource {
    binding: ResourceBinding,
    subscription: Option<SubscriptionId>,
}

/// Ordered mapping from bind point to binding, with dirty tracking.
pub struct ResourceSetDescription {
    bindings: BTreeMap<ResourceBindPoint, BoundResource>,
    dirty: ResourceSetDirty,
    hook: Option<InvalidationHook>,
}

impl Default for ResourceSetDescription {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSetDescription {
    /// A description without invalidation notifications.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: BTreeMap::new(),
            dirty: ResourceSetDirty::ALL,
            hook: None,
        }
    }

    /// A description that subscribes `listener` to every bound resource.
    #[must_use]
    pub fn with_invalidation(
        registry: Arc<ResourceRegistry>,
        listener: Weak<dyn InvalidationListener>,
    ) -> Self {
        Self {
            bindings: BTreeMap::new(),
            dirty: ResourceSetDirty::ALL,
            hook: Some(InvalidationHook { registry, listener }),
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    pub fn set_constant_buffer(
        &mut self,
        shader_slot: u8,
        buffer: ConstantBufferHandle,
        stages: ShaderStages,
    ) -> ResourceSetDirty {
        self.update_resource(shader_slot, ResourceBinding::ConstantBuffer(buffer), stages)
    }

    pub fn set_texture(
        &mut self,
        shader_slot: u8,
        texture: TextureHandle,
        view: ResourceViewHandle,
        stages: ShaderStages,
    ) -> ResourceSetDirty {
        self.update_resource(shader_slot, ResourceBinding::texture(texture, view), stages)
    }

    pub fn set_sampler(
        &mut self,
        shader_slot: u8,
        sampler: SamplerStateHandle,
        stages: ShaderStages,
    ) -> ResourceSetDirty {
        self.update_resource(shader_slot, ResourceBinding::Sampler(sampler), stages)
    }

    pub fn set_buffer(
        &mut self,
        shader_slot: u8,
        buffer: BufferHandle,
        view: ResourceViewHandle,
        stages: ShaderStages,
    ) -> ResourceSetDirty {
        self.update_resource(shader_slot, ResourceBinding::buffer(buffer, view), stages)
    }

    /// Vacates a bind point.
    pub fn clear_slot(&mut self, resource_type: ResourceType, shader_slot: u8) -> ResourceSetDirty {
        let key = ResourceBindPoint::new(resource_type, shader_slot, ShaderStages::NONE);
        match self.bindings.remove(&key) {
            Some(old) => {
                self.release(&old);
                self.dirty |= ResourceSetDirty::ALL;
                ResourceSetDirty::ALL
            }
            None => ResourceSetDirty::empty(),
        }
    }

    fn update_resource(
        &mut self,
        shader_slot: u8,
        binding: ResourceBinding,
        stages: ShaderStages,
    ) -> ResourceSetDirty {
        let Some(bind_point) = ResourceBindPoint::for_binding(&binding, shader_slot, stages) else {
            return ResourceSetDirty::empty();
        };

        let delta = match self.bindings.get_key_value(&bind_point) {
            Some((existing, bound)) => {
                if existing.stages != stages {
                    ResourceSetDirty::ALL
                } else if bound.binding.fast_compare() == binding.fast_compare() {
                    return ResourceSetDirty::empty();
                } else {
                    ResourceSetDirty::RESOURCES
                }
            }
            None => ResourceSetDirty::ALL,
        };

        // The key carries the stages, so replace the entry rather than the value.
        let previous = self.bindings.remove(&bind_point);
        let subscription = match previous {
            Some(old) if old.binding.resource_key() == binding.resource_key() => old.subscription,
            Some(old) => {
                self.release(&old);
                self.subscribe(&binding)
            }
            None => self.subscribe(&binding),
        };
        self.bindings.insert(bind_point, BoundResource { binding, subscription });

        self.dirty |= delta;
        delta
    }

    /// Removes every binding and every invalidation subscription.
    pub fn clear(&mut self) {
        let bindings = std::mem::take(&mut self.bindings);
        for bound in bindings.values() {
            self.release(bound);
        }
        self.dirty = ResourceSetDirty::ALL;
    }

    fn subscribe(&self, binding: &ResourceBinding) -> Option<SubscriptionId> {
        let hook = self.hook.as_ref()?;
        let key = binding.resource_key()?;
        let subscription = hook.registry.subscribe(key, hook.listener.clone());
        if subscription.is_none() {
            log::debug!("Bound resource {key:?} is not alive; no invalidation subscription");
        }
        subscription
    }

    fn release(&self, bound: &BoundResource) {
        if let (Some(hook), Some(key), Some(id)) =
            (&self.hook, bound.binding.resource_key(), bound.subscription)
        {
            hook.registry.unsubscribe(key, id);
        }
    }

    // ── Dirty State ──────────────────────────────────────────────────────────

    /// Accumulated changes since the last [`mark_clean`](Self::mark_clean).
    #[inline]
    #[must_use]
    pub fn dirty_flags(&self) -> ResourceSetDirty {
        self.dirty
    }

    /// Called after a device resource set was successfully updated from
    /// this description.
    pub fn mark_clean(&mut self, flags: ResourceSetDirty) {
        self.dirty.remove(flags);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in bind point order (type first, then slot).
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceBindPoint, &ResourceBinding)> + '_ {
        self.bindings.iter().map(|(point, bound)| (point, &bound.binding))
    }

    #[must_use]
    pub fn get(&self, resource_type: ResourceType, shader_slot: u8) -> Option<&ResourceBinding> {
        let key = ResourceBindPoint::new(resource_type, shader_slot, ShaderStages::NONE);
        self.bindings.get(&key).map(|bound| &bound.binding)
    }

    /// The bind point layout of this set, stages included.
    #[must_use]
    pub fn shape(&self) -> SmallVec<[BindPointShape; 8]> {
        self.bindings.keys().map(ResourceBindPoint::shape).collect()
    }

    /// Checks that every referenced resource is still alive.
    pub fn validate(&self, registry: &ResourceRegistry) -> Result<()> {
        for bound in self.bindings.values() {
            if let Some(key) = bound.binding.resource_key()
                && !registry.is_alive(key)
            {
                return Err(KilnError::ResourceNotFound(format!("{key:?}")));
            }
        }
        Ok(())
    }
}

impl Drop for ResourceSetDescription {
    fn drop(&mut self) {
        if self.hook.is_some() {
            for bound in self.bindings.values() {
                self.release(bound);
            }
        }
    }
}

impl fmt::Debug for ResourceSetDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSetDescription")
            .field("bindings", &self.bindings)
            .field("dirty", &self.dirty)
            .field("notifies", &self.hook.is_some())
            .finish()
    }
}
