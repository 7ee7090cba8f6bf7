//! Bindable Resources
//!
//! [`ResourceBinding`] is the closed set of things a shader resource table
//! can hold. Every variant refers to an externally owned resource through a
//! registry handle; the binding itself owns nothing.

use slotmap::Key;

use super::registry::{BufferHandle, ConstantBufferHandle, ResourceKey, TextureHandle};

/// Resource table a bind point belongs to.
///
/// The declaration order is the sort order of bind points (type first, then
/// slot), which keeps generated layouts deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ResourceType {
    ConstantBuffer = 1,
    Texture = 2,
    Buffer = 3,
    Sampler = 4,
}

impl ResourceType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ConstantBuffer => "ConstantBuffer",
            Self::Texture => "Texture",
            Self::Buffer => "Buffer",
            Self::Sampler => "Sampler",
        }
    }
}

/// Selects a view of a texture or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourceViewHandle(pub u16);

impl ResourceViewHandle {
    /// Read-only view over the whole resource.
    pub const SHADER_RESOURCE: Self = Self(0);
    /// Read-write view over the whole resource.
    pub const UNORDERED_ACCESS: Self = Self(1);
}

/// Immutable sampler state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerStateHandle(pub u32);

impl SamplerStateHandle {
    pub const POINT_CLAMP: Self = Self(0);
    pub const LINEAR_CLAMP: Self = Self(1);
    pub const LINEAR_WRAP: Self = Self(2);
}

/// One bindable GPU resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceBinding {
    #[default]
    None,
    Texture {
        texture: TextureHandle,
        view: ResourceViewHandle,
    },
    Buffer {
        buffer: BufferHandle,
        view: ResourceViewHandle,
    },
    Sampler(SamplerStateHandle),
    ConstantBuffer(ConstantBufferHandle),
}

impl ResourceBinding {
    #[inline]
    #[must_use]
    pub fn texture(texture: TextureHandle, view: ResourceViewHandle) -> Self {
        Self::Texture { texture, view }
    }

    #[inline]
    #[must_use]
    pub fn buffer(buffer: BufferHandle, view: ResourceViewHandle) -> Self {
        Self::Buffer { buffer, view }
    }

    #[inline]
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Resource table this binding belongs in. `None` for an empty binding.
    #[must_use]
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            Self::None => None,
            Self::Texture { .. } => Some(ResourceType::Texture),
            Self::Buffer { .. } => Some(ResourceType::Buffer),
            Self::Sampler(_) => Some(ResourceType::Sampler),
            Self::ConstantBuffer(_) => Some(ResourceType::ConstantBuffer),
        }
    }

    /// Registry key of the referenced resource. Samplers are plain state
    /// objects and have none.
    #[must_use]
    pub fn resource_key(&self) -> Option<ResourceKey> {
        match *self {
            Self::None | Self::Sampler(_) => None,
            Self::Texture { texture, .. } => Some(texture.key()),
            Self::Buffer { buffer, .. } => Some(buffer.key()),
            Self::ConstantBuffer(cb) => Some(cb.key()),
        }
    }

    /// Packed identity used for dirty detection.
    ///
    /// Layout: `[type tag: 8][view: 16][resource key or sampler: 64]`.
    /// Two bindings compare equal exactly when their keys are equal; an
    /// empty binding is always `0`.
    #[must_use]
    pub fn fast_compare(&self) -> u128 {
        let (ty, view, payload) = match *self {
            Self::None => return 0,
            Self::Texture { texture, view } => (ResourceType::Texture, view.0, texture.key().data().as_ffi()),
            Self::Buffer { buffer, view } => (ResourceType::Buffer, view.0, buffer.key().data().as_ffi()),
            Self::Sampler(state) => (ResourceType::Sampler, 0, u64::from(state.0)),
            Self::ConstantBuffer(cb) => (ResourceType::ConstantBuffer, 0, cb.key().data().as_ffi()),
        };
        (u128::from(ty as u8) << 80) | (u128::from(view) << 64) | u128::from(payload)
    }
}
