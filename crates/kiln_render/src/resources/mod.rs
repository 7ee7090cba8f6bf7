//! CPU-side resource model: the registry of GPU resources, bindings, bind
//! points, and the set and layout descriptions compiled from them.

pub mod bind_point;
pub mod binding;
pub mod layout_desc;
pub mod registry;
pub mod set_desc;

pub use bind_point::{BindPointShape, ResourceBindPoint};
pub use binding::{ResourceBinding, ResourceType, ResourceViewHandle, SamplerStateHandle};
pub use layout_desc::{LayoutBindPoint, LayoutSlot, LayoutSlotType, ResourceLayoutDescription};
pub use registry::{
    BufferDesc, BufferHandle, ConstantBufferDesc, ConstantBufferHandle, InvalidationFlags,
    InvalidationListener, ResourceKey, ResourceKind, ResourceRegistry, SubscriptionId, TextureDesc,
    TextureHandle,
};
pub use set_desc::{ResourceSetDescription, ResourceSetDirty};
