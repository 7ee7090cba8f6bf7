//! GPU Resource Registry
//!
//! A generation-checked arena of the GPU resources that bindings refer to.
//! Bindings never own a resource: they hold a typed handle wrapping a
//! [`ResourceKey`], and a key whose resource was destroyed simply stops
//! resolving instead of dangling.
//!
//! # Invalidation
//!
//! Each record keeps a subscriber list of weak [`InvalidationListener`]s.
//! Resizing or destroying a resource notifies every live subscriber from the
//! calling thread, *after* the registry lock has been released:
//!
//! ```text
//! resize_texture / destroy
//!   ├── write lock: bump version (or remove record), snapshot subscribers
//!   ├── unlock
//!   ├── listener.on_resource_invalidated(flags) -> keep?
//!   └── write lock: drop subscribers that answered `false` or are gone
//! ```
//!
//! Listeners only flip an atomic flag, so notification is safe from any
//! thread and never re-enters the registry.

use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use kiln_core::{ChangeTracker, KilnError, Result};
use parking_lot::RwLock;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Generation-checked key of a registered GPU resource.
    pub struct ResourceKey;
}

bitflags! {
    /// Reason a resource notified its subscribers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct InvalidationFlags: u32 {
        const RESIZED   = 1 << 0;
        const DESTROYED = 1 << 1;
    }
}

/// Receives lifecycle notifications of the resources it subscribed to.
pub trait InvalidationListener: Send + Sync {
    /// Called from whichever thread resized or destroyed the resource.
    ///
    /// Returns whether the resource should keep notifying this listener.
    fn on_resource_invalidated(&self, flags: InvalidationFlags) -> bool;
}

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ─── Typed Handles ───────────────────────────────────────────────────────────

/// Kind of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Texture,
    Buffer,
    ConstantBuffer,
}

impl ResourceKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Texture => "texture",
            Self::Buffer => "buffer",
            Self::ConstantBuffer => "constant buffer",
        }
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(ResourceKey);

        impl $name {
            /// Underlying registry key.
            #[inline]
            #[must_use]
            pub fn key(self) -> ResourceKey {
                self.0
            }
        }

        impl From<$name> for ResourceKey {
            #[inline]
            fn from(handle: $name) -> Self {
                handle.0
            }
        }
    };
}

typed_handle!(
    /// Handle to a registered texture.
    TextureHandle
);
typed_handle!(
    /// Handle to a registered structured / typed buffer.
    BufferHandle
);
typed_handle!(
    /// Handle to a registered constant buffer.
    ConstantBufferHandle
);

// ─── Descriptors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferDesc {
    pub label: String,
    pub size: u32,
}

#[derive(Debug, Clone)]
enum ResourceDesc {
    Texture(TextureDesc),
    Buffer(BufferDesc),
    ConstantBuffer {
        desc: ConstantBufferDesc,
        /// CPU shadow of the buffer contents.
        contents: Vec<u8>,
    },
}

impl ResourceDesc {
    fn kind(&self) -> ResourceKind {
        match self {
            Self::Texture(_) => ResourceKind::Texture,
            Self::Buffer(_) => ResourceKind::Buffer,
            Self::ConstantBuffer { .. } => ResourceKind::ConstantBuffer,
        }
    }
}

#[derive(Debug, Clone)]
struct Subscriber {
    id: SubscriptionId,
    listener: Weak<dyn InvalidationListener>,
}

type SubscriberList = SmallVec<[Subscriber; 4]>;

#[derive(Debug)]
struct ResourceRecord {
    desc: ResourceDesc,
    version: ChangeTracker,
    subscribers: SubscriberList,
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Thread-safe owner of all bindable GPU resources.
#[derive(Debug)]
pub struct ResourceRegistry {
    records: RwLock<SlotMap<ResourceKey, ResourceRecord>>,
    next_subscription: AtomicU64,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(SlotMap::with_key()),
            next_subscription: AtomicU64::new(1),
        }
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    pub fn create_texture(&self, desc: TextureDesc) -> TextureHandle {
        TextureHandle(self.insert(ResourceDesc::Texture(desc)))
    }

    pub fn create_buffer(&self, desc: BufferDesc) -> BufferHandle {
        BufferHandle(self.insert(ResourceDesc::Buffer(desc)))
    }

    /// Registers a constant buffer with zero-initialised contents.
    pub fn create_constant_buffer(&self, desc: ConstantBufferDesc) -> ConstantBufferHandle {
        let contents = vec![0u8; desc.size as usize];
        ConstantBufferHandle(self.insert(ResourceDesc::ConstantBuffer { desc, contents }))
    }

    fn insert(&self, desc: ResourceDesc) -> ResourceKey {
        let key = self.records.write().insert(ResourceRecord {
            desc,
            version: ChangeTracker::new(),
            subscribers: SmallVec::new(),
        });
        log::trace!("Registered GPU resource {key:?}");
        key
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_alive(&self, key: impl Into<ResourceKey>) -> bool {
        self.records.read().contains_key(key.into())
    }

    #[must_use]
    pub fn kind(&self, key: impl Into<ResourceKey>) -> Option<ResourceKind> {
        self.records.read().get(key.into()).map(|r| r.desc.kind())
    }

    /// Number of resizes / content writes the resource has seen.
    #[must_use]
    pub fn version(&self, key: impl Into<ResourceKey>) -> Option<u64> {
        self.records.read().get(key.into()).map(|r| r.version.version())
    }

    #[must_use]
    pub fn texture_desc(&self, handle: TextureHandle) -> Option<TextureDesc> {
        match &self.records.read().get(handle.key())?.desc {
            ResourceDesc::Texture(desc) => Some(desc.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn buffer_desc(&self, handle: BufferHandle) -> Option<BufferDesc> {
        match &self.records.read().get(handle.key())?.desc {
            ResourceDesc::Buffer(desc) => Some(desc.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn constant_buffer_desc(&self, handle: ConstantBufferHandle) -> Option<ConstantBufferDesc> {
        match &self.records.read().get(handle.key())?.desc {
            ResourceDesc::ConstantBuffer { desc, .. } => Some(desc.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Changes the extent of a texture and notifies its subscribers.
    pub fn resize_texture(&self, handle: TextureHandle, width: u32, height: u32) -> Result<()> {
        let snapshot = {
            let mut records = self.records.write();
            let record = records
                .get_mut(handle.key())
                .ok_or_else(|| not_found(handle.key()))?;
            let kind = record.desc.kind();
            let ResourceDesc::Texture(desc) = &mut record.desc else {
                return Err(kind_mismatch(handle.key(), ResourceKind::Texture, kind));
            };
            desc.width = width;
            desc.height = height;
            record.version.changed();
            record.subscribers.clone()
        };

        self.notify(handle.key(), &snapshot, InvalidationFlags::RESIZED);
        Ok(())
    }

    /// Changes the size of a buffer and notifies its subscribers.
    pub fn resize_buffer(&self, handle: BufferHandle, size: u64) -> Result<()> {
        let snapshot = {
            let mut records = self.records.write();
            let record = records
                .get_mut(handle.key())
                .ok_or_else(|| not_found(handle.key()))?;
            let kind = record.desc.kind();
            let ResourceDesc::Buffer(desc) = &mut record.desc else {
                return Err(kind_mismatch(handle.key(), ResourceKind::Buffer, kind));
            };
            desc.size = size;
            record.version.changed();
            record.subscribers.clone()
        };

        self.notify(handle.key(), &snapshot, InvalidationFlags::RESIZED);
        Ok(())
    }

    /// Removes a resource. Outstanding handles stop resolving and every
    /// subscriber receives [`InvalidationFlags::DESTROYED`].
    pub fn destroy(&self, key: impl Into<ResourceKey>) -> Result<()> {
        let key = key.into();
        let record = self.records.write().remove(key).ok_or_else(|| not_found(key))?;
        log::debug!(
            "Destroyed GPU {} {key:?} ({} subscribers)",
            record.desc.kind().name(),
            record.subscribers.len()
        );

        for subscriber in &record.subscribers {
            if let Some(listener) = subscriber.listener.upgrade() {
                listener.on_resource_invalidated(InvalidationFlags::DESTROYED);
            }
        }
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Registers a listener on a live resource. Returns `None` if the
    /// resource does not exist.
    pub fn subscribe(
        &self,
        key: impl Into<ResourceKey>,
        listener: Weak<dyn InvalidationListener>,
    ) -> Option<SubscriptionId> {
        let mut records = self.records.write();
        let record = records.get_mut(key.into())?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        record.subscribers.push(Subscriber { id, listener });
        Some(id)
    }

    /// Removes a subscription. Returns `false` if either the resource or the
    /// subscription is already gone.
    pub fn unsubscribe(&self, key: impl Into<ResourceKey>, id: SubscriptionId) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(key.into()) else {
            return false;
        };
        let before = record.subscribers.len();
        record.subscribers.retain(|s| s.id != id);
        record.subscribers.len() != before
    }

    #[must_use]
    pub fn subscriber_count(&self, key: impl Into<ResourceKey>) -> usize {
        self.records
            .read()
            .get(key.into())
            .map_or(0, |r| r.subscribers.len())
    }

    fn notify(&self, key: ResourceKey, subscribers: &SubscriberList, flags: InvalidationFlags) {
        let mut dropped: SmallVec<[SubscriptionId; 4]> = SmallVec::new();
        for subscriber in subscribers {
            let keep = subscriber
                .listener
                .upgrade()
                .is_some_and(|listener| listener.on_resource_invalidated(flags));
            if !keep {
                dropped.push(subscriber.id);
            }
        }

        if dropped.is_empty() {
            return;
        }
        if let Some(record) = self.records.write().get_mut(key) {
            record.subscribers.retain(|s| !dropped.contains(&s.id));
        }
    }

    // ── Constant Buffer Contents ─────────────────────────────────────────────

    /// Writes bytes into the CPU shadow of a constant buffer.
    pub fn write_constant_buffer(
        &self,
        handle: ConstantBufferHandle,
        offset: usize,
        bytes: &[u8],
    ) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(handle.key())
            .ok_or_else(|| not_found(handle.key()))?;
        let kind = record.desc.kind();
        let ResourceDesc::ConstantBuffer { contents, .. } = &mut record.desc else {
            return Err(kind_mismatch(handle.key(), ResourceKind::ConstantBuffer, kind));
        };

        let Some(end) = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= contents.len())
        else {
            return Err(KilnError::ConstantBufferOverflow {
                offset,
                len: bytes.len(),
                size: contents.len(),
            });
        };
        contents[offset..end].copy_from_slice(bytes);
        record.version.changed();
        Ok(())
    }

    /// Copy of the current constant buffer contents.
    #[must_use]
    pub fn constant_buffer_contents(&self, handle: ConstantBufferHandle) -> Option<Vec<u8>> {
        match &self.records.read().get(handle.key())?.desc {
            ResourceDesc::ConstantBuffer { contents, .. } => Some(contents.clone()),
            _ => None,
        }
    }
}

fn not_found(key: ResourceKey) -> KilnError {
    KilnError::ResourceNotFound(format!("{key:?}"))
}

fn kind_mismatch(key: ResourceKey, expected: ResourceKind, actual: ResourceKind) -> KilnError {
    KilnError::ResourceKindMismatch {
        key: format!("{key:?}"),
        expected: expected.name(),
        actual: actual.name(),
    }
}
