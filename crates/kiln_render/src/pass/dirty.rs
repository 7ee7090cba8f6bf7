//! Dirty Tracking
//!
//! [`DirtyMask`] records which compiled artifacts of a pass are stale.
//! Mutations only ever OR bits in; only a fully successful compile clears
//! them.
//!
//! | Bit | Rebuilds |
//! |-----|----------|
//! | `RESOURCES` | resource set contents |
//! | `TECHNIQUE` | reflection, layout, pipeline state |
//! | `RESOURCE_LAYOUT` | reflection, layout, pipeline state |
//!
//! [`InvalidationSignal`] is the only piece touched from foreign threads:
//! registry notifications store a flag, and the owning pass folds it into
//! `RESOURCES` the next time it looks at its mask.

use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use crate::resources::registry::{InvalidationFlags, InvalidationListener};
use crate::resources::set_desc::ResourceSetDirty;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyMask: u32 {
        const RESOURCES       = 1 << 0;
        const TECHNIQUE       = 1 << 1;
        const RESOURCE_LAYOUT = 1 << 2;
        const ALL = Self::RESOURCES.bits() | Self::TECHNIQUE.bits() | Self::RESOURCE_LAYOUT.bits();
    }
}

impl DirtyMask {
    /// Bits that require the layout and pipeline state to be rebuilt.
    pub const PIPELINE: Self = Self::TECHNIQUE.union(Self::RESOURCE_LAYOUT);

    /// The resource set bits of this mask.
    #[inline]
    #[must_use]
    pub fn resource_set_filter(self) -> ResourceSetDirty {
        ResourceSetDirty::from_bits_truncate(self.bits())
    }
}

impl From<ResourceSetDirty> for DirtyMask {
    #[inline]
    fn from(flags: ResourceSetDirty) -> Self {
        Self::from_bits_truncate(flags.bits())
    }
}

/// Coarse compile state derived from the dirty mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassState {
    /// Everything is stale (fresh or reset pass).
    Uncompiled,
    PartiallyDirty,
    /// Ready to dispatch.
    Compiled,
}

impl PassState {
    #[must_use]
    pub fn from_mask(mask: DirtyMask) -> Self {
        if mask.is_empty() {
            Self::Compiled
        } else if mask.contains(DirtyMask::ALL) {
            Self::Uncompiled
        } else {
            Self::PartiallyDirty
        }
    }
}

// ─── Invalidation Signal ─────────────────────────────────────────────────────

/// Lock-free flag raised when a bound resource is resized or destroyed.
#[derive(Debug, Default)]
pub struct InvalidationSignal {
    raised: AtomicBool,
}

impl InvalidationSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Lowers the flag, returning whether it was raised.
    #[inline]
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }
}

impl InvalidationListener for InvalidationSignal {
    fn on_resource_invalidated(&self, flags: InvalidationFlags) -> bool {
        self.raised.store(true, Ordering::Release);
        !flags.contains(InvalidationFlags::DESTROYED)
    }
}
