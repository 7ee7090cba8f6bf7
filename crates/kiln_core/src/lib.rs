//! Kiln Core
//!
//! Foundational types shared by every Kiln crate:
//!
//! - [`errors`]: the [`KilnError`] type and [`Result`] alias
//! - [`interner`]: global string interning for technique and constant names
//! - [`tracked`]: process-unique device object identifiers
//! - [`version_tracker`]: monotonic change counters
//! - [`hash`]: `FxHasher`-based key hashing

pub mod errors;
pub mod hash;
pub mod interner;
pub mod tracked;
pub mod version_tracker;

pub use errors::{KilnError, Result};
pub use hash::fx_hash_key;
pub use interner::Symbol;
pub use tracked::{Tracked, next_object_id};
pub use version_tracker::ChangeTracker;
