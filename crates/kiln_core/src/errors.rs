//! Error Types
//!
//! [`KilnError`] covers the caller-visible failure modes of the binding layer.
//!
//! Compilation of device objects never surfaces here: a pass that fails to
//! compile stays dirty and is retried on a later frame. The variants below
//! describe configuration mistakes (unknown constant names, conflicting
//! layout slots) and lookups against resources that no longer exist.
//!
//! ```rust,ignore
//! use kiln_core::{KilnError, Result};
//!
//! fn upload() -> Result<()> {
//!     Err(KilnError::NoPendingConstantUpdate)
//! }
//! ```

use thiserror::Error;

/// The main error type for Kiln.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KilnError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// No reflected constant with this name exists in the current technique.
    #[error("Unknown shader constant: {0}")]
    UnknownConstant(String),

    /// The written value does not fit into the reflected constant.
    #[error("Constant '{name}' holds {capacity} bytes, got {written}")]
    ConstantSizeMismatch {
        /// Constant name
        name: String,
        /// Size of the reflected member in bytes
        capacity: usize,
        /// Number of bytes the caller tried to write
        written: usize,
    },

    /// Constant writes are only accepted between `begin_constant_update`
    /// and the following `prepare_resources_for_use`.
    #[error("No constant update is pending")]
    NoPendingConstantUpdate,

    /// The reflected constant tables are not bound to the pass's current
    /// pipeline state, typically because the last compile failed.
    #[error("Constant '{0}' belongs to a shader reflection with no compiled pipeline")]
    UnboundConstantReflection(String),

    /// Two layout entries claim the same layout slot.
    #[error("Layout slot {0} is used more than once")]
    DuplicateLayoutSlot(u8),

    /// Two constant buffers are bound to the same shader register on
    /// overlapping stages.
    #[error("Constant buffer shader slot {shader_slot} is bound twice (layout slots {first} and {second})")]
    ShaderSlotConflict {
        /// Shader register of the conflicting constant buffers
        shader_slot: u8,
        /// Layout slot of the first occupant
        first: u8,
        /// Layout slot of the second occupant
        second: u8,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The resource was destroyed or never registered.
    #[error("GPU resource not found: {0}")]
    ResourceNotFound(String),

    /// The resource exists but is of a different kind than requested.
    #[error("GPU resource {key} is a {actual}, expected a {expected}")]
    ResourceKindMismatch {
        /// Resource key (debug representation)
        key: String,
        /// Kind the caller asked for
        expected: &'static str,
        /// Kind stored in the registry
        actual: &'static str,
    },

    /// A write would run past the end of a constant buffer.
    #[error("Constant buffer write of {len} bytes at offset {offset} exceeds size {size}")]
    ConstantBufferOverflow {
        /// Byte offset of the write
        offset: usize,
        /// Length of the write
        len: usize,
        /// Size of the constant buffer
        size: usize,
    },
}

/// Alias for `Result<T, KilnError>`.
pub type Result<T> = std::result::Result<T, KilnError>;
