//! Global String Interner
//!
//! Technique names and shader constant names are compared on every
//! recompile and every named constant write. Interning turns them into
//! `Copy` symbols with O(1) equality and hashing.
//!
//! ```rust,ignore
//! use kiln_core::interner;
//!
//! let a = interner::intern("CS_BlurHorizontal");
//! let b = interner::intern("CS_BlurHorizontal");
//! assert_eq!(a, b);
//! ```

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact interned string identifier.
pub type Symbol = Spur;

/// Interns a string, returning the existing symbol if already present.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up a string without interning it.
///
/// Never allocates; returns `None` for strings that were never interned.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    let interner: &'static ThreadedRodeo = &INTERNER;
    interner.resolve(&sym)
}
