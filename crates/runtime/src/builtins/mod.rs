//! Built-in operations (spec §2's 12% component, §4.1/§4.2): the
//! array/string/map/set/buffer/enum method tables. Grounded on the teacher's
//! `runtime::{list_ops, string_ops, variant_ops}` (one module per type's
//! method table), restricted to the types spec §3.1 names — crypto/http/tcp/
//! regex/compression/os/terminal/watchdog/weave built-ins the teacher has no
//! counterpart here for (no spec coverage, dropped).
//!
//! Each submodule operates directly on a `HeapPtr` the way a method call
//! resolves its receiver; mutating operations reject a crystal receiver with
//! `PhaseViolation` before touching the heap (spec §3.1 invariant).

pub mod array_ops;
pub mod buffer_ops;
pub mod enum_ops;
pub mod map_ops;
pub mod set_ops;
pub mod string_ops;

use crate::value::HeapPtr;
use lattice_core::{LatticeError, Result};

/// Shared guard used by every mutating op: a crystal receiver always fails
/// with `PhaseViolation` (spec §3.1).
pub(crate) fn require_fluid(ptr: HeapPtr, op: &str) -> Result<()> {
    if ptr.phase().is_crystal() {
        Err(LatticeError::phase_violation(format!(
            "cannot {op} on a crystal value"
        )))
    } else {
        Ok(())
    }
}

/// Normalizes a possibly-negative index (Lattice allows `-1` for "last
/// element", matching the teacher's indexing convention) against `len`.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let from_end = (-index) as usize;
        (from_end <= len).then(|| len - from_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_index_handles_negative_offsets() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(-3, 3), Some(0));
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(3, 3), None);
    }
}
