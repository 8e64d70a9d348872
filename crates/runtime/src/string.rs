//! Phase-tagged string payload for `Value::String` (spec §3.1).
//!
//! The teacher's `runtime::seqstring::SeqString` distinguishes arena-local
//! from globally-allocated strings using raw pointers and a manual `Drop`,
//! because it must cross a C ABI. This crate has no FFI boundary, so
//! `LString` reaches the same phase-routing idea (spec §3.2: "routed"
//! allocation) with a safe, reference-counted `Rc<str>` instead — no
//! built-in in this spec mutates a string's bytes in place (mutation is
//! named only for array/struct-field/map/buffer), so an immutable
//! refcounted payload is sufficient for both phases. The `RegionId` carried
//! by `Crystal` attributes the string's bytes to that region for
//! statistics and region-identity purposes (equality/display never consult
//! it); the bytes themselves are ordinary heap memory shared via `Rc`, not
//! literally carved out of the region's bump arena.

use lattice_core::heap::crystal::RegionId;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum LString {
    Fluid(Rc<str>),
    Crystal(RegionId, Rc<str>),
}

impl LString {
    pub fn new_fluid(s: impl Into<Rc<str>>) -> Self {
        LString::Fluid(s.into())
    }

    pub fn new_crystal(region: RegionId, s: impl Into<Rc<str>>) -> Self {
        LString::Crystal(region, s.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            LString::Fluid(s) => s,
            LString::Crystal(_, s) => s,
        }
    }

    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    pub fn is_crystal(&self) -> bool {
        matches!(self, LString::Crystal(_, _))
    }

    pub fn to_fluid(&self) -> Self {
        LString::Fluid(Rc::from(self.as_str()))
    }

    pub fn to_crystal(&self, region: RegionId) -> Self {
        LString::Crystal(region, Rc::from(self.as_str()))
    }
}

impl PartialEq for LString {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::fmt::Display for LString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_phase() {
        let a = LString::new_fluid("hi");
        let b = LString::new_crystal(RegionId(0), "hi");
        assert_eq!(a, b);
    }

    #[test]
    fn to_fluid_preserves_content() {
        let crystal = LString::new_crystal(RegionId(1), "abc");
        let fluid = crystal.to_fluid();
        assert!(!fluid.is_crystal());
        assert_eq!(fluid.as_str(), "abc");
    }
}
