//! Crystal region manager: a bump-allocating arena per region (spec §3.2).
//!
//! Grounded directly on the teacher's use of `bumpalo` for strand-local
//! arenas in `runtime::scheduler`. Each region owns a `bumpalo::Bump` for
//! byte-level payloads (crystal strings/buffers) plus a typed slab for
//! structured heap objects (arrays/maps/structs/enums) of whatever type `T`
//! the layer above (`lattice-runtime::value`) supplies — `lattice-core`
//! itself does not know about `Value`. Regions are freed as a whole; there
//! is no per-object free, matching spec §4.1/§3.2 exactly.

use crate::stats::Stats;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u32);

/// A handle into a specific region's typed slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrystalHandle {
    pub region: RegionId,
    pub index: u32,
}

pub struct Region<T> {
    id: RegionId,
    bump: bumpalo::Bump,
    items: Vec<T>,
}

impl<T> Region<T> {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn alloc(&mut self, value: T) -> CrystalHandle {
        let index = self.items.len() as u32;
        self.items.push(value);
        CrystalHandle {
            region: self.id,
            index,
        }
    }

    pub fn get(&self, handle: CrystalHandle) -> Option<&T> {
        if handle.region != self.id {
            return None;
        }
        self.items.get(handle.index as usize)
    }

    pub fn get_mut(&mut self, handle: CrystalHandle) -> Option<&mut T> {
        if handle.region != self.id {
            return None;
        }
        self.items.get_mut(handle.index as usize)
    }

    /// Copy `s` into the region's bump arena, returning a `&str` whose
    /// lifetime is tied to the region. Used for crystal string/buffer
    /// payloads, which do not need `Drop` and so are well-suited to
    /// `bumpalo`'s no-drop allocation.
    pub fn alloc_str(&self, s: &str) -> &str {
        self.bump.alloc_str(s)
    }

    pub fn alloc_bytes(&self, bytes: &[u8]) -> &[u8] {
        self.bump.alloc_slice_copy(bytes)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Owns every live region, keyed by id. Regions are torn down as a whole
/// (spec §3.2: "no pointer crosses from a region into the fluid heap and
/// remains after the region is freed" — enforced by the caller discarding
/// all `CrystalHandle`s into a region before calling `teardown`).
pub struct RegionManager<T> {
    regions: HashMap<u32, Region<T>>,
    next_id: u32,
    stats: Stats,
}

impl<T> RegionManager<T> {
    pub fn new(stats: Stats) -> Self {
        RegionManager {
            regions: HashMap::new(),
            next_id: 0,
            stats,
        }
    }

    /// Acquire a fresh region and install it (spec §4.2 freeze step 1).
    pub fn create_region(&mut self) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        self.regions.insert(
            id.0,
            Region {
                id,
                bump: bumpalo::Bump::new(),
                items: Vec::new(),
            },
        );
        self.stats.record_region_created();
        id
    }

    pub fn region(&self, id: RegionId) -> Option<&Region<T>> {
        self.regions.get(&id.0)
    }

    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut Region<T>> {
        self.regions.get_mut(&id.0)
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Free a region and everything transitively owned by it. Dropping the
    /// `Region<T>` drops both the typed slab and the bump arena.
    pub fn teardown(&mut self, id: RegionId) {
        if self.regions.remove(&id.0).is_some() {
            self.stats.record_region_freed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_get_roundtrip() {
        let mut mgr: RegionManager<i64> = RegionManager::new(Stats::new());
        let id = mgr.create_region();
        let region = mgr.region_mut(id).unwrap();
        let h = region.alloc(42);
        assert_eq!(region.get(h), Some(&42));
    }

    #[test]
    fn teardown_removes_the_region() {
        let mut mgr: RegionManager<i64> = RegionManager::new(Stats::new());
        let id = mgr.create_region();
        assert_eq!(mgr.region_count(), 1);
        mgr.teardown(id);
        assert_eq!(mgr.region_count(), 0);
        assert!(mgr.region(id).is_none());
    }

    #[test]
    fn handle_from_a_different_region_does_not_resolve() {
        let mut mgr: RegionManager<i64> = RegionManager::new(Stats::new());
        let id_a = mgr.create_region();
        let id_b = mgr.create_region();
        let h = mgr.region_mut(id_a).unwrap().alloc(1);
        assert!(mgr.region(id_b).unwrap().get(h).is_none());
    }
}
