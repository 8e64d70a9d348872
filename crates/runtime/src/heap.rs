//! `Heap`: the dual-heap manager (spec §3.2) composing `lattice-core`'s
//! fluid slab and crystal region manager into the single object store every
//! heap-bearing `Value` variant addresses.

use crate::heap_object::HeapObject;
use crate::value::HeapPtr;
use lattice_core::heap::crystal::{CrystalHandle, RegionId};
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{FluidHeap, RegionManager, RuntimeFlags, Stats};

pub struct Heap {
    fluid: FluidHeap<HeapObject>,
    regions: RegionManager<HeapObject>,
    pub stats: Stats,
    pub flags: RuntimeFlags,
}

impl Heap {
    pub fn new(flags: RuntimeFlags) -> Self {
        let stats = Stats::new();
        let fluid = FluidHeap::new(stats.clone())
            .with_stress(flags.stress)
            .with_threshold(flags.gc_threshold);
        Heap {
            fluid,
            regions: RegionManager::new(stats.clone()),
            stats,
            flags,
        }
    }

    /// Allocate `obj` routed per `ctx` (spec §3.2: "every allocation
    /// decision is routed"). `roots` is the shadow stack consulted if a
    /// fluid allocation triggers a collection first.
    pub fn alloc(&mut self, obj: HeapObject, ctx: AllocCtx, roots: &[FluidHandle]) -> HeapPtr {
        match ctx {
            AllocCtx::Fluid => HeapPtr::Fluid(self.fluid.alloc(obj, roots)),
            AllocCtx::Crystal(region_id) => {
                let region = self
                    .regions
                    .region_mut(region_id)
                    .expect("routed region must exist while installed as current arena");
                let CrystalHandle { region, index } = region.alloc(obj);
                HeapPtr::Crystal(region, index)
            }
        }
    }

    pub fn get(&self, ptr: HeapPtr) -> Option<&HeapObject> {
        match ptr {
            HeapPtr::Fluid(h) => self.fluid.get(h),
            HeapPtr::Crystal(region_id, index) => self
                .regions
                .region(region_id)
                .and_then(|r| r.get(CrystalHandle { region: region_id, index })),
        }
    }

    pub fn get_mut(&mut self, ptr: HeapPtr) -> Option<&mut HeapObject> {
        match ptr {
            HeapPtr::Fluid(h) => self.fluid.get_mut(h),
            HeapPtr::Crystal(region_id, index) => self
                .regions
                .region_mut(region_id)
                .and_then(|r| r.get_mut(CrystalHandle { region: region_id, index })),
        }
    }

    pub fn create_region(&mut self) -> RegionId {
        self.regions.create_region()
    }

    /// Tear down a region. Per spec §3.2/§5, callers must ensure no live
    /// root transitively reachable elsewhere still points into `id` before
    /// calling this.
    pub fn teardown_region(&mut self, id: RegionId) {
        self.regions.teardown(id);
    }

    pub fn region_count(&self) -> usize {
        self.regions.region_count()
    }

    pub fn collect(&mut self, roots: &[FluidHandle]) {
        self.fluid.collect(roots);
    }

    pub fn fluid_live_count(&self) -> usize {
        self.fluid.live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluid_alloc_and_get_roundtrip() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = heap.alloc(HeapObject::Buffer(vec![1, 2, 3]), AllocCtx::Fluid, &[]);
        match heap.get(ptr) {
            Some(HeapObject::Buffer(b)) => assert_eq!(b, &vec![1, 2, 3]),
            _ => panic!("expected buffer"),
        }
    }

    #[test]
    fn crystal_alloc_routes_into_the_region() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let region = heap.create_region();
        let ptr = heap.alloc(
            HeapObject::Buffer(vec![9]),
            AllocCtx::Crystal(region),
            &[],
        );
        assert!(matches!(ptr, HeapPtr::Crystal(_, _)));
        assert!(heap.get(ptr).is_some());
        heap.teardown_region(region);
        assert!(heap.get(ptr).is_none());
    }
}
