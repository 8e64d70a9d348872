//! `Map` methods (spec §3.1, §4.1): insertion-order-agnostic, open-addressed
//! with tombstones, string keys.

use super::require_fluid;
use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{HeapPtr, Value};
use lattice_core::containers::OpenMap;
use lattice_core::{LatticeError, Result};

fn with_map<T>(heap: &Heap, ptr: HeapPtr, f: impl FnOnce(&OpenMap<Value>) -> T) -> Result<T> {
    match heap.get(ptr) {
        Some(HeapObject::Map(m)) => Ok(f(m)),
        _ => Err(LatticeError::type_error("not a map")),
    }
}

fn with_map_mut<T>(heap: &mut Heap, ptr: HeapPtr, f: impl FnOnce(&mut OpenMap<Value>) -> T) -> Result<T> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Map(m)) => Ok(f(m)),
        _ => Err(LatticeError::type_error("not a map")),
    }
}

pub fn len(heap: &Heap, ptr: HeapPtr) -> Result<usize> {
    with_map(heap, ptr, OpenMap::len)
}

pub fn get(heap: &Heap, ptr: HeapPtr, key: &str) -> Result<Option<Value>> {
    with_map(heap, ptr, |m| m.get(key).cloned())
}

pub fn set(heap: &mut Heap, ptr: HeapPtr, key: &str, value: Value) -> Result<Option<Value>> {
    require_fluid(ptr, "assign a key into")?;
    with_map_mut(heap, ptr, move |m| m.set(key, value))
}

pub fn remove(heap: &mut Heap, ptr: HeapPtr, key: &str) -> Result<Option<Value>> {
    require_fluid(ptr, "remove a key from")?;
    with_map_mut(heap, ptr, move |m| m.remove(key))
}

pub fn contains_key(heap: &Heap, ptr: HeapPtr, key: &str) -> Result<bool> {
    with_map(heap, ptr, |m| m.contains_key(key))
}

pub fn keys(heap: &Heap, ptr: HeapPtr) -> Result<Vec<String>> {
    with_map(heap, ptr, |m| m.keys().map(str::to_string).collect())
}

pub fn values(heap: &Heap, ptr: HeapPtr) -> Result<Vec<Value>> {
    with_map(heap, ptr, |m| m.iter().map(|(_, v)| v.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap_object::HeapObject;
    use lattice_core::heap::routing::AllocCtx;
    use lattice_core::RuntimeFlags;

    #[test]
    fn set_get_remove_roundtrip() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = heap.alloc(HeapObject::Map(OpenMap::new()), AllocCtx::Fluid, &[]);
        set(&mut heap, ptr, "a", Value::int(1)).unwrap();
        assert_eq!(len(&heap, ptr).unwrap(), 1);
        assert!(contains_key(&heap, ptr, "a").unwrap());
        remove(&mut heap, ptr, "a").unwrap();
        assert!(!contains_key(&heap, ptr, "a").unwrap());
    }

    #[test]
    fn mutating_a_crystal_map_fails() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let region = heap.create_region();
        let ptr = heap.alloc(HeapObject::Map(OpenMap::new()), AllocCtx::Crystal(region), &[]);
        assert!(set(&mut heap, ptr, "a", Value::int(1)).is_err());
    }
}
