//! `Set` methods (spec §3.1): a set of values keyed by their display form.

use super::require_fluid;
use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{HeapPtr, Value, ValueKind};
use crate::value_ops::display;
use lattice_core::containers::OpenMap;
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{LatticeError, Result};

fn with_set<T>(heap: &Heap, ptr: HeapPtr, f: impl FnOnce(&OpenMap<Value>) -> T) -> Result<T> {
    match heap.get(ptr) {
        Some(HeapObject::Set(m)) => Ok(f(m)),
        _ => Err(LatticeError::type_error("not a set")),
    }
}

pub fn len(heap: &Heap, ptr: HeapPtr) -> Result<usize> {
    with_set(heap, ptr, OpenMap::len)
}

pub fn contains(heap: &Heap, ptr: HeapPtr, value: &Value) -> Result<bool> {
    let key = display(heap, value);
    with_set(heap, ptr, |m| m.contains_key(&key))
}

pub fn insert(heap: &mut Heap, ptr: HeapPtr, value: Value) -> Result<bool> {
    require_fluid(ptr, "insert into")?;
    let key = display(heap, &value);
    match heap.get_mut(ptr) {
        Some(HeapObject::Set(m)) => Ok(m.set(&key, value).is_none()),
        _ => Err(LatticeError::type_error("not a set")),
    }
}

pub fn remove(heap: &mut Heap, ptr: HeapPtr, value: &Value) -> Result<bool> {
    require_fluid(ptr, "remove from")?;
    let key = display(heap, value);
    match heap.get_mut(ptr) {
        Some(HeapObject::Set(m)) => Ok(m.remove(&key).is_some()),
        _ => Err(LatticeError::type_error("not a set")),
    }
}

pub fn union(heap: &mut Heap, a: HeapPtr, b: HeapPtr, ctx: AllocCtx, roots: &[FluidHandle]) -> Result<Value> {
    let mut merged = with_set(heap, a, Clone::clone)?;
    let extra = with_set(heap, b, Clone::clone)?;
    for (k, v) in extra.iter() {
        merged.set(k, v.clone());
    }
    build(heap, merged, ctx, roots)
}

pub fn intersection(
    heap: &mut Heap,
    a: HeapPtr,
    b: HeapPtr,
    ctx: AllocCtx,
    roots: &[FluidHandle],
) -> Result<Value> {
    let left = with_set(heap, a, Clone::clone)?;
    let right = with_set(heap, b, Clone::clone)?;
    let mut result = OpenMap::new();
    for (k, v) in left.iter() {
        if right.contains_key(k) {
            result.set(k, v.clone());
        }
    }
    build(heap, result, ctx, roots)
}

pub fn difference(
    heap: &mut Heap,
    a: HeapPtr,
    b: HeapPtr,
    ctx: AllocCtx,
    roots: &[FluidHandle],
) -> Result<Value> {
    let left = with_set(heap, a, Clone::clone)?;
    let right = with_set(heap, b, Clone::clone)?;
    let mut result = OpenMap::new();
    for (k, v) in left.iter() {
        if !right.contains_key(k) {
            result.set(k, v.clone());
        }
    }
    build(heap, result, ctx, roots)
}

fn build(heap: &mut Heap, m: OpenMap<Value>, ctx: AllocCtx, roots: &[FluidHandle]) -> Result<Value> {
    let phase = match ctx {
        AllocCtx::Fluid => lattice_core::Phase::Fluid,
        AllocCtx::Crystal(_) => lattice_core::Phase::Crystal,
    };
    let ptr = heap.alloc(HeapObject::Set(m), ctx, roots);
    Ok(Value::new(phase, ValueKind::Set(ptr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::RuntimeFlags;

    fn new_set(heap: &mut Heap, values: &[Value]) -> HeapPtr {
        let mut m = OpenMap::new();
        for v in values {
            let key = display(heap, v);
            m.set(&key, v.clone());
        }
        heap.alloc(HeapObject::Set(m), AllocCtx::Fluid, &[])
    }

    #[test]
    fn insert_is_idempotent_by_display_form() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_set(&mut heap, &[]);
        assert!(insert(&mut heap, ptr, Value::int(1)).unwrap());
        assert!(!insert(&mut heap, ptr, Value::int(1)).unwrap());
        assert_eq!(len(&heap, ptr).unwrap(), 1);
    }

    #[test]
    fn intersection_keeps_only_shared_members() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let a = new_set(&mut heap, &[Value::int(1), Value::int(2)]);
        let b = new_set(&mut heap, &[Value::int(2), Value::int(3)]);
        let result = intersection(&mut heap, a, b, AllocCtx::Fluid, &[]).unwrap();
        let ptr = result.heap_ptr().unwrap();
        assert_eq!(len(&heap, ptr).unwrap(), 1);
        assert!(contains(&heap, ptr, &Value::int(2)).unwrap());
    }
}
