//! `Array` methods (spec §3.1, §4.1).

use super::{normalize_index, require_fluid};
use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{HeapPtr, Value, ValueKind};
use crate::value_ops::deep_eq;
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{LatticeError, Result};

fn with_array<T>(heap: &Heap, ptr: HeapPtr, f: impl FnOnce(&Vec<Value>) -> T) -> Result<T> {
    match heap.get(ptr) {
        Some(HeapObject::Array(items)) => Ok(f(items)),
        _ => Err(LatticeError::type_error("not an array")),
    }
}

fn with_array_mut<T>(heap: &mut Heap, ptr: HeapPtr, f: impl FnOnce(&mut Vec<Value>) -> T) -> Result<T> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Array(items)) => Ok(f(items)),
        _ => Err(LatticeError::type_error("not an array")),
    }
}

pub fn len(heap: &Heap, ptr: HeapPtr) -> Result<usize> {
    with_array(heap, ptr, Vec::len)
}

pub fn push(heap: &mut Heap, ptr: HeapPtr, value: Value) -> Result<()> {
    require_fluid(ptr, "push")?;
    with_array_mut(heap, ptr, move |items| items.push(value))
}

pub fn pop(heap: &mut Heap, ptr: HeapPtr) -> Result<Option<Value>> {
    require_fluid(ptr, "pop")?;
    with_array_mut(heap, ptr, Vec::pop)
}

pub fn get(heap: &Heap, ptr: HeapPtr, index: i64) -> Result<Value> {
    with_array(heap, ptr, |items| {
        normalize_index(index, items.len()).map(|i| items[i].clone())
    })?
    .ok_or_else(|| LatticeError::IndexError {
        message: format!("index {index} out of bounds"),
        loc: None,
    })
}

pub fn set(heap: &mut Heap, ptr: HeapPtr, index: i64, value: Value) -> Result<()> {
    require_fluid(ptr, "assign into")?;
    let len = with_array(heap, ptr, Vec::len)?;
    let Some(i) = normalize_index(index, len) else {
        return Err(LatticeError::IndexError {
            message: format!("index {index} out of bounds"),
            loc: None,
        });
    };
    with_array_mut(heap, ptr, move |items| items[i] = value)
}

pub fn contains(heap: &Heap, ptr: HeapPtr, needle: &Value) -> Result<bool> {
    let items = with_array(heap, ptr, Clone::clone)?;
    Ok(items.iter().any(|v| deep_eq(heap, v, needle)))
}

pub fn index_of(heap: &Heap, ptr: HeapPtr, needle: &Value) -> Result<Option<usize>> {
    let items = with_array(heap, ptr, Clone::clone)?;
    Ok(items.iter().position(|v| deep_eq(heap, v, needle)))
}

pub fn clear(heap: &mut Heap, ptr: HeapPtr) -> Result<()> {
    require_fluid(ptr, "clear")?;
    with_array_mut(heap, ptr, Vec::clear)
}

pub fn concat(
    heap: &mut Heap,
    a: HeapPtr,
    b: HeapPtr,
    ctx: AllocCtx,
    roots: &[FluidHandle],
) -> Result<Value> {
    let mut items = with_array(heap, a, Clone::clone)?;
    items.extend(with_array(heap, b, Clone::clone)?);
    let phase = match ctx {
        AllocCtx::Fluid => lattice_core::Phase::Fluid,
        AllocCtx::Crystal(_) => lattice_core::Phase::Crystal,
    };
    let new_ptr = heap.alloc(HeapObject::Array(items), ctx, roots);
    Ok(Value::new(phase, ValueKind::Array(new_ptr)))
}

/// `unique()`: dedups by structural equality, keeping first occurrence.
/// Idempotent (spec §8): applying it twice equals applying it once.
pub fn unique(heap: &mut Heap, ptr: HeapPtr) -> Result<()> {
    require_fluid(ptr, "dedup")?;
    let items = with_array(heap, ptr, Clone::clone)?;
    let mut deduped: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !deduped.iter().any(|kept| deep_eq(heap, kept, &item)) {
            deduped.push(item);
        }
    }
    with_array_mut(heap, ptr, move |items| *items = deduped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::RuntimeFlags;

    fn new_array(heap: &mut Heap, items: Vec<Value>) -> HeapPtr {
        heap.alloc(HeapObject::Array(items), AllocCtx::Fluid, &[])
    }

    #[test]
    fn push_and_pop_roundtrip() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_array(&mut heap, vec![]);
        push(&mut heap, ptr, Value::int(1)).unwrap();
        push(&mut heap, ptr, Value::int(2)).unwrap();
        assert_eq!(len(&heap, ptr).unwrap(), 2);
        assert!(matches!(pop(&mut heap, ptr).unwrap().unwrap().kind, ValueKind::Int(2)));
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_array(&mut heap, vec![Value::int(1), Value::int(2), Value::int(3)]);
        assert!(matches!(get(&heap, ptr, -1).unwrap().kind, ValueKind::Int(3)));
    }

    #[test]
    fn mutating_a_crystal_array_fails_with_phase_violation() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let region = heap.create_region();
        let ptr = heap.alloc(HeapObject::Array(vec![]), AllocCtx::Crystal(region), &[]);
        assert!(push(&mut heap, ptr, Value::int(1)).is_err());
    }

    #[test]
    fn unique_applied_twice_equals_applied_once() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = new_array(
            &mut heap,
            vec![Value::int(1), Value::int(1), Value::int(2), Value::int(2)],
        );
        unique(&mut heap, ptr).unwrap();
        let after_once = with_array(&heap, ptr, Clone::clone).unwrap();
        unique(&mut heap, ptr).unwrap();
        let after_twice = with_array(&heap, ptr, Clone::clone).unwrap();
        assert_eq!(after_once.len(), after_twice.len());
        assert_eq!(after_once.len(), 2);
    }
}
