//! `Buffer` methods (spec §3.1): mutable byte vector for binary I/O and codecs.

use super::{normalize_index, require_fluid};
use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{HeapPtr, Value, ValueKind};
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{LatticeError, Result};

fn with_buf<T>(heap: &Heap, ptr: HeapPtr, f: impl FnOnce(&Vec<u8>) -> T) -> Result<T> {
    match heap.get(ptr) {
        Some(HeapObject::Buffer(b)) => Ok(f(b)),
        _ => Err(LatticeError::type_error("not a buffer")),
    }
}

fn with_buf_mut<T>(heap: &mut Heap, ptr: HeapPtr, f: impl FnOnce(&mut Vec<u8>) -> T) -> Result<T> {
    match heap.get_mut(ptr) {
        Some(HeapObject::Buffer(b)) => Ok(f(b)),
        _ => Err(LatticeError::type_error("not a buffer")),
    }
}

pub fn len(heap: &Heap, ptr: HeapPtr) -> Result<usize> {
    with_buf(heap, ptr, Vec::len)
}

pub fn push_byte(heap: &mut Heap, ptr: HeapPtr, byte: u8) -> Result<()> {
    require_fluid(ptr, "append to")?;
    with_buf_mut(heap, ptr, move |b| b.push(byte))
}

pub fn get_byte(heap: &Heap, ptr: HeapPtr, index: i64) -> Result<u8> {
    with_buf(heap, ptr, |b| normalize_index(index, b.len()).map(|i| b[i]))?
        .ok_or_else(|| LatticeError::IndexError {
            message: format!("byte index {index} out of bounds"),
            loc: None,
        })
}

pub fn set_byte(heap: &mut Heap, ptr: HeapPtr, index: i64, byte: u8) -> Result<()> {
    require_fluid(ptr, "write into")?;
    let len = with_buf(heap, ptr, Vec::len)?;
    let Some(i) = normalize_index(index, len) else {
        return Err(LatticeError::IndexError {
            message: format!("byte index {index} out of bounds"),
            loc: None,
        });
    };
    with_buf_mut(heap, ptr, move |b| b[i] = byte)
}

pub fn slice(heap: &Heap, ptr: HeapPtr, start: i64, end: i64) -> Result<Vec<u8>> {
    with_buf(heap, ptr, |b| {
        let len = b.len();
        let start = normalize_index(start, len + 1).unwrap_or(len);
        let end = normalize_index(end, len + 1).unwrap_or(len);
        if start > end {
            None
        } else {
            Some(b[start..end].to_vec())
        }
    })?
    .ok_or_else(|| LatticeError::IndexError {
        message: "slice start after end".to_string(),
        loc: None,
    })
}

pub fn concat(
    heap: &mut Heap,
    a: HeapPtr,
    b: HeapPtr,
    ctx: AllocCtx,
    roots: &[FluidHandle],
) -> Result<Value> {
    let mut bytes = with_buf(heap, a, Clone::clone)?;
    bytes.extend(with_buf(heap, b, Clone::clone)?);
    let phase = match ctx {
        AllocCtx::Fluid => lattice_core::Phase::Fluid,
        AllocCtx::Crystal(_) => lattice_core::Phase::Crystal,
    };
    let ptr = heap.alloc(HeapObject::Buffer(bytes), ctx, roots);
    Ok(Value::new(phase, ValueKind::Buffer(ptr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::RuntimeFlags;

    #[test]
    fn push_and_index_roundtrip() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = heap.alloc(HeapObject::Buffer(vec![]), AllocCtx::Fluid, &[]);
        push_byte(&mut heap, ptr, 0xAB).unwrap();
        assert_eq!(get_byte(&heap, ptr, 0).unwrap(), 0xAB);
        assert_eq!(get_byte(&heap, ptr, -1).unwrap(), 0xAB);
    }

    #[test]
    fn mutating_a_crystal_buffer_fails() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let region = heap.create_region();
        let ptr = heap.alloc(HeapObject::Buffer(vec![1]), AllocCtx::Crystal(region), &[]);
        assert!(push_byte(&mut heap, ptr, 2).is_err());
    }
}
