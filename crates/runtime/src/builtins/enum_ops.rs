//! `Enum` instance accessors (spec §3.1): variant tag, payload, and the
//! tuple-variant match support `match` expressions rely on (spec §4.4).

use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::value::{HeapPtr, Value};
use lattice_core::{LatticeError, Result};

pub fn variant_name(heap: &Heap, ptr: HeapPtr) -> Result<String> {
    match heap.get(ptr) {
        Some(HeapObject::Enum(e)) => Ok(e.variant.to_string()),
        _ => Err(LatticeError::type_error("not an enum instance")),
    }
}

pub fn enum_name(heap: &Heap, ptr: HeapPtr) -> Result<String> {
    match heap.get(ptr) {
        Some(HeapObject::Enum(e)) => Ok(e.enum_name.to_string()),
        _ => Err(LatticeError::type_error("not an enum instance")),
    }
}

pub fn payload(heap: &Heap, ptr: HeapPtr) -> Result<Vec<Value>> {
    match heap.get(ptr) {
        Some(HeapObject::Enum(e)) => Ok(e.payload.clone()),
        _ => Err(LatticeError::type_error("not an enum instance")),
    }
}

/// True when `ptr` is an instance of `enum_name::variant` — the check a
/// `MatchPattern::TupleVariant` arm performs before binding the payload.
pub fn is_variant(heap: &Heap, ptr: HeapPtr, enum_name: &str, variant: &str) -> Result<bool> {
    match heap.get(ptr) {
        Some(HeapObject::Enum(e)) => Ok(&*e.enum_name == enum_name && &*e.variant == variant),
        _ => Err(LatticeError::type_error("not an enum instance")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EnumInstance;
    use lattice_core::heap::routing::AllocCtx;
    use lattice_core::RuntimeFlags;
    use std::rc::Rc;

    fn make(heap: &mut Heap, variant: &str, payload: Vec<Value>) -> HeapPtr {
        heap.alloc(
            HeapObject::Enum(EnumInstance {
                enum_name: Rc::from("Option"),
                variant: Rc::from(variant),
                payload,
            }),
            AllocCtx::Fluid,
            &[],
        )
    }

    #[test]
    fn is_variant_matches_name_and_variant() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let ptr = make(&mut heap, "Some", vec![Value::int(1)]);
        assert!(is_variant(&heap, ptr, "Option", "Some").unwrap());
        assert!(!is_variant(&heap, ptr, "Option", "None").unwrap());
        assert_eq!(payload(&heap, ptr).unwrap().len(), 1);
    }
}
