//! Value operations (spec §4.2): construction, deep-clone, freeze, thaw,
//! anneal, equality, display/repr.
//!
//! Freeze's contract check and anneal's mutator both need to *call* a
//! Lattice closure, which is the evaluator's/VM's job, not this crate's
//! (`lattice-runtime` sits below both in the dependency order). Rather than
//! reach upward with a trait object, these functions accept the call as an
//! ordinary Rust closure supplied by the caller — the evaluator passes
//! `|heap, args| self.call_closure(...)`, the VM passes its own dispatcher.
//! This keeps the dependency arrow pointing one way while still letting
//! `lattice-runtime` own the freeze/thaw/anneal control flow itself.

use crate::heap::Heap;
use crate::heap_object::HeapObject;
use crate::string::LString;
use crate::value::{ChannelObj, ClosureObj, EnumInstance, StructInstance, Value, ValueKind};
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{LatticeError, Phase, Result};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Instant;

/// A recursive traversal that produces a structurally equal value whose
/// heap data is independently owned (spec §4.2). Closures clone by sharing
/// the captured environment (refcount increment); ref cells clone by
/// copying the inner value.
pub fn deep_clone(heap: &mut Heap, v: &Value, ctx: AllocCtx, roots: &[FluidHandle]) -> Value {
    heap.stats.record_deep_clone();
    let phase = ctx_phase(ctx);
    let kind = match &v.kind {
        ValueKind::Unit => ValueKind::Unit,
        ValueKind::Nil => ValueKind::Nil,
        ValueKind::Bool(b) => ValueKind::Bool(*b),
        ValueKind::Int(n) => ValueKind::Int(*n),
        ValueKind::Float(n) => ValueKind::Float(*n),
        ValueKind::String(s) => ValueKind::String(match ctx {
            AllocCtx::Fluid => s.to_fluid(),
            AllocCtx::Crystal(region) => s.to_crystal(region),
        }),
        ValueKind::Tuple(items) => {
            let cloned: Vec<Value> = items
                .iter()
                .map(|item| deep_clone(heap, item, ctx, roots))
                .collect();
            ValueKind::Tuple(Rc::from(cloned))
        }
        ValueKind::Array(ptr) => {
            let items: Vec<Value> = match heap.get(*ptr) {
                Some(HeapObject::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            let cloned: Vec<Value> = items
                .iter()
                .map(|item| deep_clone(heap, item, ctx, roots))
                .collect();
            ValueKind::Array(heap.alloc(HeapObject::Array(cloned), ctx, roots))
        }
        ValueKind::Map(ptr) => {
            let entries: Vec<(String, Value)> = match heap.get(*ptr) {
                Some(HeapObject::Map(m)) => m.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                _ => Vec::new(),
            };
            let mut cloned = lattice_core::containers::OpenMap::new();
            for (k, val) in entries {
                cloned.set(&k, deep_clone(heap, &val, ctx, roots));
            }
            ValueKind::Map(heap.alloc(HeapObject::Map(cloned), ctx, roots))
        }
        ValueKind::Set(ptr) => {
            let entries: Vec<(String, Value)> = match heap.get(*ptr) {
                Some(HeapObject::Set(m)) => m.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                _ => Vec::new(),
            };
            let mut cloned = lattice_core::containers::OpenMap::new();
            for (k, val) in entries {
                cloned.set(&k, deep_clone(heap, &val, ctx, roots));
            }
            ValueKind::Set(heap.alloc(HeapObject::Set(cloned), ctx, roots))
        }
        ValueKind::Buffer(ptr) => {
            let bytes: Vec<u8> = match heap.get(*ptr) {
                Some(HeapObject::Buffer(b)) => b.clone(),
                _ => Vec::new(),
            };
            ValueKind::Buffer(heap.alloc(HeapObject::Buffer(bytes), ctx, roots))
        }
        ValueKind::Struct(ptr) => {
            let s: StructInstance = match heap.get(*ptr) {
                Some(HeapObject::Struct(s)) => s.clone(),
                _ => panic!("dangling struct handle"),
            };
            let cloned_fields: Vec<Value> = s
                .fields
                .iter()
                .zip(s.field_phases.iter())
                .map(|(field, field_phase)| {
                    // except fields: keep fluid regardless of the outer ctx (spec §9).
                    if matches!(field_phase, Phase::Fluid) && ctx.is_crystal() {
                        deep_clone(heap, field, AllocCtx::Fluid, roots)
                    } else {
                        deep_clone(heap, field, ctx, roots)
                    }
                })
                .collect();
            let new_struct = StructInstance {
                type_name: s.type_name.clone(),
                field_names: s.field_names.clone(),
                fields: cloned_fields,
                field_phases: s.field_phases.clone(),
            };
            ValueKind::Struct(heap.alloc(HeapObject::Struct(new_struct), ctx, roots))
        }
        ValueKind::Enum(ptr) => {
            let e: EnumInstance = match heap.get(*ptr) {
                Some(HeapObject::Enum(e)) => e.clone(),
                _ => panic!("dangling enum handle"),
            };
            let cloned_payload: Vec<Value> = e
                .payload
                .iter()
                .map(|p| deep_clone(heap, p, ctx, roots))
                .collect();
            ValueKind::Enum(heap.alloc(
                HeapObject::Enum(EnumInstance {
                    enum_name: e.enum_name,
                    variant: e.variant,
                    payload: cloned_payload,
                }),
                ctx,
                roots,
            ))
        }
        // Closures clone by sharing the captured environment (spec §4.2).
        ValueKind::Closure(ptr) => {
            let c: ClosureObj = match heap.get(*ptr) {
                Some(HeapObject::Closure(c)) => c.clone(),
                _ => panic!("dangling closure handle"),
            };
            ValueKind::Closure(heap.alloc(HeapObject::Closure(c), ctx, roots))
        }
        ValueKind::Channel(ptr) => ValueKind::Channel(*ptr),
        // Ref cells clone by copying the inner value (spec §4.2).
        ValueKind::RefCell(ptr) => {
            let inner = match heap.get(*ptr) {
                Some(HeapObject::RefCell(v)) => v.clone(),
                _ => Value::nil(),
            };
            let cloned_inner = deep_clone(heap, &inner, ctx, roots);
            ValueKind::RefCell(heap.alloc(HeapObject::RefCell(cloned_inner), ctx, roots))
        }
        ValueKind::Builtin(b) => ValueKind::Builtin(b.clone()),
        ValueKind::Region(r) => ValueKind::Region(*r),
    };
    Value::new(phase, kind)
}

fn ctx_phase(ctx: AllocCtx) -> Phase {
    match ctx {
        AllocCtx::Fluid => Phase::Fluid,
        AllocCtx::Crystal(_) => Phase::Crystal,
    }
}

/// Freeze (fluid -> crystal), spec §4.2. `except` names struct fields that
/// remain fluid inside the otherwise-crystal outer value. `contract`, if
/// given, is invoked against the *frozen* result; on failure the region is
/// torn down and the error surfaces (the caller is expected to have
/// supplied a closure that performs exactly that call-and-check).
pub fn freeze(
    heap: &mut Heap,
    value: &Value,
    roots: &[FluidHandle],
    except: &[String],
    contract: Option<impl FnOnce(&mut Heap, &Value) -> Result<bool>>,
) -> Result<Value> {
    let start = Instant::now();
    let region = heap.create_region();
    let ctx = AllocCtx::Crystal(region);
    let mut frozen = deep_clone(heap, value, ctx, roots);
    if !except.is_empty() {
        apply_except_fields(heap, &mut frozen, except);
    }
    if let Some(check) = contract {
        match check(heap, &frozen) {
            Ok(true) => {}
            Ok(false) => {
                heap.teardown_region(region);
                return Err(LatticeError::ContractViolation {
                    function: "freeze".to_string(),
                    message: "freeze contract failed".to_string(),
                    loc: None,
                });
            }
            Err(e) => {
                heap.teardown_region(region);
                return Err(e);
            }
        }
    }
    heap.stats.record_freeze(start.elapsed());
    Ok(frozen)
}

fn apply_except_fields(heap: &mut Heap, frozen: &mut Value, except: &[String]) {
    if let ValueKind::Struct(ptr) = &frozen.kind {
        if let Some(HeapObject::Struct(s)) = heap.get_mut(*ptr) {
            for name in except {
                if let Some(i) = s.field_names.iter().position(|n| &**n == name.as_str()) {
                    s.field_phases[i] = Phase::Fluid;
                }
            }
        }
    }
}

/// Thaw (crystal -> fluid), spec §4.2: deep-clone back into the fluid heap
/// with routing disabled. The original crystal value is unchanged.
pub fn thaw(heap: &mut Heap, value: &Value, roots: &[FluidHandle]) -> Value {
    let start = Instant::now();
    let result = deep_clone(heap, value, AllocCtx::Fluid, roots);
    heap.stats.record_thaw(start.elapsed());
    result
}

/// Clone: an ordinary deep copy in the same phase (spec §4.2's "Clone" operator).
pub fn clone_value(heap: &mut Heap, value: &Value, roots: &[FluidHandle]) -> Value {
    let ctx = match value.phase {
        Phase::Fluid => AllocCtx::Fluid,
        Phase::Crystal => {
            // Clone within the same region the value already lives in, if resolvable.
            match value.heap_ptr() {
                Some(crate::value::HeapPtr::Crystal(region, _)) => AllocCtx::Crystal(region),
                _ => AllocCtx::Fluid,
            }
        }
    };
    deep_clone(heap, value, ctx, roots)
}

/// Anneal (spec §4.2, §9): thaw into a scratch fluid value, run `mutate`,
/// then re-freeze the result under the same contract captured at the
/// original freeze (resolved Open Question: captured at freeze time, not
/// re-resolved at anneal time — see DESIGN.md).
pub fn anneal(
    heap: &mut Heap,
    value: &Value,
    roots: &[FluidHandle],
    mutate: impl FnOnce(&mut Heap, Value) -> Result<Value>,
    contract: Option<impl FnOnce(&mut Heap, &Value) -> Result<bool>>,
) -> Result<Value> {
    let scratch = thaw(heap, value, roots);
    mutate(heap, scratch.clone())?;
    freeze(heap, &scratch, roots, &[], contract)
}

/// Structural equality (spec §4.2): cycles in fluid structures are guarded
/// with a visited-pair set.
pub fn deep_eq(heap: &Heap, a: &Value, b: &Value) -> bool {
    let mut visited = HashSet::new();
    deep_eq_inner(heap, a, b, &mut visited)
}

fn deep_eq_inner(
    heap: &Heap,
    a: &Value,
    b: &Value,
    visited: &mut HashSet<(crate::value::HeapPtr, crate::value::HeapPtr)>,
) -> bool {
    match (&a.kind, &b.kind) {
        (ValueKind::Unit, ValueKind::Unit) => true,
        (ValueKind::Nil, ValueKind::Nil) => true,
        (ValueKind::Bool(x), ValueKind::Bool(y)) => x == y,
        (ValueKind::Int(x), ValueKind::Int(y)) => x == y,
        (ValueKind::Float(x), ValueKind::Float(y)) => x == y,
        (ValueKind::Int(x), ValueKind::Float(y)) | (ValueKind::Float(y), ValueKind::Int(x)) => {
            *x as f64 == *y
        }
        (ValueKind::String(x), ValueKind::String(y)) => x == y,
        (ValueKind::Tuple(x), ValueKind::Tuple(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(a, b)| deep_eq_inner(heap, a, b, visited))
        }
        (ValueKind::Array(pa), ValueKind::Array(pb)) => {
            if pa == pb {
                return true;
            }
            if !visited.insert((*pa, *pb)) {
                return true; // cycle guard: already comparing this pair
            }
            match (heap.get(*pa), heap.get(*pb)) {
                (Some(HeapObject::Array(xs)), Some(HeapObject::Array(ys))) => {
                    xs.len() == ys.len()
                        && xs
                            .iter()
                            .zip(ys.iter())
                            .all(|(a, b)| deep_eq_inner(heap, a, b, visited))
                }
                _ => false,
            }
        }
        (ValueKind::Map(pa), ValueKind::Map(pb)) => {
            if pa == pb {
                return true;
            }
            if !visited.insert((*pa, *pb)) {
                return true;
            }
            match (heap.get(*pa), heap.get(*pb)) {
                (Some(HeapObject::Map(xs)), Some(HeapObject::Map(ys))) => {
                    xs.len() == ys.len()
                        && xs.iter().all(|(k, v)| {
                            ys.get(k)
                                .map(|v2| deep_eq_inner(heap, v, v2, visited))
                                .unwrap_or(false)
                        })
                }
                _ => false,
            }
        }
        (ValueKind::Set(pa), ValueKind::Set(pb)) => {
            pa == pb
                || match (heap.get(*pa), heap.get(*pb)) {
                    (Some(HeapObject::Set(xs)), Some(HeapObject::Set(ys))) => {
                        xs.len() == ys.len() && xs.keys().all(|k| ys.contains_key(k))
                    }
                    _ => false,
                }
        }
        (ValueKind::Buffer(pa), ValueKind::Buffer(pb)) => {
            pa == pb
                || match (heap.get(*pa), heap.get(*pb)) {
                    (Some(HeapObject::Buffer(x)), Some(HeapObject::Buffer(y))) => x == y,
                    _ => false,
                }
        }
        (ValueKind::Struct(pa), ValueKind::Struct(pb)) => {
            if pa == pb {
                return true;
            }
            if !visited.insert((*pa, *pb)) {
                return true;
            }
            match (heap.get(*pa), heap.get(*pb)) {
                (Some(HeapObject::Struct(x)), Some(HeapObject::Struct(y))) => {
                    x.type_name == y.type_name
                        && x.fields.len() == y.fields.len()
                        && x.fields
                            .iter()
                            .zip(y.fields.iter())
                            .all(|(a, b)| deep_eq_inner(heap, a, b, visited))
                }
                _ => false,
            }
        }
        (ValueKind::Enum(pa), ValueKind::Enum(pb)) => {
            pa == pb
                || match (heap.get(*pa), heap.get(*pb)) {
                    (Some(HeapObject::Enum(x)), Some(HeapObject::Enum(y))) => {
                        x.enum_name == y.enum_name
                            && x.variant == y.variant
                            && x.payload.len() == y.payload.len()
                            && x.payload
                                .iter()
                                .zip(y.payload.iter())
                                .all(|(a, b)| deep_eq_inner(heap, a, b, visited))
                    }
                    _ => false,
                }
        }
        (ValueKind::Closure(pa), ValueKind::Closure(pb)) => pa == pb,
        (ValueKind::Channel(pa), ValueKind::Channel(pb)) => pa == pb,
        (ValueKind::RefCell(pa), ValueKind::RefCell(pb)) => pa == pb,
        (ValueKind::Region(ra), ValueKind::Region(rb)) => ra == rb,
        _ => false,
    }
}

/// Canonical human-readable display (spec §4.2).
pub fn display(heap: &Heap, v: &Value) -> String {
    match &v.kind {
        ValueKind::Unit => "()".to_string(),
        ValueKind::Nil => "nil".to_string(),
        ValueKind::Bool(b) => b.to_string(),
        ValueKind::Int(n) => n.to_string(),
        ValueKind::Float(n) => format!("{n}"),
        ValueKind::String(s) => s.to_string(),
        ValueKind::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(|i| display(heap, i)).collect();
            format!("({})", parts.join(", "))
        }
        ValueKind::Array(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Array(items)) => {
                let parts: Vec<String> = items.iter().map(|i| display(heap, i)).collect();
                format!("[{}]", parts.join(", "))
            }
            _ => "[]".to_string(),
        },
        ValueKind::Map(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Map(m)) => {
                let parts: Vec<String> =
                    m.iter().map(|(k, v)| format!("{k}: {}", display(heap, v))).collect();
                format!("{{{}}}", parts.join(", "))
            }
            _ => "{}".to_string(),
        },
        ValueKind::Set(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Set(m)) => {
                let parts: Vec<String> = m.iter().map(|(_, v)| display(heap, v)).collect();
                format!("#{{{}}}", parts.join(", "))
            }
            _ => "#{}".to_string(),
        },
        ValueKind::Buffer(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Buffer(b)) => format!("Buffer({} bytes)", b.len()),
            _ => "Buffer()".to_string(),
        },
        ValueKind::Struct(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Struct(s)) => {
                let parts: Vec<String> = s
                    .field_names
                    .iter()
                    .zip(s.fields.iter())
                    .map(|(n, v)| format!("{n}: {}", display(heap, v)))
                    .collect();
                format!("{} {{ {} }}", s.type_name, parts.join(", "))
            }
            _ => "<struct>".to_string(),
        },
        ValueKind::Enum(ptr) => match heap.get(*ptr) {
            Some(HeapObject::Enum(e)) => {
                if e.payload.is_empty() {
                    format!("{}::{}", e.enum_name, e.variant)
                } else {
                    let parts: Vec<String> = e.payload.iter().map(|p| display(heap, p)).collect();
                    format!("{}::{}({})", e.enum_name, e.variant, parts.join(", "))
                }
            }
            _ => "<enum>".to_string(),
        },
        ValueKind::Closure(_) => "<closure>".to_string(),
        ValueKind::Channel(_) => "<channel>".to_string(),
        ValueKind::RefCell(ptr) => match heap.get(*ptr) {
            Some(HeapObject::RefCell(inner)) => format!("ref({})", display(heap, inner)),
            _ => "<ref>".to_string(),
        },
        ValueKind::Builtin(_) => "<builtin>".to_string(),
        ValueKind::Region(r) => format!("<region #{}>", r.0),
    }
}

/// `repr` additionally invokes a user-defined `repr` field on structs if
/// present (spec §4.2). `call_user_repr` is given the struct value and
/// returns `Some(text)` when the type defines a `repr` method.
pub fn repr(
    heap: &Heap,
    v: &Value,
    call_user_repr: impl FnOnce(&Heap, &Value) -> Option<String>,
) -> String {
    if matches!(v.kind, ValueKind::Struct(_)) {
        if let Some(text) = call_user_repr(heap, v) {
            return text;
        }
    }
    display(heap, v)
}

/// Builds a channel value with the given bounded capacity (spec §5).
pub fn new_channel(heap: &mut Heap, capacity: usize, ctx: AllocCtx, roots: &[FluidHandle]) -> Value {
    let ptr = heap.alloc(
        HeapObject::Channel(ChannelObj {
            buffer: std::collections::VecDeque::with_capacity(capacity),
            capacity,
            closed: false,
        }),
        ctx,
        roots,
    );
    Value::new(ctx_phase(ctx), ValueKind::Channel(ptr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::RuntimeFlags;

    fn array_value(heap: &mut Heap, items: Vec<Value>) -> Value {
        let ptr = heap.alloc(HeapObject::Array(items), AllocCtx::Fluid, &[]);
        Value::fluid(ValueKind::Array(ptr))
    }

    #[test]
    fn display_of_deep_clone_equals_display_of_original() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let v = array_value(&mut heap, vec![Value::int(1), Value::int(2)]);
        let cloned = deep_clone(&mut heap, &v, AllocCtx::Fluid, &[]);
        assert_eq!(display(&heap, &v), display(&heap, &cloned));
    }

    #[test]
    fn thaw_of_freeze_equals_original_and_is_fluid() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let v = array_value(&mut heap, vec![Value::int(1), Value::int(2), Value::int(3)]);
        let frozen = freeze(&mut heap, &v, &[], &[], None::<fn(&mut Heap, &Value) -> Result<bool>>).unwrap();
        assert!(frozen.is_crystal());
        let thawed = thaw(&mut heap, &frozen, &[]);
        assert!(thawed.is_fluid());
        assert_eq!(display(&heap, &v), display(&heap, &thawed));
    }

    #[test]
    fn deep_clone_produces_independently_owned_heap_data() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let v = array_value(&mut heap, vec![Value::int(1)]);
        let cloned = deep_clone(&mut heap, &v, AllocCtx::Fluid, &[]);
        assert_ne!(v.heap_ptr(), cloned.heap_ptr());
        assert!(deep_eq(&heap, &v, &cloned));
    }

    #[test]
    fn freeze_then_mutating_source_does_not_affect_frozen_copy() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let v = array_value(&mut heap, vec![Value::int(1), Value::int(2), Value::int(3)]);
        let frozen = freeze(&mut heap, &v, &[], &[], None::<fn(&mut Heap, &Value) -> Result<bool>>).unwrap();
        if let Some(HeapObject::Array(items)) = heap.get_mut(v.heap_ptr().unwrap()) {
            items.push(Value::int(4));
        }
        assert_eq!(display(&heap, &frozen), "[1, 2, 3]");
    }
}
