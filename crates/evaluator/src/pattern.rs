//! Pattern binding (spec §4.4): destructuring `let`/`flux`/`fix`/`for`
//! bindings (`Pattern`) and `match` arm testing (`MatchPattern`).

use lattice_ast::{Literal, MatchPattern, Pattern};
use lattice_core::heap::routing::AllocCtx;
use lattice_core::{LatticeError, Result};
use lattice_runtime::heap_object::HeapObject;
use lattice_runtime::{Environment, Heap, Value, ValueKind};

/// Binds `pattern` against `value` into `env`'s topmost scope. Array
/// destructuring supports an optional `...rest` tail (spec §4.4).
pub fn bind_pattern(env: &Environment, heap: &mut Heap, pattern: &Pattern, value: &Value) -> Result<()> {
    match pattern {
        Pattern::Wildcard => Ok(()),
        Pattern::Binding(name) => {
            env.define(name, value.clone());
            Ok(())
        }
        Pattern::Array { elements, rest } => {
            let ValueKind::Array(ptr) = &value.kind else {
                return Err(LatticeError::type_error("cannot destructure a non-array as an array pattern"));
            };
            let items = match heap.get(*ptr) {
                Some(HeapObject::Array(items)) => items.clone(),
                _ => return Err(LatticeError::type_error("dangling array handle")),
            };
            if items.len() < elements.len() {
                return Err(LatticeError::arity_error(format!(
                    "array pattern expects at least {} elements, got {}",
                    elements.len(),
                    items.len()
                )));
            }
            for (sub_pattern, item) in elements.iter().zip(items.iter()) {
                bind_pattern(env, heap, sub_pattern, item)?;
            }
            if let Some(rest_name) = rest {
                let tail: Vec<Value> = items[elements.len()..].to_vec();
                let ctx = if value.is_crystal() {
                    AllocCtx::Crystal(match value.heap_ptr() {
                        Some(lattice_runtime::HeapPtr::Crystal(region, _)) => region,
                        _ => unreachable!("crystal value must have a crystal heap pointer"),
                    })
                } else {
                    AllocCtx::Fluid
                };
                let tail_ptr = heap.alloc(HeapObject::Array(tail), ctx, &[]);
                env.define(rest_name, Value::new(value.phase, ValueKind::Array(tail_ptr)));
            }
            Ok(())
        }
        Pattern::Struct { type_name, fields, rest: _ } => {
            let ValueKind::Struct(ptr) = &value.kind else {
                return Err(LatticeError::type_error("cannot destructure a non-struct as a struct pattern"));
            };
            let instance = match heap.get(*ptr) {
                Some(HeapObject::Struct(s)) => s.clone(),
                _ => return Err(LatticeError::type_error("dangling struct handle")),
            };
            if let Some(expected) = type_name {
                if &*instance.type_name != expected {
                    return Err(LatticeError::type_error(format!(
                        "expected struct `{expected}`, found `{}`",
                        instance.type_name
                    )));
                }
            }
            for (field_name, sub_pattern) in fields {
                let field_value = instance.get_field(field_name).ok_or_else(|| {
                    LatticeError::KeyError {
                        message: format!("struct `{}` has no field `{field_name}`", instance.type_name),
                        loc: None,
                    }
                })?;
                bind_pattern(env, heap, sub_pattern, field_value)?;
            }
            Ok(())
        }
    }
}

/// Tests `scrutinee` against `pattern`, returning the bindings a successful
/// match introduces, or `None` if it doesn't match. First-match-wins `match`
/// arms (spec §4.4) try each arm's pattern in order.
pub fn match_pattern(heap: &Heap, pattern: &MatchPattern, scrutinee: &Value) -> Option<Vec<(String, Value)>> {
    match pattern {
        MatchPattern::Wildcard => Some(Vec::new()),
        MatchPattern::Binding(name) => Some(vec![(name.clone(), scrutinee.clone())]),
        MatchPattern::Literal(lit) => literal_matches(lit, scrutinee).then(Vec::new),
        MatchPattern::Range { lo, hi } => {
            let (Literal::Int(lo), Literal::Int(hi)) = (lo, hi) else {
                return None;
            };
            match &scrutinee.kind {
                ValueKind::Int(n) => (*lo..*hi).contains(n).then(Vec::new),
                _ => None,
            }
        }
        MatchPattern::TupleVariant {
            enum_name,
            variant,
            bindings,
        } => {
            let ValueKind::Enum(ptr) = &scrutinee.kind else {
                return None;
            };
            let instance = match heap.get(*ptr) {
                Some(HeapObject::Enum(e)) => e,
                _ => return None,
            };
            if &*instance.variant != variant.as_str() {
                return None;
            }
            if let Some(expected) = enum_name {
                if &*instance.enum_name != expected.as_str() {
                    return None;
                }
            }
            if instance.payload.len() != bindings.len() {
                return None;
            }
            Some(
                bindings
                    .iter()
                    .cloned()
                    .zip(instance.payload.iter().cloned())
                    .collect(),
            )
        }
    }
}

fn literal_matches(lit: &Literal, value: &Value) -> bool {
    match (lit, &value.kind) {
        (Literal::Nil, ValueKind::Nil) => true,
        (Literal::Unit, ValueKind::Unit) => true,
        (Literal::Bool(a), ValueKind::Bool(b)) => a == b,
        (Literal::Int(a), ValueKind::Int(b)) => a == b,
        (Literal::Float(a), ValueKind::Float(b)) => a == b,
        (Literal::String(a), ValueKind::String(b)) => a.as_str() == b.as_str(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::RuntimeFlags;

    #[test]
    fn wildcard_binds_nothing() {
        let heap = Heap::new(RuntimeFlags::default());
        let bound = match_pattern(&heap, &MatchPattern::Wildcard, &Value::int(5));
        assert_eq!(bound.unwrap().len(), 0);
    }

    #[test]
    fn range_pattern_is_inclusive_exclusive() {
        let heap = Heap::new(RuntimeFlags::default());
        let pattern = MatchPattern::Range {
            lo: Literal::Int(1),
            hi: Literal::Int(10),
        };
        assert!(match_pattern(&heap, &pattern, &Value::int(5)).is_some());
        assert!(match_pattern(&heap, &pattern, &Value::int(10)).is_none());
        assert!(match_pattern(&heap, &pattern, &Value::int(1)).is_some());
    }

    #[test]
    fn binding_pattern_defines_into_env() {
        let mut heap = Heap::new(RuntimeFlags::default());
        let env = Environment::new();
        bind_pattern(&env, &mut heap, &Pattern::Binding("x".to_string()), &Value::int(42)).unwrap();
        assert!(matches!(env.get("x").unwrap().kind, ValueKind::Int(42)));
    }
}
