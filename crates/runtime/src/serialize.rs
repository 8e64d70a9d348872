//! Serializable constant-pool values (spec §6.2, §4.6): the scalar subset of
//! `Value` that can appear in a bytecode chunk's constant pool. Heap-bearing
//! kinds (arrays, closures, channels, ...) are never constants — they are
//! always constructed at runtime — so only scalars need a wire format here.
//!
//! Grounded directly on `navicore-cem3::runtime::serialize`'s
//! `TypedValue`/bincode round-trip pattern, narrowed to the constant-pool
//! subset `lattice-compiler`'s `Chunk` needs.

use crate::string::LString;
use crate::value::{Value, ValueKind};
use lattice_core::{LatticeError, Phase, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Unit,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConstValue {
    /// `None` for any heap-bearing kind — those can't live in a constant pool.
    pub fn from_value(v: &Value) -> Option<ConstValue> {
        match &v.kind {
            ValueKind::Unit => Some(ConstValue::Unit),
            ValueKind::Nil => Some(ConstValue::Nil),
            ValueKind::Bool(b) => Some(ConstValue::Bool(*b)),
            ValueKind::Int(n) => Some(ConstValue::Int(*n)),
            ValueKind::Float(n) => Some(ConstValue::Float(*n)),
            ValueKind::String(s) => Some(ConstValue::String(s.as_str().to_string())),
            _ => None,
        }
    }

    /// Constants always materialize as fresh fluid values; a `fix` binding
    /// over a constant freezes it like any other expression result.
    pub fn to_value(&self) -> Value {
        match self {
            ConstValue::Unit => Value::unit(),
            ConstValue::Nil => Value::nil(),
            ConstValue::Bool(b) => Value::bool(*b),
            ConstValue::Int(n) => Value::int(*n),
            ConstValue::Float(n) => Value::float(*n),
            ConstValue::String(s) => {
                Value::new(Phase::Fluid, ValueKind::String(LString::new_fluid(s.clone())))
            }
        }
    }
}

pub fn encode(values: &[ConstValue]) -> Result<Vec<u8>> {
    bincode::serialize(values).map_err(|e| LatticeError::IoError {
        message: e.to_string(),
    })
}

pub fn decode(bytes: &[u8]) -> Result<Vec<ConstValue>> {
    bincode::deserialize(bytes).map_err(|e| LatticeError::IoError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips_every_scalar_kind() {
        let values = vec![
            ConstValue::Unit,
            ConstValue::Nil,
            ConstValue::Bool(true),
            ConstValue::Int(42),
            ConstValue::Float(1.5),
            ConstValue::String("hi".to_string()),
        ];
        let bytes = encode(&values).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(values, decoded);
    }

    #[test]
    fn heap_bearing_values_have_no_constant_form() {
        assert!(ConstValue::from_value(&Value::bool(true)).is_some());
    }
}
