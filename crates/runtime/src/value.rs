//! The `Value` type (spec §3.1): a single tagged sum shared identically by
//! the tree-walking evaluator and the bytecode VM.
//!
//! Generalizes `navicore-cem3::runtime::value::Value` (a plain tagged enum
//! of scalars + heap variants, with no phase concept, since Seq is a
//! single-heap language) to the full variant list spec §3.1 names, with an
//! explicit `Phase` carried on every value — including scalars, since a
//! `match` arm's `fluid|crystal` qualifier (spec §4.4) and a struct's
//! per-field phase flag (spec §9 Open Question) both need to read phase
//! uniformly regardless of whether the value is heap-bearing.

use crate::heap_object::HeapObject;
use crate::string::LString;
use lattice_ast::FunctionDecl;
use lattice_core::heap::crystal::RegionId;
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::Phase;
use std::cell::RefCell;
use std::rc::Rc;

/// A pointer into one of the two heaps, resolved through `Heap` (see
/// `heap.rs`). Which concrete `HeapObject` variant it addresses is carried
/// separately by the `Value` variant that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapPtr {
    Fluid(FluidHandle),
    Crystal(RegionId, u32),
}

impl HeapPtr {
    pub fn phase(self) -> Phase {
        match self {
            HeapPtr::Fluid(_) => Phase::Fluid,
            HeapPtr::Crystal(_, _) => Phase::Crystal,
        }
    }
}

/// Opaque handle for a built-in/native function (spec §3.1).
pub type BuiltinFn = dyn Fn(&mut crate::heap::Heap, &[Value]) -> lattice_core::Result<Value>;

#[derive(Clone)]
pub enum ValueKind {
    Unit,
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(LString),
    /// Ordered sequence of `Value`, heap-allocated (exposes length/capacity
    /// via the backing `Vec`).
    Array(HeapPtr),
    /// Fixed-arity sequence; arity is part of identity, not a growable length.
    Tuple(Rc<[Value]>),
    Map(HeapPtr),
    Set(HeapPtr),
    Buffer(HeapPtr),
    Struct(HeapPtr),
    Enum(HeapPtr),
    Closure(HeapPtr),
    Channel(HeapPtr),
    RefCell(HeapPtr),
    Builtin(Rc<BuiltinFn>),
    /// A region handle, itself carrying a phase bit (spec §3.1).
    Region(RegionId),
}

#[derive(Clone)]
pub struct Value {
    pub phase: Phase,
    pub kind: ValueKind,
}

impl Value {
    pub fn new(phase: Phase, kind: ValueKind) -> Self {
        Value { phase, kind }
    }

    pub fn fluid(kind: ValueKind) -> Self {
        Value::new(Phase::Fluid, kind)
    }

    pub fn crystal(kind: ValueKind) -> Self {
        Value::new(Phase::Crystal, kind)
    }

    pub fn unit() -> Self {
        Value::fluid(ValueKind::Unit)
    }

    pub fn nil() -> Self {
        Value::fluid(ValueKind::Nil)
    }

    pub fn bool(b: bool) -> Self {
        Value::fluid(ValueKind::Bool(b))
    }

    pub fn int(n: i64) -> Self {
        Value::fluid(ValueKind::Int(n))
    }

    pub fn float(n: f64) -> Self {
        Value::fluid(ValueKind::Float(n))
    }

    pub fn is_crystal(&self) -> bool {
        self.phase.is_crystal()
    }

    pub fn is_fluid(&self) -> bool {
        self.phase.is_fluid()
    }

    /// Truthiness used by `if`/`while` conditions: only `Bool(false)`,
    /// `Nil`, and `Unit` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(
            self.kind,
            ValueKind::Bool(false) | ValueKind::Nil | ValueKind::Unit
        )
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Unit => "unit",
            ValueKind::Nil => "nil",
            ValueKind::Bool(_) => "bool",
            ValueKind::Int(_) => "int",
            ValueKind::Float(_) => "float",
            ValueKind::String(_) => "string",
            ValueKind::Array(_) => "array",
            ValueKind::Tuple(_) => "tuple",
            ValueKind::Map(_) => "map",
            ValueKind::Set(_) => "set",
            ValueKind::Buffer(_) => "buffer",
            ValueKind::Struct(_) => "struct",
            ValueKind::Enum(_) => "enum",
            ValueKind::Closure(_) => "closure",
            ValueKind::Channel(_) => "channel",
            ValueKind::RefCell(_) => "ref",
            ValueKind::Builtin(_) => "builtin",
            ValueKind::Region(_) => "region",
        }
    }

    pub fn heap_ptr(&self) -> Option<HeapPtr> {
        match &self.kind {
            ValueKind::Array(h)
            | ValueKind::Map(h)
            | ValueKind::Set(h)
            | ValueKind::Buffer(h)
            | ValueKind::Struct(h)
            | ValueKind::Enum(h)
            | ValueKind::Closure(h)
            | ValueKind::Channel(h)
            | ValueKind::RefCell(h) => Some(*h),
            _ => None,
        }
    }
}

/// A struct instance: declaration + parallel field array (spec §3.1), with
/// a per-field phase flag to realize the resolved Open Question for mixed
/// `except` fields (spec §9, DESIGN.md).
#[derive(Clone)]
pub struct StructInstance {
    pub type_name: Rc<str>,
    pub field_names: Rc<[Rc<str>]>,
    pub fields: Vec<Value>,
    pub field_phases: Vec<Phase>,
}

impl StructInstance {
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.field_names
            .iter()
            .position(|n| &**n == name)
            .map(|i| &self.fields[i])
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        if let Some(i) = self.field_names.iter().position(|n| &**n == name) {
            self.fields[i] = value;
            true
        } else {
            false
        }
    }
}

/// An enum instance: enum name, variant name, optional payload array (spec §3.1).
#[derive(Clone)]
pub struct EnumInstance {
    pub enum_name: Rc<str>,
    pub variant: Rc<str>,
    pub payload: Vec<Value>,
}

/// A closure: captured environment, params/defaults, variadic flag, body
/// (spec §3.1). `decl` is `None` for closure-literal expressions (it only
/// holds a synthesized signature), `Some` for named function declarations.
#[derive(Clone)]
pub struct ClosureObj {
    pub decl: Option<Rc<FunctionDecl>>,
    pub params: Rc<[lattice_ast::Param]>,
    pub variadic: Option<Rc<str>>,
    pub body: Rc<[lattice_ast::Stmt]>,
    pub captured_env: crate::environment::Environment,
}

/// A VM closure (spec §4.6): upvalues captured as shared cells rather than
/// an AST-walking `captured_env`, plus the compiled function body. The body
/// is erased behind `Any` because the bytecode function representation
/// (`lattice-vm`'s `RtFunction`) lives in a crate downstream of this one;
/// `lattice-vm` downcasts it back on every call.
pub struct VmClosureObj {
    pub upvalues: Vec<Rc<RefCell<Value>>>,
    pub function: Rc<dyn std::any::Any>,
}

/// A bounded FIFO channel (spec §5). Cooperative suspension is realized by
/// yielding the current `may` coroutine while the queue is full/empty
/// rather than blocking the OS thread (spec §5: "mutex-free single-threaded
/// queue because all tasks run on the same OS thread").
pub struct ChannelObj {
    pub buffer: std::collections::VecDeque<Value>,
    pub capacity: usize,
    pub closed: bool,
}

impl HeapObject {
    pub fn as_struct(&self) -> Option<&StructInstance> {
        match self {
            HeapObject::Struct(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn false_nil_unit_are_falsy_everything_else_truthy() {
        assert!(!Value::bool(false).is_truthy());
        assert!(!Value::nil().is_truthy());
        assert!(!Value::unit().is_truthy());
        assert!(Value::bool(true).is_truthy());
        assert!(Value::int(0).is_truthy());
    }
}
