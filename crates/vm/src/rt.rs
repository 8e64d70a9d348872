//! Linking a compiled `Chunk` into the run-ready shape `Vm` executes
//! directly: nested `FunctionProto`s resolved to `Rc<RtFunction>` up front
//! so `MakeClosure` never has to walk a `Chunk` at call time, and the
//! top-level declarations (`StructProto`/`EnumProto`/`ImplProto`/
//! `TestProto`) collected into lookup tables the way
//! `lattice-evaluator::register_item` populates its own registries before
//! running a single statement.

use std::collections::HashMap;
use std::rc::Rc;

use lattice_compiler::{Chunk, EnumProto, FunctionProto, ImplProto, OpCode, StructProto, TestProto};
use lattice_runtime::serialize::ConstValue;

/// A linked function body: constants and nested closures resolved, ready to
/// run. Mirrors `FunctionProto` field-for-field except `functions` is
/// already `Rc`-wrapped.
pub struct RtChunk {
    pub code: Vec<OpCode>,
    pub constants: Vec<ConstValue>,
    pub functions: Vec<Rc<RtFunction>>,
}

pub struct RtFunction {
    pub name: String,
    pub arity: u32,
    pub variadic: bool,
    pub slot_count: u32,
    pub upvalue_count: u32,
    pub chunk: RtChunk,
}

/// A `struct` declaration's field order, used by `MakeStruct` to validate
/// and reorder a literal's (possibly out-of-order) name/value pairs.
pub struct StructDef {
    pub fields: Vec<String>,
}

/// An `enum` declaration's variants in source order, so `MakeEnum`'s
/// enum-less form can resolve the first variant of that name the way
/// `lattice-evaluator::eval_enum_init` scans its registry in declaration
/// order and keeps the first match.
pub struct EnumDef {
    pub name: String,
    /// `(variant_name, payload_arity)`, in declaration order.
    pub variants: Vec<(String, u32)>,
}

/// A whole linked program: the implicit top-level frame plus every
/// declaration table `Vm` needs before running a single instruction.
pub struct Program {
    pub top_level: Rc<RtFunction>,
    pub structs: HashMap<String, StructDef>,
    pub enums: Vec<EnumDef>,
    /// `type_name -> method_name -> method`.
    pub methods: HashMap<String, HashMap<String, Rc<RtFunction>>>,
    pub tests: Vec<(String, Rc<RtFunction>)>,
}

pub fn load(chunk: Chunk) -> Program {
    let functions: Vec<Rc<RtFunction>> = chunk.functions.into_iter().map(link_function).collect();

    let structs = chunk
        .structs
        .into_iter()
        .map(|StructProto { name, fields }| (name, StructDef { fields }))
        .collect();

    let enums = chunk
        .enums
        .into_iter()
        .map(|EnumProto { name, variants }| EnumDef { name, variants })
        .collect();

    let methods = chunk
        .impls
        .into_iter()
        .map(|ImplProto { type_name, methods }| {
            let table = methods
                .into_iter()
                .map(|proto| (proto.name.clone(), Rc::new(link_function(proto))))
                .collect();
            (type_name, table)
        })
        .collect();

    let tests = chunk
        .tests
        .into_iter()
        .map(|TestProto { name, function }| (name, functions[function as usize].clone()))
        .collect();

    let top_level = Rc::new(RtFunction {
        name: "<top-level>".to_string(),
        arity: 0,
        variadic: false,
        slot_count: chunk.top_level_slots,
        upvalue_count: 0,
        chunk: RtChunk { code: chunk.code, constants: chunk.constants, functions },
    });

    Program { top_level, structs, enums, methods, tests }
}

fn link_function(proto: FunctionProto) -> RtFunction {
    let functions = proto.chunk.functions.into_iter().map(|p| Rc::new(link_function(p))).collect();
    RtFunction {
        name: proto.name,
        arity: proto.arity,
        variadic: proto.variadic,
        slot_count: proto.slot_count,
        upvalue_count: proto.upvalue_count,
        chunk: RtChunk { code: proto.chunk.code, constants: proto.chunk.constants, functions },
    }
}
