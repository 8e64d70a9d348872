//! `Chunk` (spec §4.6): a linear instruction stream plus the constant pool,
//! source-line table, and nested function descriptors it references.
//!
//! Shape grounded on the teacher's `compiler::codegen::program` module,
//! which likewise assembles one top-level artifact (there, an object file;
//! here, a `Chunk`) out of per-function pieces compiled independently.

use lattice_runtime::serialize::ConstValue;
use serde::{Deserialize, Serialize};

use crate::opcode::OpCode;

/// A compiled function body: its own instruction stream sharing the parent
/// chunk's constant pool index space isn't attempted here — each
/// `FunctionProto` carries its own small constant pool instead, the way the
/// teacher's codegen keeps each function's generated IR self-contained
/// rather than threading a single global table through nested closures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionProto {
    pub name: String,
    pub arity: u32,
    pub variadic: bool,
    /// Number of local slots this function's frame needs (params + locals,
    /// counting the peak number simultaneously in scope — sibling scopes
    /// reuse slot numbers, so this can be less than the total number of
    /// `let`s in the source). `lattice-vm` reserves exactly this many
    /// `Nil`-filled stack cells when the frame is set up, *before* running
    /// any bytecode, and they stay at fixed positions for the frame's whole
    /// lifetime — `GetLocal`/`SetLocal` index into this fixed region
    /// directly, while ordinary expression evaluation pushes and pops
    /// temporaries above it. A local going out of scope therefore needs no
    /// opcode at all; only its slot *number* becomes available for reuse.
    pub slot_count: u32,
    /// One entry per upvalue the closure captures, in capture order —
    /// mirrors the `CaptureLocal`/`CaptureUpvalue` instructions emitted
    /// immediately before the `MakeClosure` that builds it.
    pub upvalue_count: u32,
    pub chunk: Chunk,
}

/// instruction index -> source line, sparse (only recorded where the line
/// actually changes, like the teacher's own line-table encoding in
/// `compiler::codegen::state`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineTable {
    entries: Vec<(u32, u32)>,
}

impl LineTable {
    pub fn push(&mut self, instruction_index: u32, line: u32) {
        if self.entries.last().map(|(_, l)| *l) != Some(line) {
            self.entries.push((instruction_index, line));
        }
    }

    pub fn line_for(&self, instruction_index: u32) -> Option<u32> {
        self.entries
            .iter()
            .rev()
            .find(|(idx, _)| *idx <= instruction_index)
            .map(|(_, line)| *line)
    }
}

/// A `struct` declaration (spec §3.4): field order only, no methods — those
/// live in `ImplProto`. Registered by the VM before running the chunk's
/// top-level code, the way `lattice-evaluator::register_item` populates its
/// `structs` registry before evaluating any statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructProto {
    pub name: String,
    pub fields: Vec<String>,
}

/// An `enum` declaration: each variant's name and payload arity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumProto {
    pub name: String,
    pub variants: Vec<(String, u32)>,
}

/// An `impl` block: the methods it supplies for `type_name`, dispatched by
/// `lattice-vm`'s method-call opcode the same way
/// `lattice-evaluator::call_struct_method` looks methods up by type name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplProto {
    pub type_name: String,
    pub methods: Vec<FunctionProto>,
}

/// A `test` block (spec §3.4): `lattice-cli`'s test-run mode invokes
/// `function` directly by index, the same way
/// `lattice-evaluator::register_item`'s `Item::Test` arm stores the body
/// without running it at load time. Compiled with no parameters and, unlike
/// an ordinary closure, no upvalues — a test referencing a top-level `let`
/// (as opposed to a top-level `fn`) isn't supported, since there's no
/// closure-construction site to supply captures for a directly-invoked test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestProto {
    pub name: String,
    pub function: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub code: Vec<OpCode>,
    pub constants: Vec<ConstValue>,
    pub lines: LineTable,
    /// Nested function descriptors `MakeClosure(FnIdx)` indexes into.
    pub functions: Vec<FunctionProto>,
    /// Top-level declarations (only populated on the outermost chunk a
    /// `Program` compiles to; nested function chunks leave these empty).
    pub structs: Vec<StructProto>,
    pub enums: Vec<EnumProto>,
    pub impls: Vec<ImplProto>,
    pub tests: Vec<TestProto>,
    /// Slot count for the implicit top-level frame (spec §4.6's top-level
    /// `let`/`flux`/`fix` bindings compile as locals of this frame — see
    /// `compiler.rs`). Always `0` on a nested `FunctionProto`'s own chunk,
    /// which carries its slot count on the `FunctionProto` itself instead.
    pub top_level_slots: u32,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    pub fn emit(&mut self, op: OpCode, line: u32) -> u32 {
        let index = self.code.len() as u32;
        self.lines.push(index, line);
        self.code.push(op);
        index
    }

    /// Reserves a slot for a forward jump, to be filled in by `patch_jump`
    /// once the target address is known.
    pub fn emit_jump_placeholder(&mut self, make_op: impl FnOnce(u32) -> OpCode, line: u32) -> u32 {
        self.emit(make_op(0), line)
    }

    pub fn patch_jump(&mut self, at: u32, target: u32) {
        let patched = match &self.code[at as usize] {
            OpCode::Jump(_) => OpCode::Jump(target),
            OpCode::JumpIfFalse(_) => OpCode::JumpIfFalse(target),
            OpCode::JumpIfFalseNoPop(_) => OpCode::JumpIfFalseNoPop(target),
            OpCode::JumpIfTrueNoPop(_) => OpCode::JumpIfTrueNoPop(target),
            OpCode::TryBegin(_) => OpCode::TryBegin(target),
            other => panic!("patch_jump called on a non-jump opcode: {other:?}"),
        };
        self.code[at as usize] = patched;
    }

    pub fn add_constant(&mut self, value: ConstValue) -> u32 {
        if let Some(index) = self.constants.iter().position(|c| *c == value) {
            return index as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    pub fn add_function(&mut self, proto: FunctionProto) -> u32 {
        self.functions.push(proto);
        (self.functions.len() - 1) as u32
    }

    pub fn next_address(&self) -> u32 {
        self.code.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_pool_deduplicates_equal_values() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(ConstValue::Int(1));
        let b = chunk.add_constant(ConstValue::Int(1));
        assert_eq!(a, b);
        assert_eq!(chunk.constants.len(), 1);
    }

    #[test]
    fn patch_jump_rewrites_the_target_address() {
        let mut chunk = Chunk::new();
        let at = chunk.emit_jump_placeholder(OpCode::Jump, 1);
        chunk.patch_jump(at, 42);
        assert!(matches!(chunk.code[at as usize], OpCode::Jump(42)));
    }

    #[test]
    fn line_table_reports_the_most_recent_entry_at_or_before_an_index() {
        let mut table = LineTable::default();
        table.push(0, 1);
        table.push(3, 2);
        assert_eq!(table.line_for(0), Some(1));
        assert_eq!(table.line_for(2), Some(1));
        assert_eq!(table.line_for(5), Some(2));
    }
}
