//! Bytecode compiler for Lattice (spec §4.6): lowers a `lattice_ast::Program`
//! into a `Chunk` that `lattice-vm` executes. Sits alongside
//! `lattice-evaluator` as a second, faster backend over the same AST —
//! grounded on the teacher's own split between `compiler::codegen` (this
//! crate's analog) and its tree-walking `interpreter` fallback.

pub mod chunk;
mod compiler;
pub mod disassemble;
mod lower;
pub mod opcode;
pub mod serialize;

pub use chunk::{Chunk, EnumProto, FunctionProto, ImplProto, StructProto, TestProto};
pub use compiler::Compiler;
pub use opcode::OpCode;
