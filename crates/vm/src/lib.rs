//! The bytecode backend (spec §4.6, §4.7, §6.2): links a `Chunk` produced by
//! `lattice-compiler` into run-ready form (`rt`) and executes it directly
//! against `lattice-runtime`'s dual heap (`vm`), as an alternative to
//! `lattice-evaluator`'s tree-walker over the same AST.

mod frame;
mod methods;
pub mod rt;
mod vm;

pub use rt::{load, Program};
pub use vm::Vm;
