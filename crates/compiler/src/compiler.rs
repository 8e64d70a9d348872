//! Top-level driver (spec §4.6): turns a whole `Program` into one `Chunk`,
//! dispatching each `Item` the same way `lattice-evaluator::register_item`
//! does, but emitting bytecode instead of mutating a runtime registry.
//!
//! Top-level `let`/`flux`/`fix` bindings compile as locals (and, from a
//! nested function, upvalues) of an implicit top-level frame — the same
//! `resolve_local`/`resolve_upvalue` machinery an ordinary nested closure
//! uses, rather than a shared mutable `globals` environment like the
//! evaluator's. Only `fn` declarations become true VM globals
//! (`DefineGlobal`/`GetGlobal`, looked up by name at runtime), so that two
//! top-level functions can call each other regardless of which one was
//! declared first — a `let` has no such ordering need, since nothing can
//! reference it before its declaration runs.

use lattice_ast::{Item, Program};
use lattice_core::Result;

use crate::chunk::{Chunk, EnumProto, FunctionProto, ImplProto, StructProto, TestProto};
use crate::lower::Lowering;
use crate::opcode::OpCode;

pub struct Compiler {
    lowering: Lowering,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler { lowering: Lowering::new() }
    }

    pub fn compile(program: &Program) -> Result<Chunk> {
        let mut compiler = Compiler::new();
        for item in &program.items {
            compiler.lower_item(item)?;
        }
        compiler.lowering.emit(OpCode::Halt, 0);
        Ok(compiler.lowering.into_chunk())
    }

    fn lower_item(&mut self, item: &Item) -> Result<()> {
        match item {
            Item::Function(decl) => {
                let proto = self.lowering.compile_function(decl, 0)?;
                let name_idx = self.lowering.const_value(lattice_runtime::serialize::ConstValue::String(decl.name.clone()));
                let fn_idx = self.lowering.add_function(proto);
                self.lowering.emit(OpCode::MakeClosure(fn_idx), 0);
                self.lowering.emit(OpCode::DefineGlobal(name_idx), 0);
            }
            Item::Struct(decl) => {
                self.lowering.register_struct(StructProto {
                    name: decl.name.clone(),
                    fields: decl.fields.iter().map(|f| f.name.clone()).collect(),
                });
            }
            Item::Enum(decl) => {
                self.lowering.register_enum(EnumProto {
                    name: decl.name.clone(),
                    variants: decl.variants.iter().map(|v| (v.name.clone(), v.payload_arity as u32)).collect(),
                });
            }
            Item::Trait(_) => {
                // Purely a contract-surface concern (spec §3.4, `requires`/
                // `ensures` wiring) checked at parse/impl-resolution time;
                // no runtime representation, matching
                // `register_item`'s own no-op `Trait` arm.
            }
            Item::Impl(decl) => {
                let mut methods = Vec::with_capacity(decl.methods.len());
                for method in &decl.methods {
                    methods.push(self.lowering.compile_function(method, 0)?);
                }
                self.lowering.register_impl(ImplProto { type_name: decl.type_name.clone(), methods });
            }
            Item::Stmt(stmt) => {
                self.lowering.lower_stmt(stmt)?;
            }
            Item::Test(decl) => {
                let proto = self.lowering.compile_test_body(&decl.body, 0)?;
                let fn_idx = self.lowering.add_function(proto);
                self.lowering.register_test(TestProto { name: decl.name.clone(), function: fn_idx });
            }
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ast::{BindingKind, Expr, Literal, Pattern, Stmt};

    #[test]
    fn an_empty_program_compiles_to_a_halt_only_chunk() {
        let program = Program { items: vec![] };
        let chunk = Compiler::compile(&program).unwrap();
        assert!(matches!(chunk.code.last(), Some(OpCode::Halt)));
    }

    #[test]
    fn a_top_level_let_compiles_as_a_local_not_a_global() {
        let program = Program {
            items: vec![Item::Stmt(Stmt::Let {
                kind: BindingKind::Let,
                pattern: Pattern::Binding("x".to_string()),
                init: Expr::Literal(Literal::Int(1)),
                loc: None,
            })],
        };
        let chunk = Compiler::compile(&program).unwrap();
        assert!(chunk.code.iter().any(|op| matches!(op, OpCode::SetLocal(_))));
        assert!(!chunk.code.iter().any(|op| matches!(op, OpCode::DefineGlobal(_))));
    }
}
