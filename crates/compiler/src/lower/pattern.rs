//! Pattern lowering (spec §4.4, §4.6): `let`/`for` destructuring
//! (`lattice_ast::Pattern`) and `match` arm testing (`MatchPattern`),
//! mirroring `lattice-evaluator::pattern`'s two binding functions but
//! compiled to opcodes instead of walked against an `Environment`.

use lattice_ast::{Literal, MatchArm, MatchPattern, Pattern};
use lattice_core::Result;
use lattice_runtime::serialize::ConstValue;

use super::Lowering;
use crate::opcode::OpCode;

fn literal_to_const(lit: &Literal) -> ConstValue {
    match lit {
        Literal::Nil => ConstValue::Nil,
        Literal::Unit => ConstValue::Unit,
        Literal::Bool(b) => ConstValue::Bool(*b),
        Literal::Int(n) => ConstValue::Int(*n),
        Literal::Float(f) => ConstValue::Float(*f),
        Literal::String(s) => ConstValue::String(s.clone()),
    }
}

/// Every name a `MatchPattern` would bind, in binding order — used to
/// reserve local slots before the pattern is tested (see `lower_match`).
fn match_pattern_bindings(pattern: &MatchPattern) -> Vec<String> {
    match pattern {
        MatchPattern::Binding(name) => vec![name.clone()],
        MatchPattern::TupleVariant { bindings, .. } => bindings.clone(),
        MatchPattern::Wildcard | MatchPattern::Literal(_) | MatchPattern::Range { .. } => Vec::new(),
    }
}

impl Lowering {
    /// Binds `pattern` against the value already on top of the stack (spec
    /// §4.4): used by `let`/`flux`/`fix` and `for`'s loop variable.
    pub(crate) fn lower_let_pattern(&mut self, pattern: &Pattern, line: u32) -> Result<()> {
        match pattern {
            Pattern::Wildcard => {
                self.emit(OpCode::Pop, line);
            }
            Pattern::Binding(name) => {
                let slot = self.declare_local(name);
                self.emit(OpCode::SetLocal(slot), line);
            }
            Pattern::Array { elements, rest } => {
                let source = self.declare_local("$destructure_array");
                self.emit(OpCode::SetLocal(source), line);
                for (i, sub_pattern) in elements.iter().enumerate() {
                    self.emit(OpCode::GetLocal(source), line);
                    let idx = self.const_value(ConstValue::Int(i as i64));
                    self.emit(OpCode::Const(idx), line);
                    self.emit(OpCode::GetIndex, line);
                    self.lower_let_pattern(sub_pattern, line)?;
                }
                if let Some(rest_name) = rest {
                    self.lower_array_rest(source, elements.len() as i64, rest_name, line);
                }
            }
            Pattern::Struct { type_name: _, fields, rest: _ } => {
                // `type_name` isn't checked here — a mismatched struct
                // surfaces as a missing-field `KeyError` from `GetField`
                // instead of the evaluator's more specific message; no
                // dedicated opcode carries a runtime type-name comparison.
                let source = self.declare_local("$destructure_struct");
                self.emit(OpCode::SetLocal(source), line);
                for (field_name, sub_pattern) in fields {
                    self.emit(OpCode::GetLocal(source), line);
                    let idx = self.const_str(field_name);
                    self.emit(OpCode::GetField(idx), line);
                    self.lower_let_pattern(sub_pattern, line)?;
                }
            }
        }
        Ok(())
    }

    /// `rest` collects every element from `start` to the source array's end
    /// into a freshly built array bound to `rest_name` (spec §4.4 Array
    /// pattern). No slicing opcode exists, so this emits a small counted
    /// loop using the same `len`/`get`/`push` array methods the evaluator's
    /// own `array_ops` exposes.
    fn lower_array_rest(&mut self, source: u32, start: i64, rest_name: &str, line: u32) {
        let rest_slot = self.declare_local(rest_name);
        self.emit(OpCode::MakeArray(0), line);
        self.emit(OpCode::SetLocal(rest_slot), line);

        let idx_slot = self.declare_local("$rest_idx");
        let start_const = self.const_value(ConstValue::Int(start));
        self.emit(OpCode::Const(start_const), line);
        self.emit(OpCode::SetLocal(idx_slot), line);

        let loop_start = self.next_address();
        self.emit(OpCode::GetLocal(idx_slot), line);
        self.emit(OpCode::GetLocal(source), line);
        let len_name = self.const_str("len");
        self.emit(OpCode::MethodCall(len_name, 0), line);
        self.emit(OpCode::Lt, line);
        let exit_jump = self.emit_jump_placeholder(OpCode::JumpIfFalse, line);

        self.emit(OpCode::GetLocal(rest_slot), line);
        self.emit(OpCode::GetLocal(source), line);
        self.emit(OpCode::GetLocal(idx_slot), line);
        let get_name = self.const_str("get");
        self.emit(OpCode::MethodCall(get_name, 1), line);
        let push_name = self.const_str("push");
        self.emit(OpCode::MethodCall(push_name, 1), line);
        self.emit(OpCode::Pop, line); // push() returns Unit

        self.emit(OpCode::GetLocal(idx_slot), line);
        let one = self.const_value(ConstValue::Int(1));
        self.emit(OpCode::Const(one), line);
        self.emit(OpCode::Add, line);
        self.emit(OpCode::SetLocal(idx_slot), line);
        self.emit(OpCode::Loop(loop_start), line);
        self.patch_jump(exit_jump);
    }

    /// Lowers a whole `match` expression (spec §4.4): first-match-wins,
    /// arm bodies are `block_value` contexts (a `return` inside one
    /// supplies the arm's value; falling through yields `Unit`), and an
    /// unmatched scrutinee raises a type error, exactly like
    /// `lattice-evaluator::eval_match`.
    pub(crate) fn lower_match(&mut self, scrutinee: &lattice_ast::Expr, arms: &[MatchArm], line: u32) -> Result<()> {
        self.lower_expr(scrutinee)?;
        let scrutinee_slot = self.declare_local("$match_scrutinee");
        self.emit(OpCode::SetLocal(scrutinee_slot), line);

        let mut end_jumps = Vec::new();
        for arm in arms {
            self.begin_scope();
            let mut fail_jumps = Vec::new();

            if let Some(qualifier) = arm.phase_qualifier {
                self.emit(OpCode::GetLocal(scrutinee_slot), line);
                let is_crystal = matches!(qualifier, lattice_core::Phase::Crystal);
                self.emit(OpCode::TestPhase { is_crystal }, line);
                fail_jumps.push(self.emit_jump_placeholder(OpCode::JumpIfFalse, line));
            }

            // Reserve binding slots up front (as `Nil`) so the arm body's
            // locals line up at the same indices whether or not this arm
            // is the one that matches.
            let mut binding_slots = Vec::new();
            for name in match_pattern_bindings(&arm.pattern) {
                self.emit(OpCode::Nil, line);
                let slot = self.declare_local(&name);
                self.emit(OpCode::SetLocal(slot), line);
                binding_slots.push(slot);
            }

            self.lower_match_pattern_test(&arm.pattern, scrutinee_slot, &binding_slots, &mut fail_jumps, line)?;

            if let Some(guard) = &arm.guard {
                self.lower_expr(guard)?;
                fail_jumps.push(self.emit_jump_placeholder(OpCode::JumpIfFalse, line));
            }

            self.lower_expr_block(&arm.body, line)?;
            end_jumps.push(self.emit_jump_placeholder(OpCode::Jump, line));

            for at in fail_jumps {
                self.patch_jump(at);
            }
            self.end_scope(line);
        }

        let no_match = self.const_str("no `match` arm matched the scrutinee");
        self.emit(OpCode::RaiseError { message: no_match }, line);

        for at in end_jumps {
            self.patch_jump(at);
        }
        Ok(())
    }

    /// Emits the shape test for one `MatchPattern`, appending any
    /// `JumpIfFalse` this arm should fail on to `fail_jumps`. Bindings
    /// (`Binding`/`TupleVariant`) always "match" but still need their
    /// reserved slot populated.
    fn lower_match_pattern_test(
        &mut self,
        pattern: &MatchPattern,
        scrutinee_slot: u32,
        binding_slots: &[u32],
        fail_jumps: &mut Vec<u32>,
        line: u32,
    ) -> Result<()> {
        match pattern {
            MatchPattern::Wildcard => {}
            MatchPattern::Binding(_) => {
                self.emit(OpCode::GetLocal(scrutinee_slot), line);
                self.emit(OpCode::SetLocal(binding_slots[0]), line);
            }
            MatchPattern::Literal(lit) => {
                self.emit(OpCode::GetLocal(scrutinee_slot), line);
                let idx = self.const_value(literal_to_const(lit));
                self.emit(OpCode::TestEq(idx), line);
                fail_jumps.push(self.emit_jump_placeholder(OpCode::JumpIfFalse, line));
            }
            MatchPattern::Range { lo, hi } => {
                self.emit(OpCode::GetLocal(scrutinee_slot), line);
                let lo_idx = self.const_value(literal_to_const(lo));
                let hi_idx = self.const_value(literal_to_const(hi));
                self.emit(OpCode::TestRange { lo: lo_idx, hi: hi_idx }, line);
                fail_jumps.push(self.emit_jump_placeholder(OpCode::JumpIfFalse, line));
            }
            MatchPattern::TupleVariant { enum_name, variant, bindings } => {
                self.emit(OpCode::GetLocal(scrutinee_slot), line);
                let enum_idx = enum_name.as_deref().map(|n| self.const_str(n));
                let variant_idx = self.const_str(variant);
                self.emit(
                    OpCode::TestVariant { enum_name: enum_idx, variant: variant_idx, arity: bindings.len() as u32 },
                    line,
                );
                fail_jumps.push(self.emit_jump_placeholder(OpCode::JumpIfFalse, line));
                if !bindings.is_empty() {
                    self.emit(OpCode::GetLocal(scrutinee_slot), line);
                    self.emit(
                        OpCode::DestructureVariant { arity: bindings.len() as u32, first_slot: binding_slots[0] },
                        line,
                    );
                }
            }
        }
        Ok(())
    }
}
