//! Expression lowering (spec §4.6): every arm leaves exactly one value on
//! top of the operand stack, mirroring `lattice-evaluator::eval::eval_expr`'s
//! per-variant dispatch but emitting opcodes instead of producing a `Value`
//! directly.

use lattice_ast::{BinOp, Expr, Literal, PhaseOp, UnOp};
use lattice_core::{LatticeError, Result};
use lattice_runtime::serialize::ConstValue;

use super::{Lowering, VarRef};
use crate::opcode::OpCode;

impl Lowering {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<()> {
        let line = 0;
        match expr {
            Expr::Literal(lit) => self.lower_literal(lit, line),
            Expr::Ident(name) => match self.resolve_name(name) {
                VarRef::Local(slot) => {
                    self.emit(OpCode::GetLocal(slot), line);
                }
                VarRef::Upvalue(idx) => {
                    self.emit(OpCode::GetUpvalue(idx), line);
                }
                VarRef::Global(idx) => {
                    self.emit(OpCode::GetGlobal(idx), line);
                }
            },
            Expr::Array(elements) => {
                for e in elements {
                    self.lower_expr(e)?;
                }
                self.emit(OpCode::MakeArray(elements.len() as u32), line);
            }
            Expr::Tuple(elements) => {
                for e in elements {
                    self.lower_expr(e)?;
                }
                self.emit(OpCode::MakeTuple(elements.len() as u32), line);
            }
            Expr::MapLiteral(pairs) => {
                for (k, v) in pairs {
                    self.lower_expr(k)?;
                    self.lower_expr(v)?;
                }
                self.emit(OpCode::MakeMap(pairs.len() as u32), line);
            }
            Expr::SetLiteral(elements) => {
                for e in elements {
                    self.lower_expr(e)?;
                }
                self.emit(OpCode::MakeSet(elements.len() as u32), line);
            }
            Expr::FieldAccess { base, field } => {
                self.lower_expr(base)?;
                let idx = self.const_str(field);
                self.emit(OpCode::GetField(idx), line);
            }
            Expr::Index { base, index } => {
                self.lower_expr(base)?;
                self.lower_expr(index)?;
                self.emit(OpCode::GetIndex, line);
            }
            Expr::Call { callee, args } => {
                self.lower_expr(callee)?;
                for a in args {
                    self.lower_expr(a)?;
                }
                self.emit(OpCode::Call(args.len() as u32), line);
            }
            Expr::MethodCall { receiver, method, args } => {
                self.lower_expr(receiver)?;
                for a in args {
                    self.lower_expr(a)?;
                }
                let name = self.const_str(method);
                self.emit(OpCode::MethodCall(name, args.len() as u32), line);
            }
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, line)?,
            Expr::Unary { op, operand } => {
                self.lower_expr(operand)?;
                self.emit(
                    match op {
                        UnOp::Neg => OpCode::Neg,
                        UnOp::Not => OpCode::Not,
                    },
                    line,
                );
            }
            Expr::Phase { op, operand, closure, except, contract } => {
                self.lower_phase(*op, operand, closure.as_deref(), except, contract.as_deref(), line)?
            }
            Expr::Forge(body) => {
                self.emit(OpCode::PushForgeRegion, line);
                self.lower_expr_block(body, line)?;
                self.emit(OpCode::PopForgeRegion, line);
            }
            Expr::Match { scrutinee, arms } => self.lower_match(scrutinee, arms, line)?,
            Expr::TryCatch { try_body, catch_binding, catch_body } => {
                self.lower_try_catch(try_body, catch_binding, catch_body, line)?
            }
            Expr::Select { arms, timeout, default } => {
                self.lower_select(arms, timeout.as_ref(), default.as_deref(), line)?
            }
            Expr::Spawn(body) => self.lower_spawn(body, line)?,
            Expr::Closure { params, variadic, body } => self.lower_closure(params, variadic, body, line)?,
            Expr::StructInit { type_name, fields } => {
                for (name, value) in fields {
                    let name_idx = self.const_str(name);
                    self.emit(OpCode::Const(name_idx), line);
                    self.lower_expr(value)?;
                }
                let type_idx = self.const_str(type_name);
                self.emit(OpCode::MakeStruct { type_name: type_idx, field_count: fields.len() as u32 }, line);
            }
            Expr::EnumInit { enum_name, variant, payload } => {
                for p in payload {
                    self.lower_expr(p)?;
                }
                let enum_idx = enum_name.as_deref().map(|n| self.const_str(n));
                let variant_idx = self.const_str(variant);
                self.emit(
                    OpCode::MakeEnum { enum_name: enum_idx, variant: variant_idx, payload_count: payload.len() as u32 },
                    line,
                );
            }
            Expr::Try(inner) => {
                self.lower_expr(inner)?;
                self.emit(OpCode::UnwrapTry, line);
            }
        }
        Ok(())
    }

    fn lower_literal(&mut self, lit: &Literal, line: u32) {
        match lit {
            Literal::Nil => {
                self.emit(OpCode::Nil, line);
            }
            Literal::Unit => {
                self.emit(OpCode::Unit, line);
            }
            Literal::Bool(true) => {
                self.emit(OpCode::True, line);
            }
            Literal::Bool(false) => {
                self.emit(OpCode::False, line);
            }
            Literal::Int(n) => {
                let idx = self.const_value(ConstValue::Int(*n));
                self.emit(OpCode::Const(idx), line);
            }
            Literal::Float(f) => {
                let idx = self.const_value(ConstValue::Float(*f));
                self.emit(OpCode::Const(idx), line);
            }
            Literal::String(s) => {
                let idx = self.const_str(s);
                self.emit(OpCode::Const(idx), line);
            }
        }
    }

    /// `&&`/`||` short-circuit (spec §4.6): the shared operand stays on the
    /// stack as the expression's result when the jump fires, matching
    /// `JumpIfFalseNoPop`/`JumpIfTrueNoPop`'s contract.
    fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, line: u32) -> Result<()> {
        match op {
            BinOp::And => {
                self.lower_expr(lhs)?;
                let short_circuit = self.emit_jump_placeholder(OpCode::JumpIfFalseNoPop, line);
                self.emit(OpCode::Pop, line);
                self.lower_expr(rhs)?;
                self.patch_jump(short_circuit);
            }
            BinOp::Or => {
                self.lower_expr(lhs)?;
                let short_circuit = self.emit_jump_placeholder(OpCode::JumpIfTrueNoPop, line);
                self.emit(OpCode::Pop, line);
                self.lower_expr(rhs)?;
                self.patch_jump(short_circuit);
            }
            _ => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                self.emit(binop_opcode(op), line);
            }
        }
        Ok(())
    }

    /// Phase operators (spec §4.2). Stack shapes match the opcodes' own
    /// doc comments: `Freeze` expects its `except` names and optional
    /// contract already pushed below the operand; `Anneal` expects the
    /// operand below its mutator closure and optional contract.
    fn lower_phase(
        &mut self,
        op: PhaseOp,
        operand: &Expr,
        closure: Option<&Expr>,
        except: &[String],
        contract: Option<&Expr>,
        line: u32,
    ) -> Result<()> {
        match op {
            PhaseOp::Freeze => {
                for name in except {
                    let idx = self.const_str(name);
                    self.emit(OpCode::Const(idx), line);
                }
                if let Some(c) = contract {
                    self.lower_expr(c)?;
                }
                self.lower_expr(operand)?;
                self.emit(OpCode::Freeze { except_count: except.len() as u32, has_contract: contract.is_some() }, line);
            }
            PhaseOp::Thaw => {
                self.lower_expr(operand)?;
                self.emit(OpCode::Thaw, line);
            }
            PhaseOp::Clone => {
                self.lower_expr(operand)?;
                self.emit(OpCode::CloneValue, line);
            }
            // Both AST variants lower a mutate-then-refreeze anneal (see
            // `lattice-evaluator::eval_phase_op`'s own doc comment).
            PhaseOp::Crystallize | PhaseOp::Sublimate => {
                let mutator = closure.ok_or_else(|| LatticeError::ParseError {
                    message: "anneal requires a mutator closure".to_string(),
                })?;
                self.lower_expr(operand)?;
                self.lower_expr(mutator)?;
                if let Some(c) = contract {
                    self.lower_expr(c)?;
                }
                self.emit(OpCode::Anneal { has_contract: contract.is_some() }, line);
            }
        }
        Ok(())
    }

    fn lower_try_catch(&mut self, try_body: &[lattice_ast::Stmt], catch_binding: &str, catch_body: &[lattice_ast::Stmt], line: u32) -> Result<()> {
        let handler = self.emit_jump_placeholder(OpCode::TryBegin, line);
        self.lower_expr_block(try_body, line)?;
        self.emit(OpCode::TryEnd, line);
        let after = self.emit_jump_placeholder(OpCode::Jump, line);

        self.patch_jump(handler);
        self.begin_scope();
        let slot = self.declare_local(catch_binding);
        self.emit(OpCode::BindCaught(slot), line);
        self.lower_expr_block(catch_body, line)?;
        self.end_scope(line);

        self.patch_jump(after);
        Ok(())
    }

    /// Runs `body` out-of-line (spec §5), deep-cloning the calling frame's
    /// locals the same way `lattice-evaluator::eval_spawn` deep-clones the
    /// environment — `lattice-vm` executes it synchronously to completion
    /// and pushes its `block_value` here, no real scheduling.
    fn lower_spawn(&mut self, body: &[lattice_ast::Stmt], line: u32) -> Result<()> {
        let skip = self.emit_jump_placeholder(OpCode::Jump, line);
        let start = self.next_address();
        self.lower_expr_block(body, line)?;
        self.emit(OpCode::Return, line);
        self.patch_jump(skip);
        let count = self.next_address() - start;
        self.emit(OpCode::Spawn { start, count }, line);
        Ok(())
    }

    /// `select` (spec §5): each pass tries every arm's channel fresh (it's
    /// re-evaluated, not cached, matching `eval_select`'s own loop), falls
    /// back to `default` or a `timeout` deadline when none are ready, else
    /// yields and retries — the same polling simplification `eval_select`
    /// already documents.
    fn lower_select(
        &mut self,
        arms: &[lattice_ast::SelectArm],
        timeout: Option<&(Box<Expr>, Vec<lattice_ast::Stmt>)>,
        default: Option<&[lattice_ast::Stmt]>,
        line: u32,
    ) -> Result<()> {
        let deadline_slot = match timeout {
            Some((duration_expr, _)) => {
                self.lower_expr(duration_expr)?;
                self.emit(OpCode::NowMillis, line);
                self.emit(OpCode::Add, line);
                let slot = self.declare_local("$select_deadline");
                self.emit(OpCode::SetLocal(slot), line);
                Some(slot)
            }
            None => None,
        };

        let loop_start = self.next_address();
        let mut done_jumps = Vec::new();

        for arm in arms {
            self.begin_scope();
            self.lower_expr(&arm.channel)?;
            let chan_slot = self.declare_local("$select_chan");
            self.emit(OpCode::SetLocal(chan_slot), line);
            self.emit(OpCode::GetLocal(chan_slot), line);
            self.emit(OpCode::TryRecv, line); // [value, status]
            let zero = self.const_value(ConstValue::Int(0));
            self.emit(OpCode::Const(zero), line);
            self.emit(OpCode::Eq, line); // [value, is_empty]
            let matched = self.emit_jump_placeholder(OpCode::JumpIfFalse, line);

            // empty: discard the Nil value and try the next arm
            self.emit(OpCode::Pop, line);
            let to_next = self.emit_jump_placeholder(OpCode::Jump, line);

            self.patch_jump(matched);
            if let Some(binding) = &arm.binding {
                let slot = self.declare_local(binding);
                self.emit(OpCode::SetLocal(slot), line);
            } else {
                self.emit(OpCode::Pop, line);
            }
            self.lower_expr_block(&arm.body, line)?;
            done_jumps.push(self.emit_jump_placeholder(OpCode::Jump, line));

            self.patch_jump(to_next);
            self.end_scope(line);
        }

        // No arm was ready this pass.
        if let Some(default_body) = default {
            self.lower_expr_block(default_body, line)?;
            done_jumps.push(self.emit_jump_placeholder(OpCode::Jump, line));
        } else if let Some((_, timeout_body)) = timeout {
            let deadline_slot = deadline_slot.expect("deadline_slot is set whenever timeout is Some");
            self.emit(OpCode::NowMillis, line);
            self.emit(OpCode::GetLocal(deadline_slot), line);
            self.emit(OpCode::Ge, line);
            let not_yet = self.emit_jump_placeholder(OpCode::JumpIfFalse, line);
            self.lower_expr_block(timeout_body, line)?;
            done_jumps.push(self.emit_jump_placeholder(OpCode::Jump, line));
            self.patch_jump(not_yet);
            self.emit(OpCode::Yield, line);
            self.emit(OpCode::Loop(loop_start), line);
        } else {
            self.emit(OpCode::Yield, line);
            self.emit(OpCode::Loop(loop_start), line);
        }

        for at in done_jumps {
            self.patch_jump(at);
        }
        Ok(())
    }

    fn lower_closure(
        &mut self,
        params: &[lattice_ast::Param],
        variadic: &Option<String>,
        body: &[lattice_ast::Stmt],
        line: u32,
    ) -> Result<()> {
        let (proto, captures) = self.compile_closure(params, variadic, body, line)?;
        for (index, is_local) in captures {
            self.emit(if is_local { OpCode::CaptureLocal(index) } else { OpCode::CaptureUpvalue(index) }, line);
        }
        let fn_idx = self.add_function(proto);
        self.emit(OpCode::MakeClosure(fn_idx), line);
        Ok(())
    }
}

fn binop_opcode(op: BinOp) -> OpCode {
    match op {
        BinOp::Add => OpCode::Add,
        BinOp::Sub => OpCode::Sub,
        BinOp::Mul => OpCode::Mul,
        BinOp::Div => OpCode::Div,
        BinOp::Mod => OpCode::Mod,
        BinOp::Eq => OpCode::Eq,
        BinOp::Ne => OpCode::Ne,
        BinOp::Lt => OpCode::Lt,
        BinOp::Le => OpCode::Le,
        BinOp::Gt => OpCode::Gt,
        BinOp::Ge => OpCode::Ge,
        BinOp::BitOr => OpCode::BitOr,
        BinOp::BitAnd => OpCode::BitAnd,
        BinOp::BitXor => OpCode::BitXor,
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops are handled in lower_binary"),
    }
}
