//! The lowering pass (spec §4.6): walks a `Program`'s AST and emits
//! `OpCode`s into a `Chunk`. Local/upvalue resolution follows the classic
//! single-pass design — a stack of `FnState`s, one per lexical function
//! nesting level, each owning its own locals table and its own upvalue
//! table resolved against the state directly below it — generalized here
//! from the teacher's `compiler::resolver` name-resolution pass, which
//! walks the same AST shape to build a `call_graph` before codegen.

mod expr;
mod pattern;
mod stmt;

use lattice_ast::FunctionDecl;
use lattice_core::{LatticeError, Result};
use lattice_runtime::serialize::ConstValue;

use crate::chunk::{Chunk, EnumProto, FunctionProto, ImplProto, StructProto, TestProto};
use crate::opcode::OpCode;

struct LocalVar {
    name: String,
    depth: u32,
}

struct UpvalueSlot {
    index: u32,
    is_local: bool,
}

struct LoopCtx {
    break_jumps: Vec<u32>,
    continue_target: u32,
}

struct FnState {
    chunk: Chunk,
    locals: Vec<LocalVar>,
    /// High-water mark of `locals.len()` — a local's slot number is freed
    /// for reuse by a later sibling scope when its own scope exits, so the
    /// final `locals.len()` undercounts how many distinct slot positions the
    /// frame actually needs; this tracks the peak instead.
    max_slots: u32,
    scope_depth: u32,
    upvalues: Vec<UpvalueSlot>,
    upvalue_names: Vec<String>,
    loops: Vec<LoopCtx>,
    /// One entry per `forge`/match-arm/`try`/`catch`/select-arm/`spawn` body
    /// currently being lowered: the local slot its value resolves into, and
    /// the addresses of the `Jump`s emitted by `return`s inside it still
    /// waiting to be patched to the body's exit point (spec's `block_value`
    /// bridge — see `eval.rs`'s doc comment on `block_value`: a `return`
    /// inside one of these bodies supplies that body's *expression* value,
    /// it does not unwind the function).
    result_slots: Vec<u32>,
    pending_return_jumps: Vec<Vec<u32>>,
    /// `loops.len()` recorded when each `result_slots` entry was pushed —
    /// `break`/`continue` may not reach past this boundary, matching
    /// `block_value`'s rejection of `ControlFlow::Break`/`Continue` bubbling
    /// out of one of these bodies.
    loop_barriers: Vec<usize>,
}

impl FnState {
    fn new() -> Self {
        FnState {
            chunk: Chunk::new(),
            locals: Vec::new(),
            max_slots: 0,
            scope_depth: 0,
            upvalues: Vec::new(),
            upvalue_names: Vec::new(),
            loops: Vec::new(),
            result_slots: Vec::new(),
            pending_return_jumps: Vec::new(),
            loop_barriers: Vec::new(),
        }
    }
}

pub(crate) enum VarRef {
    Local(u32),
    Upvalue(u32),
    Global(u32),
}

/// One `Program` worth of lowering state. `compile_program`/`compile_function`
/// in `compiler.rs` drive this; `expr.rs`/`stmt.rs`/`pattern.rs` add the
/// per-node-kind methods.
pub struct Lowering {
    states: Vec<FnState>,
}

impl Lowering {
    pub(crate) fn new() -> Self {
        Lowering { states: vec![FnState::new()] }
    }

    fn current(&mut self) -> &mut FnState {
        self.states.last_mut().expect("at least the top-level state is always present")
    }

    pub(crate) fn emit(&mut self, op: OpCode, line: u32) -> u32 {
        self.current().chunk.emit(op, line)
    }

    fn emit_jump_placeholder(&mut self, make_op: impl FnOnce(u32) -> OpCode, line: u32) -> u32 {
        self.current().chunk.emit_jump_placeholder(make_op, line)
    }

    fn patch_jump(&mut self, at: u32) {
        let target = self.current().chunk.next_address();
        self.current().chunk.patch_jump(at, target);
    }

    fn patch_jump_to(&mut self, at: u32, target: u32) {
        self.current().chunk.patch_jump(at, target);
    }

    fn next_address(&mut self) -> u32 {
        self.current().chunk.next_address()
    }

    pub(crate) fn const_value(&mut self, value: ConstValue) -> u32 {
        self.current().chunk.add_constant(value)
    }

    fn const_str(&mut self, s: &str) -> u32 {
        self.const_value(ConstValue::String(s.to_string()))
    }

    fn begin_scope(&mut self) {
        self.current().scope_depth += 1;
    }

    /// Frees every local slot declared in the scope being left, for reuse by
    /// a later sibling scope. Purely compile-time bookkeeping: a frame's
    /// local slots are fixed positions reserved once at call setup (see
    /// `FunctionProto::slot_count`), not values dynamically pushed onto the
    /// operand stack, so there's nothing to emit here — the same slot
    /// number simply gets assigned to a different local next time
    /// `declare_local` runs at this depth.
    fn end_scope(&mut self, _line: u32) {
        let fs = self.current();
        fs.scope_depth -= 1;
        let depth = fs.scope_depth;
        while let Some(local) = fs.locals.last() {
            if local.depth > depth {
                fs.locals.pop();
            } else {
                break;
            }
        }
    }

    fn declare_local(&mut self, name: &str) -> u32 {
        let fs = self.current();
        let slot = fs.locals.len() as u32;
        fs.locals.push(LocalVar { name: name.to_string(), depth: fs.scope_depth });
        fs.max_slots = fs.max_slots.max(fs.locals.len() as u32);
        slot
    }

    fn resolve_local(&self, state_idx: usize, name: &str) -> Option<u32> {
        self.states[state_idx].locals.iter().rposition(|l| l.name == name).map(|i| i as u32)
    }

    fn resolve_upvalue(&mut self, state_idx: usize, name: &str) -> Option<u32> {
        if state_idx == 0 {
            return None;
        }
        let parent_idx = state_idx - 1;
        if let Some(slot) = self.resolve_local(parent_idx, name) {
            return Some(self.add_upvalue(state_idx, slot, true, name));
        }
        if let Some(up) = self.resolve_upvalue(parent_idx, name) {
            return Some(self.add_upvalue(state_idx, up, false, name));
        }
        None
    }

    fn add_upvalue(&mut self, state_idx: usize, index: u32, is_local: bool, name: &str) -> u32 {
        let fs = &mut self.states[state_idx];
        if let Some(pos) = fs.upvalue_names.iter().position(|n| n == name) {
            return pos as u32;
        }
        fs.upvalues.push(UpvalueSlot { index, is_local });
        fs.upvalue_names.push(name.to_string());
        (fs.upvalues.len() - 1) as u32
    }

    pub(crate) fn resolve_name(&mut self, name: &str) -> VarRef {
        let cur = self.states.len() - 1;
        if let Some(slot) = self.resolve_local(cur, name) {
            return VarRef::Local(slot);
        }
        if let Some(up) = self.resolve_upvalue(cur, name) {
            return VarRef::Upvalue(up);
        }
        VarRef::Global(self.const_str(name))
    }

    pub(crate) fn add_function(&mut self, proto: FunctionProto) -> u32 {
        self.current().chunk.add_function(proto)
    }

    /// Declarations are only ever registered on the outermost chunk —
    /// `compiler.rs` only calls these while the top-level `FnState` is
    /// current (before/after compiling any nested function body, never
    /// from inside one).
    pub(crate) fn register_struct(&mut self, proto: StructProto) {
        self.current().chunk.structs.push(proto);
    }

    pub(crate) fn register_enum(&mut self, proto: EnumProto) {
        self.current().chunk.enums.push(proto);
    }

    pub(crate) fn register_impl(&mut self, proto: ImplProto) {
        self.current().chunk.impls.push(proto);
    }

    pub(crate) fn register_test(&mut self, proto: TestProto) {
        self.current().chunk.tests.push(proto);
    }

    /// Lowers a test body with no parameters and no upvalue access (see
    /// `TestProto`'s doc comment) — reuses `compile_closure`'s machinery but
    /// discards its (expected-empty) capture list.
    pub(crate) fn compile_test_body(&mut self, body: &[lattice_ast::Stmt], line: u32) -> Result<FunctionProto> {
        let (proto, _captures) = self.compile_closure(&[], &None, body, line)?;
        Ok(proto)
    }

    /// Consumes the lowering state once the whole program has been
    /// compiled, returning the finished top-level `Chunk`.
    pub(crate) fn into_chunk(mut self) -> Chunk {
        let top = self.states.pop().expect("top-level state is always present");
        let mut chunk = top.chunk;
        chunk.top_level_slots = top.max_slots;
        chunk
    }

    pub(crate) fn enter_loop(&mut self, continue_target: u32) {
        self.current().loops.push(LoopCtx { break_jumps: Vec::new(), continue_target });
    }

    /// Pops the current loop's context, returning the addresses of every
    /// `break` jump still waiting to be patched to the loop's exit.
    pub(crate) fn exit_loop(&mut self) -> Vec<u32> {
        self.current().loops.pop().map(|l| l.break_jumps).unwrap_or_default()
    }

    fn current_loop_mut(&mut self) -> Result<&mut LoopCtx> {
        let fs = self.current();
        let reachable = match fs.loop_barriers.last() {
            Some(barrier) => fs.loops.len() > *barrier,
            None => !fs.loops.is_empty(),
        };
        if !reachable {
            return Err(LatticeError::ParseError { message: "`break`/`continue` used outside a loop".to_string() });
        }
        Ok(fs.loops.last_mut().unwrap())
    }

    /// Lowers a `forge`/match-arm/`try`/`catch`/select-arm/`spawn` body,
    /// leaving its `block_value` (spec §4.4) on top of the stack: the value
    /// of the `return` that exited it, or `Unit` if it fell through.
    ///
    /// `result_slot` lives in the *enclosing* scope (declared before
    /// `begin_scope`) so it survives the body's own `end_scope`, which is
    /// where a `return`'s jump converges with the fallthrough path before
    /// the body's locals are popped — keeping cleanup uniform across both
    /// exits.
    pub(crate) fn lower_expr_block(&mut self, stmts: &[lattice_ast::Stmt], line: u32) -> Result<()> {
        let result_slot = self.declare_local("$block_result");
        {
            let fs = self.current();
            let barrier = fs.loops.len();
            fs.loop_barriers.push(barrier);
            fs.result_slots.push(result_slot);
            fs.pending_return_jumps.push(Vec::new());
        }

        self.begin_scope();
        for stmt in stmts {
            self.lower_stmt(stmt)?;
        }
        self.emit(OpCode::Unit, line);
        self.emit(OpCode::SetLocal(result_slot), line);
        let converge = self.next_address();

        let jumps = {
            let fs = self.current();
            fs.result_slots.pop();
            fs.loop_barriers.pop();
            fs.pending_return_jumps.pop().unwrap_or_default()
        };
        for at in jumps {
            self.patch_jump_to(at, converge);
        }

        self.end_scope(line);
        self.emit(OpCode::GetLocal(result_slot), line);
        Ok(())
    }

    /// Compiles `return expr;`. Inside a `forge`/match-arm/`try`/`catch`/
    /// select-arm/`spawn` body this stores into that body's result slot and
    /// jumps to its exit (see `lower_expr_block`); at ordinary function-body
    /// scope it's a true `OpCode::Return`.
    pub(crate) fn lower_return(&mut self, value: &Option<lattice_ast::Expr>, line: u32) -> Result<()> {
        match value {
            Some(expr) => self.lower_expr(expr)?,
            None => {
                self.emit(OpCode::Unit, line);
            }
        }
        if let Some(&slot) = self.current().result_slots.last() {
            self.emit(OpCode::SetLocal(slot), line);
            let at = self.emit_jump_placeholder(OpCode::Jump, line);
            self.current().pending_return_jumps.last_mut().unwrap().push(at);
        } else {
            self.emit(OpCode::Return, line);
        }
        Ok(())
    }

    /// Lowers one function body into its own `FunctionProto`, pushing a new
    /// `FnState` for the duration and popping it (after recording its
    /// capture list) once the body is fully lowered — mirrors
    /// `emit_capture_instructions`'s expectation that the child state is
    /// still on top of the stack when upvalues are resolved against it.
    pub(crate) fn compile_function(&mut self, decl: &FunctionDecl, line: u32) -> Result<FunctionProto> {
        self.states.push(FnState::new());
        self.begin_scope();
        for param in &decl.params {
            self.declare_local(&param.name);
        }
        if let Some(variadic) = &decl.variadic {
            self.declare_local(variadic);
        }

        for (i, param) in decl.params.iter().enumerate() {
            if let Some(default) = &param.default {
                let VarRef::Local(slot) = self.resolve_name(&param.name) else {
                    unreachable!("parameters are always locals")
                };
                // This argument defaults iff the call supplied fewer than
                // `i + 1` positional arguments — truthiness of whatever
                // ended up in the slot is irrelevant.
                self.emit(OpCode::ArgCount, line);
                let idx = self.const_value(ConstValue::Int(i as i64));
                self.emit(OpCode::Const(idx), line);
                self.emit(OpCode::Le, line);
                let has_arg = self.emit_jump_placeholder(OpCode::JumpIfFalseNoPop, line);
                self.emit(OpCode::Pop, line);
                self.lower_expr(default)?;
                self.emit(OpCode::SetLocal(slot), line);
                self.patch_jump(has_arg);
                self.emit(OpCode::Pop, line);
            }
        }

        self.lower_contracts(&decl.requires, "requires", &decl.name, line)?;

        // Every `return` (explicit or an implicit fall-through `Unit`) in
        // this body converges here before `ensures` is checked (spec §4.3:
        // "On return, check `ensure` contracts... with a bound `result`
        // name") — the same jump-to-a-result-slot mechanism `lower_return`
        // uses for `forge`/`match`/`try`/`spawn` bodies, just anchored at
        // function scope instead of a nested expression.
        let body_result = self.declare_local("$return");
        {
            let fs = self.current();
            let barrier = fs.loops.len();
            fs.loop_barriers.push(barrier);
            fs.result_slots.push(body_result);
            fs.pending_return_jumps.push(Vec::new());
        }
        for stmt in &decl.body {
            self.lower_stmt(stmt)?;
        }
        self.emit(OpCode::Unit, line);
        self.emit(OpCode::SetLocal(body_result), line);
        let converge = self.next_address();
        let jumps = {
            let fs = self.current();
            fs.result_slots.pop();
            fs.loop_barriers.pop();
            fs.pending_return_jumps.pop().unwrap_or_default()
        };
        for at in jumps {
            self.patch_jump_to(at, converge);
        }

        self.emit(OpCode::GetLocal(body_result), line);
        if !decl.ensures.is_empty() {
            let result_slot = self.declare_local("result");
            self.emit(OpCode::SetLocal(result_slot), line);
            self.lower_contracts(&decl.ensures, "ensures", &decl.name, line)?;
            self.emit(OpCode::GetLocal(result_slot), line);
        }
        self.emit(OpCode::Return, line);

        let fs = self.states.last().unwrap();
        let slot_count = fs.max_slots;
        let upvalue_count = fs.upvalues.len() as u32;
        let state = self.states.pop().expect("just pushed");
        Ok(FunctionProto {
            name: decl.name.clone(),
            arity: decl.params.len() as u32,
            variadic: decl.variadic.is_some(),
            slot_count,
            upvalue_count,
            chunk: state.chunk,
        })
    }

    /// Lowers an `Expr::Closure` body. Unlike `compile_function` there are
    /// no `requires`/`ensures` clauses (only named `FunctionDecl`s carry
    /// contracts), and the result is handed back together with its capture
    /// list rather than popped silently — the caller (see `expr.rs`'s
    /// `Expr::Closure` arm) still needs the *parent* state on top of the
    /// stack to emit `CaptureLocal`/`CaptureUpvalue` before `MakeClosure`.
    pub(crate) fn compile_closure(
        &mut self,
        params: &[lattice_ast::Param],
        variadic: &Option<String>,
        body: &[lattice_ast::Stmt],
        line: u32,
    ) -> Result<(FunctionProto, Vec<(u32, bool)>)> {
        self.states.push(FnState::new());
        self.begin_scope();
        for param in params {
            self.declare_local(&param.name);
        }
        if let Some(v) = variadic {
            self.declare_local(v);
        }
        for (i, param) in params.iter().enumerate() {
            if let Some(default) = &param.default {
                let VarRef::Local(slot) = self.resolve_name(&param.name) else {
                    unreachable!("parameters are always locals")
                };
                self.emit(OpCode::ArgCount, line);
                let idx = self.const_value(ConstValue::Int(i as i64));
                self.emit(OpCode::Const(idx), line);
                self.emit(OpCode::Le, line);
                let has_arg = self.emit_jump_placeholder(OpCode::JumpIfFalseNoPop, line);
                self.emit(OpCode::Pop, line);
                self.lower_expr(default)?;
                self.emit(OpCode::SetLocal(slot), line);
                self.patch_jump(has_arg);
                self.emit(OpCode::Pop, line);
            }
        }

        let body_result = self.declare_local("$return");
        {
            let fs = self.current();
            let barrier = fs.loops.len();
            fs.loop_barriers.push(barrier);
            fs.result_slots.push(body_result);
            fs.pending_return_jumps.push(Vec::new());
        }
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        self.emit(OpCode::Unit, line);
        self.emit(OpCode::SetLocal(body_result), line);
        let converge = self.next_address();
        let jumps = {
            let fs = self.current();
            fs.result_slots.pop();
            fs.loop_barriers.pop();
            fs.pending_return_jumps.pop().unwrap_or_default()
        };
        for at in jumps {
            self.patch_jump_to(at, converge);
        }
        self.emit(OpCode::GetLocal(body_result), line);
        self.emit(OpCode::Return, line);

        let fs = self.states.last().unwrap();
        let slot_count = fs.max_slots;
        let upvalue_count = fs.upvalues.len() as u32;
        let captures: Vec<(u32, bool)> = fs.upvalues.iter().map(|u| (u.index, u.is_local)).collect();
        let state = self.states.pop().expect("just pushed");
        let proto = FunctionProto {
            name: "<closure>".to_string(),
            arity: params.len() as u32,
            variadic: variadic.is_some(),
            slot_count,
            upvalue_count,
            chunk: state.chunk,
        };
        Ok((proto, captures))
    }

    /// Each failed clause raises `LatticeError::ContractViolation` at
    /// runtime (spec §4.5); the condition's truthiness check is identical
    /// for `requires` and `ensures`, only the VM-side error message differs.
    fn lower_contracts(
        &mut self,
        clauses: &[lattice_ast::Contract],
        kind: &str,
        function: &str,
        line: u32,
    ) -> Result<()> {
        let function_idx = self.const_str(function);
        for clause in clauses {
            self.lower_expr(&clause.condition)?;
            let ok = self.emit_jump_placeholder(OpCode::JumpIfTrueNoPop, line);
            self.emit(OpCode::Pop, line);
            let message = clause.message.clone().unwrap_or_else(|| format!("{kind} failed"));
            let message_idx = self.const_str(&message);
            self.emit(OpCode::RaiseContract { function: function_idx, message: message_idx }, line);
            self.patch_jump(ok);
            self.emit(OpCode::Pop, line);
        }
        Ok(())
    }
}
