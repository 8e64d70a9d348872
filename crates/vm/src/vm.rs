//! The bytecode interpreter (spec §4.6, §4.7): walks a linked `Program`'s
//! instruction stream directly against the dual fluid/crystal heap, with an
//! explicit frame stack standing in for the tree-walker's Rust-recursive
//! `Evaluator::invoke` (see `lattice-evaluator::call`). Lattice-level
//! recursion depth is therefore bounded by `Vm::frames`, not by this
//! process's own call stack.

use std::collections::HashMap;
use std::rc::Rc;

use lattice_compiler::opcode::{Addr, OpCode};
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::{AllocCtx, LatticeError, Phase, Result, RuntimeFlags};
use lattice_runtime::channel::{self, RecvOutcome, SendOutcome};
use lattice_runtime::heap_object::{HeapObject, VmClosureObj};
use lattice_runtime::scheduler;
use lattice_runtime::serialize::ConstValue;
use lattice_runtime::value::{EnumInstance, StructInstance};
use lattice_runtime::{value_ops, Heap, HeapPtr, Value, ValueKind};

use crate::frame::{cell, Cell, DeferRecord, Frame, Handler};
use crate::rt::{EnumDef, Program, RtFunction, StructDef};

/// What `step_one` tells `drive` to do next.
enum Signal {
    Continue,
    Halt,
}

/// Call-frame depth cap (spec §8): the 1001st nested call raises `Overflow`.
const MAX_FRAMES: usize = 1000;

/// Operand stack capacity; "pre-sized" per spec §8, generous enough that only
/// a runaway push loop (not ordinary deep expressions) ever hits it.
const MAX_OPERAND_STACK: usize = 65536;

/// The running virtual machine: one per program execution (see
/// `lattice-cli`'s VM-backend entry point).
pub struct Vm {
    pub heap: Heap,
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    /// Shared across every frame — a `Call`'s arguments and a function's
    /// intermediate expression values all live here, the bytecode analog of
    /// the tree-walker's Rust-native expression-evaluation stack.
    stack: Vec<Value>,
    handlers: Vec<Handler>,
    alloc_ctx_stack: Vec<AllocCtx>,
    structs: HashMap<String, StructDef>,
    enums: Vec<EnumDef>,
    methods: HashMap<String, HashMap<String, Rc<RtFunction>>>,
    /// Accumulates `CaptureLocal`/`CaptureUpvalue` cells for the `MakeClosure`
    /// that follows them, belonging to the enclosing frame being built, not
    /// any particular `Frame` struct.
    pending_captures: Vec<Cell>,
}

impl Vm {
    pub fn new(flags: RuntimeFlags) -> Self {
        let mut vm = Vm {
            heap: Heap::new(flags),
            globals: HashMap::new(),
            frames: Vec::new(),
            stack: Vec::new(),
            handlers: Vec::new(),
            alloc_ctx_stack: Vec::new(),
            structs: HashMap::new(),
            enums: Vec::new(),
            methods: HashMap::new(),
            pending_captures: Vec::new(),
        };
        vm.install_builtins();
        vm
    }

    /// Binds the same demonstration built-ins the tree-walker installs (spec
    /// §8: `print`, `channel`) directly into `globals` — no heap allocation
    /// for the `Builtin` value itself.
    fn install_builtins(&mut self) {
        self.globals.insert(
            "print".to_string(),
            Value::fluid(ValueKind::Builtin(Rc::new(|heap: &mut Heap, args: &[Value]| {
                let parts: Vec<String> = args.iter().map(|v| value_ops::display(heap, v)).collect();
                println!("{}", parts.join(" "));
                Ok(Value::unit())
            }))),
        );
        self.globals.insert(
            "channel".to_string(),
            Value::fluid(ValueKind::Builtin(Rc::new(|heap: &mut Heap, args: &[Value]| {
                let capacity = match args.first() {
                    Some(Value { kind: ValueKind::Int(n), .. }) if *n >= 0 => *n as usize,
                    Some(_) => return Err(LatticeError::type_error("channel(capacity) requires an int capacity")),
                    None => 0,
                };
                Ok(value_ops::new_channel(heap, capacity, AllocCtx::Fluid, &[]))
            }))),
        );
    }

    /// Loads and runs a whole linked program (spec §3.4): struct/enum/impl
    /// tables are installed up front, then the implicit top-level frame runs
    /// to `Halt`, mirroring `lattice-evaluator::eval_program` registering
    /// every declaration before a single statement executes.
    pub fn run(&mut self, program: Program) -> Result<()> {
        self.structs = program.structs;
        self.enums = program.enums;
        self.methods = program.methods;
        self.push_frame(Frame::new(program.top_level, Vec::new(), 0))?;
        self.drive(0)
    }

    pub fn globals(&self) -> &HashMap<String, Value> {
        &self.globals
    }

    pub(crate) fn current_ctx(&self) -> AllocCtx {
        self.alloc_ctx_stack.last().copied().unwrap_or(AllocCtx::Fluid)
    }

    fn current_phase(&self) -> Phase {
        match self.current_ctx() {
            AllocCtx::Fluid => Phase::Fluid,
            AllocCtx::Crystal(_) => Phase::Crystal,
        }
    }

    /// Every `FluidHandle` directly reachable from live VM state, for the
    /// fluid GC's mark phase (spec §3.3) — one level deep, same as
    /// `lattice-evaluator::Evaluator::roots`; the `Trace` graph does the
    /// rest from here.
    pub(crate) fn roots(&self) -> Vec<FluidHandle> {
        let mut out = Vec::new();
        for v in self.globals.values() {
            if let Some(HeapPtr::Fluid(h)) = v.heap_ptr() {
                out.push(h);
            }
        }
        for v in &self.stack {
            if let Some(HeapPtr::Fluid(h)) = v.heap_ptr() {
                out.push(h);
            }
        }
        for frame in &self.frames {
            for cell in frame.slots.iter().chain(frame.upvalues.iter()) {
                if let Some(HeapPtr::Fluid(h)) = cell.borrow().heap_ptr() {
                    out.push(h);
                }
            }
        }
        out
    }

    fn push(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= MAX_OPERAND_STACK {
            return Err(LatticeError::Overflow { message: "operand stack overflow".to_string() });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pushes a call (or `spawn`/`defer` replay) frame, enforcing spec §8's
    /// call-frame depth cap so unbounded Lattice recursion raises a clean
    /// `Overflow` instead of growing `frames` without bound.
    fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(LatticeError::Overflow { message: "call stack exceeded depth 1000".to_string() });
        }
        self.frames.push(frame);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| LatticeError::type_error("operand stack underflow"))
    }

    fn peek(&self) -> Result<&Value> {
        self.stack.last().ok_or_else(|| LatticeError::type_error("operand stack underflow"))
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("drive never runs with an empty frame stack")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("drive never runs with an empty frame stack")
    }

    /// The outer loop: steps the top frame until the frame stack drains back
    /// to `floor`, routing any error through `unwind`. `run` drives with
    /// `floor = 0`; `call_value`/`run_range` drive a nested call with
    /// `floor` set to the depth just before that call, so an error inside it
    /// can never unwind past frames belonging to an unrelated caller.
    fn drive(&mut self, floor: usize) -> Result<()> {
        loop {
            if self.frames.len() <= floor {
                return Ok(());
            }
            match self.step_one() {
                Ok(Signal::Continue) => {}
                Ok(Signal::Halt) => return Ok(()),
                Err(e) => self.unwind(e, floor)?,
            }
        }
    }

    /// Unwinds a raised error (spec §4.4 Try) bounded to `floor`: looks for
    /// a live handler at the current frame depth, applies it if found,
    /// otherwise pops the abandoned frame (running its defers first) and
    /// retries one frame up. Propagates `Err` once `frames.len() == floor`
    /// with nothing left to try — out of `run` entirely when `floor == 0`,
    /// or just out of the nested call in progress otherwise.
    fn unwind(&mut self, mut err: LatticeError, floor: usize) -> Result<()> {
        loop {
            if self.frames.len() <= floor {
                return Err(err);
            }
            let depth = self.frames.len() - 1;
            if let Some(pos) = self.handlers.iter().rposition(|h| h.frame_depth == depth) {
                let handler = self.handlers.split_off(pos).remove(0);
                self.stack.truncate(handler.operand_depth);
                self.push(Value::fluid(ValueKind::String(lattice_runtime::string::LString::new_fluid(
                    err.message(),
                ))))?;
                self.current_frame_mut().ip = handler.target;
                return Ok(());
            }
            self.handlers.retain(|h| h.frame_depth < depth);
            let frame = self.frames.pop().expect("checked frames.len() > floor above");
            let function = frame.function.clone();
            let upvalues = frame.upvalues.clone();
            for defer in frame.defers.into_iter().rev() {
                if let Err(e) = self.run_defer(function.clone(), upvalues.clone(), defer) {
                    err = e;
                }
            }
            if self.frames.len() <= floor {
                return Err(err);
            }
        }
    }

    // ---- calls ----

    /// Resolves a callee `Value` to its function body and upvalues, and
    /// binds `args` into a fresh `Frame` (spec §4.3): positional params fill
    /// from whatever args were supplied, leaving any unsupplied trailing
    /// slots `Nil` for the callee's own `ArgCount`-gated prologue to default;
    /// more args than declared arity is only an error with no `variadic`
    /// slot to catch the overflow.
    fn build_frame(&mut self, callee: Value, args: Vec<Value>) -> Result<Frame> {
        let (function, upvalues) = resolve_callee(&self.heap, &callee)?;
        self.bind_frame(function, upvalues, args)
    }

    /// Binds `args` into a fresh `Frame` for `function` (spec §4.3): shared
    /// by ordinary closure calls (`build_frame`, resolving a callable
    /// `Value` first) and struct-method dispatch (`build_struct_method_frame`,
    /// which already has the method looked up and has no upvalues to carry).
    fn bind_frame(&mut self, function: Rc<RtFunction>, upvalues: Vec<Cell>, mut args: Vec<Value>) -> Result<Frame> {
        let arity = function.arity as usize;
        if args.len() > arity && !function.variadic {
            return Err(LatticeError::arity_error(format!(
                "too many arguments: expected {}, got {}",
                arity,
                args.len()
            )));
        }
        let arg_count = args.len() as u32;
        let rest: Vec<Value> = if args.len() > arity { args.split_off(arity) } else { Vec::new() };
        let mut frame = Frame::new(function.clone(), upvalues, arg_count);
        for (slot, value) in args.into_iter().enumerate() {
            *frame.slots[slot].borrow_mut() = value;
        }
        if function.variadic {
            let roots = self.roots();
            let ptr = self.heap.alloc(HeapObject::Array(rest), AllocCtx::Fluid, &roots);
            *frame.slots[arity].borrow_mut() = Value::fluid(ValueKind::Array(ptr));
        }
        Ok(frame)
    }

    /// The only synchronous nested-call mechanism in the VM: used exclusively
    /// by `Freeze`/`Anneal`'s contract and mutator closures, which need a
    /// result back *inline* before the enclosing opcode can finish. Ordinary
    /// `Call`/`MethodCall` never go through here — they just push a frame and
    /// let the single outer `drive(0)` loop started by `run` continue, so
    /// Lattice call depth costs a `Vec` entry, not a Rust stack frame.
    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        match &callee.kind {
            ValueKind::Builtin(f) => return f.clone()(&mut self.heap, &args),
            _ => {}
        }
        let floor = self.frames.len();
        let frame = self.build_frame(callee, args)?;
        self.push_frame(frame)?;
        self.drive(floor)?;
        self.pop()
    }

    fn run_defer(&mut self, function: Rc<RtFunction>, upvalues: Vec<Cell>, defer: DeferRecord) -> Result<()> {
        self.run_range(function, defer.slots, upvalues, defer.start, defer.count)?;
        Ok(())
    }

    /// Steps a bounded instruction range (`DeferBlock`, `Spawn`) to
    /// completion over its own slots, leaving exactly one value on the
    /// shared operand stack the way `lower_expr_block` compiles any
    /// expression block to contribute a single net value. Calls made from
    /// within the range push ordinary frames and run through the same
    /// bounded `drive`, so nested recursion here is still flat.
    fn run_range(&mut self, function: Rc<RtFunction>, slots: Vec<Cell>, upvalues: Vec<Cell>, start: Addr, count: u32) -> Result<Value> {
        let end = start + count;
        let floor = self.frames.len();
        self.push_frame(Frame { function, ip: start, slots, upvalues, arg_count: 0, defers: Vec::new() })?;
        loop {
            if self.frames.len() == floor + 1 && self.frames[floor].ip >= end {
                break;
            }
            match self.step_one() {
                Ok(Signal::Continue) => {}
                Ok(Signal::Halt) => break,
                Err(e) => self.unwind(e, floor)?,
            }
        }
        let frame = self.frames.pop().expect("run_range never unwinds past its own floor without returning Err");
        let fun = frame.function.clone();
        let upvalues = frame.upvalues.clone();
        for defer in frame.defers.into_iter().rev() {
            self.run_defer(fun.clone(), upvalues.clone(), defer)?;
        }
        self.pop()
    }

    // ---- the dispatch loop ----

    fn step_one(&mut self) -> Result<Signal> {
        let op = {
            let frame = self.current_frame();
            frame.function.chunk.code[frame.ip as usize].clone()
        };
        self.current_frame_mut().ip += 1;

        match op {
            OpCode::Const(idx) => {
                let value = self.const_at(idx).to_value();
                self.push(value)?;
            }
            OpCode::Nil => self.push(Value::nil())?,
            OpCode::True => self.push(Value::bool(true))?,
            OpCode::False => self.push(Value::bool(false))?,
            OpCode::Unit => self.push(Value::unit())?,
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Dup => {
                let v = self.peek()?.clone();
                self.push(v)?;
            }

            OpCode::GetLocal(slot) => {
                let v = self.current_frame().slots[slot as usize].borrow().clone();
                self.push(v)?;
            }
            OpCode::SetLocal(slot) => {
                let v = self.peek()?.clone();
                *self.current_frame().slots[slot as usize].borrow_mut() = v;
            }
            OpCode::GetGlobal(idx) => {
                let name = self.const_name(idx);
                let v = self
                    .globals
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| LatticeError::type_error(format!("undefined name `{name}`")))?;
                self.push(v)?;
            }
            OpCode::DefineGlobal(idx) => {
                let name = self.const_name(idx);
                let v = self.pop()?;
                self.globals.insert(name, v);
            }
            OpCode::SetGlobal(idx) => {
                let name = self.const_name(idx);
                if !self.globals.contains_key(&name) {
                    return Err(LatticeError::type_error(format!("undefined name `{name}`")));
                }
                let v = self.peek()?.clone();
                self.globals.insert(name, v);
            }
            OpCode::GetUpvalue(idx) => {
                let v = self.current_frame().upvalues[idx as usize].borrow().clone();
                self.push(v)?;
            }
            OpCode::SetUpvalue(idx) => {
                let v = self.peek()?.clone();
                *self.current_frame().upvalues[idx as usize].borrow_mut() = v;
            }

            OpCode::MakeArray(count) => {
                let items = self.pop_n_in_order(count as usize)?;
                let roots = self.roots();
                let ptr = self.heap.alloc(HeapObject::Array(items), self.current_ctx(), &roots);
                self.push(Value::new(self.current_phase(), ValueKind::Array(ptr)))?;
            }
            OpCode::MakeTuple(count) => {
                let items = self.pop_n_in_order(count as usize)?;
                self.push(Value::new(self.current_phase(), ValueKind::Tuple(Rc::from(items))))?;
            }
            OpCode::MakeMap(count) => {
                let raw = self.pop_n_in_order(count as usize * 2)?;
                let roots = self.roots();
                let ptr = self.heap.alloc(HeapObject::Map(lattice_core::containers::OpenMap::new()), self.current_ctx(), &roots);
                for pair in raw.chunks(2) {
                    let key = value_ops::display(&self.heap, &pair[0]);
                    lattice_runtime::builtins::map_ops::set(&mut self.heap, ptr, &key, pair[1].clone())?;
                }
                self.push(Value::new(self.current_phase(), ValueKind::Map(ptr)))?;
            }
            OpCode::MakeSet(count) => {
                let raw = self.pop_n_in_order(count as usize)?;
                let roots = self.roots();
                let ptr = self.heap.alloc(HeapObject::Set(lattice_core::containers::OpenMap::new()), self.current_ctx(), &roots);
                for v in raw {
                    lattice_runtime::builtins::set_ops::insert(&mut self.heap, ptr, v)?;
                }
                self.push(Value::new(self.current_phase(), ValueKind::Set(ptr)))?;
            }
            OpCode::GetField(idx) => {
                let name = self.const_name(idx);
                let base = self.pop()?;
                let ValueKind::Struct(ptr) = base.kind else {
                    return Err(LatticeError::type_error(format!("`{}` has no field `{name}`", base.type_name())));
                };
                match self.heap.get(ptr) {
                    Some(HeapObject::Struct(s)) => {
                        let v = s.get_field(&name).cloned().ok_or_else(|| {
                            LatticeError::type_error(format!("`{}` has no field `{name}`", s.type_name))
                        })?;
                        self.push(v)?;
                    }
                    _ => return Err(LatticeError::type_error("dangling struct handle")),
                }
            }
            OpCode::SetField(idx) => {
                let name = self.const_name(idx);
                let base = self.pop()?;
                let value = self.pop()?;
                let ValueKind::Struct(ptr) = base.kind else {
                    return Err(LatticeError::type_error(format!("`{}` has no field `{name}`", base.type_name())));
                };
                if base.is_crystal() {
                    return Err(LatticeError::phase_violation(format!(
                        "cannot assign to field `{name}` of a crystal struct"
                    )));
                }
                match self.heap.get_mut(ptr) {
                    Some(HeapObject::Struct(s)) => {
                        if !s.set_field(&name, value) {
                            return Err(LatticeError::type_error(format!("`{}` has no field `{name}`", s.type_name)));
                        }
                    }
                    _ => return Err(LatticeError::type_error("dangling struct handle")),
                }
            }
            OpCode::GetIndex => {
                let index = self.pop()?;
                let base = self.pop()?;
                self.push(self.get_index(&base, &index)?)?;
            }
            OpCode::SetIndex => {
                let index = self.pop()?;
                let base = self.pop()?;
                let value = self.pop()?;
                self.set_index(&base, &index, value)?;
            }

            OpCode::Add => self.binop_add()?,
            OpCode::Sub => self.binop_arith("-", |a, b| a.checked_sub(b), |a, b| a - b)?,
            OpCode::Mul => self.binop_arith("*", |a, b| a.checked_mul(b), |a, b| a * b)?,
            OpCode::Div => self.binop_div()?,
            OpCode::Mod => self.binop_mod()?,
            OpCode::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::bool(value_ops::deep_eq(&self.heap, &a, &b)))?;
            }
            OpCode::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::bool(!value_ops::deep_eq(&self.heap, &a, &b)))?;
            }
            OpCode::Lt => self.binop_compare(|o| o == std::cmp::Ordering::Less)?,
            OpCode::Le => self.binop_compare(|o| o != std::cmp::Ordering::Greater)?,
            OpCode::Gt => self.binop_compare(|o| o == std::cmp::Ordering::Greater)?,
            OpCode::Ge => self.binop_compare(|o| o != std::cmp::Ordering::Less)?,
            OpCode::BitOr => self.binop_bitwise("|", |a, b| a | b)?,
            OpCode::BitAnd => self.binop_bitwise("&", |a, b| a & b)?,
            OpCode::BitXor => self.binop_bitwise("^", |a, b| a ^ b)?,
            OpCode::Neg => {
                let v = self.pop()?;
                let out = match v.kind {
                    ValueKind::Int(n) => Value::new(v.phase, ValueKind::Int(-n)),
                    ValueKind::Float(n) => Value::new(v.phase, ValueKind::Float(-n)),
                    _ => return Err(LatticeError::type_error(format!("cannot negate `{}`", v.type_name()))),
                };
                self.push(out)?;
            }
            OpCode::Not => {
                let v = self.pop()?;
                self.push(Value::bool(!v.is_truthy()))?;
            }

            OpCode::Jump(addr) => self.current_frame_mut().ip = addr,
            OpCode::JumpIfFalse(addr) => {
                let v = self.pop()?;
                if !v.is_truthy() {
                    self.current_frame_mut().ip = addr;
                }
            }
            OpCode::JumpIfFalseNoPop(addr) => {
                if !self.peek()?.is_truthy() {
                    self.current_frame_mut().ip = addr;
                } else {
                    self.pop()?;
                }
            }
            OpCode::JumpIfTrueNoPop(addr) => {
                if self.peek()?.is_truthy() {
                    self.current_frame_mut().ip = addr;
                } else {
                    self.pop()?;
                }
            }
            OpCode::Loop(addr) => self.current_frame_mut().ip = addr,

            OpCode::ArgCount => {
                let n = self.current_frame().arg_count;
                self.push(Value::int(n as i64))?;
            }
            OpCode::Call(argc) => {
                let args = self.pop_n_in_order(argc as usize)?;
                let callee = self.pop()?;
                let frame = self.build_frame(callee, args)?;
                self.push_frame(frame)?;
            }
            OpCode::MethodCall(idx, argc) => {
                let method = self.const_name(idx);
                let args = self.pop_n_in_order(argc as usize)?;
                let receiver = self.pop()?;
                if matches!(receiver.kind, ValueKind::Struct(_)) {
                    let frame = self.build_struct_method_frame(&receiver, &method, args)?;
                    self.push_frame(frame)?;
                } else {
                    let result = crate::methods::call_method(self, &receiver, &method, args)?;
                    self.push(result)?;
                }
            }
            OpCode::CaptureLocal(slot) => {
                let c = self.current_frame().slots[slot as usize].clone();
                self.pending_captures_mut().push(c);
            }
            OpCode::CaptureUpvalue(idx) => {
                let c = self.current_frame().upvalues[idx as usize].clone();
                self.pending_captures_mut().push(c);
            }
            OpCode::MakeClosure(idx) => {
                let function = self.current_frame().function.chunk.functions[idx as usize].clone();
                let upvalues = std::mem::take(&mut self.pending_captures);
                let roots = self.roots();
                let vc = VmClosureObj { upvalues, function };
                let ptr = self.heap.alloc(HeapObject::VmClosure(vc), AllocCtx::Fluid, &roots);
                self.push(Value::fluid(ValueKind::Closure(ptr)))?;
            }
            OpCode::Return => {
                let result = self.pop()?;
                let frame = self.frames.pop().expect("Return only runs inside a live frame");
                let fun = frame.function.clone();
                let upvalues = frame.upvalues.clone();
                for defer in frame.defers.into_iter().rev() {
                    self.run_defer(fun.clone(), upvalues.clone(), defer)?;
                }
                self.handlers.retain(|h| h.frame_depth < self.frames.len());
                self.push(result)?;
                if self.frames.is_empty() {
                    return Ok(Signal::Halt);
                }
            }

            OpCode::Freeze { except_count, has_contract } => self.op_freeze(except_count, has_contract)?,
            OpCode::Thaw => {
                let v = self.pop()?;
                let roots = self.roots();
                self.push(value_ops::thaw(&mut self.heap, &v, &roots))?;
            }
            OpCode::CloneValue => {
                let v = self.pop()?;
                let roots = self.roots();
                self.push(value_ops::clone_value(&mut self.heap, &v, &roots))?;
            }
            OpCode::Anneal { has_contract } => self.op_anneal(has_contract)?,
            OpCode::PushForgeRegion => {
                let id = self.heap.create_region();
                self.alloc_ctx_stack.push(AllocCtx::Crystal(id));
            }
            OpCode::PopForgeRegion => {
                self.alloc_ctx_stack.pop();
            }

            OpCode::MakeStruct { type_name, field_count } => self.op_make_struct(type_name, field_count)?,
            OpCode::MakeEnum { enum_name, variant, payload_count } => {
                self.op_make_enum(enum_name, variant, payload_count)?
            }

            OpCode::TestPhase { is_crystal } => {
                let v = self.pop()?;
                self.push(Value::bool(v.is_crystal() == is_crystal))?;
            }
            OpCode::TestEq(idx) => {
                let v = self.pop()?;
                let lit = self.const_at(idx).clone();
                self.push(Value::bool(const_matches(&lit, &v)))?;
            }
            OpCode::TestRange { lo, hi } => {
                let v = self.pop()?;
                let matched = match (self.const_at(lo), self.const_at(hi), &v.kind) {
                    (ConstValue::Int(lo), ConstValue::Int(hi), ValueKind::Int(n)) => (*lo..*hi).contains(n),
                    _ => false,
                };
                self.push(Value::bool(matched))?;
            }
            OpCode::TestVariant { enum_name, variant, arity } => {
                let v = self.pop()?;
                self.push(Value::bool(self.test_variant(&v, enum_name, variant, arity)?))?;
            }
            OpCode::DestructureVariant { arity, first_slot } => {
                let v = self.pop()?;
                let ValueKind::Enum(ptr) = v.kind else {
                    return Err(LatticeError::type_error("DestructureVariant on a non-enum value"));
                };
                let payload = match self.heap.get(ptr) {
                    Some(HeapObject::Enum(e)) => e.payload.clone(),
                    _ => return Err(LatticeError::type_error("dangling enum handle")),
                };
                for i in 0..arity as usize {
                    *self.current_frame().slots[first_slot as usize + i].borrow_mut() = payload[i].clone();
                }
            }

            OpCode::RaiseContract { function, message } => {
                let function = self.const_name(function);
                let message = self.const_name(message);
                return Err(LatticeError::ContractViolation { function, message, loc: None });
            }
            OpCode::RaiseError { message } => {
                let message = self.const_name(message);
                return Err(LatticeError::type_error(message));
            }
            OpCode::UnwrapTry => self.op_unwrap_try()?,

            OpCode::TryBegin(target) => {
                self.handlers.push(Handler {
                    frame_depth: self.frames.len() - 1,
                    operand_depth: self.stack.len(),
                    target,
                });
            }
            OpCode::TryEnd => {
                self.handlers.pop();
            }
            OpCode::BindCaught(slot) => {
                let v = self.pop()?;
                *self.current_frame().slots[slot as usize].borrow_mut() = v;
            }
            OpCode::DeferBlock { start, count } => {
                let slots = self.current_frame().slots.clone();
                self.current_frame_mut().defers.push(DeferRecord { start, count, slots });
            }

            OpCode::MakeChannel => {
                let capacity = self.pop()?;
                let n = match capacity.kind {
                    ValueKind::Int(n) if n >= 0 => n as usize,
                    _ => return Err(LatticeError::type_error("channel(capacity) requires a non-negative int")),
                };
                let roots = self.roots();
                self.push(value_ops::new_channel(&mut self.heap, n, AllocCtx::Fluid, &roots))?;
            }
            OpCode::ChannelSend => {
                let value = self.pop()?;
                let chan = self.pop()?;
                let ValueKind::Channel(ptr) = chan.kind else {
                    return Err(LatticeError::type_error("send target is not a channel"));
                };
                loop {
                    match channel::try_send(&mut self.heap, ptr, value.clone())? {
                        SendOutcome::Sent => break,
                        SendOutcome::Closed => return Err(LatticeError::type_error("send on a closed channel")),
                        SendOutcome::Full => scheduler::yield_now(),
                    }
                }
                self.push(Value::unit())?;
            }
            OpCode::ChannelRecv => {
                let chan = self.pop()?;
                let ValueKind::Channel(ptr) = chan.kind else {
                    return Err(LatticeError::type_error("recv target is not a channel"));
                };
                loop {
                    match channel::try_recv(&mut self.heap, ptr)? {
                        RecvOutcome::Value(v) => {
                            self.push(v)?;
                            break;
                        }
                        RecvOutcome::Closed => {
                            self.push(Value::nil())?;
                            break;
                        }
                        RecvOutcome::Empty => scheduler::yield_now(),
                    }
                }
            }
            OpCode::TryRecv => {
                let chan = self.pop()?;
                let ValueKind::Channel(ptr) = chan.kind else {
                    return Err(LatticeError::type_error("recv target is not a channel"));
                };
                match channel::try_recv(&mut self.heap, ptr)? {
                    RecvOutcome::Value(v) => {
                        self.push(v)?;
                        self.push(Value::int(1))?;
                    }
                    RecvOutcome::Empty => {
                        self.push(Value::nil())?;
                        self.push(Value::int(0))?;
                    }
                    RecvOutcome::Closed => {
                        self.push(Value::nil())?;
                        self.push(Value::int(2))?;
                    }
                }
            }
            OpCode::NowMillis => {
                let millis = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                self.push(Value::int(millis))?;
            }
            OpCode::Spawn { start, count } => {
                let function = self.current_frame().function.clone();
                let upvalues = self.current_frame().upvalues.clone();
                let values: Vec<Value> = self.current_frame().slots.iter().map(|c| c.borrow().clone()).collect();
                let roots = self.roots();
                let slots: Vec<Cell> =
                    values.into_iter().map(|v| cell(value_ops::clone_value(&mut self.heap, &v, &roots))).collect();
                let result = self.run_range(function, slots, upvalues, start, count)?;
                self.push(result)?;
            }
            OpCode::Yield => scheduler::yield_now(),

            OpCode::Halt => return Ok(Signal::Halt),
        }
        Ok(Signal::Continue)
    }

    // ---- small dispatch helpers, split out of `step_one` for readability ----

    fn pending_captures_mut(&mut self) -> &mut Vec<Cell> {
        // Stashed on the VM rather than the frame: captures accumulate across
        // the run of `CaptureLocal`/`CaptureUpvalue` instructions that
        // precede a single `MakeClosure`, which belong to the *enclosing*
        // frame, not the closure being built.
        &mut self.pending_captures
    }

    fn const_at(&self, idx: u32) -> &ConstValue {
        &self.current_frame().function.chunk.constants[idx as usize]
    }

    fn const_name(&self, idx: u32) -> String {
        match self.const_at(idx) {
            ConstValue::String(s) => s.clone(),
            other => panic!("expected a string constant, found {other:?}"),
        }
    }

    fn pop_n_in_order(&mut self, n: usize) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.pop()?);
        }
        items.reverse();
        Ok(items)
    }

    fn get_index(&mut self, base: &Value, index: &Value) -> Result<Value> {
        use lattice_runtime::builtins::{array_ops, buffer_ops, map_ops, string_ops};
        match &base.kind {
            ValueKind::Array(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("array index must be an int"));
                };
                array_ops::get(&mut self.heap, *ptr, i)
            }
            ValueKind::Tuple(items) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("tuple index must be an int"));
                };
                let idx = normalize_index(i, items.len())?;
                Ok(items[idx].clone())
            }
            ValueKind::Map(ptr) => {
                let key = value_ops::display(&self.heap, index);
                Ok(map_ops::get(&self.heap, *ptr, &key)?.unwrap_or_else(Value::nil))
            }
            ValueKind::Buffer(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("buffer index must be an int"));
                };
                Ok(Value::int(buffer_ops::get_byte(&self.heap, *ptr, i)? as i64))
            }
            ValueKind::String(s) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("string index must be an int"));
                };
                Ok(Value::new(base.phase, ValueKind::String(lattice_runtime::string::LString::new_fluid(
                    string_ops::char_at(s, i)?,
                ))))
            }
            _ => Err(LatticeError::type_error(format!("`{}` is not indexable", base.type_name()))),
        }
    }

    fn set_index(&mut self, base: &Value, index: &Value, value: Value) -> Result<()> {
        use lattice_runtime::builtins::{array_ops, buffer_ops, map_ops};
        if base.is_crystal() {
            return Err(LatticeError::phase_violation("cannot index-assign into a crystal value"));
        }
        match &base.kind {
            ValueKind::Array(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("array index must be an int"));
                };
                array_ops::set(&mut self.heap, *ptr, i, value)
            }
            ValueKind::Map(ptr) => {
                let key = value_ops::display(&self.heap, index);
                map_ops::set(&mut self.heap, *ptr, &key, value)
            }
            ValueKind::Buffer(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("buffer index must be an int"));
                };
                let ValueKind::Int(b) = value.kind else {
                    return Err(LatticeError::type_error("buffer byte assignment must be an int"));
                };
                buffer_ops::set_byte(&mut self.heap, *ptr, i, b as u8)
            }
            _ => Err(LatticeError::type_error(format!("`{}` is not index-assignable", base.type_name()))),
        }
    }

    fn binop_add(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let out = match (&a.kind, &b.kind) {
            (ValueKind::Int(x), ValueKind::Int(y)) => {
                Value::int(x.checked_add(*y).ok_or_else(|| LatticeError::Overflow { message: "+".to_string() })?)
            }
            (ValueKind::Float(x), ValueKind::Float(y)) => Value::float(x + y),
            (ValueKind::Int(x), ValueKind::Float(y)) => Value::float(*x as f64 + y),
            (ValueKind::Float(x), ValueKind::Int(y)) => Value::float(x + *y as f64),
            (ValueKind::String(x), ValueKind::String(y)) => {
                let ctx = self.current_ctx();
                lattice_runtime::builtins::string_ops::concat(x, y, self.current_phase(), ctx.region())
            }
            _ => return Err(LatticeError::type_error(format!("cannot add `{}` and `{}`", a.type_name(), b.type_name()))),
        };
        self.push(out)?;
        Ok(())
    }

    fn binop_arith(&mut self, verb: &str, int_op: impl Fn(i64, i64) -> Option<i64>, float_op: impl Fn(f64, f64) -> f64) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let out = match (&a.kind, &b.kind) {
            (ValueKind::Int(x), ValueKind::Int(y)) => {
                Value::int(int_op(*x, *y).ok_or_else(|| LatticeError::Overflow { message: verb.to_string() })?)
            }
            (ValueKind::Float(x), ValueKind::Float(y)) => Value::float(float_op(*x, *y)),
            (ValueKind::Int(x), ValueKind::Float(y)) => Value::float(float_op(*x as f64, *y)),
            (ValueKind::Float(x), ValueKind::Int(y)) => Value::float(float_op(*x, *y as f64)),
            _ => {
                return Err(LatticeError::type_error(format!(
                    "cannot apply `{verb}` to `{}` and `{}`",
                    a.type_name(),
                    b.type_name()
                )))
            }
        };
        self.push(out)?;
        Ok(())
    }

    fn binop_div(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let out = match (&a.kind, &b.kind) {
            (ValueKind::Int(_), ValueKind::Int(0)) => return Err(LatticeError::DivisionByZero { loc: None }),
            (ValueKind::Int(x), ValueKind::Int(y)) => Value::int(x / y),
            (ValueKind::Float(x), ValueKind::Float(y)) => Value::float(x / y),
            (ValueKind::Int(x), ValueKind::Float(y)) => Value::float(*x as f64 / y),
            (ValueKind::Float(x), ValueKind::Int(y)) => Value::float(x / *y as f64),
            _ => return Err(LatticeError::type_error(format!("cannot divide `{}` by `{}`", a.type_name(), b.type_name()))),
        };
        self.push(out)?;
        Ok(())
    }

    fn binop_mod(&mut self) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let out = match (&a.kind, &b.kind) {
            (ValueKind::Int(_), ValueKind::Int(0)) => return Err(LatticeError::DivisionByZero { loc: None }),
            (ValueKind::Int(x), ValueKind::Int(y)) => Value::int(x % y),
            (ValueKind::Float(x), ValueKind::Float(y)) => Value::float(x % y),
            (ValueKind::Int(x), ValueKind::Float(y)) => Value::float(*x as f64 % y),
            (ValueKind::Float(x), ValueKind::Int(y)) => Value::float(x % *y as f64),
            _ => return Err(LatticeError::type_error(format!("cannot modulo `{}` by `{}`", a.type_name(), b.type_name()))),
        };
        self.push(out)?;
        Ok(())
    }

    fn binop_compare(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a.kind, &b.kind) {
            (ValueKind::Int(x), ValueKind::Int(y)) => x.partial_cmp(y),
            (ValueKind::Float(x), ValueKind::Float(y)) => x.partial_cmp(y),
            (ValueKind::Int(x), ValueKind::Float(y)) => (*x as f64).partial_cmp(y),
            (ValueKind::Float(x), ValueKind::Int(y)) => x.partial_cmp(&(*y as f64)),
            (ValueKind::String(x), ValueKind::String(y)) => x.as_str().partial_cmp(y.as_str()),
            _ => return Err(LatticeError::type_error(format!("cannot compare `{}` and `{}`", a.type_name(), b.type_name()))),
        };
        let ordering = ordering.ok_or_else(|| LatticeError::type_error("comparison produced no ordering (NaN?)"))?;
        self.push(Value::bool(accept(ordering)))?;
        Ok(())
    }

    fn binop_bitwise(&mut self, symbol: &str, op: impl Fn(i64, i64) -> i64) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let (ValueKind::Int(x), ValueKind::Int(y)) = (&a.kind, &b.kind) else {
            return Err(LatticeError::type_error(format!(
                "`{symbol}` requires int operands, found `{}` and `{}`",
                a.type_name(),
                b.type_name()
            )));
        };
        self.push(Value::int(op(*x, *y)))?;
        Ok(())
    }

    fn build_struct_method_frame(&mut self, receiver: &Value, method: &str, mut args: Vec<Value>) -> Result<Frame> {
        let ValueKind::Struct(ptr) = receiver.kind else {
            return Err(LatticeError::type_error("not a struct"));
        };
        let type_name = match self.heap.get(ptr) {
            Some(HeapObject::Struct(s)) => s.type_name.to_string(),
            _ => return Err(LatticeError::type_error("dangling struct handle")),
        };
        let function = self
            .methods
            .get(&type_name)
            .and_then(|methods| methods.get(method))
            .cloned()
            .ok_or_else(|| LatticeError::type_error(format!("`{type_name}` has no method `{method}`")))?;
        args.insert(0, receiver.clone());
        self.bind_frame(function, Vec::new(), args)
    }

    fn op_freeze(&mut self, except_count: u32, has_contract: bool) -> Result<()> {
        let contract = if has_contract { Some(self.pop()?) } else { None };
        let except: Vec<String> = self
            .pop_n_in_order(except_count as usize)?
            .into_iter()
            .map(|v| value_ops::display(&self.heap, &v))
            .collect();
        let value = self.pop()?;
        let roots = self.roots();
        let frozen = self.freeze_value(&value, &except, contract, &roots)?;
        self.push(frozen)?;
        Ok(())
    }

    fn freeze_value(&mut self, value: &Value, except: &[String], contract: Option<Value>, roots: &[FluidHandle]) -> Result<Value> {
        match contract {
            Some(c) => {
                // `value_ops::freeze`'s contract closure needs `&mut self` to
                // call back into `call_value`, which a plain closure can't
                // borrow alongside `self.heap`'s own `&mut` — so freeze is
                // reimplemented inline here rather than through the shared
                // helper, mirroring the region-create/clone/except steps by
                // hand and invoking the contract as a separate step.
                let region = self.heap.create_region();
                let cloned = value_ops::deep_clone(&mut self.heap, value, AllocCtx::Crystal(region), roots);
                apply_except_fields(&mut self.heap, &cloned, except);
                match self.call_value(c, vec![cloned.clone()]) {
                    Ok(v) if v.is_truthy() => Ok(cloned),
                    Ok(_) => {
                        self.heap.teardown_region(region);
                        Err(LatticeError::ContractViolation {
                            function: "freeze".to_string(),
                            message: "freeze contract failed".to_string(),
                            loc: None,
                        })
                    }
                    Err(e) => {
                        self.heap.teardown_region(region);
                        Err(e)
                    }
                }
            }
            None => {
                let region = self.heap.create_region();
                let cloned = value_ops::deep_clone(&mut self.heap, value, AllocCtx::Crystal(region), roots);
                apply_except_fields(&mut self.heap, &cloned, except);
                Ok(cloned)
            }
        }
    }

    fn op_anneal(&mut self, has_contract: bool) -> Result<()> {
        let contract = if has_contract { Some(self.pop()?) } else { None };
        let mutator = self.pop()?;
        let value = self.pop()?;
        let roots = self.roots();
        let thawed = value_ops::thaw(&mut self.heap, &value, &roots);
        self.call_value(mutator, vec![thawed.clone()])?;
        let roots = self.roots();
        let frozen = self.freeze_value(&thawed, &[], contract, &roots)?;
        self.push(frozen)?;
        Ok(())
    }

    fn op_make_struct(&mut self, type_name: u32, field_count: u32) -> Result<()> {
        let type_name = self.const_name(type_name);
        let raw = self.pop_n_in_order(field_count as usize * 2)?;
        let decl = self
            .structs
            .get(&type_name)
            .ok_or_else(|| LatticeError::type_error(format!("unknown struct `{type_name}`")))?;
        if field_count as usize != decl.fields.len() {
            return Err(LatticeError::arity_error(format!(
                "struct `{type_name}` expects {} fields, got {}",
                decl.fields.len(),
                field_count
            )));
        }
        let mut by_name: HashMap<String, Value> = HashMap::new();
        for pair in raw.chunks(2) {
            let name = value_ops::display(&self.heap, &pair[0]);
            by_name.insert(name, pair[1].clone());
        }
        let mut fields = Vec::with_capacity(decl.fields.len());
        for name in &decl.fields {
            let value = by_name
                .remove(name)
                .ok_or_else(|| LatticeError::KeyError { message: format!("struct `{type_name}` is missing field `{name}`"), loc: None })?;
            fields.push(value);
        }
        let field_names: Rc<[Rc<str>]> = decl.fields.iter().map(|n| Rc::from(n.as_str())).collect();
        let phase = self.current_phase();
        let instance = StructInstance {
            type_name: Rc::from(type_name.as_str()),
            field_names,
            fields,
            field_phases: vec![phase; decl.fields.len()],
        };
        let roots = self.roots();
        let ptr = self.heap.alloc(HeapObject::Struct(instance), self.current_ctx(), &roots);
        self.push(Value::new(phase, ValueKind::Struct(ptr)))?;
        Ok(())
    }

    fn op_make_enum(&mut self, enum_name: Option<u32>, variant: u32, payload_count: u32) -> Result<()> {
        let variant_name = self.const_name(variant);
        let payload = self.pop_n_in_order(payload_count as usize)?;
        let resolved_enum = match enum_name {
            Some(idx) => {
                let name = self.const_name(idx);
                self.enums
                    .iter()
                    .find(|e| e.name == name)
                    .ok_or_else(|| LatticeError::type_error(format!("unknown enum `{name}`")))?
            }
            None => self
                .enums
                .iter()
                .find(|e| e.variants.iter().any(|(v, _)| *v == variant_name))
                .ok_or_else(|| LatticeError::type_error(format!("no enum declares variant `{variant_name}`")))?,
        };
        let (_, arity) = resolved_enum
            .variants
            .iter()
            .find(|(v, _)| *v == variant_name)
            .ok_or_else(|| LatticeError::type_error(format!("no enum declares variant `{variant_name}`")))?;
        if payload.len() as u32 != *arity {
            return Err(LatticeError::arity_error(format!(
                "variant `{}.{variant_name}` expects {arity} payload values, got {}",
                resolved_enum.name,
                payload.len()
            )));
        }
        let instance = EnumInstance {
            enum_name: Rc::from(resolved_enum.name.as_str()),
            variant: Rc::from(variant_name.as_str()),
            payload,
        };
        let phase = self.current_phase();
        let roots = self.roots();
        let ptr = self.heap.alloc(HeapObject::Enum(instance), self.current_ctx(), &roots);
        self.push(Value::new(phase, ValueKind::Enum(ptr)))?;
        Ok(())
    }

    fn test_variant(&self, v: &Value, enum_name: Option<u32>, variant: u32, arity: u32) -> Result<bool> {
        let ValueKind::Enum(ptr) = v.kind else {
            return Ok(false);
        };
        let instance = match self.heap.get(ptr) {
            Some(HeapObject::Enum(e)) => e,
            _ => return Err(LatticeError::type_error("dangling enum handle")),
        };
        let variant_name = self.const_name(variant);
        if *instance.variant != *variant_name {
            return Ok(false);
        }
        if let Some(idx) = enum_name {
            let name = self.const_name(idx);
            if *instance.enum_name != *name {
                return Ok(false);
            }
        }
        Ok(instance.payload.len() as u32 == arity)
    }

    fn op_unwrap_try(&mut self) -> Result<()> {
        let v = self.pop()?;
        let ValueKind::Enum(ptr) = v.kind else {
            self.push(v)?;
            return Ok(());
        };
        let instance = match self.heap.get(ptr) {
            Some(HeapObject::Enum(e)) => e.clone(),
            _ => return Err(LatticeError::type_error("dangling enum handle")),
        };
        match instance.variant.as_ref() {
            "Err" | "None" => {
                let message = instance
                    .payload
                    .first()
                    .map(|p| value_ops::display(&self.heap, p))
                    .unwrap_or_else(|| format!("{}.{}", instance.enum_name, instance.variant));
                Err(LatticeError::type_error(message))
            }
            _ => {
                let out = instance.payload.first().cloned().unwrap_or_else(Value::unit);
                self.push(out)?;
                Ok(())
            }
        }
    }
}

fn resolve_callee(heap: &Heap, callee: &Value) -> Result<(Rc<RtFunction>, Vec<Cell>)> {
    let ValueKind::Closure(ptr) = &callee.kind else {
        return Err(LatticeError::type_error(format!("`{}` is not callable", callee.type_name())));
    };
    match heap.get(*ptr) {
        Some(HeapObject::VmClosure(vc)) => {
            let function = vc
                .function
                .clone()
                .downcast::<RtFunction>()
                .map_err(|_| LatticeError::type_error("closure body is not a bytecode function"))?;
            Ok((function, vc.upvalues.clone()))
        }
        Some(HeapObject::Closure(_)) => Err(LatticeError::type_error("dangling or non-bytecode closure handle")),
        _ => Err(LatticeError::type_error("dangling closure handle")),
    }
}

/// Mirrors `lattice-evaluator::pattern::literal_matches` exactly: only
/// matching-kind equality counts, unlike `Eq`'s looser numeric coercion.
fn const_matches(lit: &ConstValue, value: &Value) -> bool {
    match (lit, &value.kind) {
        (ConstValue::Unit, ValueKind::Unit) => true,
        (ConstValue::Nil, ValueKind::Nil) => true,
        (ConstValue::Bool(a), ValueKind::Bool(b)) => a == b,
        (ConstValue::Int(a), ValueKind::Int(b)) => a == b,
        (ConstValue::Float(a), ValueKind::Float(b)) => a == b,
        (ConstValue::String(a), ValueKind::String(b)) => a.as_str() == b.as_str(),
        _ => false,
    }
}

fn normalize_index(i: i64, len: usize) -> Result<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx as usize >= len {
        return Err(LatticeError::IndexError { message: format!("index {i} out of bounds for length {len}"), loc: None });
    }
    Ok(idx as usize)
}

/// Local duplicate of `lattice-evaluator::eval`'s own `apply_except_fields`
/// (that one is `pub(crate)` to a different crate) — flips the named fields
/// of a just-frozen struct back to fluid.
fn apply_except_fields(heap: &mut Heap, value: &Value, except: &[String]) {
    if except.is_empty() {
        return;
    }
    let ValueKind::Struct(ptr) = value.kind else { return };
    if let Some(HeapObject::Struct(s)) = heap.get_mut(ptr) {
        for name in except {
            if let Some(pos) = s.field_names.iter().position(|f| f.as_ref() == name.as_str()) {
                s.field_phases[pos] = Phase::Fluid;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ast::builders::*;
    use lattice_ast::BinOp;

    // spec §8: the 1001st nested call raises `Overflow` instead of growing
    // `frames` without bound.
    #[test]
    fn call_depth_beyond_1000_overflows() {
        let source = program(vec![
            function(
                "recurse",
                [param("n")],
                [return_stmt(Some(call_fn("recurse", [binary(BinOp::Add, ident("n"), int(1))])))],
            ),
            lattice_ast::Item::Stmt(expr_stmt(call_fn("recurse", [int(0)]))),
        ]);
        let chunk = lattice_compiler::Compiler::compile(&source).unwrap();
        let linked = crate::rt::load(chunk);
        let mut vm = Vm::new(RuntimeFlags::default());

        let err = vm.run(linked).unwrap_err();
        assert!(matches!(err, LatticeError::Overflow { .. }), "got {err:?}");
    }
}
