//! The tree-walking evaluator (spec §4.4): the reference execution semantics
//! every other backend (`lattice-vm`) must agree with on deterministic
//! programs.
//!
//! `Evaluator` owns the dual heap and every cross-cutting registry
//! (bonds/reactions/seeds/pressures/module cache) the language's phase model
//! needs, the way the teacher's `runtime::Interpreter` owns its memory
//! manager and scheduler registries in one struct rather than threading them
//! through every call individually.

use crate::control_flow::ControlFlow;
use crate::module::{ModuleResolver, NoModules};
use crate::pattern;
use lattice_ast::{
    AssignTarget, BinOp, CompoundOp, EnumDecl, Expr, FunctionDecl, Item, Literal, PhaseOp, Program,
    StructDecl, Stmt, UnOp,
};
use lattice_core::containers::OpenMap;
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::{AllocCtx, LatticeError, Phase, Result, RuntimeFlags};
use lattice_runtime::bonds::{BondEffect, BondRegistry};
use lattice_runtime::heap_object::HeapObject;
use lattice_runtime::module_cache::ModuleCache;
use lattice_runtime::pressures::PressureRegistry;
use lattice_runtime::reactions::ReactionRegistry;
use lattice_runtime::seeds::SeedRegistry;
use lattice_runtime::string::LString;
use lattice_runtime::value::{ClosureObj, EnumInstance, StructInstance};
use lattice_runtime::value_ops;
use lattice_runtime::{Environment, Heap, Value, ValueKind};
use std::rc::Rc;

/// The tree-walker's execution state (spec §4.4). One `Evaluator` per
/// program run; `lattice-cli` constructs one per invocation.
pub struct Evaluator {
    pub(crate) heap: Heap,
    pub(crate) globals: Environment,
    pub(crate) structs: OpenMap<Rc<StructDecl>>,
    pub(crate) enums: OpenMap<Rc<EnumDecl>>,
    /// `type_name -> method_name -> decl`, populated by `impl` blocks.
    pub(crate) impls: OpenMap<OpenMap<Rc<FunctionDecl>>>,
    pub(crate) bonds: BondRegistry,
    pub(crate) reactions: ReactionRegistry,
    pub(crate) seeds: SeedRegistry,
    pub(crate) pressures: PressureRegistry,
    pub(crate) module_cache: ModuleCache,
    pub(crate) resolver: Rc<dyn ModuleResolver>,
    /// Every call's environment, used only to trace GC roots (spec §3.3) —
    /// call semantics themselves live in `call.rs`'s `invoke`.
    pub(crate) call_stack: Vec<Environment>,
    /// One frame per live call, each a LIFO list of deferred blocks (spec §4.4 Defer).
    pub(crate) defer_stack: Vec<Vec<Vec<Stmt>>>,
    /// The routed allocation context a `forge` block installs for container
    /// literals evaluated inside it (spec §3.2, §4.4 Forge).
    pub(crate) alloc_ctx_stack: Vec<AllocCtx>,
}

impl Evaluator {
    pub fn new(flags: RuntimeFlags) -> Self {
        Evaluator::with_resolver(flags, Rc::new(NoModules))
    }

    pub fn with_resolver(flags: RuntimeFlags, resolver: Rc<dyn ModuleResolver>) -> Self {
        let mut evaluator = Evaluator {
            heap: Heap::new(flags),
            globals: Environment::new(),
            structs: OpenMap::new(),
            enums: OpenMap::new(),
            impls: OpenMap::new(),
            bonds: BondRegistry::new(),
            reactions: ReactionRegistry::new(),
            seeds: SeedRegistry::new(),
            pressures: PressureRegistry::new(),
            module_cache: ModuleCache::new(),
            resolver,
            call_stack: Vec::new(),
            defer_stack: Vec::new(),
            alloc_ctx_stack: Vec::new(),
        };
        evaluator.install_builtins();
        evaluator
    }

    /// Binds the demonstration built-ins (spec §8: `print`, `channel`, ...)
    /// into `globals` so ordinary `Call` expressions reach them like any
    /// user-defined function — no separate "intrinsic call" AST node.
    fn install_builtins(&mut self) {
        self.globals.define(
            "print",
            Value::fluid(ValueKind::Builtin(Rc::new(|heap: &mut Heap, args: &[Value]| {
                let parts: Vec<String> = args.iter().map(|v| value_ops::display(heap, v)).collect();
                println!("{}", parts.join(" "));
                Ok(Value::unit())
            }))),
        );
        self.globals.define(
            "channel",
            Value::fluid(ValueKind::Builtin(Rc::new(|heap: &mut Heap, args: &[Value]| {
                let capacity = match args.first() {
                    Some(Value { kind: ValueKind::Int(n), .. }) if *n >= 0 => *n as usize,
                    Some(_) => return Err(LatticeError::type_error("channel(capacity) requires an int capacity")),
                    None => 0,
                };
                Ok(crate::concurrency::new_channel(heap, capacity, &[]))
            }))),
        );
    }

    /// Every `FluidHandle` reachable from live state, for the fluid GC's mark
    /// phase (spec §3.3: environments are the GC's root set).
    pub(crate) fn roots(&self) -> Vec<FluidHandle> {
        let mut out = Vec::new();
        self.globals.trace_into(&mut out);
        for env in &self.call_stack {
            env.trace_into(&mut out);
        }
        out
    }

    pub(crate) fn current_ctx(&self) -> AllocCtx {
        self.alloc_ctx_stack.last().copied().unwrap_or(AllocCtx::Fluid)
    }

    pub(crate) fn current_phase(&self) -> Phase {
        match self.current_ctx() {
            AllocCtx::Fluid => Phase::Fluid,
            AllocCtx::Crystal(_) => Phase::Crystal,
        }
    }

    /// Runs every top-level item, in order (spec §3.4): declarations register
    /// into the evaluator's tables, bare statements execute immediately.
    pub fn eval_program(&mut self, program: &Program) -> Result<()> {
        for item in &program.items {
            self.register_item(item)?;
        }
        Ok(())
    }

    fn register_item(&mut self, item: &Item) -> Result<()> {
        match item {
            Item::Function(decl) => {
                let closure = self.make_named_closure(decl.clone());
                self.globals.define(&decl.name, closure);
                Ok(())
            }
            Item::Struct(decl) => {
                self.structs.set(&decl.name, decl.clone());
                Ok(())
            }
            Item::Enum(decl) => {
                self.enums.set(&decl.name, decl.clone());
                Ok(())
            }
            Item::Trait(_) => {
                // Traits name a method contract only; nothing to register
                // beyond the `impl` blocks that actually supply bodies
                // (spec §3.4 names `trait` only as a declaration, with no
                // described runtime effect of its own).
                Ok(())
            }
            Item::Impl(decl) => {
                let mut methods = self.impls.get(&decl.type_name).cloned().unwrap_or_default();
                for method in &decl.methods {
                    methods.set(&method.name, method.clone());
                }
                self.impls.set(&decl.type_name, methods);
                Ok(())
            }
            Item::Stmt(stmt) => {
                self.eval_stmt(&self.globals.clone(), stmt)?;
                Ok(())
            }
            Item::Test(test) => {
                // Running tests on load would surprise a caller that merely
                // wants to load a library module; `lattice-cli`'s test-run
                // mode invokes `eval_block` on `test.body` directly instead.
                let _ = test;
                Ok(())
            }
        }
    }

    fn make_named_closure(&mut self, decl: Rc<FunctionDecl>) -> Value {
        let roots = self.roots();
        let obj = ClosureObj {
            decl: Some(decl.clone()),
            params: Rc::from(decl.params.clone()),
            variadic: decl.variadic.as_deref().map(Rc::from),
            body: Rc::from(decl.body.clone()),
            captured_env: self.globals.clone(),
        };
        let ptr = self.heap.alloc(HeapObject::Closure(obj), AllocCtx::Fluid, &roots);
        Value::fluid(ValueKind::Closure(ptr))
    }

    /// Evaluates `body` expecting either `ControlFlow::Return` or a plain
    /// fall-through value (spec §4.4): the signal a `match`/`forge`/
    /// `try`/`select`/`spawn` body resolves to when treated as an
    /// expression rather than a function body. `break`/`continue` inside one
    /// of these bodies is rejected — this tree-walker does not thread loop
    /// control through expression position (documented simplification, see
    /// DESIGN.md).
    pub(crate) fn block_value(&self, flow: ControlFlow) -> Result<Value> {
        match flow {
            ControlFlow::Return(v) => Ok(v),
            ControlFlow::None => Ok(Value::unit()),
            ControlFlow::Break | ControlFlow::Continue => {
                Err(LatticeError::type_error("`break`/`continue` used outside a loop"))
            }
        }
    }

    pub(crate) fn eval_block(&mut self, env: &Environment, body: &[Stmt]) -> Result<ControlFlow> {
        env.push_scope();
        let result = self.eval_block_in_place(env, body);
        env.pop_scope();
        result
    }

    fn eval_block_in_place(&mut self, env: &Environment, body: &[Stmt]) -> Result<ControlFlow> {
        for stmt in body {
            let flow = self.eval_stmt(env, stmt)?;
            if flow.interrupts() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::None)
    }

    fn eval_stmt(&mut self, env: &Environment, stmt: &Stmt) -> Result<ControlFlow> {
        match stmt {
            Stmt::Let { kind, pattern, init, .. } => {
                let value = self.eval_expr(env, init)?;
                let value = self.apply_binding_phase(*kind, value)?;
                pattern::bind_pattern(env, &mut self.heap, pattern, &value)?;
                Ok(ControlFlow::None)
            }
            Stmt::Assign { target, value, .. } => {
                let value = self.eval_expr(env, value)?;
                self.assign_target(env, target, value)?;
                Ok(ControlFlow::None)
            }
            Stmt::CompoundAssign { target, op, value, .. } => {
                let current = self.read_target(env, target)?;
                let rhs = self.eval_expr(env, value)?;
                let combined = self.apply_compound(*op, &current, &rhs)?;
                self.assign_target(env, target, combined)?;
                Ok(ControlFlow::None)
            }
            Stmt::Expr(expr) => {
                self.eval_expr(env, expr)?;
                Ok(ControlFlow::None)
            }
            Stmt::If { cond, then_branch, else_branch } => {
                if self.eval_expr(env, cond)?.is_truthy() {
                    self.eval_block(env, then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval_block(env, else_branch)
                } else {
                    Ok(ControlFlow::None)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval_expr(env, cond)?.is_truthy() {
                    match self.eval_block(env, body)? {
                        ControlFlow::Break => break,
                        ControlFlow::Continue | ControlFlow::None => {}
                        ret @ ControlFlow::Return(_) => return Ok(ret),
                    }
                }
                Ok(ControlFlow::None)
            }
            Stmt::Loop { body } => loop {
                match self.eval_block(env, body)? {
                    ControlFlow::Break => return Ok(ControlFlow::None),
                    ControlFlow::Continue | ControlFlow::None => {}
                    ret @ ControlFlow::Return(_) => return Ok(ret),
                }
            },
            Stmt::ForIn { binding, iter, body } => {
                let iterable = self.eval_expr(env, iter)?;
                let items = self.iterate(&iterable)?;
                for item in items {
                    env.push_scope();
                    let bind_result = pattern::bind_pattern(env, &mut self.heap, binding, &item);
                    if let Err(e) = bind_result {
                        env.pop_scope();
                        return Err(e);
                    }
                    let flow = self.eval_block_in_place(env, body);
                    env.pop_scope();
                    match flow? {
                        ControlFlow::Break => break,
                        ControlFlow::Continue | ControlFlow::None => {}
                        ret @ ControlFlow::Return(_) => return Ok(ret),
                    }
                }
                Ok(ControlFlow::None)
            }
            Stmt::Break => Ok(ControlFlow::Break),
            Stmt::Continue => Ok(ControlFlow::Continue),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::unit(),
                };
                Ok(ControlFlow::Return(value))
            }
            Stmt::Defer(body) => {
                if let Some(top) = self.defer_stack.last_mut() {
                    top.push(body.clone());
                } else {
                    // `defer` at top level (outside any call frame) has
                    // nothing to run at: it never fires. Documented as a
                    // no-op rather than an error, matching Go's top-level
                    // `defer` (runs at program exit, which this interpreter
                    // has no hook for).
                }
                Ok(ControlFlow::None)
            }
            Stmt::Import { path, alias, names } => {
                self.import(env, path, alias.as_deref(), names)?;
                Ok(ControlFlow::None)
            }
            Stmt::Block(body) => self.eval_block(env, body),
        }
    }

    fn apply_binding_phase(&mut self, kind: lattice_ast::BindingKind, value: Value) -> Result<Value> {
        use lattice_ast::BindingKind;
        match kind {
            // Ambient phase: casual mode leaves the value exactly as
            // evaluated. Strict-mode phase-checking is an external
            // collaborator (spec §6.2), not modeled here.
            BindingKind::Let => Ok(value),
            BindingKind::Flux => {
                if value.is_crystal() {
                    let roots = self.roots();
                    Ok(value_ops::thaw(&mut self.heap, &value, &roots))
                } else {
                    Ok(value)
                }
            }
            BindingKind::Fix => {
                if value.is_fluid() {
                    self.freeze_value(&value, &[], None)
                } else {
                    Ok(value)
                }
            }
        }
    }

    pub(crate) fn iterate(&mut self, value: &Value) -> Result<Vec<Value>> {
        match &value.kind {
            ValueKind::Array(ptr) => match self.heap.get(*ptr) {
                Some(HeapObject::Array(items)) => Ok(items.clone()),
                _ => Err(LatticeError::type_error("dangling array handle")),
            },
            ValueKind::Set(ptr) => match self.heap.get(*ptr) {
                Some(HeapObject::Set(m)) => Ok(m.iter().map(|(_, v)| v.clone()).collect()),
                _ => Err(LatticeError::type_error("dangling set handle")),
            },
            ValueKind::Map(ptr) => {
                let entries: Vec<(String, Value)> = match self.heap.get(*ptr) {
                    Some(HeapObject::Map(m)) => m.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                    _ => return Err(LatticeError::type_error("dangling map handle")),
                };
                let mut pairs = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = Value::fluid(ValueKind::String(LString::new_fluid(k)));
                    pairs.push(Value::new(value.phase, ValueKind::Tuple(Rc::from(vec![key, v]))));
                }
                Ok(pairs)
            }
            ValueKind::String(s) => Ok(s
                .as_str()
                .chars()
                .map(|c| Value::fluid(ValueKind::String(LString::new_fluid(c.to_string()))))
                .collect()),
            _ => Err(LatticeError::type_error(format!("cannot iterate a {}", value.type_name()))),
        }
    }

    fn assign_target(&mut self, env: &Environment, target: &AssignTarget, value: Value) -> Result<()> {
        match target {
            AssignTarget::Ident(name) => {
                let previous_phase = env.get(name).map(|v| v.phase);
                env.set(name, value.clone())?;
                if previous_phase != Some(value.phase) {
                    self.on_phase_transition(env, name, value.phase)?;
                }
                Ok(())
            }
            AssignTarget::Field { base, field } => {
                let base_value = self.eval_expr(env, base)?;
                let ValueKind::Struct(ptr) = base_value.kind else {
                    return Err(LatticeError::type_error("field assignment target is not a struct"));
                };
                if base_value.is_crystal() {
                    return Err(LatticeError::phase_violation("cannot assign a field on a crystal struct"));
                }
                match self.heap.get_mut(ptr) {
                    Some(HeapObject::Struct(s)) => {
                        if !s.set_field(field, value) {
                            return Err(LatticeError::KeyError {
                                message: format!("struct `{}` has no field `{field}`", s.type_name),
                                loc: None,
                            });
                        }
                        Ok(())
                    }
                    _ => Err(LatticeError::type_error("dangling struct handle")),
                }
            }
            AssignTarget::Index { base, index } => {
                let base_value = self.eval_expr(env, base)?;
                let index_value = self.eval_expr(env, index)?;
                self.assign_index(&base_value, &index_value, value)
            }
        }
    }

    fn assign_index(&mut self, base: &Value, index: &Value, value: Value) -> Result<()> {
        match &base.kind {
            ValueKind::Array(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("array index must be an int"));
                };
                lattice_runtime::builtins::array_ops::set(&mut self.heap, *ptr, i, value)
            }
            ValueKind::Map(ptr) => {
                let ValueKind::String(key) = &index.kind else {
                    return Err(LatticeError::type_error("map index must be a string"));
                };
                lattice_runtime::builtins::map_ops::set(&mut self.heap, *ptr, key.as_str(), value).map(|_| ())
            }
            ValueKind::Buffer(ptr) => {
                let (ValueKind::Int(i), ValueKind::Int(byte)) = (&index.kind, &value.kind) else {
                    return Err(LatticeError::type_error("buffer index/value must be ints"));
                };
                lattice_runtime::builtins::buffer_ops::set_byte(&mut self.heap, *ptr, *i, *byte as u8)
            }
            _ => Err(LatticeError::type_error(format!("cannot index-assign into a {}", base.type_name()))),
        }
    }

    fn read_target(&mut self, env: &Environment, target: &AssignTarget) -> Result<Value> {
        match target {
            AssignTarget::Ident(name) => env
                .get(name)
                .ok_or_else(|| LatticeError::type_error(format!("undefined variable `{name}`"))),
            AssignTarget::Field { base, field } => {
                let base_value = self.eval_expr(env, base)?;
                self.get_field(&base_value, field)
            }
            AssignTarget::Index { base, index } => {
                let base_value = self.eval_expr(env, base)?;
                let index_value = self.eval_expr(env, index)?;
                self.get_index(&base_value, &index_value)
            }
        }
    }

    fn apply_compound(&self, op: CompoundOp, current: &Value, rhs: &Value) -> Result<Value> {
        let op = match op {
            CompoundOp::Add => BinOp::Add,
            CompoundOp::Sub => BinOp::Sub,
            CompoundOp::Mul => BinOp::Mul,
            CompoundOp::Div => BinOp::Div,
            CompoundOp::Mod => BinOp::Mod,
            CompoundOp::BitOr => BinOp::BitOr,
            CompoundOp::BitAnd => BinOp::BitAnd,
            CompoundOp::BitXor => BinOp::BitXor,
        };
        self.apply_binop(op, current, rhs)
    }

    /// Bonds/reactions (spec §4.4) fire on an *actual* phase change, not
    /// every assignment. Gate bonds are not vetoed from the language surface
    /// yet (no construct names a veto callback) — the transition always
    /// proceeds (documented simplification, DESIGN.md).
    fn on_phase_transition(&mut self, env: &Environment, name: &str, new_phase: Phase) -> Result<()> {
        let effects = self.bonds.propagate(name, new_phase);
        for (dependency, effect) in effects {
            let target_phase = match effect {
                BondEffect::SetPhase(p) => p,
                BondEffect::SetPhaseIfNotVetoed(p) => p,
            };
            if let Some(current) = env.get(&dependency) {
                if current.phase != target_phase {
                    let coerced = self.coerce_phase(current, target_phase)?;
                    env.set(&dependency, coerced)?;
                }
            }
        }
        if let Some(value) = env.get(name) {
            let closures: Vec<Value> = self.reactions.fire(name).to_vec();
            for closure in closures {
                self.call_value(closure, vec![value.clone()])?;
            }
        }
        Ok(())
    }

    fn coerce_phase(&mut self, value: Value, phase: Phase) -> Result<Value> {
        match (value.phase, phase) {
            (Phase::Fluid, Phase::Crystal) => self.freeze_value(&value, &[], None),
            (Phase::Crystal, Phase::Fluid) => {
                let roots = self.roots();
                Ok(value_ops::thaw(&mut self.heap, &value, &roots))
            }
            _ => Ok(value),
        }
    }

    /// Freezes `value` into a fresh crystal region (spec §4.2): deep-clones
    /// it, marks `except` struct fields fluid, then (if `contract` is
    /// given) calls it against the frozen result and tears the region back
    /// down on a failed or erroring contract.
    ///
    /// `value_ops::freeze` takes the same steps, but its contract hook is a
    /// plain `FnOnce(&mut Heap, ..)` closure — it cannot itself call back
    /// into a Lattice closure, which needs the evaluator's full call
    /// machinery (environments, defer stack), not just the heap. A
    /// contract call and the `&mut self.heap` borrow `value_ops::freeze`
    /// would hold for its own duration can't coexist, so freezing with a
    /// *user* contract is reimplemented here as two sequential steps (clone
    /// into a region, then call) instead of one nested callback.
    /// `value_ops::freeze`/`anneal` remain available for any caller whose
    /// contract is a plain Rust closure — none in this crate.
    pub(crate) fn freeze_value(&mut self, value: &Value, except: &[String], contract: Option<Value>) -> Result<Value> {
        let roots = self.roots();
        let region = self.heap.create_region();
        let ctx = AllocCtx::Crystal(region);
        let mut frozen = value_ops::deep_clone(&mut self.heap, value, ctx, &roots);
        apply_except_fields(&mut self.heap, &frozen, except);
        if let Some(contract) = contract {
            match self.call_value(contract, vec![frozen.clone()]) {
                Ok(passed) if passed.is_truthy() => {}
                Ok(_) => {
                    self.heap.teardown_region(region);
                    return Err(LatticeError::ContractViolation {
                        function: "freeze".to_string(),
                        message: "contract failed".to_string(),
                        loc: None,
                    });
                }
                Err(e) => {
                    self.heap.teardown_region(region);
                    return Err(e);
                }
            }
        }
        frozen.phase = Phase::Crystal;
        Ok(frozen)
    }

    /// Thaw/mutate/refreeze (spec §4.2 `sublimate`): the mutator closure
    /// runs against an independent fluid copy, then the result is frozen
    /// back with the *same* `except`/`contract` the original freeze used
    /// (resolved Open Question: captured at freeze time, not re-resolved at
    /// anneal time — matching `value_ops::anneal`'s own doc comment).
    pub(crate) fn anneal_value(
        &mut self,
        value: &Value,
        mutator: Value,
        contract: Option<Value>,
    ) -> Result<Value> {
        let roots = self.roots();
        let thawed = value_ops::thaw(&mut self.heap, value, &roots);
        self.call_value(mutator, vec![thawed.clone()])?;
        self.freeze_value(&thawed, &[], contract)
    }

    pub(crate) fn get_field(&mut self, base: &Value, field: &str) -> Result<Value> {
        let ValueKind::Struct(ptr) = base.kind else {
            return Err(LatticeError::type_error(format!("`{}` has no fields", base.type_name())));
        };
        match self.heap.get(ptr) {
            Some(HeapObject::Struct(s)) => s.get_field(field).cloned().ok_or_else(|| LatticeError::KeyError {
                message: format!("struct `{}` has no field `{field}`", s.type_name),
                loc: None,
            }),
            _ => Err(LatticeError::type_error("dangling struct handle")),
        }
    }

    pub(crate) fn get_index(&mut self, base: &Value, index: &Value) -> Result<Value> {
        match &base.kind {
            ValueKind::Array(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("array index must be an int"));
                };
                lattice_runtime::builtins::array_ops::get(&mut self.heap, *ptr, i)
            }
            ValueKind::Tuple(items) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("tuple index must be an int"));
                };
                normalize_index(i, items.len())
                    .and_then(|i| items.get(i).cloned())
                    .ok_or_else(|| LatticeError::IndexError {
                        message: format!("tuple index {i} out of bounds"),
                        loc: None,
                    })
            }
            ValueKind::Map(ptr) => {
                let ValueKind::String(key) = &index.kind else {
                    return Err(LatticeError::type_error("map index must be a string"));
                };
                lattice_runtime::builtins::map_ops::get(&mut self.heap, *ptr, key.as_str())?
                    .ok_or_else(|| LatticeError::KeyError {
                        message: format!("map has no key `{}`", key.as_str()),
                        loc: None,
                    })
            }
            ValueKind::Buffer(ptr) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("buffer index must be an int"));
                };
                lattice_runtime::builtins::buffer_ops::get_byte(&mut self.heap, *ptr, i).map(|b| Value::fluid(ValueKind::Int(b as i64)))
            }
            ValueKind::String(s) => {
                let ValueKind::Int(i) = index.kind else {
                    return Err(LatticeError::type_error("string index must be an int"));
                };
                let ch = lattice_runtime::builtins::string_ops::char_at(s, i)?;
                Ok(Value::new(base.phase, ValueKind::String(LString::new_fluid(ch))))
            }
            _ => Err(LatticeError::type_error(format!("cannot index a {}", base.type_name()))),
        }
    }
}

/// Local duplicate of `value_ops`'s private except-field logic (spec §4.2):
/// struct fields named in `except` keep `Phase::Fluid` even though the
/// struct as a whole is being frozen. Kept here rather than exported from
/// `value_ops` because `value_ops::freeze`'s own copy is `pub(crate)` to
/// that crate.
fn apply_except_fields(heap: &mut Heap, value: &Value, except: &[String]) {
    if except.is_empty() {
        return;
    }
    if let ValueKind::Struct(ptr) = value.kind {
        if let Some(HeapObject::Struct(s)) = heap.get_mut(ptr) {
            for name in except {
                if let Some(i) = s.field_names.iter().position(|f| &**f == name.as_str()) {
                    s.field_phases[i] = Phase::Fluid;
                }
            }
        }
    }
}

/// Local duplicate of `builtins::normalize_index` (`pub(crate)` to
/// `lattice-runtime`): negative indices count from the end.
pub(crate) fn normalize_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        let i = index as usize;
        (i < len).then_some(i)
    } else {
        let i = (len as i64) + index;
        (i >= 0).then_some(i as usize)
    }
}

impl Evaluator {
    pub(crate) fn eval_expr(&mut self, env: &Environment, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(self.literal_value(lit)),
            Expr::Ident(name) => env
                .get(name)
                .ok_or_else(|| LatticeError::type_error(format!("undefined variable `{name}`"))),
            Expr::Array(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<Result<Vec<_>>>()?;
                let roots = self.roots();
                let ctx = self.current_ctx();
                let ptr = self.heap.alloc(HeapObject::Array(values), ctx, &roots);
                Ok(Value::new(self.current_phase(), ValueKind::Array(ptr)))
            }
            Expr::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::new(self.current_phase(), ValueKind::Tuple(Rc::from(values))))
            }
            Expr::MapLiteral(entries) => {
                let mut map = OpenMap::new();
                for (k, v) in entries {
                    let key = self.eval_expr(env, k)?;
                    let value = self.eval_expr(env, v)?;
                    let key_str = value_ops::display(&self.heap, &key);
                    map.set(&key_str, value);
                }
                let roots = self.roots();
                let ctx = self.current_ctx();
                let ptr = self.heap.alloc(HeapObject::Map(map), ctx, &roots);
                Ok(Value::new(self.current_phase(), ValueKind::Map(ptr)))
            }
            Expr::SetLiteral(items) => {
                let mut set = OpenMap::new();
                for e in items {
                    let value = self.eval_expr(env, e)?;
                    let key = value_ops::display(&self.heap, &value);
                    set.set(&key, value);
                }
                let roots = self.roots();
                let ctx = self.current_ctx();
                let ptr = self.heap.alloc(HeapObject::Set(set), ctx, &roots);
                Ok(Value::new(self.current_phase(), ValueKind::Set(ptr)))
            }
            Expr::FieldAccess { base, field } => {
                let base_value = self.eval_expr(env, base)?;
                self.get_field(&base_value, field)
            }
            Expr::Index { base, index } => {
                let base_value = self.eval_expr(env, base)?;
                let index_value = self.eval_expr(env, index)?;
                self.get_index(&base_value, &index_value)
            }
            Expr::Call { callee, args } => {
                let callee_value = self.eval_expr(env, callee)?;
                let arg_values = args
                    .iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<Result<Vec<_>>>()?;
                self.call_value(callee_value, arg_values)
            }
            Expr::MethodCall { receiver, method, args } => {
                let receiver_value = self.eval_expr(env, receiver)?;
                let arg_values = args
                    .iter()
                    .map(|e| self.eval_expr(env, e))
                    .collect::<Result<Vec<_>>>()?;
                self.call_method(&receiver_value, method, arg_values)
            }
            Expr::Binary { op, lhs, rhs } => {
                // `&&`/`||` short-circuit (spec §4.1); every other operator
                // evaluates both sides first.
                match op {
                    BinOp::And => {
                        let l = self.eval_expr(env, lhs)?;
                        if !l.is_truthy() {
                            return Ok(l);
                        }
                        self.eval_expr(env, rhs)
                    }
                    BinOp::Or => {
                        let l = self.eval_expr(env, lhs)?;
                        if l.is_truthy() {
                            return Ok(l);
                        }
                        self.eval_expr(env, rhs)
                    }
                    _ => {
                        let l = self.eval_expr(env, lhs)?;
                        let r = self.eval_expr(env, rhs)?;
                        self.apply_binop(*op, &l, &r)
                    }
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(env, operand)?;
                match op {
                    UnOp::Neg => match value.kind {
                        ValueKind::Int(n) => Ok(Value::new(value.phase, ValueKind::Int(-n))),
                        ValueKind::Float(n) => Ok(Value::new(value.phase, ValueKind::Float(-n))),
                        _ => Err(LatticeError::type_error(format!("cannot negate a {}", value.type_name()))),
                    },
                    UnOp::Not => Ok(Value::new(value.phase, ValueKind::Bool(!value.is_truthy()))),
                }
            }
            Expr::Phase { op, operand, closure, except, contract } => {
                self.eval_phase_op(env, *op, operand, closure.as_deref(), except, contract.as_deref())
            }
            Expr::Forge(body) => {
                let roots = self.roots();
                let region = self.heap.create_region();
                self.alloc_ctx_stack.push(AllocCtx::Crystal(region));
                let result = self.eval_block(env, body);
                self.alloc_ctx_stack.pop();
                let _ = roots;
                let flow = result?;
                self.block_value(flow)
            }
            Expr::Match { scrutinee, arms } => self.eval_match(env, scrutinee, arms),
            Expr::TryCatch { try_body, catch_binding, catch_body } => {
                match self.eval_block(env, try_body) {
                    Ok(flow) => self.block_value(flow),
                    Err(e) => {
                        env.push_scope();
                        env.define(catch_binding, Value::fluid(ValueKind::String(LString::new_fluid(e.to_string()))));
                        let flow = self.eval_block_in_place(env, catch_body);
                        env.pop_scope();
                        self.block_value(flow?)
                    }
                }
            }
            Expr::Select { arms, timeout, default } => self.eval_select(env, arms, timeout.as_ref(), default.as_deref()),
            Expr::Spawn(body) => self.eval_spawn(env, body),
            Expr::Closure { params, variadic, body } => {
                let roots = self.roots();
                let obj = ClosureObj {
                    decl: None,
                    params: Rc::from(params.clone()),
                    variadic: variadic.as_deref().map(Rc::from),
                    body: Rc::from(body.clone()),
                    captured_env: env.clone(),
                };
                let ptr = self.heap.alloc(HeapObject::Closure(obj), self.current_ctx(), &roots);
                Ok(Value::new(self.current_phase(), ValueKind::Closure(ptr)))
            }
            Expr::StructInit { type_name, fields } => self.eval_struct_init(env, type_name, fields),
            Expr::EnumInit { enum_name, variant, payload } => self.eval_enum_init(env, enum_name.as_deref(), variant, payload),
            Expr::Try(inner) => {
                let value = self.eval_expr(env, inner)?;
                self.eval_try(&value)
            }
        }
    }

    fn literal_value(&self, lit: &Literal) -> Value {
        match lit {
            Literal::Nil => Value::nil(),
            Literal::Unit => Value::unit(),
            Literal::Bool(b) => Value::bool(*b),
            Literal::Int(n) => Value::int(*n),
            Literal::Float(n) => Value::float(*n),
            Literal::String(s) => Value::fluid(ValueKind::String(LString::new_fluid(s.clone()))),
        }
    }

    /// Unwraps a postfix `?` (spec §4.1): any `Enum` value whose variant is
    /// not named `Err`/`None` passes through its first payload value (or
    /// `unit` if it has none); an `Err`/`None` variant short-circuits by
    /// propagating a `LatticeError` up through the call stack (this
    /// tree-walker has no separate unwinding channel for it, so it reuses
    /// the same `Result` plumbing every other error takes — the surrounding
    /// function call still sees it as an ordinary `Err`).
    fn eval_try(&mut self, value: &Value) -> Result<Value> {
        let ValueKind::Enum(ptr) = value.kind else {
            return Ok(value.clone());
        };
        let instance = match self.heap.get(ptr) {
            Some(HeapObject::Enum(e)) => e.clone(),
            _ => return Err(LatticeError::type_error("dangling enum handle")),
        };
        if &*instance.variant == "Err" || &*instance.variant == "None" {
            let message = instance
                .payload
                .first()
                .map(|v| value_ops::display(&self.heap, v))
                .unwrap_or_else(|| format!("{}.{}", instance.enum_name, instance.variant));
            return Err(LatticeError::type_error(message));
        }
        Ok(instance.payload.first().cloned().unwrap_or_else(Value::unit))
    }

    fn eval_phase_op(
        &mut self,
        env: &Environment,
        op: PhaseOp,
        operand: &Expr,
        closure: Option<&Expr>,
        except: &[String],
        contract: Option<&Expr>,
    ) -> Result<Value> {
        let value = self.eval_expr(env, operand)?;
        let contract_value = contract.map(|c| self.eval_expr(env, c)).transpose()?;
        match op {
            PhaseOp::Freeze => self.freeze_value(&value, except, contract_value),
            PhaseOp::Thaw => {
                let roots = self.roots();
                Ok(value_ops::thaw(&mut self.heap, &value, &roots))
            }
            PhaseOp::Clone => {
                let roots = self.roots();
                Ok(value_ops::clone_value(&mut self.heap, &value, &roots))
            }
            // The anneal operator (spec §4.2): thaw, run `closure` as the
            // mutator, refreeze under the same contract. `builders::anneal`
            // emits `Crystallize` carrying the mutator in `closure` (resolved
            // Open Question, DESIGN.md: the AST's `PhaseOp` names this case
            // `Crystallize`/`Sublimate` rather than `Anneal`; both carry the
            // same closure-mutator shape, so both are treated identically
            // here).
            PhaseOp::Crystallize | PhaseOp::Sublimate => {
                let mutator = closure
                    .ok_or_else(|| LatticeError::type_error("anneal requires a mutator closure"))
                    .and_then(|c| self.eval_expr(env, c))?;
                self.anneal_value(&value, mutator, contract_value)
            }
        }
    }

    fn eval_match(&mut self, env: &Environment, scrutinee: &Expr, arms: &[lattice_ast::MatchArm]) -> Result<Value> {
        let scrutinee_value = self.eval_expr(env, scrutinee)?;
        for arm in arms {
            if let Some(qualifier) = arm.phase_qualifier {
                let matches_phase = match qualifier {
                    Phase::Fluid => scrutinee_value.is_fluid(),
                    Phase::Crystal => scrutinee_value.is_crystal(),
                };
                if !matches_phase {
                    continue;
                }
            }
            let Some(bindings) = pattern::match_pattern(&self.heap, &arm.pattern, &scrutinee_value) else {
                continue;
            };
            env.push_scope();
            for (name, value) in &bindings {
                env.define(name, value.clone());
            }
            if let Some(guard) = &arm.guard {
                let passed = self.eval_expr(env, guard);
                let passed = match passed {
                    Ok(v) => v.is_truthy(),
                    Err(e) => {
                        env.pop_scope();
                        return Err(e);
                    }
                };
                if !passed {
                    env.pop_scope();
                    continue;
                }
            }
            let flow = self.eval_block_in_place(env, &arm.body);
            env.pop_scope();
            return self.block_value(flow?);
        }
        Err(LatticeError::type_error("no `match` arm matched the scrutinee"))
    }

    fn eval_struct_init(&mut self, env: &Environment, type_name: &str, fields: &[(String, Expr)]) -> Result<Value> {
        let decl = self
            .structs
            .get(type_name)
            .cloned()
            .ok_or_else(|| LatticeError::type_error(format!("unknown struct `{type_name}`")))?;
        if fields.len() != decl.fields.len() {
            return Err(LatticeError::arity_error(format!(
                "struct `{type_name}` expects {} fields, got {}",
                decl.fields.len(),
                fields.len()
            )));
        }
        let mut values = Vec::with_capacity(decl.fields.len());
        for field_decl in &decl.fields {
            let (_, expr) = fields
                .iter()
                .find(|(name, _)| name == &field_decl.name)
                .ok_or_else(|| LatticeError::KeyError {
                    message: format!("struct `{type_name}` is missing field `{}`", field_decl.name),
                    loc: None,
                })?;
            values.push(self.eval_expr(env, expr)?);
        }
        let phase = self.current_phase();
        let field_names: Rc<[Rc<str>]> = decl.fields.iter().map(|f| Rc::from(f.name.as_str())).collect();
        let instance = StructInstance {
            type_name: Rc::from(type_name),
            field_names,
            fields: values,
            field_phases: vec![phase; decl.fields.len()],
        };
        let roots = self.roots();
        let ctx = self.current_ctx();
        let ptr = self.heap.alloc(HeapObject::Struct(instance), ctx, &roots);
        Ok(Value::new(phase, ValueKind::Struct(ptr)))
    }

    fn eval_enum_init(
        &mut self,
        env: &Environment,
        enum_name: Option<&str>,
        variant: &str,
        payload: &[Expr],
    ) -> Result<Value> {
        let resolved_name = match enum_name {
            Some(name) => name.to_string(),
            None => self
                .enums
                .iter()
                .find(|(_, decl)| decl.variants.iter().any(|v| v.name == variant))
                .map(|(name, _)| name.to_string())
                .ok_or_else(|| LatticeError::type_error(format!("no enum declares variant `{variant}`")))?,
        };
        let decl = self
            .enums
            .get(&resolved_name)
            .cloned()
            .ok_or_else(|| LatticeError::type_error(format!("unknown enum `{resolved_name}`")))?;
        let variant_decl = decl
            .variants
            .iter()
            .find(|v| v.name == variant)
            .ok_or_else(|| LatticeError::type_error(format!("enum `{resolved_name}` has no variant `{variant}`")))?;
        if payload.len() != variant_decl.payload_arity {
            return Err(LatticeError::arity_error(format!(
                "variant `{}.{variant}` expects {} payload values, got {}",
                resolved_name,
                variant_decl.payload_arity,
                payload.len()
            )));
        }
        let payload_values = payload
            .iter()
            .map(|e| self.eval_expr(env, e))
            .collect::<Result<Vec<_>>>()?;
        let instance = EnumInstance {
            enum_name: Rc::from(resolved_name.as_str()),
            variant: Rc::from(variant),
            payload: payload_values,
        };
        let roots = self.roots();
        let ctx = self.current_ctx();
        let ptr = self.heap.alloc(HeapObject::Enum(instance), ctx, &roots);
        Ok(Value::new(self.current_phase(), ValueKind::Enum(ptr)))
    }

    fn apply_binop(&self, op: BinOp, l: &Value, r: &Value) -> Result<Value> {
        use ValueKind::*;
        match op {
            BinOp::Add => match (&l.kind, &r.kind) {
                (Int(a), Int(b)) => a.checked_add(*b).map(Int).map(|k| Value::new(l.phase, k)).ok_or_else(|| LatticeError::Overflow {
                    message: "integer addition overflowed".to_string(),
                }),
                (Float(a), Float(b)) => Ok(Value::new(l.phase, Float(a + b))),
                (Int(a), Float(b)) | (Float(b), Int(a)) => Ok(Value::new(l.phase, Float(*a as f64 + b))),
                (String(a), String(b)) => Ok(lattice_runtime::builtins::string_ops::concat(
                    a,
                    b,
                    l.phase,
                    string_region(a),
                )),
                _ => Err(LatticeError::type_error(format!(
                    "cannot add {} and {}",
                    l.type_name(),
                    r.type_name()
                ))),
            },
            BinOp::Sub => self.arith(l, r, |a, b| a.checked_sub(b), |a, b| a - b, "subtract"),
            BinOp::Mul => self.arith(l, r, |a, b| a.checked_mul(b), |a, b| a * b, "multiply"),
            BinOp::Div => match (&l.kind, &r.kind) {
                (Int(_), Int(0)) => Err(LatticeError::DivisionByZero { loc: None }),
                (Int(a), Int(b)) => Ok(Value::new(l.phase, Int(a / b))),
                (Float(a), Float(b)) => Ok(Value::new(l.phase, Float(a / b))),
                (Int(a), Float(b)) => Ok(Value::new(l.phase, Float(*a as f64 / b))),
                (Float(a), Int(b)) => Ok(Value::new(l.phase, Float(a / *b as f64))),
                _ => Err(LatticeError::type_error(format!("cannot divide {} and {}", l.type_name(), r.type_name()))),
            },
            BinOp::Mod => match (&l.kind, &r.kind) {
                (Int(_), Int(0)) => Err(LatticeError::DivisionByZero { loc: None }),
                (Int(a), Int(b)) => Ok(Value::new(l.phase, Int(a % b))),
                (Float(a), Float(b)) => Ok(Value::new(l.phase, Float(a % b))),
                _ => Err(LatticeError::type_error(format!("cannot modulo {} and {}", l.type_name(), r.type_name()))),
            },
            BinOp::Eq => Ok(Value::fluid(Bool(value_ops::deep_eq(&self.heap, l, r)))),
            BinOp::Ne => Ok(Value::fluid(Bool(!value_ops::deep_eq(&self.heap, l, r)))),
            BinOp::Lt => self.compare(l, r, |o| o == std::cmp::Ordering::Less),
            BinOp::Le => self.compare(l, r, |o| o != std::cmp::Ordering::Greater),
            BinOp::Gt => self.compare(l, r, |o| o == std::cmp::Ordering::Greater),
            BinOp::Ge => self.compare(l, r, |o| o != std::cmp::Ordering::Less),
            BinOp::And => Ok(Value::fluid(Bool(l.is_truthy() && r.is_truthy()))),
            BinOp::Or => Ok(Value::fluid(Bool(l.is_truthy() || r.is_truthy()))),
            BinOp::BitOr => self.bitwise(l, r, |a, b| a | b, "|"),
            BinOp::BitAnd => self.bitwise(l, r, |a, b| a & b, "&"),
            BinOp::BitXor => self.bitwise(l, r, |a, b| a ^ b, "^"),
        }
    }

    fn arith(
        &self,
        l: &Value,
        r: &Value,
        int_op: impl FnOnce(i64, i64) -> Option<i64>,
        float_op: impl FnOnce(f64, f64) -> f64,
        verb: &str,
    ) -> Result<Value> {
        use ValueKind::*;
        match (&l.kind, &r.kind) {
            (Int(a), Int(b)) => int_op(*a, *b)
                .map(|n| Value::new(l.phase, Int(n)))
                .ok_or_else(|| LatticeError::Overflow {
                    message: format!("integer {verb} overflowed"),
                }),
            (Float(a), Float(b)) => Ok(Value::new(l.phase, Float(float_op(*a, *b)))),
            (Int(a), Float(b)) => Ok(Value::new(l.phase, Float(float_op(*a as f64, *b)))),
            (Float(a), Int(b)) => Ok(Value::new(l.phase, Float(float_op(*a, *b as f64)))),
            _ => Err(LatticeError::type_error(format!("cannot {verb} {} and {}", l.type_name(), r.type_name()))),
        }
    }

    fn bitwise(&self, l: &Value, r: &Value, op: impl FnOnce(i64, i64) -> i64, symbol: &str) -> Result<Value> {
        match (&l.kind, &r.kind) {
            (ValueKind::Int(a), ValueKind::Int(b)) => Ok(Value::new(l.phase, ValueKind::Int(op(*a, *b)))),
            _ => Err(LatticeError::type_error(format!(
                "cannot apply `{symbol}` to {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        }
    }

    fn compare(&self, l: &Value, r: &Value, accept: impl FnOnce(std::cmp::Ordering) -> bool) -> Result<Value> {
        use ValueKind::*;
        let ord = match (&l.kind, &r.kind) {
            (Int(a), Int(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => a.as_str().partial_cmp(b.as_str()),
            _ => return Err(LatticeError::type_error(format!("cannot compare {} and {}", l.type_name(), r.type_name()))),
        };
        ord.map(|o| Value::fluid(Bool(accept(o))))
            .ok_or_else(|| LatticeError::type_error("comparison produced no ordering (NaN?)"))
    }
}

/// `LString` carries its own region inline (it has no `HeapPtr`, unlike the
/// other heap-bearing `ValueKind` variants), so extracting it means
/// pattern-matching the string itself.
fn string_region(s: &LString) -> Option<lattice_core::heap::crystal::RegionId> {
    match s {
        LString::Crystal(region, _) => Some(*region),
        LString::Fluid(_) => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use lattice_ast::builders::*;
    use lattice_ast::{BindingKind, MatchPattern};

    fn call_main(ev: &mut Evaluator) -> Result<Value> {
        let main = ev.globals.get("main").expect("no `main` registered");
        ev.call_value(main, vec![])
    }

    fn array_items(ev: &Evaluator, v: &Value) -> Vec<Value> {
        let ValueKind::Array(ptr) = v.kind else { panic!("expected an array") };
        match ev.heap.get(ptr) {
            Some(HeapObject::Array(items)) => items.clone(),
            _ => panic!("dangling array handle"),
        }
    }

    // spec.md "Concrete scenarios" #1: a `fix`'d freeze doesn't see a later
    // mutation of the fluid original it was frozen from.
    #[test]
    fn freeze_diverges_from_later_mutation() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "main",
            [],
            [
                let_binding(BindingKind::Flux, "a", array([int(1), int(2), int(3)])),
                let_binding(BindingKind::Fix, "b", freeze(ident("a"))),
                expr_stmt(method_call(ident("a"), "push", [int(4)])),
                return_stmt(Some(array([
                    method_call(ident("a"), "len", []),
                    method_call(ident("b"), "len", []),
                ]))),
            ],
        )]))
        .unwrap();
        let result = call_main(&mut ev).unwrap();
        let items = array_items(&ev, &result);
        assert!(matches!(items[0].kind, ValueKind::Int(4)));
        assert!(matches!(items[1].kind, ValueKind::Int(3)));
    }

    #[test]
    fn mutating_a_frozen_array_is_a_phase_violation() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "main",
            [],
            [
                let_binding(BindingKind::Flux, "a", array([int(1)])),
                let_binding(BindingKind::Fix, "b", freeze(ident("a"))),
                expr_stmt(method_call(ident("b"), "push", [int(2)])),
            ],
        )]))
        .unwrap();
        let err = call_main(&mut ev).unwrap_err();
        assert!(matches!(err, LatticeError::PhaseViolation { .. }), "got {err:?}");
    }

    #[test]
    fn missing_argument_falls_back_to_declared_default() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "greet",
            [param_default("who", string("world"))],
            [return_stmt(Some(ident("who")))],
        )]))
        .unwrap();

        let greet = ev.globals.get("greet").unwrap();
        let defaulted = ev.call_value(greet, vec![]).unwrap();
        let ValueKind::String(s) = defaulted.kind else { panic!("expected string") };
        assert_eq!(s.as_str(), "world");

        let greet = ev.globals.get("greet").unwrap();
        let explicit = ev
            .call_value(greet, vec![Value::fluid(ValueKind::String(LString::new_fluid("Lattice".to_string())))])
            .unwrap();
        let ValueKind::String(s) = explicit.kind else { panic!("expected string") };
        assert_eq!(s.as_str(), "Lattice");
    }

    #[test]
    fn requires_violation_is_caught_by_try_catch() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![
            function_with_requires(
                "divide",
                [param("a"), param("b")],
                [requires(binary(BinOp::Ne, ident("b"), int(0)), Some("b must not be zero"))],
                [return_stmt(Some(binary(BinOp::Div, ident("a"), ident("b"))))],
            ),
            function(
                "main",
                [],
                [return_stmt(Some(try_catch(
                    [expr_stmt(call_fn("divide", [int(1), int(0)]))],
                    "e",
                    [return_stmt(Some(ident("e")))],
                )))],
            ),
        ]))
        .unwrap();
        let result = call_main(&mut ev).unwrap();
        let ValueKind::String(s) = result.kind else { panic!("expected caught error string") };
        assert!(s.as_str().contains("b must not be zero"), "got {}", s.as_str());
    }

    #[test]
    fn match_range_pattern_selects_the_containing_arm() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "classify",
            [param("n")],
            [return_stmt(Some(match_expr(
                ident("n"),
                [
                    arm(
                        MatchPattern::Range { lo: Literal::Int(0), hi: Literal::Int(10) },
                        vec![return_stmt(Some(string("low")))],
                    ),
                    arm(MatchPattern::Wildcard, vec![return_stmt(Some(string("high")))]),
                ],
            )))],
        )]))
        .unwrap();

        let classify = ev.globals.get("classify").unwrap();
        let low = ev.call_value(classify, vec![Value::int(5)]).unwrap();
        let ValueKind::String(s) = low.kind else { panic!("expected string") };
        assert_eq!(s.as_str(), "low");

        let classify = ev.globals.get("classify").unwrap();
        let high = ev.call_value(classify, vec![Value::int(42)]).unwrap();
        let ValueKind::String(s) = high.kind else { panic!("expected string") };
        assert_eq!(s.as_str(), "high");
    }

    // spec.md "Concrete scenarios" #5: `spawn { c.send(42) }` then
    // `c.recv()`. `eval_spawn` runs synchronously (documented
    // simplification), so the send has already completed by the time the
    // parent's `recv` runs.
    #[test]
    fn channel_send_from_spawn_then_recv() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "main",
            [],
            [
                let_binding(BindingKind::Flux, "c", call_fn("channel", [int(1)])),
                expr_stmt(spawn([expr_stmt(method_call(ident("c"), "send", [int(42)]))])),
                return_stmt(Some(method_call(ident("c"), "recv", []))),
            ],
        )]))
        .unwrap();
        let result = call_main(&mut ev).unwrap();
        assert!(matches!(result.kind, ValueKind::Int(42)));
    }

    #[test]
    fn anneal_mutates_the_frozen_value_in_place() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "main",
            [],
            [
                let_binding(BindingKind::Fix, "a", freeze(array([int(1), int(2)]))),
                Stmt::Assign {
                    target: AssignTarget::Ident("a".to_string()),
                    value: anneal(
                        ident("a"),
                        closure([param("x")], [expr_stmt(method_call(ident("x"), "push", [int(3)]))]),
                    ),
                    loc: None,
                },
                return_stmt(Some(method_call(ident("a"), "len", []))),
            ],
        )]))
        .unwrap();
        let result = call_main(&mut ev).unwrap();
        assert!(matches!(result.kind, ValueKind::Int(3)));
    }

    // spec §8: the 1001st nested call raises `Overflow` instead of blowing
    // the Rust stack.
    #[test]
    fn call_depth_beyond_1000_overflows() {
        let mut ev = Evaluator::new(RuntimeFlags::default());
        ev.eval_program(&program(vec![function(
            "recurse",
            [param("n")],
            [return_stmt(Some(call_fn("recurse", [binary(BinOp::Add, ident("n"), int(1))])))],
        )]))
        .unwrap();
        let recurse = ev.globals.get("recurse").unwrap();
        let err = ev.call_value(recurse, vec![Value::int(0)]).unwrap_err();
        assert!(matches!(err, LatticeError::Overflow { .. }), "got {err:?}");
    }
}
