//! Function-call semantics (spec §4.3): parameter binding with defaults and
//! variadics, `requires`/`ensures` contract checking, and `defer` — all
//! delegated from `eval.rs`'s `Call`/`MethodCall` expression handling.

use crate::eval::Evaluator;
use lattice_ast::Param;
use lattice_core::{LatticeError, Result};
use lattice_runtime::builtins::{array_ops, buffer_ops, enum_ops, map_ops, set_ops, string_ops};
use lattice_runtime::contracts::{self, ContractClause};
use lattice_runtime::heap_object::HeapObject;
use lattice_runtime::string::LString;
use lattice_runtime::value::ClosureObj;
use lattice_runtime::{Environment, HeapPtr, Value, ValueKind};
use std::rc::Rc;

/// Call-frame depth cap (spec §8), mirroring `lattice-vm`'s `MAX_FRAMES`: the
/// 1001st nested `invoke` raises `Overflow` instead of risking a Rust stack
/// overflow, since this backend's Lattice call depth rides the native stack.
const MAX_CALL_DEPTH: usize = 1000;

impl Evaluator {
    /// Calls any callable `Value` (spec §4.3): a `Closure` invokes the
    /// interpreted call path below, a `Builtin` is a native Rust function
    /// called directly against the heap.
    pub(crate) fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        match callee.kind {
            ValueKind::Closure(ptr) => {
                let closure = match self.heap.get(ptr) {
                    Some(HeapObject::Closure(c)) => c.clone(),
                    _ => return Err(LatticeError::type_error("dangling closure handle")),
                };
                self.invoke(&closure, args)
            }
            ValueKind::Builtin(f) => f(&mut self.heap, &args),
            _ => Err(LatticeError::type_error(format!("`{}` is not callable", callee.type_name()))),
        }
    }

    /// The 6-step call path (spec §4.3):
    /// 1. bind params (positional, falling back to declared defaults,
    ///    collecting a variadic tail);
    /// 2. check `requires`;
    /// 3. push a call frame (for GC rooting) and a fresh defer list;
    /// 4. evaluate the body;
    /// 5. check `ensures` against the body's result;
    /// 6. run deferred blocks LIFO, regardless of outcome, then propagate
    ///    whichever of body/ensures failed first.
    pub(crate) fn invoke(&mut self, closure: &ClosureObj, args: Vec<Value>) -> Result<Value> {
        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err(LatticeError::Overflow {
                message: "call stack exceeded depth 1000".to_string(),
            });
        }

        let call_env = Environment::child_of(&closure.captured_env);
        self.bind_params(&call_env, &closure.captured_env, &closure.params, closure.variadic.as_deref(), args)?;

        if let Some(decl) = &closure.decl {
            self.check_contracts(&call_env, &decl.requires, "requires", &decl.name)?;
        }

        self.call_stack.push(call_env.clone());
        self.defer_stack.push(Vec::new());

        let outcome = self.eval_block(&call_env, &closure.body);
        let result = outcome.map(|flow| match flow {
            crate::control_flow::ControlFlow::Return(v) => v,
            _ => Value::unit(),
        });

        let ensure_outcome = match (&result, &closure.decl) {
            (Ok(value), Some(decl)) if !decl.ensures.is_empty() => {
                call_env.define("result", value.clone());
                self.check_contracts(&call_env, &decl.ensures, "ensures", &decl.name)
            }
            _ => Ok(()),
        };

        let defers = self.defer_stack.pop().unwrap_or_default();
        self.call_stack.pop();

        for block in defers.into_iter().rev() {
            self.eval_block(&call_env, &block)?;
        }

        ensure_outcome?;
        result
    }

    fn check_contracts(
        &mut self,
        env: &Environment,
        contracts: &[lattice_ast::Contract],
        _kind: &str,
        function: &str,
    ) -> Result<()> {
        let mut clauses = Vec::with_capacity(contracts.len());
        for c in contracts {
            let passed = self.eval_expr(env, &c.condition)?.is_truthy();
            clauses.push(ContractClause {
                passed,
                message: c.message.clone(),
                loc: c.loc,
            });
        }
        contracts::check(&self.flags(), function, &clauses)
    }

    fn flags(&self) -> lattice_core::RuntimeFlags {
        self.heap.flags
    }

    /// Binds `args` against `params` into `call_env` (spec §4.3). Missing
    /// trailing arguments fall back to each `Param`'s `default` expression,
    /// evaluated in `def_env` (the closure's *captured* environment, not
    /// `call_env` — matching `Param::default`'s doc comment: defaults are
    /// evaluated "in the definition environment", so an earlier parameter's
    /// value is never visible to a later parameter's default).
    fn bind_params(
        &mut self,
        call_env: &Environment,
        def_env: &Environment,
        params: &[Param],
        variadic: Option<&str>,
        mut args: Vec<Value>,
    ) -> Result<()> {
        let mut args = args.drain(..);
        for param in params {
            let value = match args.next() {
                Some(v) => v,
                None => match &param.default {
                    Some(expr) => self.eval_expr(def_env, expr)?,
                    None => {
                        return Err(LatticeError::arity_error(format!(
                            "missing required argument `{}`",
                            param.name
                        )))
                    }
                },
            };
            call_env.define(&param.name, value);
        }
        let remaining: Vec<Value> = args.collect();
        match variadic {
            Some(name) => {
                let roots = self.roots();
                let ptr = self
                    .heap
                    .alloc(HeapObject::Array(remaining), lattice_core::AllocCtx::Fluid, &roots);
                call_env.define(name, Value::fluid(ValueKind::Array(ptr)));
            }
            None if !remaining.is_empty() => {
                return Err(LatticeError::arity_error(format!(
                    "too many arguments: expected {}, got {}",
                    params.len(),
                    params.len() + remaining.len()
                )));
            }
            None => {}
        }
        Ok(())
    }

    /// Dispatches a `receiver.method(args)` call (spec §4.1): built-in
    /// container/string/enum methods resolve directly against the heap;
    /// `Struct` receivers look up a user `impl` method and invoke it with
    /// the receiver prepended as the first argument (there is no implicit
    /// `self` binding in the AST's `FunctionDecl`, so the receiver is just
    /// the method's first parameter, matching the teacher's own
    /// no-implicit-receiver method-table dispatch).
    pub(crate) fn call_method(&mut self, receiver: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
        match &receiver.kind {
            ValueKind::Array(ptr) => self.call_array_method(*ptr, method, args),
            ValueKind::Map(ptr) => self.call_map_method(*ptr, method, args),
            ValueKind::Set(ptr) => self.call_set_method(*ptr, method, args),
            ValueKind::Buffer(ptr) => self.call_buffer_method(*ptr, method, args),
            ValueKind::String(_) => self.call_string_method(receiver, method, args),
            ValueKind::Enum(ptr) => self.call_enum_method(*ptr, method, args),
            ValueKind::Struct(_) => self.call_struct_method(receiver, method, args),
            ValueKind::Channel(ptr) => self.call_channel_method(*ptr, method, args),
            _ => Err(LatticeError::type_error(format!(
                "`{}` has no method `{method}`",
                receiver.type_name()
            ))),
        }
    }

    /// `send`/`recv`/`close` (spec §5). Real suspension is a scheduler
    /// concern the single-threaded synchronous `eval_spawn` (see
    /// `concurrency.rs`) can't provide, so a full `send` or an empty,
    /// unclosed `recv` spins on `scheduler::yield_now()` exactly like
    /// `eval_select`'s no-default case — a consequence of that same
    /// documented simplification, not a separate one.
    fn call_channel_method(&mut self, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
        use lattice_runtime::channel::{self, RecvOutcome, SendOutcome};
        use lattice_runtime::scheduler;
        match method {
            "send" => {
                let value = take_arg(&mut args, "send")?;
                loop {
                    match channel::try_send(&mut self.heap, ptr, value.clone())? {
                        SendOutcome::Sent => return Ok(Value::unit()),
                        SendOutcome::Closed => return Err(LatticeError::type_error("send on a closed channel")),
                        SendOutcome::Full => scheduler::yield_now(),
                    }
                }
            }
            "recv" => loop {
                match channel::try_recv(&mut self.heap, ptr)? {
                    RecvOutcome::Value(v) => return Ok(v),
                    RecvOutcome::Closed => return Ok(Value::nil()),
                    RecvOutcome::Empty => scheduler::yield_now(),
                }
            },
            "close" => {
                channel::close(&mut self.heap, ptr)?;
                Ok(Value::unit())
            }
            "is_closed" => Ok(Value::bool(channel::is_closed(&self.heap, ptr)?)),
            _ => Err(LatticeError::type_error(format!("channel has no method `{method}`"))),
        }
    }

    fn call_array_method(&mut self, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
        let heap = &mut self.heap;
        match method {
            "len" => Ok(Value::int(array_ops::len(heap, ptr)? as i64)),
            "push" => {
                array_ops::push(heap, ptr, take_arg(&mut args, "push")?)?;
                Ok(Value::unit())
            }
            "pop" => Ok(array_ops::pop(heap, ptr)?.unwrap_or_else(Value::nil)),
            "get" => {
                let i = take_int(&mut args, "get")?;
                array_ops::get(heap, ptr, i)
            }
            "set" => {
                let i = take_int(&mut args, "set")?;
                let value = take_arg(&mut args, "set")?;
                array_ops::set(heap, ptr, i, value)?;
                Ok(Value::unit())
            }
            "contains" => {
                let needle = take_arg(&mut args, "contains")?;
                Ok(Value::bool(array_ops::contains(heap, ptr, &needle)?))
            }
            "index_of" => {
                let needle = take_arg(&mut args, "index_of")?;
                Ok(array_ops::index_of(heap, ptr, &needle)?
                    .map(|i| Value::int(i as i64))
                    .unwrap_or_else(Value::nil))
            }
            "clear" => {
                array_ops::clear(heap, ptr)?;
                Ok(Value::unit())
            }
            "unique" => {
                array_ops::unique(heap, ptr)?;
                Ok(Value::unit())
            }
            "concat" => {
                let ValueKind::Array(other) = take_arg(&mut args, "concat")?.kind else {
                    return Err(LatticeError::type_error("`concat` expects an array argument"));
                };
                let roots = self.roots();
                array_ops::concat(&mut self.heap, ptr, other, self.current_ctx(), &roots)
            }
            _ => Err(LatticeError::type_error(format!("array has no method `{method}`"))),
        }
    }

    fn call_map_method(&mut self, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
        let heap = &mut self.heap;
        match method {
            "len" => Ok(Value::int(map_ops::len(heap, ptr)? as i64)),
            "get" => {
                let key = take_string(&mut args, "get")?;
                Ok(map_ops::get(heap, ptr, &key)?.unwrap_or_else(Value::nil))
            }
            "set" => {
                let key = take_string(&mut args, "set")?;
                let value = take_arg(&mut args, "set")?;
                map_ops::set(heap, ptr, &key, value)?;
                Ok(Value::unit())
            }
            "remove" => {
                let key = take_string(&mut args, "remove")?;
                Ok(map_ops::remove(heap, ptr, &key)?.unwrap_or_else(Value::nil))
            }
            "contains_key" => {
                let key = take_string(&mut args, "contains_key")?;
                Ok(Value::bool(map_ops::contains_key(heap, ptr, &key)?))
            }
            "keys" => {
                let keys = map_ops::keys(heap, ptr)?;
                let items = keys
                    .into_iter()
                    .map(|k| Value::fluid(ValueKind::String(LString::new_fluid(k))))
                    .collect();
                let roots = self.roots();
                let arr = self.heap.alloc(HeapObject::Array(items), lattice_core::AllocCtx::Fluid, &roots);
                Ok(Value::fluid(ValueKind::Array(arr)))
            }
            "values" => {
                let values = map_ops::values(heap, ptr)?;
                let roots = self.roots();
                let arr = self.heap.alloc(HeapObject::Array(values), lattice_core::AllocCtx::Fluid, &roots);
                Ok(Value::fluid(ValueKind::Array(arr)))
            }
            _ => Err(LatticeError::type_error(format!("map has no method `{method}`"))),
        }
    }

    fn call_set_method(&mut self, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
        match method {
            "len" => Ok(Value::int(set_ops::len(&self.heap, ptr)? as i64)),
            "contains" => {
                let v = take_arg(&mut args, "contains")?;
                Ok(Value::bool(set_ops::contains(&self.heap, ptr, &v)?))
            }
            "insert" => {
                let v = take_arg(&mut args, "insert")?;
                Ok(Value::bool(set_ops::insert(&mut self.heap, ptr, v)?))
            }
            "remove" => {
                let v = take_arg(&mut args, "remove")?;
                Ok(Value::bool(set_ops::remove(&mut self.heap, ptr, &v)?))
            }
            "union" | "intersection" | "difference" => {
                let ValueKind::Set(other) = take_arg(&mut args, method)?.kind else {
                    return Err(LatticeError::type_error(format!("`{method}` expects a set argument")));
                };
                let roots = self.roots();
                let ctx = self.current_ctx();
                match method {
                    "union" => set_ops::union(&mut self.heap, ptr, other, ctx, &roots),
                    "intersection" => set_ops::intersection(&mut self.heap, ptr, other, ctx, &roots),
                    _ => set_ops::difference(&mut self.heap, ptr, other, ctx, &roots),
                }
            }
            _ => Err(LatticeError::type_error(format!("set has no method `{method}`"))),
        }
    }

    fn call_buffer_method(&mut self, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
        let heap = &mut self.heap;
        match method {
            "len" => Ok(Value::int(buffer_ops::len(heap, ptr)? as i64)),
            "push_byte" => {
                let b = take_int(&mut args, "push_byte")?;
                buffer_ops::push_byte(heap, ptr, b as u8)?;
                Ok(Value::unit())
            }
            "get_byte" => {
                let i = take_int(&mut args, "get_byte")?;
                Ok(Value::int(buffer_ops::get_byte(heap, ptr, i)? as i64))
            }
            "set_byte" => {
                let i = take_int(&mut args, "set_byte")?;
                let b = take_int(&mut args, "set_byte")?;
                buffer_ops::set_byte(heap, ptr, i, b as u8)?;
                Ok(Value::unit())
            }
            "slice" => {
                let start = take_int(&mut args, "slice")?;
                let end = take_int(&mut args, "slice")?;
                let bytes = buffer_ops::slice(heap, ptr, start, end)?;
                let roots = self.roots();
                let new_ptr = self.heap.alloc(HeapObject::Buffer(bytes), lattice_core::AllocCtx::Fluid, &roots);
                Ok(Value::fluid(ValueKind::Buffer(new_ptr)))
            }
            "concat" => {
                let ValueKind::Buffer(other) = take_arg(&mut args, "concat")?.kind else {
                    return Err(LatticeError::type_error("`concat` expects a buffer argument"));
                };
                let roots = self.roots();
                buffer_ops::concat(&mut self.heap, ptr, other, self.current_ctx(), &roots)
            }
            _ => Err(LatticeError::type_error(format!("buffer has no method `{method}`"))),
        }
    }

    fn call_string_method(&mut self, receiver: &Value, method: &str, mut args: Vec<Value>) -> Result<Value> {
        let ValueKind::String(s) = &receiver.kind else {
            return Err(LatticeError::type_error("not a string"));
        };
        let region = match s {
            LString::Crystal(region, _) => Some(*region),
            LString::Fluid(_) => None,
        };
        match method {
            "len" => Ok(Value::int(string_ops::len(s) as i64)),
            "char_at" => {
                let i = take_int(&mut args, "char_at")?;
                Ok(Value::new(receiver.phase, ValueKind::String(LString::new_fluid(string_ops::char_at(s, i)?))))
            }
            "slice" => {
                let start = take_int(&mut args, "slice")?;
                let end = take_int(&mut args, "slice")?;
                string_ops::slice(s, start, end, receiver.phase, region)
            }
            "split" => {
                let sep = take_string(&mut args, "split")?;
                let parts = string_ops::split(s, &sep);
                let items = parts
                    .into_iter()
                    .map(|p| Value::fluid(ValueKind::String(LString::new_fluid(p))))
                    .collect();
                let roots = self.roots();
                let arr = self.heap.alloc(HeapObject::Array(items), lattice_core::AllocCtx::Fluid, &roots);
                Ok(Value::fluid(ValueKind::Array(arr)))
            }
            "contains" => {
                let needle = take_string(&mut args, "contains")?;
                Ok(Value::bool(string_ops::contains(s, &needle)))
            }
            "index_of" => {
                let needle = take_string(&mut args, "index_of")?;
                Ok(string_ops::index_of(s, &needle).map(|i| Value::int(i as i64)).unwrap_or_else(Value::nil))
            }
            "to_upper" => Ok(string_ops::to_upper(s, receiver.phase, region)),
            "to_lower" => Ok(string_ops::to_lower(s, receiver.phase, region)),
            "trim" => Ok(string_ops::trim(s, receiver.phase, region)),
            _ => Err(LatticeError::type_error(format!("string has no method `{method}`"))),
        }
    }

    fn call_enum_method(&mut self, ptr: HeapPtr, method: &str, _args: Vec<Value>) -> Result<Value> {
        match method {
            "variant_name" => Ok(Value::fluid(ValueKind::String(LString::new_fluid(enum_ops::variant_name(&self.heap, ptr)?)))),
            "enum_name" => Ok(Value::fluid(ValueKind::String(LString::new_fluid(enum_ops::enum_name(&self.heap, ptr)?)))),
            "payload" => {
                let payload = enum_ops::payload(&self.heap, ptr)?;
                let roots = self.roots();
                let arr = self.heap.alloc(HeapObject::Array(payload), lattice_core::AllocCtx::Fluid, &roots);
                Ok(Value::fluid(ValueKind::Array(arr)))
            }
            _ => Err(LatticeError::type_error(format!("enum has no method `{method}`"))),
        }
    }

    /// User-defined methods (spec §4.1 Impl): looked up in the `impls`
    /// registry by the struct's runtime type name, then invoked with the
    /// receiver as the method's first argument.
    fn call_struct_method(&mut self, receiver: &Value, method: &str, mut args: Vec<Value>) -> Result<Value> {
        let ValueKind::Struct(ptr) = receiver.kind else {
            return Err(LatticeError::type_error("not a struct"));
        };
        let type_name = match self.heap.get(ptr) {
            Some(HeapObject::Struct(s)) => s.type_name.to_string(),
            _ => return Err(LatticeError::type_error("dangling struct handle")),
        };
        let decl = self
            .impls
            .get(&type_name)
            .and_then(|methods| methods.get(method))
            .cloned()
            .ok_or_else(|| LatticeError::type_error(format!("`{type_name}` has no method `{method}`")))?;
        let closure = ClosureObj {
            decl: Some(decl.clone()),
            params: Rc::from(decl.params.clone()),
            variadic: decl.variadic.as_deref().map(Rc::from),
            body: Rc::from(decl.body.clone()),
            captured_env: self.globals.clone(),
        };
        args.insert(0, receiver.clone());
        self.invoke(&closure, args)
    }
}

fn take_arg(args: &mut Vec<Value>, method: &str) -> Result<Value> {
    if args.is_empty() {
        Err(LatticeError::arity_error(format!("`{method}` is missing an argument")))
    } else {
        Ok(args.remove(0))
    }
}

fn take_int(args: &mut Vec<Value>, method: &str) -> Result<i64> {
    match take_arg(args, method)?.kind {
        ValueKind::Int(n) => Ok(n),
        _ => Err(LatticeError::type_error(format!("`{method}` expects an int argument"))),
    }
}

fn take_string(args: &mut Vec<Value>, method: &str) -> Result<String> {
    match take_arg(args, method)?.kind {
        ValueKind::String(s) => Ok(s.as_str().to_string()),
        _ => Err(LatticeError::type_error(format!("`{method}` expects a string argument"))),
    }
}
