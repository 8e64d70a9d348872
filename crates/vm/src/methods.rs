//! `MethodCall` dispatch for container/string/enum/channel receivers (spec
//! §4.1): mirrors `lattice-evaluator::call::call_method`'s per-kind table
//! one-for-one. Struct receivers are handled separately, in `vm.rs` itself,
//! since a user `impl` method needs a pushed `Frame` rather than a value
//! returned in place.

use lattice_core::{AllocCtx, LatticeError, Result};
use lattice_runtime::builtins::{array_ops, buffer_ops, enum_ops, map_ops, set_ops, string_ops};
use lattice_runtime::heap_object::HeapObject;
use lattice_runtime::scheduler;
use lattice_runtime::string::LString;
use lattice_runtime::{channel, HeapPtr, Value, ValueKind};

use crate::vm::Vm;

pub(crate) fn call_method(vm: &mut Vm, receiver: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
    match &receiver.kind {
        ValueKind::Array(ptr) => call_array_method(vm, *ptr, method, args),
        ValueKind::Map(ptr) => call_map_method(vm, *ptr, method, args),
        ValueKind::Set(ptr) => call_set_method(vm, *ptr, method, args),
        ValueKind::Buffer(ptr) => call_buffer_method(vm, *ptr, method, args),
        ValueKind::String(_) => call_string_method(vm, receiver, method, args),
        ValueKind::Enum(ptr) => call_enum_method(vm, *ptr, method, args),
        ValueKind::Channel(ptr) => call_channel_method(vm, *ptr, method, args),
        _ => Err(LatticeError::type_error(format!("`{}` has no method `{method}`", receiver.type_name()))),
    }
}

/// `send`/`recv`/`close`/`is_closed` (spec §5): a full `send` or an empty,
/// unclosed `recv` spins on `scheduler::yield_now()`, the same documented
/// simplification as `eval_select`'s no-default branch — there's no real
/// suspension in a single cooperative worker.
fn call_channel_method(vm: &mut Vm, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
    use channel::{RecvOutcome, SendOutcome};
    match method {
        "send" => {
            let value = take_arg(&mut args, "send")?;
            loop {
                match channel::try_send(&mut vm.heap, ptr, value.clone())? {
                    SendOutcome::Sent => return Ok(Value::unit()),
                    SendOutcome::Closed => return Err(LatticeError::type_error("send on a closed channel")),
                    SendOutcome::Full => scheduler::yield_now(),
                }
            }
        }
        "recv" => loop {
            match channel::try_recv(&mut vm.heap, ptr)? {
                RecvOutcome::Value(v) => return Ok(v),
                RecvOutcome::Closed => return Ok(Value::nil()),
                RecvOutcome::Empty => scheduler::yield_now(),
            }
        },
        "close" => {
            channel::close(&mut vm.heap, ptr)?;
            Ok(Value::unit())
        }
        "is_closed" => Ok(Value::bool(channel::is_closed(&vm.heap, ptr)?)),
        _ => Err(LatticeError::type_error(format!("channel has no method `{method}`"))),
    }
}

fn call_array_method(vm: &mut Vm, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
    match method {
        "len" => Ok(Value::int(array_ops::len(&vm.heap, ptr)? as i64)),
        "push" => {
            array_ops::push(&mut vm.heap, ptr, take_arg(&mut args, "push")?)?;
            Ok(Value::unit())
        }
        "pop" => Ok(array_ops::pop(&mut vm.heap, ptr)?.unwrap_or_else(Value::nil)),
        "get" => {
            let i = take_int(&mut args, "get")?;
            array_ops::get(&vm.heap, ptr, i)
        }
        "set" => {
            let i = take_int(&mut args, "set")?;
            let value = take_arg(&mut args, "set")?;
            array_ops::set(&mut vm.heap, ptr, i, value)?;
            Ok(Value::unit())
        }
        "contains" => {
            let needle = take_arg(&mut args, "contains")?;
            Ok(Value::bool(array_ops::contains(&vm.heap, ptr, &needle)?))
        }
        "index_of" => {
            let needle = take_arg(&mut args, "index_of")?;
            Ok(array_ops::index_of(&vm.heap, ptr, &needle)?.map(|i| Value::int(i as i64)).unwrap_or_else(Value::nil))
        }
        "clear" => {
            array_ops::clear(&mut vm.heap, ptr)?;
            Ok(Value::unit())
        }
        "unique" => {
            array_ops::unique(&mut vm.heap, ptr)?;
            Ok(Value::unit())
        }
        "concat" => {
            let ValueKind::Array(other) = take_arg(&mut args, "concat")?.kind else {
                return Err(LatticeError::type_error("`concat` expects an array argument"));
            };
            let roots = vm.roots();
            let ctx = vm.current_ctx();
            array_ops::concat(&mut vm.heap, ptr, other, ctx, &roots)
        }
        _ => Err(LatticeError::type_error(format!("array has no method `{method}`"))),
    }
}

fn call_map_method(vm: &mut Vm, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
    match method {
        "len" => Ok(Value::int(map_ops::len(&vm.heap, ptr)? as i64)),
        "get" => {
            let key = take_string(&mut args, "get")?;
            Ok(map_ops::get(&vm.heap, ptr, &key)?.unwrap_or_else(Value::nil))
        }
        "set" => {
            let key = take_string(&mut args, "set")?;
            let value = take_arg(&mut args, "set")?;
            map_ops::set(&mut vm.heap, ptr, &key, value)?;
            Ok(Value::unit())
        }
        "remove" => {
            let key = take_string(&mut args, "remove")?;
            Ok(map_ops::remove(&mut vm.heap, ptr, &key)?.unwrap_or_else(Value::nil))
        }
        "contains_key" => {
            let key = take_string(&mut args, "contains_key")?;
            Ok(Value::bool(map_ops::contains_key(&vm.heap, ptr, &key)?))
        }
        "keys" => {
            let keys = map_ops::keys(&vm.heap, ptr)?;
            let items = keys.into_iter().map(|k| Value::fluid(ValueKind::String(LString::new_fluid(k)))).collect();
            let roots = vm.roots();
            let arr = vm.heap.alloc(HeapObject::Array(items), AllocCtx::Fluid, &roots);
            Ok(Value::fluid(ValueKind::Array(arr)))
        }
        "values" => {
            let values = map_ops::values(&vm.heap, ptr)?;
            let roots = vm.roots();
            let arr = vm.heap.alloc(HeapObject::Array(values), AllocCtx::Fluid, &roots);
            Ok(Value::fluid(ValueKind::Array(arr)))
        }
        _ => Err(LatticeError::type_error(format!("map has no method `{method}`"))),
    }
}

fn call_set_method(vm: &mut Vm, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
    match method {
        "len" => Ok(Value::int(set_ops::len(&vm.heap, ptr)? as i64)),
        "contains" => {
            let v = take_arg(&mut args, "contains")?;
            Ok(Value::bool(set_ops::contains(&vm.heap, ptr, &v)?))
        }
        "insert" => {
            let v = take_arg(&mut args, "insert")?;
            Ok(Value::bool(set_ops::insert(&mut vm.heap, ptr, v)?))
        }
        "remove" => {
            let v = take_arg(&mut args, "remove")?;
            Ok(Value::bool(set_ops::remove(&mut vm.heap, ptr, &v)?))
        }
        "union" | "intersection" | "difference" => {
            let ValueKind::Set(other) = take_arg(&mut args, method)?.kind else {
                return Err(LatticeError::type_error(format!("`{method}` expects a set argument")));
            };
            let roots = vm.roots();
            let ctx = vm.current_ctx();
            match method {
                "union" => set_ops::union(&mut vm.heap, ptr, other, ctx, &roots),
                "intersection" => set_ops::intersection(&mut vm.heap, ptr, other, ctx, &roots),
                _ => set_ops::difference(&mut vm.heap, ptr, other, ctx, &roots),
            }
        }
        _ => Err(LatticeError::type_error(format!("set has no method `{method}`"))),
    }
}

fn call_buffer_method(vm: &mut Vm, ptr: HeapPtr, method: &str, mut args: Vec<Value>) -> Result<Value> {
    match method {
        "len" => Ok(Value::int(buffer_ops::len(&vm.heap, ptr)? as i64)),
        "push_byte" => {
            let b = take_int(&mut args, "push_byte")?;
            buffer_ops::push_byte(&mut vm.heap, ptr, b as u8)?;
            Ok(Value::unit())
        }
        "get_byte" => {
            let i = take_int(&mut args, "get_byte")?;
            Ok(Value::int(buffer_ops::get_byte(&vm.heap, ptr, i)? as i64))
        }
        "set_byte" => {
            let i = take_int(&mut args, "set_byte")?;
            let b = take_int(&mut args, "set_byte")?;
            buffer_ops::set_byte(&mut vm.heap, ptr, i, b as u8)?;
            Ok(Value::unit())
        }
        "slice" => {
            let start = take_int(&mut args, "slice")?;
            let end = take_int(&mut args, "slice")?;
            let bytes = buffer_ops::slice(&vm.heap, ptr, start, end)?;
            let roots = vm.roots();
            let new_ptr = vm.heap.alloc(HeapObject::Buffer(bytes), AllocCtx::Fluid, &roots);
            Ok(Value::fluid(ValueKind::Buffer(new_ptr)))
        }
        "concat" => {
            let ValueKind::Buffer(other) = take_arg(&mut args, "concat")?.kind else {
                return Err(LatticeError::type_error("`concat` expects a buffer argument"));
            };
            let roots = vm.roots();
            let ctx = vm.current_ctx();
            buffer_ops::concat(&mut vm.heap, ptr, other, ctx, &roots)
        }
        _ => Err(LatticeError::type_error(format!("buffer has no method `{method}`"))),
    }
}

fn call_string_method(vm: &mut Vm, receiver: &Value, method: &str, mut args: Vec<Value>) -> Result<Value> {
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
            let items = parts.into_iter().map(|p| Value::fluid(ValueKind::String(LString::new_fluid(p)))).collect();
            let roots = vm.roots();
            let arr = vm.heap.alloc(HeapObject::Array(items), AllocCtx::Fluid, &roots);
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

fn call_enum_method(vm: &mut Vm, ptr: HeapPtr, method: &str, _args: Vec<Value>) -> Result<Value> {
    match method {
        "variant_name" => Ok(Value::fluid(ValueKind::String(LString::new_fluid(enum_ops::variant_name(&vm.heap, ptr)?)))),
        "enum_name" => Ok(Value::fluid(ValueKind::String(LString::new_fluid(enum_ops::enum_name(&vm.heap, ptr)?)))),
        "payload" => {
            let payload = enum_ops::payload(&vm.heap, ptr)?;
            let roots = vm.roots();
            let arr = vm.heap.alloc(HeapObject::Array(payload), AllocCtx::Fluid, &roots);
            Ok(Value::fluid(ValueKind::Array(arr)))
        }
        _ => Err(LatticeError::type_error(format!("enum has no method `{method}`"))),
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
