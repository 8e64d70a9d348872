//! Lexical environment (spec §3.3, §4.3): a stack of scopes, reference
//! counted so closures can capture without copying.

use crate::value::Value;
use lattice_core::containers::OpenMap;
use lattice_core::heap::fluid::FluidHandle;
use lattice_core::{LatticeError, Result};
use std::cell::RefCell;
use std::rc::Rc;

struct EnvironmentInner {
    scopes: Vec<OpenMap<Value>>,
    parent: Option<Environment>,
}

/// A reference-counted environment handle (spec §3.3: "Environments are
/// reference-counted so closures can capture them without copying").
#[derive(Clone)]
pub struct Environment {
    inner: Rc<RefCell<EnvironmentInner>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                scopes: vec![OpenMap::new()],
                parent: None,
            })),
        }
    }

    /// A fresh environment whose lookups fall through to `parent` once its
    /// own scope stack is exhausted — used when a closure's body pushes a
    /// new parameter scope on top of its captured environment at call time
    /// (spec §4.3).
    pub fn child_of(parent: &Environment) -> Self {
        Environment {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                scopes: vec![OpenMap::new()],
                parent: Some(parent.clone()),
            })),
        }
    }

    pub fn push_scope(&self) {
        self.inner.borrow_mut().scopes.push(OpenMap::new());
    }

    pub fn pop_scope(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.scopes.pop();
        if inner.scopes.is_empty() {
            inner.scopes.push(OpenMap::new());
        }
    }

    /// Defines `name` in the topmost scope (spec §4.3).
    pub fn define(&self, name: &str, value: Value) {
        let mut inner = self.inner.borrow_mut();
        let top = inner.scopes.last_mut().expect("scope stack is never empty");
        top.set(name, value);
    }

    pub fn define_at(&self, depth: usize, name: &str, value: Value) {
        let mut inner = self.inner.borrow_mut();
        let len = inner.scopes.len();
        if depth < len {
            inner.scopes[len - 1 - depth].set(name, value);
        } else {
            drop(inner);
            self.define(name, value);
        }
    }

    /// Returns a deep-clone of the bound value (spec §4.3: "`get` returns a
    /// deep-clone"). Deep-cloning requires the heap, so this crate's `get`
    /// returns the raw value; `lattice-evaluator`/`lattice-vm` call
    /// `value_ops::deep_clone` on the result when spec semantics demand an
    /// independent copy (e.g. binding into a new scope).
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.inner.borrow();
        for scope in inner.scopes.iter().rev() {
            if let Some(v) = scope.get(name) {
                return Some(v.clone());
            }
        }
        match &inner.parent {
            Some(parent) => parent.get(name),
            None => None,
        }
    }

    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        for scope in inner.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                scope.set(name, value);
                return Ok(());
            }
        }
        let parent = inner.parent.clone();
        drop(inner);
        match parent {
            Some(parent) => parent.set(name, value),
            None => Err(LatticeError::type_error(format!("undefined variable `{name}`"))),
        }
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        let mut inner = self.inner.borrow_mut();
        for scope in inner.scopes.iter_mut().rev() {
            if let Some(v) = scope.remove(name) {
                return Some(v);
            }
        }
        None
    }

    /// Ordinary deep copy: a fresh environment with independently-owned
    /// scope maps (values themselves are shallow-cloned; callers deep-clone
    /// individual values through `value_ops` when true independence is
    /// required, matching spec §3.3's split between ordinary and
    /// arena-routed clone modes).
    pub fn clone_env(&self) -> Self {
        let inner = self.inner.borrow();
        Environment {
            inner: Rc::new(RefCell::new(EnvironmentInner {
                scopes: inner.scopes.clone(),
                parent: inner.parent.clone(),
            })),
        }
    }

    /// Every binding visible from this environment's own scopes (not
    /// walking to `parent`) — used by `lattice-evaluator`'s module import to
    /// snapshot a module's top-level exports, and by `spawn` to capture the
    /// bindings a new task's environment is seeded from.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let inner = self.inner.borrow();
        let mut out = Vec::new();
        for scope in &inner.scopes {
            for (k, v) in scope.iter() {
                out.push((k.to_string(), v.clone()));
            }
        }
        out
    }

    /// Gather every `FluidHandle` reachable from this environment's
    /// bindings, for the fluid GC's mark phase (`HeapObject::Closure`'s
    /// `Trace` impl calls this on the closure's captured environment).
    pub fn trace_into(&self, out: &mut Vec<FluidHandle>) {
        let inner = self.inner.borrow();
        for scope in &inner.scopes {
            for (_, v) in scope.iter() {
                if let Some(crate::value::HeapPtr::Fluid(h)) = v.heap_ptr() {
                    out.push(h);
                }
            }
        }
        if let Some(parent) = &inner.parent {
            parent.trace_into(out);
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get_in_same_scope() {
        let env = Environment::new();
        env.define("x", Value::int(1));
        assert!(matches!(env.get("x").unwrap().kind, crate::value::ValueKind::Int(1)));
    }

    #[test]
    fn set_walks_up_to_the_defining_scope() {
        let env = Environment::new();
        env.define("x", Value::int(1));
        env.push_scope();
        env.set("x", Value::int(2)).unwrap();
        env.pop_scope();
        assert!(matches!(env.get("x").unwrap().kind, crate::value::ValueKind::Int(2)));
    }

    #[test]
    fn set_unbound_variable_fails() {
        let env = Environment::new();
        assert!(env.set("nope", Value::int(1)).is_err());
    }

    #[test]
    fn child_of_falls_through_to_parent_lookups() {
        let parent = Environment::new();
        parent.define("x", Value::int(42));
        let child = Environment::child_of(&parent);
        assert!(matches!(child.get("x").unwrap().kind, crate::value::ValueKind::Int(42)));
    }
}
