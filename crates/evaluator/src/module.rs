//! Module import (spec §3.4): resolving an `import` path to a `Program`,
//! running it once, and binding its exported top-level names.
//!
//! Resolution itself (filesystem, registry, whatever a host embeds) is left
//! to the caller via `ModuleResolver` — `lattice-cli` supplies a
//! filesystem-backed one; tests use an in-memory one.

use crate::eval::Evaluator;
use lattice_ast::Program;
use lattice_core::{AllocCtx, LatticeError, Result};
use lattice_runtime::heap_object::HeapObject;
use lattice_runtime::{Environment, Value, ValueKind};

pub trait ModuleResolver {
    fn resolve(&self, path: &str) -> Result<Program>;
}

/// Default resolver for an `Evaluator` with no host-supplied module system:
/// any `import` is an error. `lattice-cli` installs a real resolver before
/// running a program that uses `import`.
pub struct NoModules;

impl ModuleResolver for NoModules {
    fn resolve(&self, path: &str) -> Result<Program> {
        Err(LatticeError::type_error(format!(
            "cannot import `{path}`: no module resolver is configured"
        )))
    }
}

impl Evaluator {
    /// Imports `path`, binding either the whole module under `alias` (or
    /// `path` itself if no alias is given) or destructuring `names` out of
    /// it directly into `env` (spec §3.4).
    pub(crate) fn import(&mut self, env: &Environment, path: &str, alias: Option<&str>, names: &[String]) -> Result<()> {
        let module_value = if let Some(cached) = self.module_cache.get(path) {
            cached.clone()
        } else {
            let built = self.load_module(path)?;
            self.module_cache.get_or_insert_with(path, || Ok(built.clone()))?.clone()
        };

        if names.is_empty() {
            let binding_name = alias.unwrap_or(path);
            env.define(binding_name, module_value);
        } else {
            let ValueKind::Map(ptr) = module_value.kind else {
                return Err(LatticeError::type_error(format!("module `{path}` has no exports map")));
            };
            for name in names {
                let value = lattice_runtime::builtins::map_ops::get(&mut self.heap, ptr, name)?
                    .ok_or_else(|| LatticeError::KeyError {
                        message: format!("module `{path}` has no export named `{name}`"),
                        loc: None,
                    })?;
                env.define(name, value);
            }
        }
        Ok(())
    }

    /// Runs `path`'s `Program` into a fresh top-level environment (temporarily
    /// swapping in `self.globals` so nested function declarations close over
    /// the module's own scope, not the importer's), then snapshots its
    /// bindings into a fluid `Map` — the module's export table.
    fn load_module(&mut self, path: &str) -> Result<Value> {
        let program = self.resolver.clone().resolve(path)?;
        let module_globals = Environment::new();
        let previous_globals = std::mem::replace(&mut self.globals, module_globals.clone());
        let run_result = self.eval_program(&program);
        self.globals = previous_globals;
        run_result?;

        let mut exports = lattice_core::containers::OpenMap::new();
        for (name, value) in module_globals.snapshot() {
            exports.set(&name, value);
        }
        let roots = self.roots();
        let ptr = self.heap.alloc(HeapObject::Map(exports), AllocCtx::Fluid, &roots);
        Ok(Value::fluid(ValueKind::Map(ptr)))
    }
}
