//! Module cache (spec §4.4): resolved-path to module `Value` (a `Map`),
//! populated on first import so re-importing the same path doesn't re-run
//! the target program.

use crate::value::Value;
use lattice_core::containers::OpenMap;
use lattice_core::Result;

#[derive(Default)]
pub struct ModuleCache {
    modules: OpenMap<Value>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resolved_path: &str) -> Option<&Value> {
        self.modules.get(resolved_path)
    }

    /// Returns the cached module for `resolved_path`, running `build` (the
    /// caller's "evaluate the target program once" step) only on a miss.
    pub fn get_or_insert_with(
        &mut self,
        resolved_path: &str,
        build: impl FnOnce() -> Result<Value>,
    ) -> Result<&Value> {
        if !self.modules.contains_key(resolved_path) {
            let module = build()?;
            self.modules.set(resolved_path, module);
        }
        Ok(self.modules.get(resolved_path).expect("just inserted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_runs_only_once_per_path() {
        let mut cache = ModuleCache::new();
        let mut calls = 0;
        {
            let mut build = || {
                calls += 1;
                Ok(Value::int(1))
            };
            cache.get_or_insert_with("/a.lat", &mut build).unwrap();
        }
        cache.get_or_insert_with("/a.lat", || panic!("must not rebuild")).unwrap();
        assert_eq!(calls, 1);
    }
}
