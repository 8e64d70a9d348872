//! Reactions (spec §4.4): closures registered against a variable name, fired
//! after every phase transition of that variable. New; no direct teacher
//! analogue (Seq has no phase model), structured as an independent keyed
//! registry the way the teacher structures its `memory_stats`/`scheduler`
//! registries.

use crate::value::Value;
use lattice_core::containers::OpenMap;

#[derive(Default)]
pub struct ReactionRegistry {
    by_target: OpenMap<Vec<Value>>,
}

impl ReactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `closure` (expected to be a `Value::Closure`) to fire on
    /// every phase transition of `target`.
    pub fn register(&mut self, target: &str, closure: Value) {
        match self.by_target.get_mut(target) {
            Some(list) => list.push(closure),
            None => {
                self.by_target.set(target, vec![closure]);
            }
        }
    }

    /// The closures registered against `target`, in registration order —
    /// the caller (evaluator/VM) invokes each with the variable's new value.
    pub fn fire(&self, target: &str) -> &[Value] {
        self.by_target
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn clear(&mut self, target: &str) {
        self.by_target.remove(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_closures_fire_in_order() {
        let mut reg = ReactionRegistry::new();
        assert!(reg.fire("x").is_empty());
        reg.register("x", Value::int(1));
        reg.register("x", Value::int(2));
        assert_eq!(reg.fire("x").len(), 2);
    }

    #[test]
    fn clear_removes_all_reactions_for_a_target() {
        let mut reg = ReactionRegistry::new();
        reg.register("x", Value::int(1));
        reg.clear("x");
        assert!(reg.fire("x").is_empty());
    }
}
